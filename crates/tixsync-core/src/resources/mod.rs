//! Built-in resource adapters

mod events;
mod generic;
mod items;
mod orders;

pub use events::{EventAdapter, SubEventAdapter};
pub use generic::GenericAdapter;
pub use items::ItemAdapter;
pub use orders::{OrderAdapter, CHECKINS, POSITIONS};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::SyncConfig;
use crate::db::RecordRepository;
use crate::error::Result;
use crate::models::{LocalRecord, RecordDraft, RemoteId, SyncScope};
use crate::sync::{ResourceAdapter, Strategy};
use crate::util::parse_timestamp_millis;

/// Adapters a full sync runs, in order.
pub struct Catalog {
    /// Synced once under the organizer
    pub organizer: Vec<Arc<dyn ResourceAdapter>>,
    /// Synced once per configured event
    pub event: Vec<Arc<dyn ResourceAdapter>>,
}

impl Catalog {
    pub fn find(&self, resource: &str) -> Option<&Arc<dyn ResourceAdapter>> {
        self.organizer
            .iter()
            .chain(&self.event)
            .find(|adapter| adapter.resource() == resource)
    }
}

/// Standard adapter sets for a configuration.
pub fn catalog(config: &SyncConfig) -> Catalog {
    let mut items = ItemAdapter::new();
    if let Some(dir) = &config.media_dir {
        items = items.with_media_dir(dir.clone());
    }

    Catalog {
        organizer: vec![
            Arc::new(EventAdapter),
            Arc::new(
                GenericAdapter::organizer("reusablemedia", Strategy::Resumable)
                    .with_lookup_field("identifier")
                    .with_created_field("created", "created"),
            ),
        ],
        event: vec![
            Arc::new(SubEventAdapter),
            Arc::new(GenericAdapter::event("categories", Strategy::Full)),
            Arc::new(items),
            Arc::new(GenericAdapter::event("questions", Strategy::Full)),
            Arc::new(GenericAdapter::event("quotas", Strategy::Full)),
            Arc::new(GenericAdapter::event("taxrules", Strategy::Full)),
            Arc::new(GenericAdapter::event("checkinlists", Strategy::Full)),
            Arc::new(GenericAdapter::event("badgelayouts", Strategy::Full)),
            Arc::new(
                GenericAdapter::event("revokedsecrets", Strategy::Resumable)
                    .with_lookup_field("secret")
                    .with_created_field("created", "created"),
            ),
            Arc::new(
                GenericAdapter::event("blockedsecrets", Strategy::Conditional)
                    .with_lookup_field("secret"),
            ),
            Arc::new(OrderAdapter::new().with_pdf_data(config.pdf_data)),
        ],
    }
}

/// Reconcile the children of `parent` of one resource against `drafts`.
///
/// Unchanged children are kept as is, changed ones updated, missing ones
/// inserted and children absent from `drafts` deleted. Returns the current
/// children in draft order.
pub fn sync_children(
    repo: &dyn RecordRepository,
    parent: &LocalRecord,
    resource: &str,
    drafts: Vec<RecordDraft>,
) -> Result<Vec<LocalRecord>> {
    let scope = SyncScope::new(resource, parent.scope.clone());

    let mut existing: HashMap<RemoteId, LocalRecord> = HashMap::new();
    let mut stale = Vec::new();
    for child in repo.children(parent.id, resource)? {
        if existing.contains_key(&child.remote_id) {
            stale.push(child.id);
        } else {
            existing.insert(child.remote_id.clone(), child);
        }
    }

    let mut current = Vec::with_capacity(drafts.len());
    for mut draft in drafts {
        draft.parent_id = Some(parent.id);
        match existing.remove(&draft.remote_id) {
            Some(child) if child.matches(&draft.json_data) && child.fields == draft.fields => {
                current.push(child);
            }
            Some(child) => {
                repo.update(child.id, &draft)?;
                current.push(LocalRecord {
                    parent_id: draft.parent_id,
                    json_data: draft.json_data,
                    fields: draft.fields,
                    delete_after: None,
                    ..child
                });
            }
            None => current.push(repo.insert(&scope, &draft)?),
        }
    }

    stale.extend(existing.into_values().map(|child| child.id));
    repo.delete_many(&stale)?;
    Ok(current)
}

pub(crate) fn json_str<'a>(object: &'a Value, field: &str) -> Option<&'a str> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

/// Field as text; numbers are rendered in decimal.
pub(crate) fn json_text(object: &Value, field: &str) -> Option<String> {
    match object.get(field)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn json_time(object: &Value, field: &str) -> Option<i64> {
    json_str(object, field).and_then(parse_timestamp_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::db::{Database, SqliteRecordRepository};
    use crate::models::RecordFields;
    use serde_json::json;

    fn child(id: i64, name: &str) -> RecordDraft {
        RecordDraft {
            remote_id: RemoteId::from_number(id),
            parent_id: None,
            json_data: json!({"id": id, "name": name}),
            fields: RecordFields::default(),
        }
    }

    #[test]
    fn sync_children_reconciles_by_identity() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(db.connection());
        let parent = repo
            .insert(
                &SyncScope::new("orders", "democon"),
                &RecordDraft {
                    remote_id: RemoteId::code("ABC12"),
                    parent_id: None,
                    json_data: json!({"code": "ABC12"}),
                    fields: RecordFields::default(),
                },
            )
            .unwrap();

        let first = sync_children(
            &repo,
            &parent,
            "orderpositions",
            vec![child(1, "a"), child(2, "b")],
        )
        .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].scope, "democon");

        let second = sync_children(
            &repo,
            &parent,
            "orderpositions",
            vec![child(2, "b"), child(3, "c")],
        )
        .unwrap();

        assert_eq!(second[0].id, first[1].id);
        let ids: Vec<_> = repo
            .children(parent.id, "orderpositions")
            .unwrap()
            .into_iter()
            .map(|record| record.remote_id)
            .collect();
        assert_eq!(ids, vec![RemoteId::from_number(2), RemoteId::from_number(3)]);
    }

    #[test]
    fn catalog_lists_standard_resources() {
        let config = SyncConfig::new(RemoteConfig::new("https://tix.example", "demo", "t"));
        let catalog = catalog(&config);

        let organizer: Vec<_> = catalog.organizer.iter().map(|a| a.resource()).collect();
        assert_eq!(organizer, vec!["events", "reusablemedia"]);
        assert_eq!(catalog.event.last().unwrap().resource(), "orders");
        assert_eq!(
            catalog.find("revokedsecrets").unwrap().strategy(),
            Strategy::Resumable
        );
        assert!(catalog.find("notes").is_none());
    }

    #[test]
    fn json_helpers() {
        let object = json!({"id": 4, "code": "", "date_from": "2024-05-01T10:00:00Z"});
        assert_eq!(json_text(&object, "id").as_deref(), Some("4"));
        assert_eq!(json_str(&object, "code"), None);
        assert_eq!(json_time(&object, "date_from"), Some(1_714_557_600_000));
        assert_eq!(json_time(&object, "date_to"), None);
    }
}
