//! Orders with nested positions and check-ins

use serde_json::Value;

use super::{json_str, json_text, json_time, sync_children};
use crate::db::RecordRepository;
use crate::error::{Error, Result};
use crate::models::{LocalRecord, RecordDraft, RecordFields, RemoteId, SyncScope};
use crate::sync::{id_field, ResourceAdapter, Strategy};

pub const POSITIONS: &str = "orderpositions";
pub const CHECKINS: &str = "checkins";

/// Order fields dropped from listings unless explicitly needed
const DEFAULT_EXCLUDES: [&str; 2] = ["payments", "refunds"];

#[derive(Debug, Clone)]
pub struct OrderAdapter {
    pdf_data: bool,
    exclude: Vec<String>,
}

impl Default for OrderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderAdapter {
    pub fn new() -> Self {
        Self {
            pdf_data: false,
            exclude: DEFAULT_EXCLUDES.iter().map(ToString::to_string).collect(),
        }
    }

    /// Request ticket rendering data with every position
    #[must_use]
    pub const fn with_pdf_data(mut self, enabled: bool) -> Self {
        self.pdf_data = enabled;
        self
    }

    #[must_use]
    pub fn with_exclude(mut self, fields: Vec<String>) -> Self {
        self.exclude = fields;
        self
    }

    fn position_draft(scope: &SyncScope, position: &Value) -> Result<RecordDraft> {
        Ok(RecordDraft {
            remote_id: id_field(POSITIONS, position, "id")?,
            parent_id: None,
            json_data: position.clone(),
            fields: RecordFields {
                event_slug: Some(scope.parent.clone()),
                subevent_id: position.get("subevent").and_then(Value::as_i64),
                lookup_key: json_str(position, "secret").map(ToString::to_string),
                ..RecordFields::default()
            },
        })
    }

    fn checkin_draft(scope: &SyncScope, checkin: &Value) -> Result<RecordDraft> {
        let remote_id = match json_text(checkin, "id") {
            Some(id) => RemoteId::code(id),
            None => {
                let list = json_text(checkin, "list")
                    .ok_or_else(|| Error::mapping(CHECKINS, "missing list"))?;
                let datetime = json_str(checkin, "datetime")
                    .ok_or_else(|| Error::mapping(CHECKINS, "missing datetime"))?;
                let kind = json_str(checkin, "type").unwrap_or("entry");
                RemoteId::composite(&[&list, datetime, kind])
            }
        };
        Ok(RecordDraft {
            remote_id,
            parent_id: None,
            json_data: checkin.clone(),
            fields: RecordFields {
                event_slug: Some(scope.parent.clone()),
                starts_at: json_time(checkin, "datetime"),
                ..RecordFields::default()
            },
        })
    }
}

fn array<'a>(object: &'a Value, field: &str) -> &'a [Value] {
    object
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

impl ResourceAdapter for OrderAdapter {
    fn resource(&self) -> &str {
        "orders"
    }

    fn endpoint(&self, parent: &str) -> String {
        format!("events/{parent}/orders/")
    }

    fn strategy(&self) -> Strategy {
        Strategy::Resumable
    }

    fn remote_id(&self, object: &Value) -> Result<RemoteId> {
        id_field(self.resource(), object, "code")
    }

    fn fields(&self, scope: &SyncScope, object: &Value) -> Result<RecordFields> {
        Ok(RecordFields {
            event_slug: Some(scope.parent.clone()),
            lookup_key: json_str(object, "code").map(ToString::to_string),
            starts_at: json_time(object, "datetime"),
            ..RecordFields::default()
        })
    }

    fn upsert_relations(
        &self,
        repo: &dyn RecordRepository,
        record: &LocalRecord,
        object: &Value,
    ) -> Result<()> {
        let scope = SyncScope::new(POSITIONS, record.scope.clone());
        let positions = array(object, "positions");
        let drafts = positions
            .iter()
            .map(|position| Self::position_draft(&scope, position))
            .collect::<Result<Vec<_>>>()?;

        let stored = sync_children(repo, record, POSITIONS, drafts)?;
        for (position, json) in stored.iter().zip(positions) {
            let checkins = array(json, "checkins")
                .iter()
                .map(|checkin| Self::checkin_draft(&scope, checkin))
                .collect::<Result<Vec<_>>>()?;
            sync_children(repo, position, CHECKINS, checkins)?;
        }
        Ok(())
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = self
            .exclude
            .iter()
            .map(|field| ("exclude".to_string(), field.clone()))
            .collect();
        if self.pdf_data {
            query.push(("pdf_data".to_string(), "true".to_string()));
        }
        query
    }
}
