//! Configurable adapter for resources without relations

use serde_json::Value;

use super::json_text;
use crate::error::Result;
use crate::models::{RecordFields, RemoteId, SyncScope, ALL_PARENTS};
use crate::sync::id_field;
use crate::sync::{ResourceAdapter, Strategy};

#[derive(Debug, Clone)]
pub struct GenericAdapter {
    resource: String,
    strategy: Strategy,
    organizer_level: bool,
    id_field: String,
    lookup_field: Option<String>,
    created_field: String,
    creation_ordering: String,
}

impl GenericAdapter {
    fn new(resource: impl Into<String>, strategy: Strategy, organizer_level: bool) -> Self {
        Self {
            resource: resource.into(),
            strategy,
            organizer_level,
            id_field: "id".to_string(),
            lookup_field: None,
            created_field: "datetime".to_string(),
            creation_ordering: "datetime".to_string(),
        }
    }

    /// Resource listed under `events/<slug>/<resource>/`
    pub fn event(resource: impl Into<String>, strategy: Strategy) -> Self {
        Self::new(resource, strategy, false)
    }

    /// Resource listed under `<resource>/` at organizer level
    pub fn organizer(resource: impl Into<String>, strategy: Strategy) -> Self {
        Self::new(resource, strategy, true)
    }

    #[must_use]
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Field copied into the indexed lookup column
    #[must_use]
    pub fn with_lookup_field(mut self, field: impl Into<String>) -> Self {
        self.lookup_field = Some(field.into());
        self
    }

    /// Creation field and the ordering that sorts by it
    #[must_use]
    pub fn with_created_field(
        mut self,
        field: impl Into<String>,
        ordering: impl Into<String>,
    ) -> Self {
        self.created_field = field.into();
        self.creation_ordering = ordering.into();
        self
    }
}

impl ResourceAdapter for GenericAdapter {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn endpoint(&self, parent: &str) -> String {
        if self.organizer_level {
            format!("{}/", self.resource)
        } else {
            format!("events/{parent}/{}/", self.resource)
        }
    }

    fn strategy(&self) -> Strategy {
        self.strategy
    }

    fn scope_parent(&self, parent: &str) -> String {
        if self.organizer_level {
            ALL_PARENTS.to_string()
        } else {
            parent.to_string()
        }
    }

    fn remote_id(&self, object: &Value) -> Result<RemoteId> {
        id_field(&self.resource, object, &self.id_field)
    }

    fn fields(&self, scope: &SyncScope, object: &Value) -> Result<RecordFields> {
        Ok(RecordFields {
            event_slug: (!scope.is_organizer_level()).then(|| scope.parent.clone()),
            subevent_id: object.get("subevent").and_then(Value::as_i64),
            lookup_key: self
                .lookup_field
                .as_deref()
                .and_then(|field| json_text(object, field)),
            ..RecordFields::default()
        })
    }

    fn created_at(&self, object: &Value) -> Option<String> {
        json_text(object, &self.created_field)
    }

    fn creation_ordering(&self) -> &str {
        &self.creation_ordering
    }
}
