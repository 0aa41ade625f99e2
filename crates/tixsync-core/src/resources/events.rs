//! Events and sub-events

use serde_json::Value;

use super::{json_str, json_time};
use crate::error::Result;
use crate::models::{RecordFields, RemoteId, SyncScope, ALL_PARENTS};
use crate::sync::id_field;
use crate::sync::{ResourceAdapter, Strategy};

/// Start and end of an event-like object. The end falls back to the start.
fn date_fields(object: &Value) -> (Option<i64>, Option<i64>) {
    let starts_at = json_time(object, "date_from");
    let ends_at = json_time(object, "date_to").or(starts_at);
    (starts_at, ends_at)
}

/// Organizer-level event list, keyed by slug.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventAdapter;

impl ResourceAdapter for EventAdapter {
    fn resource(&self) -> &str {
        "events"
    }

    fn endpoint(&self, _parent: &str) -> String {
        "events/".to_string()
    }

    fn strategy(&self) -> Strategy {
        Strategy::Conditional
    }

    fn scope_parent(&self, _parent: &str) -> String {
        ALL_PARENTS.to_string()
    }

    fn remote_id(&self, object: &Value) -> Result<RemoteId> {
        id_field(self.resource(), object, "slug")
    }

    fn fields(&self, _scope: &SyncScope, object: &Value) -> Result<RecordFields> {
        let (starts_at, ends_at) = date_fields(object);
        Ok(RecordFields {
            event_slug: json_str(object, "slug").map(ToString::to_string),
            starts_at,
            ends_at,
            ..RecordFields::default()
        })
    }
}

/// Dates of an event series.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubEventAdapter;

impl ResourceAdapter for SubEventAdapter {
    fn resource(&self) -> &str {
        "subevents"
    }

    fn endpoint(&self, parent: &str) -> String {
        format!("events/{parent}/subevents/")
    }

    fn strategy(&self) -> Strategy {
        Strategy::Conditional
    }

    fn fields(&self, scope: &SyncScope, object: &Value) -> Result<RecordFields> {
        let (starts_at, ends_at) = date_fields(object);
        Ok(RecordFields {
            event_slug: Some(scope.parent.clone()),
            subevent_id: object.get("id").and_then(Value::as_i64),
            starts_at,
            ends_at,
            ..RecordFields::default()
        })
    }
}
