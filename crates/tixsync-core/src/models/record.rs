//! Local record model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Server-assigned identity of a remote object, normalized to a string key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn from_number(id: i64) -> Self {
        Self(id.to_string())
    }

    pub fn code(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Identity made of several parts, joined with `/`.
    pub fn composite(parts: &[&str]) -> Self {
        Self(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value when the identity is a plain id.
    pub fn as_number(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Indexed columns an adapter derives from the JSON payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    pub event_slug: Option<String>,
    pub subevent_id: Option<i64>,
    /// Ticket secret or media identifier used by offline lookups
    pub lookup_key: Option<String>,
    /// Unix milliseconds
    pub starts_at: Option<i64>,
    /// Unix milliseconds
    pub ends_at: Option<i64>,
}

/// Everything needed to insert a record; the store assigns the surrogate key.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub remote_id: RemoteId,
    pub parent_id: Option<i64>,
    pub json_data: Value,
    pub fields: RecordFields,
}

/// Persisted representation of one remote object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub id: i64,
    pub resource: String,
    pub scope: String,
    pub remote_id: RemoteId,
    pub parent_id: Option<i64>,
    pub json_data: Value,
    pub fields: RecordFields,
    /// Unix milliseconds after which retention may delete the record.
    /// `None` means the schedule is pending re-evaluation.
    pub delete_after: Option<i64>,
    pub synced_at: i64,
}

impl LocalRecord {
    /// Structural comparison against a fresh payload, ignoring key order.
    pub fn matches(&self, object: &Value) -> bool {
        self.json_data == *object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_id_forms() {
        assert_eq!(RemoteId::from_number(42).as_str(), "42");
        assert_eq!(RemoteId::from_number(42).as_number(), Some(42));
        assert_eq!(RemoteId::code("ABC12").as_number(), None);
        assert_eq!(
            RemoteId::composite(&["3", "2024-05-01T10:00:00Z", "entry"]).as_str(),
            "3/2024-05-01T10:00:00Z/entry"
        );
    }

    #[test]
    fn matches_ignores_key_order() {
        let record = LocalRecord {
            id: 1,
            resource: "orders".to_string(),
            scope: "democon".to_string(),
            remote_id: RemoteId::code("ABC12"),
            parent_id: None,
            json_data: json!({"code": "ABC12", "status": "p", "total": "10.00"}),
            fields: RecordFields::default(),
            delete_after: None,
            synced_at: 0,
        };

        assert!(record.matches(&json!({"total": "10.00", "status": "p", "code": "ABC12"})));
        assert!(!record.matches(&json!({"code": "ABC12", "status": "n", "total": "10.00"})));
    }
}
