//! Per-resource capability record

use serde_json::Value;

use crate::db::RecordRepository;
use crate::error::{Error, Result};
use crate::models::{LocalRecord, RecordFields, RemoteId, SyncScope};

/// Cursor strategy for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Full,
    Conditional,
    Resumable,
}

/// What the engine needs to know about one resource kind.
///
/// Only `resource`, `endpoint` and `strategy` are required; the defaults
/// match the common REST shape (`id` identity, `datetime` creation field).
pub trait ResourceAdapter: Send + Sync {
    /// Resource name used in scopes and ledger rows
    fn resource(&self) -> &str;

    /// Listing path relative to the organizer root
    fn endpoint(&self, parent: &str) -> String;

    fn strategy(&self) -> Strategy;

    /// Parent key records are stored under
    fn scope_parent(&self, parent: &str) -> String {
        parent.to_string()
    }

    fn scope(&self, parent: &str) -> SyncScope {
        SyncScope::new(self.resource(), self.scope_parent(parent))
    }

    fn remote_id(&self, object: &Value) -> Result<RemoteId> {
        id_field(self.resource(), object, "id")
    }

    fn fields(&self, _scope: &SyncScope, _object: &Value) -> Result<RecordFields> {
        Ok(RecordFields::default())
    }

    /// Store related child records after the object itself was written
    fn upsert_relations(
        &self,
        _repo: &dyn RecordRepository,
        _record: &LocalRecord,
        _object: &Value,
    ) -> Result<()> {
        Ok(())
    }

    /// Side effects before a record disappears
    fn before_delete(&self, _repo: &dyn RecordRepository, _record: &LocalRecord) -> Result<()> {
        Ok(())
    }

    /// Extra query parameters for every listing request
    fn query(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Creation timestamp used as the resume checkpoint
    fn created_at(&self, object: &Value) -> Option<String> {
        object
            .get("datetime")
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }

    fn creation_ordering(&self) -> &str {
        "datetime"
    }

    fn modification_ordering(&self) -> &str {
        "-last_modified"
    }
}

/// Read an identity from a numeric or string field.
pub fn id_field(resource: &str, object: &Value, field: &str) -> Result<RemoteId> {
    match object.get(field) {
        Some(Value::Number(number)) => number
            .as_i64()
            .map(RemoteId::from_number)
            .ok_or_else(|| Error::mapping(resource, format!("{field} is not an integer"))),
        Some(Value::String(code)) if !code.is_empty() => Ok(RemoteId::code(code.clone())),
        _ => Err(Error::mapping(resource, format!("missing {field}"))),
    }
}
