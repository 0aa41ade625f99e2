//! Sync cursor model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::SyncScope;
use crate::error::Error;

const INCOMPLETE_PREFIX: &str = "incomplete:";

/// Whether the last run of a scope finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum CursorStatus {
    Complete,
    /// Interrupted creation-ordered fetch; resume from this creation timestamp.
    Incomplete { created_since: String },
}

impl fmt::Display for CursorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("complete"),
            Self::Incomplete { created_since } => write!(f, "{INCOMPLETE_PREFIX}{created_since}"),
        }
    }
}

impl FromStr for CursorStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "complete" {
            return Ok(Self::Complete);
        }
        match s.strip_prefix(INCOMPLETE_PREFIX) {
            Some(ts) if !ts.trim().is_empty() => Ok(Self::Incomplete {
                created_since: ts.to_string(),
            }),
            _ => Err(Error::InvalidInput(format!("Unknown cursor status: {s}"))),
        }
    }
}

/// Persisted bookmark for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub last_modified: Option<String>,
    pub meta: Option<String>,
    pub status: Option<CursorStatus>,
}

impl SyncCursor {
    pub fn complete(last_modified: Option<String>, meta: Option<String>) -> Self {
        Self {
            last_modified,
            meta,
            status: Some(CursorStatus::Complete),
        }
    }

    pub fn incomplete(
        last_modified: Option<String>,
        meta: Option<String>,
        created_since: impl Into<String>,
    ) -> Self {
        Self {
            last_modified,
            meta,
            status: Some(CursorStatus::Incomplete {
                created_since: created_since.into(),
            }),
        }
    }

    /// A cursor written before status tracking existed counts as complete
    /// when it carries a timestamp.
    pub fn is_complete(&self) -> bool {
        match &self.status {
            Some(CursorStatus::Complete) => true,
            Some(CursorStatus::Incomplete { .. }) => false,
            None => self.last_modified.is_some(),
        }
    }

    /// Creation timestamp to resume from, if the last run was interrupted.
    pub fn resume_point(&self) -> Option<&str> {
        match &self.status {
            Some(CursorStatus::Incomplete { created_since }) => Some(created_since),
            _ => None,
        }
    }
}

/// A ledger row as listed for status display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorEntry {
    pub scope: SyncScope,
    pub cursor: SyncCursor,
    pub updated_at: i64,
}
