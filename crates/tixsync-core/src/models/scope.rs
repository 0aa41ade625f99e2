//! Replication stream identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parent key used by organizer-level resources that have no owning event.
pub const ALL_PARENTS: &str = "__all__";

/// One independent replication stream: a resource kind under a parent key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncScope {
    pub resource: String,
    pub parent: String,
}

impl SyncScope {
    pub fn new(resource: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            parent: parent.into(),
        }
    }

    /// Scope for a resource that lives directly under the organizer.
    pub fn organizer(resource: impl Into<String>) -> Self {
        Self::new(resource, ALL_PARENTS)
    }

    pub fn is_organizer_level(&self) -> bool {
        self.parent == ALL_PARENTS
    }

    /// Sibling scope for another resource under the same parent.
    #[must_use]
    pub fn with_resource(&self, resource: impl Into<String>) -> Self {
        Self::new(resource, self.parent.clone())
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource, self.parent)
    }
}
