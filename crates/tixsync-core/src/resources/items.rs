//! Products, with cached pictures

use std::path::PathBuf;

use serde_json::Value;

use super::json_str;
use crate::db::RecordRepository;
use crate::error::Result;
use crate::models::{LocalRecord, RecordFields, SyncScope};
use crate::sync::{ResourceAdapter, Strategy};

#[derive(Debug, Clone, Default)]
pub struct ItemAdapter {
    media_dir: Option<PathBuf>,
}

impl ItemAdapter {
    pub const fn new() -> Self {
        Self { media_dir: None }
    }

    /// Directory holding downloaded item pictures
    #[must_use]
    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = Some(dir.into());
        self
    }

    /// Local file for the record's picture URL, if pictures are cached
    pub fn picture_path(&self, record: &LocalRecord) -> Option<PathBuf> {
        let dir = self.media_dir.as_ref()?;
        let url = json_str(&record.json_data, "picture")?;
        let name = url
            .split(['?', '#'])
            .next()?
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")?;
        Some(dir.join(name))
    }
}

impl ResourceAdapter for ItemAdapter {
    fn resource(&self) -> &str {
        "items"
    }

    fn endpoint(&self, parent: &str) -> String {
        format!("events/{parent}/items/")
    }

    fn strategy(&self) -> Strategy {
        Strategy::Full
    }

    fn fields(&self, scope: &SyncScope, _object: &Value) -> Result<RecordFields> {
        Ok(RecordFields {
            event_slug: Some(scope.parent.clone()),
            ..RecordFields::default()
        })
    }

    fn before_delete(&self, _repo: &dyn RecordRepository, record: &LocalRecord) -> Result<()> {
        let Some(path) = self.picture_path(record) else {
            return Ok(());
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Removed cached picture {}", path.display());
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
