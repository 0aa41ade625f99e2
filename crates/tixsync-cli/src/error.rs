use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tixsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No events configured. Pass --event or set TIXSYNC_EVENTS.")]
    NoEvents,
    #[error("Lookup key cannot be empty")]
    EmptyLookupKey,
    #[error("Sync cancelled")]
    Cancelled,
}

impl From<tixsync_core::config::ConfigError> for CliError {
    fn from(error: tixsync_core::config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}
