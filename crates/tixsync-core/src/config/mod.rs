//! Runtime configuration loaded from the environment

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::util::is_http_url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Remote API access
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Server root, without the `/api/v1` suffix
    pub api_url: String,
    pub organizer: String,
    pub token: String,
    pub http_timeout: Duration,
    /// Retries of a single request answered with 429
    pub rate_limit_retries: u32,
    /// Upper bound for a server-requested `Retry-After` sleep
    pub max_retry_after: Duration,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("api_url", &self.api_url)
            .field("organizer", &self.organizer)
            .field("token", &"[REDACTED]")
            .field("http_timeout", &self.http_timeout)
            .field("rate_limit_retries", &self.rate_limit_retries)
            .field("max_retry_after", &self.max_retry_after)
            .finish()
    }
}

impl RemoteConfig {
    pub fn new(
        api_url: impl Into<String>,
        organizer: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            organizer: organizer.into(),
            token: token.into(),
            http_timeout: Duration::from_secs(30),
            rate_limit_retries: 5,
            max_retry_after: Duration::from_secs(120),
        }
    }

    #[must_use]
    pub const fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries;
        self
    }

    #[must_use]
    pub const fn with_max_retry_after(mut self, max: Duration) -> Self {
        self.max_retry_after = max;
        self
    }

    /// Root every relative resource path is resolved against
    pub fn organizer_root(&self) -> String {
        format!(
            "{}/api/v1/organizers/{}/",
            self.api_url,
            urlencoding::encode(&self.organizer)
        )
    }
}

/// Engine sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Concurrent page-processing tasks
    pub page_workers: usize,
    /// Identities per reconciler query
    pub identity_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_workers: 2,
            identity_batch_size: crate::db::MAX_QUERY_PARAMETERS,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn with_page_workers(mut self, workers: usize) -> Self {
        self.page_workers = workers;
        self
    }

    #[must_use]
    pub const fn with_identity_batch_size(mut self, size: usize) -> Self {
        self.identity_batch_size = size;
        self
    }
}

/// Retention policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    pub enabled: bool,
    /// Days a record is kept after its event or sub-event ended
    pub days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            days: 14,
        }
    }
}

impl RetentionConfig {
    pub fn horizon(&self) -> chrono::Duration {
        chrono::Duration::days(self.days)
    }
}

/// Full sync configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub remote: RemoteConfig,
    pub engine: EngineConfig,
    pub retention: RetentionConfig,
    /// Event slugs to replicate; also the retention keep-list
    pub events: Vec<String>,
    /// Request heavy ticket rendering data with orders
    pub pdf_data: bool,
    /// Only fetch orders for sub-events that have not ended yet
    pub future_orders_only: bool,
    /// Directory holding cached item pictures
    pub media_dir: Option<PathBuf>,
}

impl SyncConfig {
    pub fn new(remote: RemoteConfig) -> Self {
        Self {
            remote,
            engine: EngineConfig::default(),
            retention: RetentionConfig::default(),
            events: Vec::new(),
            pdf_data: false,
            future_orders_only: false,
            media_dir: None,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: Vec<String>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub const fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    #[must_use]
    pub const fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    #[must_use]
    pub const fn with_pdf_data(mut self, enabled: bool) -> Self {
        self.pdf_data = enabled;
        self
    }

    #[must_use]
    pub const fn with_future_orders_only(mut self, enabled: bool) -> Self {
        self.future_orders_only = enabled;
        self
    }

    #[must_use]
    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = Some(dir.into());
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = required_trimmed(&lookup, "TIXSYNC_API_URL")?;
        if !is_http_url(&api_url) {
            return Err(ConfigError::Invalid(
                "TIXSYNC_API_URL must start with http:// or https://".to_string(),
            ));
        }
        let organizer = required_trimmed(&lookup, "TIXSYNC_ORGANIZER")?;
        let token = required_trimmed(&lookup, "TIXSYNC_API_TOKEN")?;

        let http_timeout = parse_ranged(&lookup, "TIXSYNC_HTTP_TIMEOUT_SECS", 30, 1..=600)?;
        let rate_limit_retries = parse_ranged(&lookup, "TIXSYNC_RATE_LIMIT_RETRIES", 5, 0..=20)?;
        let max_retry_after =
            parse_ranged(&lookup, "TIXSYNC_MAX_RETRY_AFTER_SECS", 120, 1..=3_600)?;
        let page_workers = parse_ranged(&lookup, "TIXSYNC_PAGE_WORKERS", 2, 1..=16)?;
        let identity_batch_size =
            parse_ranged(&lookup, "TIXSYNC_IDENTITY_BATCH_SIZE", 500, 1..=999)?;
        let retention_days = parse_ranged(&lookup, "TIXSYNC_RETENTION_DAYS", 14, 0..=3_650)?;

        let remote = RemoteConfig::new(api_url, organizer, token)
            .with_http_timeout(Duration::from_secs(http_timeout))
            .with_rate_limit_retries(u32::try_from(rate_limit_retries).unwrap_or(u32::MAX))
            .with_max_retry_after(Duration::from_secs(max_retry_after));

        let engine = EngineConfig {
            page_workers: usize::try_from(page_workers).unwrap_or(1),
            identity_batch_size: usize::try_from(identity_batch_size)
                .unwrap_or(crate::db::MAX_QUERY_PARAMETERS),
        };
        let retention = RetentionConfig {
            enabled: parse_bool(&lookup, "TIXSYNC_RETENTION_ENABLED", true)?,
            days: i64::try_from(retention_days).unwrap_or(14),
        };

        let events = optional_trimmed(&lookup, "TIXSYNC_EVENTS")
            .map(|value| parse_list(&value))
            .unwrap_or_default();

        Ok(Self {
            remote,
            engine,
            retention,
            events,
            pdf_data: parse_bool(&lookup, "TIXSYNC_PDF_DATA", false)?,
            future_orders_only: parse_bool(&lookup, "TIXSYNC_FUTURE_ORDERS_ONLY", false)?,
            media_dir: optional_trimmed(&lookup, "TIXSYNC_MEDIA_DIR").map(PathBuf::from),
        })
    }
}

/// Split a comma separated list, dropping blanks and duplicates.
pub fn parse_list(value: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in value.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        if !items.iter().any(|existing| existing == item) {
            items.push(item.to_string());
        }
    }
    items
}

fn parse_ranged(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let value = raw.parse::<u64>().map_err(|_| invalid())?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(invalid())
    }
}

fn parse_bool(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(format!("{name} must be true or false"))),
    }
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    crate::util::normalize_text_option(lookup(name))
}
