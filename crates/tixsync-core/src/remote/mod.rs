//! Remote REST resource access

mod client;
pub mod mock;

pub use client::{map_status, parse_retry_after, ApiClient};

use serde_json::Value;

use crate::error::{Error, Result};

/// Header carrying the server time at which a page was generated.
pub const PAGE_GENERATED_HEADER: &str = "x-page-generated";

/// Body of a fetch: data, or a satisfied precondition.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    NotModified,
    Data(Value),
}

/// Parsed response plus the headers the sync protocol reads.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Fetched,
    pub last_modified: Option<String>,
    pub page_generated: Option<String>,
}

/// Paginated JSON fetch capability.
#[allow(async_fn_in_trait)]
pub trait RemoteApi {
    /// GET `url` (absolute, or relative to the organizer API root).
    ///
    /// `if_modified_since` is sent as a precondition; a satisfied precondition
    /// is returned as `Fetched::NotModified`, not as an error.
    async fn fetch(&self, url: &str, if_modified_since: Option<&str>) -> Result<RemoteResponse>;
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub count: usize,
    pub next: Option<String>,
    pub results: Vec<Value>,
}

impl Page {
    /// Decode `{count, next, results}`. A bare array is a single final page.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(results) => Ok(Self {
                count: results.len(),
                next: None,
                results,
            }),
            Value::Object(mut map) => {
                let results = match map.remove("results") {
                    Some(Value::Array(results)) => results,
                    _ => {
                        return Err(Error::InvalidResponse(
                            "page has no results array".to_string(),
                        ))
                    }
                };
                let next = map
                    .get("next")
                    .and_then(Value::as_str)
                    .filter(|next| !next.trim().is_empty())
                    .map(ToString::to_string);
                let count = map
                    .get("count")
                    .and_then(Value::as_u64)
                    .and_then(|count| usize::try_from(count).ok())
                    .unwrap_or(results.len());
                Ok(Self {
                    count,
                    next,
                    results,
                })
            }
            other => Err(Error::InvalidResponse(format!(
                "expected a page object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
