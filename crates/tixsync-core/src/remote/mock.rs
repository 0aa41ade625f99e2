//! Scripted in-memory remote for tests and offline demos.
//!
//! Responses are queued per resource path (query string ignored) and served
//! in order. Every request is recorded so tests can assert on the exact URLs
//! and preconditions the engine produced.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use serde_json::{json, Value};

use super::{map_status, Fetched, RemoteApi, RemoteResponse};
use crate::error::{Error, Result};

/// Injected failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Connection dropped mid-request
    Disconnect,
    /// Error status with an optional body
    Status(u16, String),
}

/// One scripted response.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    Page {
        results: Vec<Value>,
        next: Option<String>,
        count: Option<usize>,
        generated: Option<String>,
        last_modified: Option<String>,
    },
    Object(Value),
    NotModified,
    Failure(MockFailure),
}

impl MockResponse {
    pub const fn page(results: Vec<Value>) -> Self {
        Self::Page {
            results,
            next: None,
            count: None,
            generated: None,
            last_modified: None,
        }
    }

    pub const fn object(value: Value) -> Self {
        Self::Object(value)
    }

    pub const fn not_modified() -> Self {
        Self::NotModified
    }

    pub const fn disconnect() -> Self {
        Self::Failure(MockFailure::Disconnect)
    }

    pub const fn status(status: u16) -> Self {
        Self::Failure(MockFailure::Status(status, String::new()))
    }

    #[must_use]
    pub fn with_next(mut self, url: impl Into<String>) -> Self {
        if let Self::Page { next, .. } = &mut self {
            *next = Some(url.into());
        }
        self
    }

    #[must_use]
    pub fn with_count(mut self, total: usize) -> Self {
        if let Self::Page { count, .. } = &mut self {
            *count = Some(total);
        }
        self
    }

    /// Set the `X-Page-Generated` header
    #[must_use]
    pub fn generated_at(mut self, ts: impl Into<String>) -> Self {
        if let Self::Page { generated, .. } = &mut self {
            *generated = Some(ts.into());
        }
        self
    }

    /// Set the `Last-Modified` header
    #[must_use]
    pub fn with_last_modified(mut self, ts: impl Into<String>) -> Self {
        if let Self::Page { last_modified, .. } = &mut self {
            *last_modified = Some(ts.into());
        }
        self
    }
}

/// A request the engine issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub if_modified_since: Option<String>,
}

impl RecordedRequest {
    /// Decoded query parameters
    pub fn query(&self) -> Vec<(String, String)> {
        let Some((_, query)) = self.url.split_once('?') else {
            return Vec::new();
        };
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(key), decode(value))
            })
            .collect()
    }

    /// First value of a query parameter
    pub fn param(&self, name: &str) -> Option<String> {
        self.query()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

fn decode(value: &str) -> String {
    urlencoding::decode(value).map_or_else(|_| value.to_string(), |decoded| decoded.into_owned())
}

/// In-memory `RemoteApi`.
pub struct MockRemote {
    root: String,
    queues: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new("https://tix.example/api/v1/organizers/demo/")
    }
}

impl MockRemote {
    /// `root` is stripped from absolute URLs before queue lookup.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            queues: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Absolute URL for a relative path, handy for `next` links.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.root, path.trim_start_matches('/'))
    }

    /// Queue a response for a path
    pub fn enqueue(&self, path: &str, response: MockResponse) -> &Self {
        let key = self.key(path);
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push_back(response);
        self
    }

    /// All requests so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Requests whose path matches
    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        let key = self.key(path);
        self.requests()
            .into_iter()
            .filter(|request| self.key(&request.url) == key)
            .collect()
    }

    /// Responses not yet consumed
    pub fn pending(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(VecDeque::len)
            .sum()
    }

    pub fn clear_requests(&self) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn key(&self, url: &str) -> String {
        let path = url.strip_prefix(self.root.as_str()).unwrap_or(url);
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        path.trim_start_matches('/').to_string()
    }
}

impl RemoteApi for MockRemote {
    async fn fetch(&self, url: &str, if_modified_since: Option<&str>) -> Result<RemoteResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                url: url.to_string(),
                if_modified_since: if_modified_since.map(ToString::to_string),
            });

        let key = self.key(url);
        let scripted = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        let Some(scripted) = scripted else {
            return Err(Error::InvalidResponse(format!(
                "no scripted response for {key}"
            )));
        };

        match scripted {
            MockResponse::Page {
                results,
                next,
                count,
                generated,
                last_modified,
            } => Ok(RemoteResponse {
                status: 200,
                body: Fetched::Data(json!({
                    "count": count.unwrap_or(results.len()),
                    "next": next,
                    "previous": null,
                    "results": results,
                })),
                last_modified,
                page_generated: generated,
            }),
            MockResponse::Object(value) => Ok(RemoteResponse {
                status: 200,
                body: Fetched::Data(value),
                last_modified: None,
                page_generated: None,
            }),
            MockResponse::NotModified => Ok(RemoteResponse {
                status: 304,
                body: Fetched::NotModified,
                last_modified: None,
                page_generated: None,
            }),
            MockResponse::Failure(MockFailure::Disconnect) => Err(Error::Io(
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
            )),
            MockResponse::Failure(MockFailure::Status(status, body)) => {
                Err(map_status(status, &body))
            }
        }
    }
}
