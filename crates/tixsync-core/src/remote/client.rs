//! HTTP implementation of the remote API

use std::time::Duration;

use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, IF_MODIFIED_SINCE, LAST_MODIFIED, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{Fetched, RemoteApi, RemoteResponse, PAGE_GENERATED_HEADER};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url};

/// Sleep used when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: Option<String>,
    error: Option<String>,
}

/// Authenticated REST client for one organizer.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    root: String,
    token: String,
    rate_limit_retries: u32,
    max_retry_after: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ApiClient")
            .field("root", &self.root)
            .field("token", &"[REDACTED]")
            .field("rate_limit_retries", &self.rate_limit_retries)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        if !is_http_url(&config.api_url) {
            return Err(Error::InvalidInput(
                "API URL must include http:// or https://".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("tixsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            root: config.organizer_root(),
            token: config.token.clone(),
            rate_limit_retries: config.rate_limit_retries,
            max_retry_after: config.max_retry_after,
        })
    }

    /// Organizer API root
    pub fn root(&self) -> &str {
        &self.root
    }

    fn resolve(&self, url: &str) -> String {
        if is_http_url(url) {
            url.to_string()
        } else {
            format!("{}{}", self.root, url.trim_start_matches('/'))
        }
    }
}

impl RemoteApi for ApiClient {
    async fn fetch(&self, url: &str, if_modified_since: Option<&str>) -> Result<RemoteResponse> {
        let url = self.resolve(url);
        let mut attempts = 0;

        loop {
            let mut request = self
                .http
                .get(&url)
                .header(AUTHORIZATION, format!("Token {}", self.token))
                .header(ACCEPT, "application/json");
            if let Some(since) = if_modified_since {
                request = request.header(IF_MODIFIED_SINCE, since);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempts >= self.rate_limit_retries {
                    return Err(Error::RateLimited(url));
                }
                attempts += 1;
                let delay = parse_retry_after(response.headers())
                    .unwrap_or(DEFAULT_RETRY_AFTER)
                    .min(self.max_retry_after);
                tracing::debug!(
                    "Rate limited on {}, retrying in {:?} (attempt {})",
                    url,
                    delay,
                    attempts
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let last_modified = header_string(response.headers(), LAST_MODIFIED.as_str());
            let page_generated = header_string(response.headers(), PAGE_GENERATED_HEADER);

            if status == StatusCode::NOT_MODIFIED {
                return Ok(RemoteResponse {
                    status: status.as_u16(),
                    body: Fetched::NotModified,
                    last_modified,
                    page_generated,
                });
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(map_status(status.as_u16(), &body));
            }

            let bytes = response.bytes().await?;
            let body = serde_json::from_slice(&bytes).map_err(|error| {
                Error::InvalidResponse(format!("{url} returned malformed JSON: {error}"))
            })?;

            return Ok(RemoteResponse {
                status: status.as_u16(),
                body: Fetched::Data(body),
                last_modified,
                page_generated,
            });
        }
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Delay requested by a `Retry-After` header given in seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a failed HTTP status onto the error taxonomy.
pub fn map_status(status: u16, body: &str) -> Error {
    let message = parse_api_error(body).unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        401 => Error::Unauthorized(message),
        403 => Error::PermissionDenied(message),
        404 => Error::NotFound(message),
        409 => Error::Conflict(message),
        _ => Error::Api { status, message },
    }
}

fn parse_api_error(body: &str) -> Option<String> {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.detail.or(payload.error) {
            return Some(message.trim().to_string());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 12 "));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn statuses_map_to_taxonomy() {
        assert!(matches!(
            map_status(401, r#"{"detail": "Device access has been revoked."}"#),
            Error::Unauthorized(message) if message == "Device access has been revoked."
        ));
        assert!(matches!(map_status(403, ""), Error::PermissionDenied(_)));
        assert!(matches!(map_status(404, "<html>"), Error::NotFound(_)));
        assert!(matches!(map_status(409, ""), Error::Conflict(_)));
        assert!(matches!(
            map_status(503, ""),
            Error::Api { status: 503, message } if message == "HTTP 503"
        ));
    }

    #[test]
    fn relative_paths_resolve_against_organizer_root() {
        let config = RemoteConfig::new("https://tix.example/", "demo", "secret-device-token");
        let client = ApiClient::new(&config).unwrap();

        assert_eq!(
            client.resolve("/events/democon/orders/?ordering=datetime"),
            "https://tix.example/api/v1/organizers/demo/events/democon/orders/?ordering=datetime"
        );
        assert_eq!(
            client.resolve("https://tix.example/api/v1/organizers/demo/events/?page=2"),
            "https://tix.example/api/v1/organizers/demo/events/?page=2"
        );
        assert!(!format!("{client:?}").contains("secret-device-token"));
    }

    #[test]
    fn rejects_non_http_root() {
        let config = RemoteConfig::new("tix.example", "demo", "token");
        assert!(ApiClient::new(&config).is_err());
    }
}
