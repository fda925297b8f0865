//! HTTP client for the location delivery endpoint

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::types::{DeliveryTarget, Sample};

use super::payload;

/// How a single delivery attempt failed.
///
/// `Transport` and `Status` are retryable: the caller keeps the batch and
/// tries again on the next trigger. `Serialization` is not: the same payload
/// would fail on every future attempt, so the caller is expected to reset
/// the buffer.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Connection, DNS, timeout, or deadline failure before a response
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The server answered outside [200, 300)
    #[error("server returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The batch could not be encoded to the wire format
    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

/// HTTP client for delivering sample batches
pub struct DeliveryClient {
    http_client: reqwest::Client,
}

impl DeliveryClient {
    /// Create a client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    /// POST `batch` to `target`, bounded by `deadline` if the host supplied
    /// one (a time-boxed background execution window, say).
    ///
    /// The caller guarantees `batch` is non-empty. A deadline expiry aborts
    /// the request and counts as a transport failure; the buffer is only
    /// pruned by the caller after this returns Ok, so an aborted attempt
    /// leaves everything pending.
    pub async fn deliver(
        &self,
        batch: &[Sample],
        target: &DeliveryTarget,
        deadline: Option<Duration>,
    ) -> std::result::Result<(), DeliveryError> {
        let body = payload::encode_batch(batch)
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let headers = build_headers(target)?;

        let send = self
            .http_client
            .post(&target.endpoint)
            .headers(headers)
            .body(body)
            .send();

        let response = match deadline {
            Some(limit) => match tokio::time::timeout(limit, send).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(DeliveryError::Transport(format!(
                        "deadline of {:?} expired",
                        limit
                    )))
                }
            },
            None => send.await,
        }
        .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Build the request header map: configured headers first, then the forced
/// `Content-Type: application/json` (the forced value always wins, even
/// when the configured set defines its own Content-Type).
fn build_headers(target: &DeliveryTarget) -> std::result::Result<HeaderMap, DeliveryError> {
    let mut headers = HeaderMap::new();

    for (name, value) in &target.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| DeliveryError::Transport(format!("invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            DeliveryError::Transport(format!("invalid header value for {}: {}", name, e))
        })?;
        headers.insert(name, value);
    }

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(headers)
}

/// Validate a delivery target before persisting it.
///
/// Rejects endpoints that do not parse as URLs and headers that cannot be
/// represented on the wire, so a bad `configure` call fails loudly instead
/// of poisoning every later delivery attempt.
pub fn validate_target(target: &DeliveryTarget) -> Result<()> {
    reqwest::Url::parse(&target.endpoint)
        .map_err(|e| Error::Config(format!("invalid endpoint URL {:?}: {}", target.endpoint, e)))?;

    for (name, value) in &target.headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name {:?}: {}", name, e)))?;
        HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("invalid value for header {:?}: {}", name, e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn target(endpoint: &str, headers: &[(&str, &str)]) -> DeliveryTarget {
        DeliveryTarget {
            endpoint: endpoint.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_target() {
        let target = target(
            "https://api.example.com/locations",
            &[("Authorization", "Bearer abc"), ("X-Device-Id", "42")],
        );
        assert!(validate_target(&target).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        assert!(validate_target(&target("not a url", &[])).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_header_name() {
        assert!(validate_target(&target("https://example.com", &[("bad header", "v")])).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_header_value() {
        assert!(validate_target(&target("https://example.com", &[("X-Note", "line\nbreak")])).is_err());
    }

    #[test]
    fn test_forced_content_type_wins() {
        let target = target("https://example.com", &[("Content-Type", "text/plain")]);
        let headers = build_headers(&target).unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_configured_headers_carried() {
        let mut configured = HashMap::new();
        configured.insert("X-Api-Key".to_string(), "secret".to_string());
        let target = DeliveryTarget {
            endpoint: "https://example.com".to_string(),
            headers: configured,
        };

        let headers = build_headers(&target).unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "secret");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }
}
