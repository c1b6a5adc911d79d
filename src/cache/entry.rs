//! Serialized form of a cached response.

use std::collections::BTreeMap;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Headers that describe one particular transmission rather than the resource.
const SKIPPED_HEADERS: [&str; 3] = ["content-length", "date", "server"];

/// Stored response: `{status_code, media_type, headers, body}` with a base64 body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status_code: u16,
    pub media_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum CacheEntryError {
    #[error("cache entry is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache entry body is not valid base64: {0}")]
    Body(#[from] base64::DecodeError),
    #[error("cache entry has invalid status code {0}")]
    Status(u16),
}

impl CacheEntry {
    /// Capture a response for storage.
    ///
    /// Header values that are not visible ASCII cannot round-trip through
    /// the JSON form and are dropped.
    pub fn capture(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
        let media_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let headers = headers
            .iter()
            .filter(|(name, _)| !SKIPPED_HEADERS.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        Self {
            status_code: status.as_u16(),
            media_type,
            headers,
            body: STANDARD.encode(body),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CacheEntryError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, CacheEntryError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Rebuild an HTTP response equivalent to the captured one.
    pub fn into_response(self) -> Result<Response, CacheEntryError> {
        let status = StatusCode::from_u16(self.status_code)
            .map_err(|_| CacheEntryError::Status(self.status_code))?;
        let body = Bytes::from(STANDARD.decode(self.body.as_bytes())?);

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        if !headers.contains_key(header::CONTENT_TYPE)
            && let Some(media_type) = self
                .media_type
                .as_deref()
                .and_then(|value| HeaderValue::from_str(value).ok())
        {
            headers.insert(header::CONTENT_TYPE, media_type);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("11"));
        headers.insert(header::DATE, HeaderValue::from_static("Sun, 18 Oct 2026 10:00:00 GMT"));
        headers.insert(header::SERVER, HeaderValue::from_static("longbox"));
        headers.insert("x-custom", HeaderValue::from_static("kept"));
        headers
    }

    #[test]
    fn capture_skips_transmission_headers() {
        let entry = CacheEntry::capture(StatusCode::OK, &sample_headers(), b"{\"ok\":true}");
        assert_eq!(entry.status_code, 200);
        assert_eq!(entry.media_type.as_deref(), Some("application/json"));
        assert!(!entry.headers.contains_key("content-length"));
        assert!(!entry.headers.contains_key("date"));
        assert!(!entry.headers.contains_key("server"));
        assert_eq!(entry.headers.get("x-custom").map(String::as_str), Some("kept"));
        assert_eq!(entry.body, STANDARD.encode(b"{\"ok\":true}"));
    }

    #[test]
    fn json_layout_uses_wire_field_names() {
        let entry = CacheEntry::capture(StatusCode::NOT_FOUND, &HeaderMap::new(), b"");
        let value: serde_json::Value =
            serde_json::from_slice(&entry.to_bytes().expect("encode")).expect("json");
        assert_eq!(value["status_code"], 404);
        assert!(value["media_type"].is_null());
        assert!(value["headers"].is_object());
        assert_eq!(value["body"], "");
    }

    #[tokio::test]
    async fn restored_response_matches_capture() {
        let entry = CacheEntry::capture(StatusCode::CREATED, &sample_headers(), b"{\"ok\":true}");
        let restored = CacheEntry::from_bytes(&entry.to_bytes().expect("encode"))
            .expect("decode")
            .into_response()
            .expect("response");

        assert_eq!(restored.status(), StatusCode::CREATED);
        assert_eq!(restored.headers()["content-type"], "application/json");
        assert_eq!(restored.headers()["x-custom"], "kept");
        let body = axum::body::to_bytes(restored.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&body[..], b"{\"ok\":true}");
    }

    #[test]
    fn media_type_fills_missing_content_type() {
        let entry = CacheEntry {
            status_code: 200,
            media_type: Some("text/plain".to_string()),
            headers: BTreeMap::new(),
            body: String::new(),
        };
        let response = entry.into_response().expect("response");
        assert_eq!(response.headers()["content-type"], "text/plain");
    }

    #[test]
    fn corrupt_entries_are_rejected() {
        assert!(matches!(
            CacheEntry::from_bytes(b"not json"),
            Err(CacheEntryError::Json(_))
        ));

        let bad_body = CacheEntry {
            status_code: 200,
            media_type: None,
            headers: BTreeMap::new(),
            body: "***".to_string(),
        };
        assert!(matches!(
            bad_body.into_response(),
            Err(CacheEntryError::Body(_))
        ));

        let bad_status = CacheEntry {
            status_code: 42,
            media_type: None,
            headers: BTreeMap::new(),
            body: String::new(),
        };
        assert!(matches!(
            bad_status.into_response(),
            Err(CacheEntryError::Status(42))
        ));
    }
}
