//! Cache key construction.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Prefix of every stored response entry.
pub const RESPONSE_KEY_PREFIX: &str = "cache:responses:";
/// Prefix of every tag membership set.
pub const TAG_KEY_PREFIX: &str = "cache:tag:";

/// Key of the membership set holding every response key registered under `tag`.
pub fn tag_key(tag: &str) -> String {
    format!("{TAG_KEY_PREFIX}{tag}")
}

/// The request attributes that decide whether two requests share a response.
#[derive(Debug, Clone, Copy)]
pub struct RequestFingerprint<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub accept: Option<&'a str>,
}

impl RequestFingerprint<'_> {
    /// Canonical JSON form: sorted keys, no whitespace, absent `accept` as `null`.
    pub fn canonical(&self) -> String {
        let mut fields: BTreeMap<&str, Option<&str>> = BTreeMap::new();
        fields.insert("accept", self.accept);
        fields.insert("method", Some(self.method));
        fields.insert("path", Some(self.path));
        fields.insert("query", Some(self.query));
        // Serializing a map of strings cannot fail.
        serde_json::to_string(&fields).unwrap_or_default()
    }

    /// Store key of the response produced for this request.
    pub fn response_key(&self) -> String {
        let digest = Sha256::digest(self.canonical().as_bytes());
        format!("{RESPONSE_KEY_PREFIX}{}", hex::encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(query: &'a str, accept: Option<&'a str>) -> RequestFingerprint<'a> {
        RequestFingerprint {
            method: "GET",
            path: "/v1/series",
            query,
            accept,
        }
    }

    #[test]
    fn canonical_form_sorts_keys_and_keeps_null_accept() {
        assert_eq!(
            request("", None).canonical(),
            r#"{"accept":null,"method":"GET","path":"/v1/series","query":""}"#
        );
    }

    #[test]
    fn response_key_is_prefixed_sha256_hex() {
        let key = request("page_size=5", Some("application/json")).response_key();
        let digest = key.strip_prefix(RESPONSE_KEY_PREFIX).expect("prefix");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_requests_get_distinct_keys() {
        let base = request("", None).response_key();
        assert_eq!(base, request("", None).response_key());
        assert_ne!(base, request("page_size=5", None).response_key());
        assert_ne!(base, request("", Some("application/json")).response_key());
        assert_ne!(base, request("", Some("")).response_key());

        let head = RequestFingerprint {
            method: "HEAD",
            ..request("", None)
        };
        assert_ne!(base, head.response_key());
    }

    #[test]
    fn tag_keys_are_prefixed() {
        assert_eq!(tag_key("series:list"), "cache:tag:series:list");
    }
}
