//! Response cache configuration.
//!
//! Controls the tag-indexed response cache via `longbox.toml`.

use std::time::Duration;

use axum::http::Method;
use clap::ValueEnum;
use serde::Deserialize;

pub const DEFAULT_TTL_SECONDS: u64 = 60;
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 250;
const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_RETRIES: u32 = 2;
const DEFAULT_BASE_BACKOFF_MS: u64 = 50;
const DEFAULT_MAX_BACKOFF_MS: u64 = 250;

/// Where cached responses and tag sets live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Redis,
    /// Process-local store. Entries are not shared between replicas.
    Memory,
}

/// Retry schedule for tag invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`, growing linearly up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let linear = self
            .base_backoff_ms
            .saturating_mul(u64::from(attempt).saturating_add(1));
        Duration::from_millis(linear.min(self.max_backoff_ms))
    }
}

/// Runtime configuration of the response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: String,
    pub ttl_seconds: u64,
    /// Upper bound on a single store round trip.
    pub operation_timeout_ms: u64,
    /// Responses with larger bodies are served but not stored.
    pub max_body_bytes: usize,
    /// Upper-case method names served through the read path.
    pub safe_methods: Vec<String>,
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::default(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            safe_methods: vec![Method::GET.as_str().to_string()],
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            redis_url: settings.redis_url.clone(),
            ttl_seconds: settings.ttl_seconds,
            operation_timeout_ms: settings.operation_timeout_ms,
            max_body_bytes: settings.max_body_bytes,
            safe_methods: settings
                .safe_methods
                .iter()
                .map(|method| method.trim().to_ascii_uppercase())
                .filter(|method| !method.is_empty())
                .collect(),
            retry: settings.retry,
        }
    }
}

impl CacheConfig {
    /// Entry and tag-set lifetime, never shorter than one second.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds.max(1))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms.max(1))
    }

    pub fn is_safe_method(&self, method: &Method) -> bool {
        self.safe_methods
            .iter()
            .any(|safe| safe.eq_ignore_ascii_case(method.as_str()))
    }
}

/// Lenient TTL parsing for environment overrides.
///
/// Unparsable input yields the default; anything below one second is raised
/// to one.
pub fn parse_ttl_seconds(raw: &str) -> u64 {
    match raw.trim().parse::<i64>() {
        Ok(value) => u64::try_from(value.max(1)).unwrap_or(DEFAULT_TTL_SECONDS),
        Err(_) => DEFAULT_TTL_SECONDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.backend, CacheBackend::Redis);
        assert_eq!(config.ttl(), Duration::from_secs(60));
        assert_eq!(config.operation_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_body_bytes, 5 * 1024 * 1024);
        assert_eq!(config.retry.retries, 2);
    }

    #[test]
    fn ttl_is_clamped_to_one_second() {
        let config = CacheConfig {
            ttl_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.ttl(), Duration::from_secs(1));
    }

    #[test]
    fn ttl_parsing_is_lenient() {
        assert_eq!(parse_ttl_seconds("120"), 120);
        assert_eq!(parse_ttl_seconds(" 30 "), 30);
        assert_eq!(parse_ttl_seconds("0"), 1);
        assert_eq!(parse_ttl_seconds("-5"), 1);
        assert_eq!(parse_ttl_seconds("soon"), DEFAULT_TTL_SECONDS);
        assert_eq!(parse_ttl_seconds(""), DEFAULT_TTL_SECONDS);
    }

    #[test]
    fn backoff_grows_linearly_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(50));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(4), Duration::from_millis(250));
        assert_eq!(policy.backoff(50), Duration::from_millis(250));
    }

    #[test]
    fn safe_methods_match_case_insensitively() {
        let config = CacheConfig {
            safe_methods: vec!["get".to_string(), "HEAD".to_string()],
            ..Default::default()
        };
        assert!(config.is_safe_method(&Method::GET));
        assert!(config.is_safe_method(&Method::HEAD));
        assert!(!config.is_safe_method(&Method::POST));
    }
}
