//! Tag-indexed HTTP response cache.
//!
//! Responses to safe requests are stored under a fingerprint of the request
//! and registered in one membership set per resource tag derived from the
//! path. Mutations bust the tags of the resource they touched along with the
//! collections that list it.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "redis"
//! redis_url = "redis://localhost:6379/0"
//! ttl_seconds = 60
//! # ... see config.rs for all options
//! ```

mod config;
mod entry;
mod invalidation;
mod keys;
mod middleware;
mod store;
mod tags;

pub use config::{
    CacheBackend, CacheConfig, DEFAULT_REDIS_URL, DEFAULT_TTL_SECONDS, RetryPolicy,
    parse_ttl_seconds,
};
pub use entry::{CacheEntry, CacheEntryError};
pub use invalidation::{InvalidationOutcome, Invalidator};
pub use keys::{RESPONSE_KEY_PREFIX, RequestFingerprint, TAG_KEY_PREFIX, tag_key};
pub use middleware::{CACHE_STATUS_HEADER, CacheState, response_cache_layer};
pub use store::{CacheStore, CacheStoreError, MemoryStore, RedisStore};
pub use tags::{ResourcePath, TagInfo, derive_tags};

use std::sync::Arc;

/// Build the store selected by the configuration.
///
/// Redis connections are opened lazily, so an unreachable server is not an
/// error here.
pub fn open_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheStoreError> {
    match config.backend {
        CacheBackend::Redis => Ok(Arc::new(RedisStore::open(
            &config.redis_url,
            config.operation_timeout(),
        )?)),
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
