//! Cache store backends.
//!
//! The response cache needs a small key/value surface: byte values with a
//! TTL plus string sets for tag membership. `RedisStore` is the shared
//! backend; `MemoryStore` keeps everything in-process.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use redis::{
    AsyncCommands, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use thiserror::Error;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::util::lock::mutex_lock;

use super::keys::tag_key;

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheStoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache store operation `{op}` timed out")]
    Timeout { op: &'static str },
    #[error("cache store protocol error: {0}")]
    Protocol(String),
    #[error("cache store operation cancelled")]
    Cancelled,
}

impl From<RedisError> for CacheStoreError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            CacheStoreError::Unavailable(err.to_string())
        } else {
            CacheStoreError::Protocol(err.to_string())
        }
    }
}

/// Key/value and set operations backing the response cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheStoreError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheStoreError>;

    /// Remove keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheStoreError>;

    async fn add_to_set(&self, set_key: &str, member: &str) -> Result<(), CacheStoreError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheStoreError>;

    /// Members of a set; an absent set is empty.
    async fn members(&self, set_key: &str) -> Result<Vec<String>, CacheStoreError>;

    /// Add `member` to the membership set of each tag and refresh the set TTL.
    async fn register_tags(
        &self,
        member: &str,
        tags: &[String],
        ttl: Duration,
    ) -> Result<(), CacheStoreError> {
        for tag in tags {
            let key = tag_key(tag);
            self.add_to_set(&key, member).await?;
            self.expire(&key, ttl).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Redis
// ============================================================================

/// Redis-backed store.
///
/// The connection is opened on first use and discarded after connection
/// level failures, so the next call reconnects. A connection manager is
/// bound to the runtime that created it; when that runtime goes away its
/// calls fail as dropped connections and a fresh one is built on the
/// caller's runtime.
///
/// Only one connect attempt runs at a time. A failed attempt marks the
/// server down for `reconnect_cooldown`, and calls made in that window fail
/// at once instead of queueing behind another connect timeout.
pub struct RedisStore {
    client: redis::Client,
    link: Mutex<RedisLink>,
    connect_gate: tokio::sync::Mutex<()>,
    op_timeout: Duration,
    reconnect_cooldown: Duration,
}

#[derive(Default)]
struct RedisLink {
    connection: Option<ConnectionManager>,
    down_until: Option<Instant>,
}

/// How long a failed connect short-circuits later calls.
pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(1);

impl RedisStore {
    pub fn open(url: &str, op_timeout: Duration) -> Result<Self, CacheStoreError> {
        let client = redis::Client::open(url).map_err(CacheStoreError::from)?;
        Ok(Self {
            client,
            link: Mutex::new(RedisLink::default()),
            connect_gate: tokio::sync::Mutex::new(()),
            op_timeout,
            reconnect_cooldown: DEFAULT_RECONNECT_COOLDOWN,
        })
    }

    pub fn with_reconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.reconnect_cooldown = cooldown;
        self
    }

    /// The open connection, or an error while the server is marked down.
    fn current(&self) -> Result<Option<ConnectionManager>, CacheStoreError> {
        let link = mutex_lock(&self.link, SOURCE, "current");
        if let Some(connection) = link.connection.as_ref() {
            return Ok(Some(connection.clone()));
        }
        match link.down_until {
            Some(until) if until > Instant::now() => Err(CacheStoreError::Unavailable(
                "redis marked down after a failed connect".to_string(),
            )),
            _ => Ok(None),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheStoreError> {
        if let Some(connection) = self.current()? {
            return Ok(connection);
        }

        let _gate = self.connect_gate.lock().await;
        // Whoever held the gate before us may have settled it either way.
        if let Some(connection) = self.current()? {
            return Ok(connection);
        }

        let config = ConnectionManagerConfig::new().set_number_of_retries(0);
        let connected = match timeout(
            self.op_timeout,
            ConnectionManager::new_with_config(self.client.clone(), config),
        )
        .await
        {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(err)) => Err(CacheStoreError::from(err)),
            Err(_) => Err(CacheStoreError::Timeout { op: "connect" }),
        };

        let mut link = mutex_lock(&self.link, SOURCE, "connect");
        match connected {
            Ok(connection) => {
                debug!(cache = "redis", "opened connection");
                link.connection = Some(connection.clone());
                link.down_until = None;
                Ok(connection)
            }
            Err(err) => {
                warn!(
                    cache = "redis",
                    error = %err,
                    cooldown_ms = self.reconnect_cooldown.as_millis() as u64,
                    "redis connect failed"
                );
                link.down_until = Some(Instant::now() + self.reconnect_cooldown);
                Err(err)
            }
        }
    }

    fn discard_connection(&self) {
        mutex_lock(&self.link, SOURCE, "discard").connection.take();
    }

    async fn run<T, F, Fut>(&self, op: &'static str, command: F) -> Result<T, CacheStoreError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let connection = self.connection().await?;
        match timeout(self.op_timeout, command(connection)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                let err = CacheStoreError::from(err);
                if matches!(err, CacheStoreError::Unavailable(_)) {
                    warn!(op, error = %err, "dropping redis connection");
                    self.discard_connection();
                }
                Err(err)
            }
            Err(_) => {
                self.discard_connection();
                Err(CacheStoreError::Timeout { op })
            }
        }
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheStoreError> {
        self.run("get", |mut conn| async move { conn.get(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheStoreError> {
        self.run("set", |mut conn| async move {
            conn.set_ex(key, value, ttl_seconds(ttl)).await
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheStoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run("delete", |mut conn| async move { conn.del(keys).await })
            .await
    }

    async fn add_to_set(&self, set_key: &str, member: &str) -> Result<(), CacheStoreError> {
        self.run("add_to_set", |mut conn| async move {
            conn.sadd(set_key, member).await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheStoreError> {
        let seconds = i64::try_from(ttl_seconds(ttl)).unwrap_or(i64::MAX);
        self.run("expire", |mut conn| async move { conn.expire(key, seconds).await })
            .await
    }

    async fn members(&self, set_key: &str) -> Result<Vec<String>, CacheStoreError> {
        self.run("members", |mut conn| async move { conn.smembers(set_key).await })
            .await
    }

    async fn register_tags(
        &self,
        member: &str,
        tags: &[String],
        ttl: Duration,
    ) -> Result<(), CacheStoreError> {
        if tags.is_empty() {
            return Ok(());
        }
        let seconds = i64::try_from(ttl_seconds(ttl)).unwrap_or(i64::MAX);
        let mut pipeline = redis::pipe();
        for tag in tags {
            let key = tag_key(tag);
            pipeline
                .sadd(&key, member)
                .ignore()
                .expire(&key, seconds)
                .ignore();
        }

        self.run("register_tags", |mut conn| async move {
            let () = pipeline.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

// ============================================================================
// In-process
// ============================================================================

#[derive(Debug, Clone)]
enum MemoryValue {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process store with Redis-like expiry semantics.
///
/// Expired keys are dropped when touched and, at most once per
/// `SWEEP_INTERVAL`, by a full sweep on write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, MemoryEntry>,
    last_sweep: Option<Instant>,
}

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

impl MemoryState {
    fn sweep_expired(&mut self, now: Instant) {
        if self
            .last_sweep
            .is_some_and(|at| now.saturating_duration_since(at) < SWEEP_INTERVAL)
        {
            return;
        }
        self.entries.retain(|_, entry| entry.is_live(now));
        self.last_sweep = Some(now);
    }

    fn live_entry(&mut self, key: &str, now: Instant) -> Option<&mut MemoryEntry> {
        if self.entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys, entries and tag sets alike.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        mutex_lock(&self.state, SOURCE, "len")
            .entries
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheStoreError> {
        let mut state = mutex_lock(&self.state, SOURCE, "get");
        match state.live_entry(key, Instant::now()) {
            Some(MemoryEntry {
                value: MemoryValue::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(CacheStoreError::Protocol(format!(
                "key `{key}` does not hold a value"
            ))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheStoreError> {
        let now = Instant::now();
        let mut state = mutex_lock(&self.state, SOURCE, "set");
        state.sweep_expired(now);
        state.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: MemoryValue::Bytes(value.to_vec()),
                expires_at: Some(now + Duration::from_secs(ttl_seconds(ttl))),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheStoreError> {
        let now = Instant::now();
        let mut state = mutex_lock(&self.state, SOURCE, "delete");
        let removed = keys
            .iter()
            .filter_map(|key| state.entries.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn add_to_set(&self, set_key: &str, member: &str) -> Result<(), CacheStoreError> {
        let now = Instant::now();
        let mut state = mutex_lock(&self.state, SOURCE, "add_to_set");
        state.sweep_expired(now);
        match state.live_entry(set_key, now) {
            Some(MemoryEntry {
                value: MemoryValue::Set(members),
                ..
            }) => {
                members.insert(member.to_string());
                Ok(())
            }
            Some(_) => Err(CacheStoreError::Protocol(format!(
                "key `{set_key}` does not hold a set"
            ))),
            None => {
                state.entries.insert(
                    set_key.to_string(),
                    MemoryEntry {
                        value: MemoryValue::Set(HashSet::from([member.to_string()])),
                        expires_at: None,
                    },
                );
                Ok(())
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheStoreError> {
        let now = Instant::now();
        let mut state = mutex_lock(&self.state, SOURCE, "expire");
        if let Some(entry) = state.live_entry(key, now) {
            entry.expires_at = Some(now + Duration::from_secs(ttl_seconds(ttl)));
        }
        Ok(())
    }

    async fn members(&self, set_key: &str) -> Result<Vec<String>, CacheStoreError> {
        let mut state = mutex_lock(&self.state, SOURCE, "members");
        match state.live_entry(set_key, Instant::now()) {
            Some(MemoryEntry {
                value: MemoryValue::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(CacheStoreError::Protocol(format!(
                "key `{set_key}` does not hold a set"
            ))),
            None => Ok(Vec::new()),
        }
    }
}
