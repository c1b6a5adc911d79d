//! Tag invalidation.
//!
//! Busting a tag deletes every response key recorded in its membership set
//! and then the set itself. Store failures are retried with a short linear
//! backoff and, once retries run out, logged and swallowed: a stale entry
//! left behind expires with its TTL.

use std::{collections::BTreeSet, sync::Arc};

use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    config::RetryPolicy,
    keys::tag_key,
    store::{CacheStore, CacheStoreError},
    tags::derive_tags,
};

/// Summary of one invalidation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationOutcome {
    pub tags_cleared: usize,
    pub keys_removed: u64,
    /// Tags still intact after every retry failed.
    pub failed_tags: Vec<String>,
    /// Set when shutdown interrupted the run; remaining tags were skipped.
    pub cancelled: bool,
}

pub struct Invalidator {
    store: Option<Arc<dyn CacheStore>>,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl Invalidator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        retry: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store: Some(store),
            retry,
            shutdown,
        }
    }

    /// An invalidator with no backing store. Every call is a no-op.
    pub fn disabled() -> Self {
        Self {
            store: None,
            retry: RetryPolicy::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Bust every response registered under the given tags.
    ///
    /// Never fails. Each tag is attempted independently, so one tag
    /// exhausting its retries does not stop the others.
    pub async fn invalidate<I, S>(&self, tags: I) -> InvalidationOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut outcome = InvalidationOutcome::default();
        let Some(store) = self.store.as_deref() else {
            return outcome;
        };

        let tags: BTreeSet<String> = tags
            .into_iter()
            .map(Into::into)
            .filter(|tag| !tag.is_empty())
            .collect();

        for tag in tags {
            match self.invalidate_with_retry(store, &tag).await {
                Ok(removed) => {
                    outcome.tags_cleared += 1;
                    outcome.keys_removed += removed;
                }
                Err(CacheStoreError::Cancelled) => {
                    warn!(tag = %tag, "cache invalidation cancelled by shutdown");
                    outcome.cancelled = true;
                    break;
                }
                Err(err) => {
                    warn!(
                        tag = %tag,
                        error = %err,
                        attempts = self.retry.retries + 1,
                        "giving up on cache tag invalidation"
                    );
                    outcome.failed_tags.push(tag);
                }
            }
        }

        if outcome.keys_removed > 0 {
            counter!("longbox_cache_invalidated_keys_total").increment(outcome.keys_removed);
        }
        info!(
            cache = "response",
            tags_cleared = outcome.tags_cleared,
            keys_removed = outcome.keys_removed,
            failed = outcome.failed_tags.len(),
            cancelled = outcome.cancelled,
            "invalidated cache tags"
        );
        outcome
    }

    /// Bust everything a mutation of each path would bust.
    pub async fn invalidate_paths<I, S>(&self, paths: I) -> InvalidationOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: BTreeSet<String> = paths
            .into_iter()
            .flat_map(|path| derive_tags(path.as_ref()).invalidation_tags())
            .collect();
        self.invalidate(tags).await
    }

    /// Run an invalidation on its own task.
    ///
    /// The work carries on if the returned handle is dropped, so a caller
    /// that goes away mid-request cannot leave a tag half-cleared.
    pub fn spawn_invalidate(
        self: &Arc<Self>,
        tags: BTreeSet<String>,
    ) -> JoinHandle<InvalidationOutcome> {
        let invalidator = Arc::clone(self);
        tokio::spawn(async move { invalidator.invalidate(tags).await })
    }

    async fn invalidate_with_retry(
        &self,
        store: &dyn CacheStore,
        tag: &str,
    ) -> Result<u64, CacheStoreError> {
        let mut attempt = 0;
        loop {
            if self.shutdown.is_cancelled() {
                return Err(CacheStoreError::Cancelled);
            }

            let err = match invalidate_tag(store, tag).await {
                Ok(removed) => return Ok(removed),
                Err(CacheStoreError::Cancelled) => return Err(CacheStoreError::Cancelled),
                Err(err) if attempt >= self.retry.retries => return Err(err),
                Err(err) => err,
            };

            let backoff = self.retry.backoff(attempt);
            debug!(
                tag,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "retrying cache tag invalidation"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(CacheStoreError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
            attempt += 1;
        }
    }
}

/// Delete the members of a tag set, then the set. Returns the members removed.
async fn invalidate_tag(store: &dyn CacheStore, tag: &str) -> Result<u64, CacheStoreError> {
    let key = tag_key(tag);
    let members = store.members(&key).await?;
    let removed = if members.is_empty() {
        0
    } else {
        store.delete(&members).await?
    };
    store.delete(std::slice::from_ref(&key)).await?;
    Ok(removed)
}
