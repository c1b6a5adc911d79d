//! Response cache middleware.
//!
//! Safe requests are served from the store when a fingerprint matches and
//! recorded under their resource tags otherwise. Every other request busts
//! the tags of the path it touched once the handler has produced a
//! non-5xx response. Store trouble never fails a request: the handler's
//! response is returned as if no cache were installed.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use metrics::counter;
use tracing::{debug, error, instrument, warn};

use super::{
    CacheConfig, Invalidator,
    entry::CacheEntry,
    keys::RequestFingerprint,
    store::{CacheStore, CacheStoreError},
    tags::derive_tags,
};

/// Response header reporting whether the body came from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

const HIT: &str = "hit";
const MISS: &str = "miss";

/// Shared cache state for the middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: Arc<CacheConfig>,
    pub store: Arc<dyn CacheStore>,
    pub invalidator: Arc<Invalidator>,
}

impl CacheState {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn CacheStore>,
        invalidator: Arc<Invalidator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            invalidator,
        }
    }
}

#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if cache.config.is_safe_method(request.method()) {
        read_through(&cache, request, next).await
    } else {
        invalidate_after(&cache, request, next).await
    }
}

async fn read_through(cache: &CacheState, request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let key = RequestFingerprint {
        method: request.method().as_str(),
        path: &path,
        query: request.uri().query().unwrap_or(""),
        accept: request
            .headers()
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok()),
    }
    .response_key();

    let mut store_reachable = true;
    match cache.store.get(&key).await {
        Ok(Some(raw)) => {
            match CacheEntry::from_bytes(&raw).and_then(CacheEntry::into_response) {
                Ok(response) => {
                    counter!("longbox_cache_hit_total").increment(1);
                    debug!(cache = "response", outcome = "hit", "serving cached response");
                    return with_cache_status(response, HIT);
                }
                Err(err) => {
                    warn!(error = %err, "discarding unreadable cache entry");
                    if let Err(err) = cache.store.delete(std::slice::from_ref(&key)).await {
                        counter!("longbox_cache_store_error_total").increment(1);
                        warn!(op = "delete", error = %err, "cache store call failed");
                    }
                }
            }
        }
        Ok(None) => {}
        Err(err) => {
            // Only a timed-out read still attempts the write.
            store_reachable = matches!(err, CacheStoreError::Timeout { .. });
            counter!("longbox_cache_store_error_total").increment(1);
            warn!(op = "get", error = %err, "cache store call failed, serving live response");
        }
    }

    counter!("longbox_cache_miss_total").increment(1);
    debug!(cache = "response", outcome = "miss", "executing handler");
    let response = next.run(request).await;

    if !store_reachable || response.status().is_server_error() {
        return with_cache_status(response, MISS);
    }

    if declared_length(&response).is_some_and(|len| len > cache.config.max_body_bytes) {
        debug!(cache = "response", outcome = "skip", "response body too large to cache");
        return with_cache_status(response, MISS);
    }

    let (parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            error!(error = %err, "failed to buffer response body");
            return with_cache_status(StatusCode::INTERNAL_SERVER_ERROR.into_response(), MISS);
        }
    };

    if bytes.len() > cache.config.max_body_bytes {
        debug!(cache = "response", outcome = "skip", "response body too large to cache");
    } else {
        match CacheEntry::capture(parts.status, &parts.headers, &bytes).to_bytes() {
            Ok(encoded) => {
                let tags: Vec<String> = derive_tags(&path).cache_tags.into_iter().collect();
                let persisted = tokio::spawn(persist(
                    Arc::clone(&cache.store),
                    key,
                    encoded,
                    tags,
                    cache.config.ttl(),
                ));
                if let Err(err) = persisted.await {
                    warn!(error = %err, "cache write task failed");
                }
            }
            Err(err) => warn!(error = %err, "failed to encode cache entry"),
        }
    }

    with_cache_status(Response::from_parts(parts, Body::from(bytes)), MISS)
}

/// Store the entry and register it under its tags.
///
/// Runs detached from the request so a client disconnect cannot interrupt
/// it between the two steps.
async fn persist(
    store: Arc<dyn CacheStore>,
    key: String,
    encoded: Vec<u8>,
    tags: Vec<String>,
    ttl: Duration,
) {
    if let Err(err) = store.set(&key, &encoded, ttl).await {
        counter!("longbox_cache_store_error_total").increment(1);
        warn!(op = "set", error = %err, "cache store call failed");
        return;
    }
    if let Err(err) = store.register_tags(&key, &tags, ttl).await {
        counter!("longbox_cache_store_error_total").increment(1);
        warn!(op = "register_tags", error = %err, "cache store call failed");
        return;
    }
    debug!(cache = "response", tags = ?tags, "cached response");
}

async fn invalidate_after(cache: &CacheState, request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    if response.status().is_server_error() {
        debug!(
            status = response.status().as_u16(),
            "handler failed, leaving cache untouched"
        );
        return with_cache_status(response, MISS);
    }

    let tags = derive_tags(&path).invalidation_tags();
    if let Err(err) = cache.invalidator.spawn_invalidate(tags).await {
        warn!(error = %err, "cache invalidation task failed");
    }

    with_cache_status(response, MISS)
}

fn declared_length(response: &Response) -> Option<usize> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

fn with_cache_status(mut response: Response, status: &'static str) -> Response {
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(status));
    response
}
