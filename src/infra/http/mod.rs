pub mod error;
mod handlers;
mod middleware;
mod state;

pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use state::AppState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};

use crate::cache::{CacheState, response_cache_layer};

use self::handlers::*;
use self::middleware::{log_responses, set_request_context};

/// Assemble the catalog API.
///
/// Everything except `/health` sits behind the response cache when one is
/// configured.
pub fn build_router(state: AppState, cache: Option<CacheState>, upload_limit: usize) -> Router {
    let api_routes = Router::new()
        .route("/", get(root))
        .route("/v1/series", get(list_series).post(create_series))
        .route(
            "/v1/series/{series_id}",
            get(get_series).patch(update_series).delete(delete_series),
        )
        .route(
            "/v1/series/{series_id}/issues",
            get(list_issues).post(create_issue),
        )
        .route(
            "/v1/series/{series_id}/issues/{issue_id}",
            get(get_issue).patch(update_issue).delete(delete_issue),
        )
        .route(
            "/v1/series/{series_id}/issues/{issue_id}/copies/{copy_id}/images",
            get(list_images).post(upload_image),
        )
        .route("/v1/issues", get(search_issues))
        .route(
            "/v1/issues/{issue_id}/copies",
            get(list_copies).post(create_copy),
        )
        .route(
            "/v1/issues/{issue_id}/copies/{copy_id}",
            get(get_copy).patch(update_copy).delete(delete_copy),
        )
        .route("/v1/jobs/{job_id}", get(get_job));

    let api_routes = match cache {
        Some(cache) => api_routes.layer(from_fn_with_state(cache, response_cache_layer)),
        None => api_routes,
    };

    let live_routes = Router::new().route("/health", get(health));

    api_routes
        .merge(live_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}
