//! Catalog API handlers.

mod copies;
mod images;
mod issues;
mod jobs;
mod series;

pub use copies::{create_copy, delete_copy, get_copy, list_copies, update_copy};
pub use images::{list_images, upload_image};
pub use issues::{create_issue, delete_issue, get_issue, list_issues, search_issues, update_issue};
pub use jobs::get_job;
pub use series::{create_series, delete_series, get_series, list_series, update_series};

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;

use crate::application::{error::ErrorReport, pagination::PageRequest};

use super::{error::ApiError, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
}

fn page_request(page_size: Option<u32>, page_token: Option<&str>) -> Result<PageRequest, ApiError> {
    PageRequest::parse(page_size, page_token).map_err(ApiError::from)
}

/// Treat blank query values as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn root() -> impl IntoResponse {
    Json(json!({ "message": "Welcome to the longbox comic catalog API" }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.repos.ping().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
