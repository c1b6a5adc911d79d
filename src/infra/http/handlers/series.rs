use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use longbox_api_types::{CreateSeriesRequest, ListSeriesResponse, UpdateSeriesRequest};
use serde::Deserialize;

use crate::application::repos::SeriesFilter;
use crate::infra::http::{error::ApiError, state::AppState};

use super::{non_blank, page_request};

#[derive(Debug, Default, Deserialize)]
pub struct SeriesListQuery {
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
    pub publisher: Option<String>,
    pub title_search: Option<String>,
}

pub async fn list_series(
    State(state): State<AppState>,
    Query(query): Query<SeriesListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = page_request(query.page_size, query.page_token.as_deref())?;
    let filter = SeriesFilter {
        publisher: non_blank(query.publisher),
        title_search: non_blank(query.title_search),
    };

    let result = state.repos.list_series(&filter, page).await?;
    let next_page_token = result.next_page_token();
    Ok(Json(ListSeriesResponse {
        series: result.items,
        next_page_token,
    }))
}

pub async fn create_series(
    State(state): State<AppState>,
    Json(payload): Json<CreateSeriesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let series = state.repos.create_series(payload).await?;
    Ok((StatusCode::CREATED, Json(series)))
}

pub async fn get_series(
    State(state): State<AppState>,
    Path(series_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.repos.find_series(series_id).await? {
        Some(series) => Ok(Json(series)),
        None => Err(ApiError::not_found("series not found")),
    }
}

pub async fn update_series(
    State(state): State<AppState>,
    Path(series_id): Path<i64>,
    Json(patch): Json<UpdateSeriesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::bad_request("no fields to update", None));
    }
    match state.repos.update_series(series_id, patch).await? {
        Some(series) => Ok(Json(series)),
        None => Err(ApiError::not_found("series not found")),
    }
}

pub async fn delete_series(
    State(state): State<AppState>,
    Path(series_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.repos.delete_series(series_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("series not found"))
    }
}
