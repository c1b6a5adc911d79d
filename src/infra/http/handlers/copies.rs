use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use longbox_api_types::{CreateCopyRequest, ListCopiesResponse, UpdateCopyRequest};

use crate::infra::http::{error::ApiError, state::AppState};

use super::{PageQuery, page_request};

async fn require_issue(state: &AppState, issue_id: i64) -> Result<(), ApiError> {
    match state.repos.find_issue(issue_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found("issue not found")),
    }
}

pub async fn list_copies(
    State(state): State<AppState>,
    Path(issue_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = page_request(query.page_size, query.page_token.as_deref())?;
    require_issue(&state, issue_id).await?;

    let result = state.repos.list_copies(issue_id, page).await?;
    let next_page_token = result.next_page_token();
    Ok(Json(ListCopiesResponse {
        copies: result.items,
        next_page_token,
    }))
}

pub async fn create_copy(
    State(state): State<AppState>,
    Path(issue_id): Path<i64>,
    Json(payload): Json<CreateCopyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_issue(&state, issue_id).await?;
    let copy = state.repos.create_copy(issue_id, payload).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub async fn get_copy(
    State(state): State<AppState>,
    Path((issue_id, copy_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    match state.repos.find_copy(issue_id, copy_id).await? {
        Some(copy) => Ok(Json(copy)),
        None => Err(ApiError::not_found("copy not found")),
    }
}

pub async fn update_copy(
    State(state): State<AppState>,
    Path((issue_id, copy_id)): Path<(i64, i64)>,
    Json(patch): Json<UpdateCopyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::bad_request("no fields to update", None));
    }
    match state.repos.update_copy(issue_id, copy_id, patch).await? {
        Some(copy) => Ok(Json(copy)),
        None => Err(ApiError::not_found("copy not found")),
    }
}

pub async fn delete_copy(
    State(state): State<AppState>,
    Path((issue_id, copy_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    if state.repos.delete_copy(issue_id, copy_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("copy not found"))
    }
}
