use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use longbox_api_types::{CreateIssueRequest, ListIssuesResponse, UpdateIssueRequest};
use serde::Deserialize;

use crate::application::repos::IssueFilter;
use crate::infra::http::{error::ApiError, state::AppState};

use super::{non_blank, page_request};

#[derive(Debug, Default, Deserialize)]
pub struct IssueListQuery {
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
    pub story_arc: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueSearchQuery {
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
    pub title_search: Option<String>,
}

async fn require_series(state: &AppState, series_id: i64) -> Result<(), ApiError> {
    match state.repos.find_series(series_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found("series not found")),
    }
}

pub async fn list_issues(
    State(state): State<AppState>,
    Path(series_id): Path<i64>,
    Query(query): Query<IssueListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = page_request(query.page_size, query.page_token.as_deref())?;
    require_series(&state, series_id).await?;

    let filter = IssueFilter {
        story_arc: non_blank(query.story_arc),
    };
    let result = state.repos.list_issues(series_id, &filter, page).await?;
    let next_page_token = result.next_page_token();
    Ok(Json(ListIssuesResponse {
        issues: result.items,
        next_page_token,
    }))
}

/// Issues across all series whose series title contains the search text.
pub async fn search_issues(
    State(state): State<AppState>,
    Query(query): Query<IssueSearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = page_request(query.page_size, query.page_token.as_deref())?;
    let Some(title_search) = non_blank(query.title_search) else {
        return Err(ApiError::bad_request("title_search must not be empty", None));
    };

    let result = state.repos.search_issues(&title_search, page).await?;
    let next_page_token = result.next_page_token();
    Ok(Json(ListIssuesResponse {
        issues: result.items,
        next_page_token,
    }))
}

pub async fn create_issue(
    State(state): State<AppState>,
    Path(series_id): Path<i64>,
    Json(payload): Json<CreateIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.issue_nr.trim().is_empty() {
        return Err(ApiError::bad_request("issue_nr must not be empty", None));
    }
    require_series(&state, series_id).await?;

    let issue = state.repos.create_issue(series_id, payload).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

pub async fn get_issue(
    State(state): State<AppState>,
    Path((series_id, issue_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    match state.repos.find_series_issue(series_id, issue_id).await? {
        Some(issue) => Ok(Json(issue)),
        None => Err(ApiError::not_found("issue not found")),
    }
}

pub async fn update_issue(
    State(state): State<AppState>,
    Path((series_id, issue_id)): Path<(i64, i64)>,
    Json(patch): Json<UpdateIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::bad_request("no fields to update", None));
    }
    match state.repos.update_issue(series_id, issue_id, patch).await? {
        Some(issue) => Ok(Json(issue)),
        None => Err(ApiError::not_found("issue not found")),
    }
}

pub async fn delete_issue(
    State(state): State<AppState>,
    Path((series_id, issue_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    if state.repos.delete_issue(series_id, issue_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("issue not found"))
    }
}
