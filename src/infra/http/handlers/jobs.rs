use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::infra::http::{error::ApiError, state::AppState};

/// Current snapshot of an image upload job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .tracker()
        .get(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("job not found"))
}
