use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use longbox_api_types::{ImageType, ListCopyImagesResponse};
use tracing::debug;

use crate::infra::{
    http::{error::ApiError, state::AppState},
    storage::CopyLocation,
};

struct ImageUpload {
    image_type: ImageType,
    payload: Bytes,
    filename: Option<String>,
}

/// Walk series, issue and copy so every level 404s on its own.
async fn resolve_location(
    state: &AppState,
    series_id: i64,
    issue_id: i64,
    copy_id: i64,
) -> Result<CopyLocation, ApiError> {
    let series = state
        .repos
        .find_series(series_id)
        .await?
        .ok_or_else(|| ApiError::not_found("series not found"))?;
    let issue = state
        .repos
        .find_series_issue(series_id, issue_id)
        .await?
        .ok_or_else(|| ApiError::not_found("issue not found"))?;
    let copy = state
        .repos
        .find_copy(issue_id, copy_id)
        .await?
        .ok_or_else(|| ApiError::not_found("copy not found"))?;

    Ok(CopyLocation {
        series_id: series.series_id,
        series_title: series.title,
        issue_id: issue.issue_id,
        issue_number: issue.issue_nr,
        issue_variant: issue.variant,
        copy_id: copy.copy_id,
    })
}

async fn read_upload(multipart: &mut Multipart) -> Result<ImageUpload, ApiError> {
    let mut image_type = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("image_type") => {
                let raw = field.text().await?;
                let parsed = raw.trim().parse::<ImageType>().map_err(|err| {
                    ApiError::bad_request("invalid image_type", Some(err.to_string()))
                })?;
                image_type = Some(parsed);
            }
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|name| !name.trim().is_empty());
                let payload = field.bytes().await?;
                file = Some((payload, filename));
            }
            _ => continue,
        }
    }

    let Some(image_type) = image_type else {
        return Err(ApiError::bad_request(
            "missing image_type",
            Some(format!(
                "expected one of: {}",
                ImageType::ALL.map(|kind| kind.as_str()).join(", ")
            )),
        ));
    };
    let Some((payload, filename)) = file else {
        return Err(ApiError::bad_request("missing file field", None));
    };
    if payload.is_empty() {
        return Err(ApiError::bad_request("empty image upload", None));
    }

    Ok(ImageUpload {
        image_type,
        payload,
        filename,
    })
}

pub async fn list_images(
    State(state): State<AppState>,
    Path((series_id, issue_id, copy_id)): Path<(i64, i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let location = resolve_location(&state, series_id, issue_id, copy_id).await?;
    let images = state.storage.list_copy_images(&location).await?;
    Ok(Json(ListCopyImagesResponse { images }))
}

/// Accept an image and return the tracking job; the file is written in the background.
pub async fn upload_image(
    State(state): State<AppState>,
    Path((series_id, issue_id, copy_id)): Path<(i64, i64, i64)>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let upload = read_upload(&mut multipart).await?;
    let location = resolve_location(&state, series_id, issue_id, copy_id).await?;

    debug!(
        series_id,
        issue_id,
        copy_id,
        image_type = %upload.image_type,
        bytes = upload.payload.len(),
        "accepted image upload"
    );
    let job = state
        .jobs
        .submit(
            location.with_image_type(upload.image_type),
            upload.payload,
            upload.filename,
        )
        .await;
    Ok((StatusCode::ACCEPTED, Json(job)))
}
