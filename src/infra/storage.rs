//! Filesystem storage for copy images.
//!
//! Images are grouped by series and issue directory:
//! `<root>/<series>/<issue>[_<variant>]/copy<id>_<type>_<timestamp>_<token><ext>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use longbox_api_types::{ComicImage, ImageType};
use slug::slugify;
use thiserror::Error;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::application::jobs::{ImageJobRequest, ImageProcessor};

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]");
const DEFAULT_EXTENSION: &str = ".bin";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("uploaded image is empty")]
    EmptyPayload,
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Where a copy's images live in the catalog hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyLocation {
    pub series_id: i64,
    pub series_title: Option<String>,
    pub issue_id: i64,
    pub issue_number: String,
    pub issue_variant: Option<String>,
    pub copy_id: i64,
}

impl CopyLocation {
    pub fn with_image_type(self, image_type: ImageType) -> ImageContext {
        ImageContext {
            location: self,
            image_type,
        }
    }

    fn relative_directory(&self) -> PathBuf {
        let series_dir = sanitize_component(
            self.series_title.as_deref().unwrap_or_default(),
            &format!("series-{}", self.series_id),
        );

        let issue_base = if self.issue_number.trim().is_empty() {
            format!("issue-{}", self.issue_id)
        } else {
            sanitize_component(
                &format!("issue-{}", self.issue_number),
                &format!("issue-{}", self.issue_id),
            )
        };
        let issue_dir = match self.issue_variant.as_deref().map(str::trim) {
            Some(variant) if !variant.is_empty() => format!(
                "{issue_base}_{}",
                sanitize_component(variant, &format!("variant-{}", self.issue_id))
            ),
            _ => issue_base,
        };

        PathBuf::from(series_dir).join(issue_dir)
    }

    /// Prefix shared by every stored file of this copy.
    fn file_prefix(&self) -> String {
        format!("copy{}_", self.copy_id)
    }

    fn image(&self, image_type: ImageType, file_name: String, relative_path: String) -> ComicImage {
        ComicImage {
            series_id: self.series_id,
            issue_id: self.issue_id,
            copy_id: self.copy_id,
            image_type,
            file_name,
            relative_path,
        }
    }
}

/// A single image upload target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageContext {
    pub location: CopyLocation,
    pub image_type: ImageType,
}

/// Filesystem-backed image storage.
#[derive(Debug, Clone)]
pub struct ImageStorage {
    root: PathBuf,
}

impl ImageStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an image for the copy and describe where it landed.
    pub async fn save_copy_image(
        &self,
        context: &ImageContext,
        payload: &[u8],
        original_filename: Option<&str>,
    ) -> Result<ComicImage, StorageError> {
        if payload.is_empty() {
            return Err(StorageError::EmptyPayload);
        }

        let location = &context.location;
        let relative_dir = location.relative_directory();
        let directory = self.root.join(&relative_dir);
        fs::create_dir_all(&directory).await?;

        let file_name = build_file_name(context, original_filename)?;
        fs::write(directory.join(&file_name), payload).await?;
        debug!(
            copy_id = location.copy_id,
            image_type = %context.image_type,
            file_name = %file_name,
            "stored copy image"
        );

        let relative_path = relative_path_string(&relative_dir.join(&file_name))?;
        Ok(location.image(context.image_type, file_name, relative_path))
    }

    /// Every stored image of the copy, ordered by file name.
    ///
    /// Files whose name does not encode a known image type are skipped.
    pub async fn list_copy_images(
        &self,
        location: &CopyLocation,
    ) -> Result<Vec<ComicImage>, StorageError> {
        let relative_dir = location.relative_directory();
        let directory = self.root.join(&relative_dir);
        let mut entries = match fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();

        names
            .into_iter()
            .filter_map(|name| {
                parse_image_type(location, &name).map(|image_type| (name, image_type))
            })
            .map(|(file_name, image_type)| -> Result<ComicImage, StorageError> {
                let relative_path = relative_path_string(&relative_dir.join(&file_name))?;
                Ok(location.image(image_type, file_name, relative_path))
            })
            .collect()
    }
}

#[async_trait]
impl ImageProcessor for ImageStorage {
    async fn process(&self, request: &ImageJobRequest) -> Result<ComicImage, StorageError> {
        self.save_copy_image(
            &request.context,
            &request.payload,
            request.original_filename.as_deref(),
        )
        .await
    }
}

fn sanitize_component(raw: &str, fallback: &str) -> String {
    let cleaned = slugify(raw.trim());
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

fn build_file_name(
    context: &ImageContext,
    original_filename: Option<&str>,
) -> Result<String, StorageError> {
    let extension = original_filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    let timestamp = OffsetDateTime::now_utc().format(TIMESTAMP_FORMAT)?;
    let token = Uuid::new_v4().simple().to_string();

    Ok(format!(
        "{}{}_{}_{}{}",
        context.location.file_prefix(),
        context.image_type,
        timestamp,
        &token[..8],
        extension
    ))
}

/// Recover the image type from a stored file name.
///
/// Type names contain underscores, so the longest matching type wins.
fn parse_image_type(location: &CopyLocation, file_name: &str) -> Option<ImageType> {
    let remainder = file_name.strip_prefix(&location.file_prefix())?;
    ImageType::ALL
        .into_iter()
        .filter(|kind| {
            remainder
                .strip_prefix(kind.as_str())
                .is_some_and(|rest| rest.starts_with('_'))
        })
        .max_by_key(|kind| kind.as_str().len())
}

fn relative_path_string(path: &Path) -> Result<String, StorageError> {
    path.to_str()
        .map(|value| value.replace(std::path::MAIN_SEPARATOR, "/"))
        .ok_or(StorageError::InvalidPath)
}
