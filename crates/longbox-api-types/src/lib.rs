//! Request and response payloads shared by the longbox server and its clients.
//!
//! Every type here is plain data. Enabling the `sqlx` feature adds `FromRow`
//! derives so the server can map SQLite rows straight into the API shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Largest page a list endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Page size used when the client does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

// ----- Series -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Series {
    pub series_id: i64,
    pub title: Option<String>,
    pub publisher: Option<String>,
    pub series_group: Option<String>,
    pub age: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSeriesRequest {
    pub series_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub series_group: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSeriesRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub series_group: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
}

impl UpdateSeriesRequest {
    /// True when the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.publisher.is_none()
            && self.series_group.is_none()
            && self.age.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSeriesResponse {
    pub series: Vec<Series>,
    pub next_page_token: Option<String>,
}

// ----- Issues -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Issue {
    pub issue_id: i64,
    pub series_id: i64,
    pub issue_nr: String,
    pub variant: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub full_title: Option<String>,
    pub cover_date: Option<String>,
    pub cover_year: Option<i64>,
    pub story_arc: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateIssueRequest {
    pub issue_nr: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub full_title: Option<String>,
    #[serde(default)]
    pub cover_date: Option<String>,
    #[serde(default)]
    pub cover_year: Option<i64>,
    #[serde(default)]
    pub story_arc: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateIssueRequest {
    #[serde(default)]
    pub issue_nr: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub full_title: Option<String>,
    #[serde(default)]
    pub cover_date: Option<String>,
    #[serde(default)]
    pub cover_year: Option<i64>,
    #[serde(default)]
    pub story_arc: Option<String>,
}

impl UpdateIssueRequest {
    pub fn is_empty(&self) -> bool {
        self.issue_nr.is_none()
            && self.variant.is_none()
            && self.title.is_none()
            && self.subtitle.is_none()
            && self.full_title.is_none()
            && self.cover_date.is_none()
            && self.cover_year.is_none()
            && self.story_arc.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListIssuesResponse {
    pub issues: Vec<Issue>,
    pub next_page_token: Option<String>,
}

// ----- Copies -----

/// Descriptive attributes of a physical copy, as exported from CLZ.
///
/// Used as-is for create and partial-update payloads; on update, `None`
/// leaves the stored column untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(default)]
pub struct CopyFields {
    pub clz_comic_id: Option<i64>,
    pub custom_label: Option<String>,
    pub format: Option<String>,
    pub grade: Option<String>,
    pub grader_notes: Option<String>,
    pub grading_company: Option<String>,
    pub raw_slabbed: Option<String>,
    pub signed_by: Option<String>,
    pub slab_cert_number: Option<String>,
    pub purchase_date: Option<String>,
    pub purchase_price: Option<f64>,
    pub purchase_store: Option<String>,
    pub purchase_year: Option<i64>,
    pub date_sold: Option<String>,
    pub price_sold: Option<f64>,
    pub sold_year: Option<i64>,
    pub my_value: Option<f64>,
    pub covrprice_value: Option<f64>,
    pub value: Option<f64>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub age: Option<String>,
    pub barcode: Option<String>,
    pub cover_price: Option<f64>,
    pub page_quality: Option<String>,
    pub key_flag: Option<String>,
    pub key_category: Option<String>,
    pub key_reason: Option<String>,
    pub label_type: Option<String>,
    pub no_of_pages: Option<i64>,
    pub variant_description: Option<String>,
}

impl CopyFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ComicCopy {
    pub copy_id: i64,
    pub issue_id: i64,
    #[serde(flatten)]
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub fields: CopyFields,
}

pub type CreateCopyRequest = CopyFields;
pub type UpdateCopyRequest = CopyFields;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCopiesResponse {
    pub copies: Vec<ComicCopy>,
    pub next_page_token: Option<String>,
}

// ----- Images -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Front,
    Back,
    Spine,
    Staples,
    InteriorFrontCover,
    InteriorBackCover,
    Misc,
}

impl ImageType {
    pub const ALL: [ImageType; 7] = [
        ImageType::Front,
        ImageType::Back,
        ImageType::Spine,
        ImageType::Staples,
        ImageType::InteriorFrontCover,
        ImageType::InteriorBackCover,
        ImageType::Misc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageType::Front => "front",
            ImageType::Back => "back",
            ImageType::Spine => "spine",
            ImageType::Staples => "staples",
            ImageType::InteriorFrontCover => "interior_front_cover",
            ImageType::InteriorBackCover => "interior_back_cover",
            ImageType::Misc => "misc",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownImageType(pub String);

impl fmt::Display for UnknownImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown image type `{}`", self.0)
    }
}

impl std::error::Error for UnknownImageType {}

impl FromStr for ImageType {
    type Err = UnknownImageType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ImageType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownImageType(value.to_string()))
    }
}

/// Metadata describing an image saved for a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComicImage {
    pub series_id: i64,
    pub issue_id: i64,
    pub copy_id: i64,
    pub image_type: ImageType,
    pub file_name: String,
    pub relative_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCopyImagesResponse {
    pub images: Vec<ComicImage>,
}

// ----- Jobs -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an asynchronous image upload job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUploadJob {
    pub job_id: String,
    pub series_id: i64,
    pub issue_id: i64,
    pub copy_id: i64,
    pub image_type: ImageType,
    pub status: JobStatus,
    pub detail: Option<String>,
    pub result: Option<ComicImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_type_round_trips_through_str() {
        for kind in ImageType::ALL {
            assert_eq!(kind.as_str().parse::<ImageType>(), Ok(kind));
        }
        assert!("cover".parse::<ImageType>().is_err());
    }

    #[test]
    fn image_type_serializes_snake_case() {
        let json = serde_json::to_string(&ImageType::InteriorBackCover).expect("serialize");
        assert_eq!(json, "\"interior_back_cover\"");
    }

    #[test]
    fn job_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn empty_patches_are_detected() {
        assert!(UpdateSeriesRequest::default().is_empty());
        assert!(UpdateIssueRequest::default().is_empty());
        assert!(CopyFields::default().is_empty());

        let patch = CopyFields {
            grade: Some("9.8".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn copy_flattens_fields_in_json() {
        let copy = ComicCopy {
            copy_id: 3,
            issue_id: 7,
            fields: CopyFields {
                grade: Some("9.4".to_string()),
                ..Default::default()
            },
        };
        let value = serde_json::to_value(&copy).expect("serialize");
        assert_eq!(value["copy_id"], 3);
        assert_eq!(value["grade"], "9.4");
        assert!(value.get("fields").is_none());
    }

    #[test]
    fn create_series_rejects_unknown_fields() {
        let result: Result<CreateSeriesRequest, _> =
            serde_json::from_str(r#"{"series_id": 1, "bogus": true}"#);
        assert!(result.is_err());
    }
}
