//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use longbox_api_types::{
    ComicCopy, CopyFields, CreateIssueRequest, CreateSeriesRequest, Issue, Series,
    UpdateIssueRequest, UpdateSeriesRequest,
};
use thiserror::Error;

use crate::application::pagination::{Page, PageRequest};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeriesFilter {
    pub publisher: Option<String>,
    /// Case-insensitive substring of the series title.
    pub title_search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub story_arc: Option<String>,
}

#[async_trait]
pub trait SeriesRepo: Send + Sync {
    async fn list_series(
        &self,
        filter: &SeriesFilter,
        page: PageRequest,
    ) -> Result<Page<Series>, RepoError>;

    async fn find_series(&self, series_id: i64) -> Result<Option<Series>, RepoError>;

    async fn create_series(&self, params: CreateSeriesRequest) -> Result<Series, RepoError>;

    /// Returns `None` when the series does not exist.
    async fn update_series(
        &self,
        series_id: i64,
        patch: UpdateSeriesRequest,
    ) -> Result<Option<Series>, RepoError>;

    /// Deletes the series with its issues and copies. Returns whether a row was removed.
    async fn delete_series(&self, series_id: i64) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait IssuesRepo: Send + Sync {
    async fn list_issues(
        &self,
        series_id: i64,
        filter: &IssueFilter,
        page: PageRequest,
    ) -> Result<Page<Issue>, RepoError>;

    /// Issues of every series whose title contains `title_search`.
    async fn search_issues(
        &self,
        title_search: &str,
        page: PageRequest,
    ) -> Result<Page<Issue>, RepoError>;

    async fn find_issue(&self, issue_id: i64) -> Result<Option<Issue>, RepoError>;

    async fn find_series_issue(
        &self,
        series_id: i64,
        issue_id: i64,
    ) -> Result<Option<Issue>, RepoError>;

    async fn create_issue(
        &self,
        series_id: i64,
        params: CreateIssueRequest,
    ) -> Result<Issue, RepoError>;

    async fn update_issue(
        &self,
        series_id: i64,
        issue_id: i64,
        patch: UpdateIssueRequest,
    ) -> Result<Option<Issue>, RepoError>;

    async fn delete_issue(&self, series_id: i64, issue_id: i64) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait CopiesRepo: Send + Sync {
    async fn list_copies(
        &self,
        issue_id: i64,
        page: PageRequest,
    ) -> Result<Page<ComicCopy>, RepoError>;

    async fn find_copy(&self, issue_id: i64, copy_id: i64)
    -> Result<Option<ComicCopy>, RepoError>;

    async fn create_copy(&self, issue_id: i64, fields: CopyFields)
    -> Result<ComicCopy, RepoError>;

    async fn update_copy(
        &self,
        issue_id: i64,
        copy_id: i64,
        patch: CopyFields,
    ) -> Result<Option<ComicCopy>, RepoError>;

    async fn delete_copy(&self, issue_id: i64, copy_id: i64) -> Result<bool, RepoError>;
}

/// Everything the HTTP layer needs from persistence.
#[async_trait]
pub trait CatalogRepo: SeriesRepo + IssuesRepo + CopiesRepo {
    /// Cheap round trip proving the store is reachable.
    async fn ping(&self) -> Result<(), RepoError>;
}
