use std::{collections::HashMap, sync::Mutex};

use longbox_api_types::{ComicImage, ImageType, ImageUploadJob, JobStatus};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::jobs::tracker";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("unknown job `{0}`")]
    UnknownJob(String),
    #[error("job `{job_id}` is already {status}")]
    AlreadyTerminal { job_id: String, status: JobStatus },
}

/// In-process registry of image upload jobs.
///
/// Records live for the life of the process. Once a job reaches
/// `completed` or `failed` it no longer changes.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: Mutex<HashMap<String, ImageUploadJob>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending job with a fresh id.
    pub fn create(
        &self,
        series_id: i64,
        issue_id: i64,
        copy_id: i64,
        image_type: ImageType,
    ) -> ImageUploadJob {
        let job = ImageUploadJob {
            job_id: Uuid::new_v4().simple().to_string(),
            series_id,
            issue_id,
            copy_id,
            image_type,
            status: JobStatus::Pending,
            detail: None,
            result: None,
        };
        mutex_lock(&self.jobs, SOURCE, "create").insert(job.job_id.clone(), job.clone());
        debug!(job_id = %job.job_id, "created image job");
        job
    }

    pub fn get(&self, job_id: &str) -> Option<ImageUploadJob> {
        mutex_lock(&self.jobs, SOURCE, "get").get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.jobs, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mark_in_progress(&self, job_id: &str) -> Result<ImageUploadJob, JobError> {
        self.transition(job_id, "mark_in_progress", |job| {
            job.status = JobStatus::InProgress;
            job.detail = None;
        })
    }

    pub fn mark_completed(
        &self,
        job_id: &str,
        result: ComicImage,
    ) -> Result<ImageUploadJob, JobError> {
        self.transition(job_id, "mark_completed", |job| {
            job.status = JobStatus::Completed;
            job.detail = None;
            job.result = Some(result);
        })
    }

    pub fn mark_failed(
        &self,
        job_id: &str,
        detail: impl Into<String>,
    ) -> Result<ImageUploadJob, JobError> {
        let detail = detail.into();
        self.transition(job_id, "mark_failed", |job| {
            job.status = JobStatus::Failed;
            job.detail = Some(detail);
            job.result = None;
        })
    }

    fn transition(
        &self,
        job_id: &str,
        op: &'static str,
        apply: impl FnOnce(&mut ImageUploadJob),
    ) -> Result<ImageUploadJob, JobError> {
        let mut jobs = mutex_lock(&self.jobs, SOURCE, op);
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::UnknownJob(job_id.to_string()))?;
        if job.status.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }
        apply(job);
        debug!(job_id, status = %job.status, "image job transitioned");
        Ok(job.clone())
    }
}
