use std::sync::Arc;

use crate::application::{
    jobs::{ImageJobQueue, JobTracker},
    repos::CatalogRepo,
};
use crate::infra::storage::ImageStorage;

/// Shared handles for every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub repos: Arc<dyn CatalogRepo>,
    pub storage: Arc<ImageStorage>,
    pub jobs: ImageJobQueue,
}

impl AppState {
    pub fn tracker(&self) -> &Arc<JobTracker> {
        self.jobs.tracker()
    }
}
