//! Asynchronous image upload jobs.
//!
//! Uploads are accepted immediately and written by a supervised worker pool.
//! Each transition of a job busts the cached view of its status endpoint.

mod supervisor;
mod tracker;

pub use supervisor::{
    ABORTED_DETAIL, ImageJobConfig, ImageJobQueue, ImageJobRequest, ImageJobSupervisor,
    ImageProcessor, copy_images_path, job_path,
};
pub use tracker::{JobError, JobTracker};
