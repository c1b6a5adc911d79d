use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use longbox_api_types::{ComicImage, ImageUploadJob};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::{self, JoinError, JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cache::Invalidator,
    infra::storage::{CopyLocation, ImageContext, StorageError},
};

use super::tracker::JobTracker;

/// Detail recorded when a processing task dies without reporting back.
pub const ABORTED_DETAIL: &str = "image processing task aborted";
const QUEUE_FULL_DETAIL: &str = "image processing queue is full";
const QUEUE_CLOSED_DETAIL: &str = "image processing queue is closed";

/// One accepted upload waiting to be written.
#[derive(Debug, Clone)]
pub struct ImageJobRequest {
    pub job_id: String,
    pub context: ImageContext,
    pub payload: Bytes,
    pub original_filename: Option<String>,
}

/// Performs the actual work of an image job.
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    async fn process(&self, request: &ImageJobRequest) -> Result<ComicImage, StorageError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ImageJobConfig {
    /// Accepted jobs that may wait for a worker before submissions fail.
    pub queue_capacity: usize,
    /// Jobs processed at the same time.
    pub max_concurrency: usize,
}

impl Default for ImageJobConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            max_concurrency: 4,
        }
    }
}

pub fn job_path(job_id: &str) -> String {
    format!("/v1/jobs/{job_id}")
}

pub fn copy_images_path(location: &CopyLocation) -> String {
    format!(
        "/v1/series/{}/issues/{}/copies/{}/images",
        location.series_id, location.issue_id, location.copy_id
    )
}

/// Submission side of the image job pipeline.
#[derive(Clone)]
pub struct ImageJobQueue {
    sender: mpsc::Sender<ImageJobRequest>,
    tracker: Arc<JobTracker>,
    invalidator: Arc<Invalidator>,
}

impl ImageJobQueue {
    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Register a job for the upload and hand it to the supervisor.
    ///
    /// Always returns the job. When the queue cannot take it the job is
    /// failed on the spot so clients polling it see a terminal state.
    pub async fn submit(
        &self,
        context: ImageContext,
        payload: Bytes,
        original_filename: Option<String>,
    ) -> ImageUploadJob {
        let location = &context.location;
        let job = self.tracker.create(
            location.series_id,
            location.issue_id,
            location.copy_id,
            context.image_type,
        );
        let request = ImageJobRequest {
            job_id: job.job_id.clone(),
            context,
            payload,
            original_filename,
        };

        let detail = match self.sender.try_send(request) {
            Ok(()) => {
                debug!(job_id = %job.job_id, "queued image job");
                return job;
            }
            Err(TrySendError::Full(_)) => QUEUE_FULL_DETAIL,
            Err(TrySendError::Closed(_)) => QUEUE_CLOSED_DETAIL,
        };

        warn!(job_id = %job.job_id, reason = detail, "rejecting image job");
        let failed = match self.tracker.mark_failed(&job.job_id, detail) {
            Ok(failed) => failed,
            Err(err) => {
                error!(job_id = %job.job_id, error = %err, "failed to record rejected image job");
                job.clone()
            }
        };
        self.invalidator.invalidate_paths([job_path(&job.job_id)]).await;
        failed
    }
}

/// Owns the worker tasks that process queued image jobs.
///
/// A task that panics or is aborted still leaves its job in `failed`.
pub struct ImageJobSupervisor {
    receiver: mpsc::Receiver<ImageJobRequest>,
    tracker: Arc<JobTracker>,
    invalidator: Arc<Invalidator>,
    processor: Arc<dyn ImageProcessor>,
    max_concurrency: usize,
    shutdown: CancellationToken,
}

impl ImageJobSupervisor {
    /// Start the supervisor loop, returning the queue that feeds it.
    pub fn spawn(
        config: ImageJobConfig,
        tracker: Arc<JobTracker>,
        invalidator: Arc<Invalidator>,
        processor: Arc<dyn ImageProcessor>,
        shutdown: CancellationToken,
    ) -> (ImageJobQueue, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let queue = ImageJobQueue {
            sender,
            tracker: Arc::clone(&tracker),
            invalidator: Arc::clone(&invalidator),
        };
        let supervisor = Self {
            receiver,
            tracker,
            invalidator,
            processor,
            max_concurrency: config.max_concurrency.max(1),
            shutdown,
        };
        (queue, tokio::spawn(supervisor.run()))
    }

    async fn run(mut self) {
        let mut tasks = JoinSet::new();
        let mut running: HashMap<task::Id, String> = HashMap::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(in_flight = tasks.len(), "image job supervisor shutting down");
                    tasks.abort_all();
                    break;
                }
                Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    self.reap(joined, &mut running).await;
                }
                received = self.receiver.recv(), if tasks.len() < self.max_concurrency => {
                    let Some(request) = received else {
                        debug!("image job queue closed");
                        break;
                    };
                    let job_id = request.job_id.clone();
                    let handle = tasks.spawn(process_job(
                        Arc::clone(&self.tracker),
                        Arc::clone(&self.invalidator),
                        Arc::clone(&self.processor),
                        request,
                    ));
                    running.insert(handle.id(), job_id);
                }
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            self.reap(joined, &mut running).await;
        }

        self.receiver.close();
        while let Ok(request) = self.receiver.try_recv() {
            self.fail(&request.job_id, QUEUE_CLOSED_DETAIL).await;
        }
    }

    async fn reap(
        &self,
        joined: Result<(task::Id, ()), JoinError>,
        running: &mut HashMap<task::Id, String>,
    ) {
        let err = match joined {
            Ok((id, ())) => {
                running.remove(&id);
                return;
            }
            Err(err) => err,
        };

        let Some(job_id) = running.remove(&err.id()) else {
            error!(error = %err, "untracked image task ended abnormally");
            return;
        };
        if err.is_panic() {
            error!(job_id = %job_id, "image processing task panicked");
        } else {
            warn!(job_id = %job_id, "image processing task cancelled");
        }
        self.fail(&job_id, ABORTED_DETAIL).await;
    }

    async fn fail(&self, job_id: &str, detail: &str) {
        match self.tracker.mark_failed(job_id, detail) {
            Ok(_) => {
                self.invalidator.invalidate_paths([job_path(job_id)]).await;
            }
            Err(err) => debug!(job_id, error = %err, "image job already settled"),
        }
    }
}

async fn process_job(
    tracker: Arc<JobTracker>,
    invalidator: Arc<Invalidator>,
    processor: Arc<dyn ImageProcessor>,
    request: ImageJobRequest,
) {
    let job_id = request.job_id.as_str();
    let status_path = job_path(job_id);

    if let Err(err) = tracker.mark_in_progress(job_id) {
        error!(job_id, error = %err, "image job cannot start");
        return;
    }
    invalidator.invalidate_paths([status_path.as_str()]).await;

    match processor.process(&request).await {
        Ok(image) => match tracker.mark_completed(job_id, image) {
            Ok(_) => {
                info!(job_id, "image job completed");
                invalidator
                    .invalidate_paths([status_path, copy_images_path(&request.context.location)])
                    .await;
            }
            Err(err) => {
                error!(job_id, error = %err, "image job finished in an unexpected state");
            }
        },
        Err(err) => {
            warn!(job_id, error = %err, "image job failed");
            if let Err(err) = tracker.mark_failed(job_id, err.to_string()) {
                error!(job_id, error = %err, "image job failed in an unexpected state");
            }
            invalidator.invalidate_paths([status_path]).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use longbox_api_types::{ImageType, JobStatus};
    use tokio::sync::Notify;

    use super::*;
    use crate::cache::{CacheStore, MemoryStore, RetryPolicy, derive_tags};

    fn context() -> ImageContext {
        CopyLocation {
            series_id: 1,
            series_title: Some("Saga".to_string()),
            issue_id: 2,
            issue_number: "1".to_string(),
            issue_variant: None,
            copy_id: 3,
        }
        .with_image_type(ImageType::Front)
    }

    struct StubProcessor;

    #[async_trait]
    impl ImageProcessor for StubProcessor {
        async fn process(&self, request: &ImageJobRequest) -> Result<ComicImage, StorageError> {
            if request.payload.is_empty() {
                return Err(StorageError::EmptyPayload);
            }
            if request.payload.as_ref() == b"panic" {
                panic!("processor exploded");
            }
            Ok(ComicImage {
                series_id: request.context.location.series_id,
                issue_id: request.context.location.issue_id,
                copy_id: request.context.location.copy_id,
                image_type: request.context.image_type,
                file_name: "copy3_front.bin".to_string(),
                relative_path: "saga/issue-1/copy3_front.bin".to_string(),
            })
        }
    }

    /// Blocks every job until released.
    struct GatedProcessor {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ImageProcessor for GatedProcessor {
        async fn process(&self, _request: &ImageJobRequest) -> Result<ComicImage, StorageError> {
            self.gate.notified().await;
            Err(StorageError::InvalidPath)
        }
    }

    /// Blocks every job until released, then succeeds.
    struct GatedSuccess {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ImageProcessor for GatedSuccess {
        async fn process(&self, request: &ImageJobRequest) -> Result<ComicImage, StorageError> {
            self.gate.notified().await;
            StubProcessor.process(request).await
        }
    }

    /// Settles the job itself before reporting success.
    struct SettlingProcessor {
        tracker: Arc<JobTracker>,
    }

    #[async_trait]
    impl ImageProcessor for SettlingProcessor {
        async fn process(&self, request: &ImageJobRequest) -> Result<ComicImage, StorageError> {
            if request.payload.as_ref() == b"settle" {
                self.tracker
                    .mark_failed(&request.job_id, "settled elsewhere")
                    .expect("job is in progress");
            }
            StubProcessor.process(request).await
        }
    }

    fn spawn_with(
        processor: Arc<dyn ImageProcessor>,
        config: ImageJobConfig,
    ) -> (ImageJobQueue, JoinHandle<()>, CancellationToken) {
        spawn_full(
            Arc::new(JobTracker::new()),
            Arc::new(Invalidator::disabled()),
            processor,
            config,
        )
    }

    fn spawn_full(
        tracker: Arc<JobTracker>,
        invalidator: Arc<Invalidator>,
        processor: Arc<dyn ImageProcessor>,
        config: ImageJobConfig,
    ) -> (ImageJobQueue, JoinHandle<()>, CancellationToken) {
        let shutdown = CancellationToken::new();
        let (queue, handle) =
            ImageJobSupervisor::spawn(config, tracker, invalidator, processor, shutdown.clone());
        (queue, handle, shutdown)
    }

    fn caching_invalidator(store: &Arc<MemoryStore>) -> Arc<Invalidator> {
        Arc::new(Invalidator::new(
            store.clone(),
            RetryPolicy::default(),
            CancellationToken::new(),
        ))
    }

    /// Record a response for `path` the way the read path would.
    async fn cache_response(store: &MemoryStore, path: &str) -> String {
        let key = format!("cache:responses:{path}");
        let ttl = Duration::from_secs(60);
        store.set(&key, b"cached", ttl).await.expect("set");
        let tags: Vec<String> = derive_tags(path).cache_tags.into_iter().collect();
        store.register_tags(&key, &tags, ttl).await.expect("tags");
        key
    }

    async fn wait_for_eviction(store: &MemoryStore, key: &str) {
        for _ in 0..200 {
            if store.get(key).await.expect("get").is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{key} was never invalidated");
    }

    async fn wait_for_status(queue: &ImageJobQueue, job_id: &str, status: JobStatus) {
        for _ in 0..200 {
            if queue.tracker().get(job_id).map(|job| job.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never reached {status:?}");
    }

    async fn wait_for_terminal(queue: &ImageJobQueue, job_id: &str) -> ImageUploadJob {
        for _ in 0..200 {
            if let Some(job) = queue.tracker().get(job_id)
                && job.status.is_terminal()
            {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never settled");
    }

    #[tokio::test]
    async fn successful_job_completes_with_result() {
        let (queue, _handle, _shutdown) =
            spawn_with(Arc::new(StubProcessor), ImageJobConfig::default());

        let job = queue
            .submit(context(), Bytes::from_static(b"image"), Some("a.png".into()))
            .await;
        assert_eq!(job.status, JobStatus::Pending);

        let done = wait_for_terminal(&queue, &job.job_id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.detail, None);
        assert!(done.result.is_some());
    }

    #[tokio::test]
    async fn processor_errors_fail_the_job() {
        let (queue, _handle, _shutdown) =
            spawn_with(Arc::new(StubProcessor), ImageJobConfig::default());

        let job = queue.submit(context(), Bytes::new(), None).await;
        let failed = wait_for_terminal(&queue, &job.job_id).await;
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.detail.as_deref(), Some("uploaded image is empty"));
        assert_eq!(failed.result, None);
    }

    #[tokio::test]
    async fn panicking_task_fails_the_job() {
        let (queue, _handle, _shutdown) =
            spawn_with(Arc::new(StubProcessor), ImageJobConfig::default());

        let job = queue
            .submit(context(), Bytes::from_static(b"panic"), None)
            .await;
        let failed = wait_for_terminal(&queue, &job.job_id).await;
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.detail.as_deref(), Some(ABORTED_DETAIL));

        // The supervisor keeps serving after a panic.
        let next = queue
            .submit(context(), Bytes::from_static(b"image"), None)
            .await;
        let done = wait_for_terminal(&queue, &next.job_id).await;
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn full_queue_fails_submissions_immediately() {
        let gate = Arc::new(Notify::new());
        let (queue, _handle, _shutdown) = spawn_with(
            Arc::new(GatedProcessor { gate: gate.clone() }),
            ImageJobConfig {
                queue_capacity: 1,
                max_concurrency: 1,
            },
        );

        // One job occupies the worker, one waits in the queue, the third is rejected.
        let first = queue
            .submit(context(), Bytes::from_static(b"a"), None)
            .await;
        for _ in 0..200 {
            if queue.tracker().get(&first.job_id).map(|job| job.status)
                == Some(JobStatus::InProgress)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _second = queue
            .submit(context(), Bytes::from_static(b"b"), None)
            .await;
        let third = queue
            .submit(context(), Bytes::from_static(b"c"), None)
            .await;

        assert_eq!(third.status, JobStatus::Failed);
        assert_eq!(third.detail.as_deref(), Some(QUEUE_FULL_DETAIL));
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn shutdown_fails_in_flight_jobs() {
        let gate = Arc::new(Notify::new());
        let (queue, handle, shutdown) = spawn_with(
            Arc::new(GatedProcessor { gate }),
            ImageJobConfig::default(),
        );

        let job = queue
            .submit(context(), Bytes::from_static(b"a"), None)
            .await;
        for _ in 0..200 {
            if queue.tracker().get(&job.job_id).map(|job| job.status)
                == Some(JobStatus::InProgress)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        shutdown.cancel();
        handle.await.expect("supervisor exits cleanly");

        let failed = queue.tracker().get(&job.job_id).expect("job");
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.detail.as_deref(), Some(ABORTED_DETAIL));

        let late = queue
            .submit(context(), Bytes::from_static(b"b"), None)
            .await;
        assert_eq!(late.status, JobStatus::Failed);
        assert_eq!(late.detail.as_deref(), Some(QUEUE_CLOSED_DETAIL));
    }

    #[tokio::test]
    async fn each_transition_busts_the_job_and_completion_busts_images() {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(Notify::new());
        let (queue, _handle, _shutdown) = spawn_full(
            Arc::new(JobTracker::new()),
            caching_invalidator(&store),
            Arc::new(GatedSuccess { gate: gate.clone() }),
            ImageJobConfig {
                queue_capacity: 4,
                max_concurrency: 1,
            },
        );

        // Keep the worker busy so the job under test stays pending.
        let blocker = queue
            .submit(context(), Bytes::from_static(b"a"), None)
            .await;
        wait_for_status(&queue, &blocker.job_id, JobStatus::InProgress).await;
        let job = queue
            .submit(context(), Bytes::from_static(b"b"), None)
            .await;
        assert_eq!(job.status, JobStatus::Pending);
        let pending_poll = cache_response(&store, &job_path(&job.job_id)).await;

        gate.notify_one();
        wait_for_status(&queue, &job.job_id, JobStatus::InProgress).await;
        wait_for_eviction(&store, &pending_poll).await;

        let running_poll = cache_response(&store, &job_path(&job.job_id)).await;
        let images = cache_response(&store, &copy_images_path(&context().location)).await;
        gate.notify_one();
        wait_for_status(&queue, &job.job_id, JobStatus::Completed).await;
        wait_for_eviction(&store, &running_poll).await;
        wait_for_eviction(&store, &images).await;
    }

    #[tokio::test]
    async fn completion_of_a_settled_job_leaves_images_cached() {
        let store = Arc::new(MemoryStore::new());
        let tracker = Arc::new(JobTracker::new());
        let (queue, _handle, _shutdown) = spawn_full(
            tracker.clone(),
            caching_invalidator(&store),
            Arc::new(SettlingProcessor { tracker }),
            ImageJobConfig {
                queue_capacity: 4,
                max_concurrency: 1,
            },
        );
        let images = cache_response(&store, &copy_images_path(&context().location)).await;

        let settled = queue
            .submit(context(), Bytes::from_static(b"settle"), None)
            .await;
        // A second job for another copy only starts once the first task is gone.
        let mut other = context();
        other.location.copy_id = 4;
        let next = queue
            .submit(other, Bytes::from_static(b"image"), None)
            .await;
        wait_for_status(&queue, &next.job_id, JobStatus::Completed).await;

        let job = queue.tracker().get(&settled.job_id).expect("job");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.detail.as_deref(), Some("settled elsewhere"));
        assert!(store.get(&images).await.expect("get").is_some());
    }
}
