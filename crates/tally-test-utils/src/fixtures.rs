//! Pre-built test fixtures for common reconciliation scenarios.

use std::sync::Arc;

use tally_core::id::JobId;
use tally_core::jobs::{JobDetail, JobStatus};

use crate::collaborators::{TracingJobQueue, TracingLogService, TracingObjectStore};

/// Bucket holding manifests in fixtures.
pub const MANIFEST_BUCKET: &str = "manifests";

/// Bucket holding results in fixtures.
pub const RESULTS_BUCKET: &str = "results";

/// Results prefix used by fixtures.
pub const RESULTS_PREFIX: &str = "pipeline-results";

/// Queue active jobs are submitted to.
pub const QUEUE: &str = "mixed";

/// Log group child streams are written to.
pub const LOG_GROUP: &str = "/aws/batch/job";

/// Test context with tracing collaborators.
pub struct TestContext {
    /// Object store.
    pub store: Arc<TracingObjectStore>,
    /// Job queue.
    pub queue: Arc<TracingJobQueue>,
    /// Log service.
    pub logs: Arc<TracingLogService>,
}

impl TestContext {
    /// Creates a context with default page sizes.
    pub fn new() -> Self {
        Self {
            store: Arc::new(TracingObjectStore::new()),
            queue: Arc::new(TracingJobQueue::new()),
            logs: Arc::new(TracingLogService::new()),
        }
    }

    /// Creates a context whose store and queue return small pages, so every
    /// scan crosses page boundaries.
    pub fn paginated(page_size: usize) -> Self {
        Self {
            store: Arc::new(TracingObjectStore::with_page_size(page_size)),
            queue: Arc::new(TracingJobQueue::with_page_size(page_size)),
            logs: Arc::new(TracingLogService::new()),
        }
    }

    /// Writes a manifest and returns its `s3://` URL.
    pub fn put_manifest(&self, name: &str, items: &[&str]) -> String {
        let mut body = items.join("\n");
        body.push('\n');
        self.store.put(MANIFEST_BUCKET, name, body);
        format!("s3://{MANIFEST_BUCKET}/{name}")
    }

    /// Writes one result object for each of `stages` under `item`.
    pub fn put_results(&self, item: &str, stages: &[&str]) {
        for stage in stages {
            self.store.put(
                RESULTS_BUCKET,
                &format!("{RESULTS_PREFIX}/{item}/{stage}/{item}.bam"),
                "bam",
            );
        }
    }

    /// Submits an array job to [`QUEUE`] carrying `manifest_url`.
    pub fn submit_array_job(
        &self,
        id: &str,
        name: &str,
        size: u32,
        status: JobStatus,
        manifest_url: &str,
    ) -> JobId {
        let job_id = JobId::new(id).expect("job id");
        self.queue.submit(
            QUEUE,
            JobDetail::new(job_id.clone(), name, status)
                .with_array_size(size)
                .with_env("ACCESSION_LIST", manifest_url)
                .with_env("BUCKET_NAME", RESULTS_BUCKET)
                .with_env("PREFIX", RESULTS_PREFIX),
        );
        job_id
    }

    /// Adds child `index` of `parent`, with a log stream when `stream` is given.
    pub fn add_child(&self, parent: &JobId, index: u32, status: JobStatus, stream: Option<&str>) {
        let mut detail = JobDetail::new(parent.child(index), "child", status);
        if let Some(stream) = stream {
            detail = detail.with_log_stream(stream);
        }
        self.queue.add_child(parent, index, detail);
    }

    /// Sets the log pages of `stream` in [`LOG_GROUP`] (newest first).
    pub fn set_log(&self, stream: &str, pages: &[&[&str]]) {
        self.logs.set_pages(
            LOG_GROUP,
            stream,
            pages.iter().map(|page| page.iter().copied()),
        );
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
