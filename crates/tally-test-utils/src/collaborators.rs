//! Collaborator fakes with operation tracing and fault injection.
//!
//! Each fake wraps the matching in-memory backend from `tally-core`, records
//! every call for later assertions, and can be told to throttle the next `n`
//! calls, fail calls whose target starts with a prefix, or sleep before
//! answering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use tally_core::error::{Error, Result};
use tally_core::id::JobId;
use tally_core::jobs::{
    JobDetail, JobFilter, JobPage, JobQueue, JobStatus, ListJobsRequest, MemoryJobQueue,
};
use tally_core::logs::{LogPage, LogService, MemoryLogService};
use tally_core::storage::{ListPage, MemoryObjectStore, ObjectStore};

/// Record of a collaborator call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorOp {
    /// Object store listing.
    ListObjects {
        /// Bucket listed.
        bucket: String,
        /// Prefix listed.
        prefix: String,
        /// Continuation token passed.
        token: Option<String>,
    },
    /// Object read.
    GetObject {
        /// Bucket read.
        bucket: String,
        /// Key read.
        key: String,
    },
    /// Job listing.
    ListJobs {
        /// Queue name or array parent id.
        target: String,
        /// Status filter.
        status: JobStatus,
        /// Continuation token passed.
        token: Option<String>,
    },
    /// Job description batch.
    DescribeJobs {
        /// Ids described.
        ids: Vec<String>,
    },
    /// Log page read.
    GetLogEvents {
        /// Log group.
        group: String,
        /// Log stream.
        stream: String,
        /// Backward token passed.
        token: Option<String>,
    },
}

#[derive(Debug, Default)]
struct Faults {
    throttle_next: Mutex<u32>,
    throttle_targets: Mutex<HashMap<String, u32>>,
    fail_prefixes: Mutex<Vec<String>>,
    latency: Mutex<Option<Duration>>,
}

impl Faults {
    async fn apply(&self, service: &'static str, target: &str) -> Result<()> {
        let latency = *self.latency.lock().expect("lock");
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        {
            let mut remaining = self.throttle_next.lock().expect("lock");
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::throttled(service, "Rate exceeded"));
            }
        }
        {
            let mut targets = self.throttle_targets.lock().expect("lock");
            if let Some(remaining) = targets.get_mut(target) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::throttled(service, format!("Rate exceeded for {target}")));
                }
            }
        }

        let fail_prefixes = self.fail_prefixes.lock().expect("lock");
        if fail_prefixes.iter().any(|p| target.starts_with(p.as_str())) {
            return Err(Error::collaborator(
                service,
                format!("injected failure for {target}"),
            ));
        }
        Ok(())
    }
}

/// Shared recording state behind every fake.
#[derive(Debug, Clone, Default)]
struct Recorder {
    operations: Arc<Mutex<Vec<CollaboratorOp>>>,
    faults: Arc<Faults>,
}

impl Recorder {
    fn record(&self, op: CollaboratorOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn operations(&self) -> Vec<CollaboratorOp> {
        self.operations.lock().expect("lock").clone()
    }

    fn clear(&self) {
        self.operations.lock().expect("lock").clear();
    }

    fn throttle_next(&self, calls: u32) {
        *self.faults.throttle_next.lock().expect("lock") = calls;
    }

    fn throttle_target(&self, target: &str, calls: u32) {
        self.faults
            .throttle_targets
            .lock()
            .expect("lock")
            .insert(target.to_string(), calls);
    }

    fn inject_failure(&self, prefix: String) {
        self.faults.fail_prefixes.lock().expect("lock").push(prefix);
    }

    fn clear_failures(&self) {
        self.faults.fail_prefixes.lock().expect("lock").clear();
        self.faults.throttle_targets.lock().expect("lock").clear();
        *self.faults.throttle_next.lock().expect("lock") = 0;
    }

    fn set_latency(&self, latency: Duration) {
        *self.faults.latency.lock().expect("lock") = Some(latency);
    }
}

/// Object store with operation tracing.
///
/// Failure targets are `{bucket}/{key}` for reads and `{bucket}/{prefix}` for
/// listings.
#[derive(Debug, Clone, Default)]
pub struct TracingObjectStore {
    inner: MemoryObjectStore,
    recorder: Recorder,
}

impl TracingObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store returning at most `page_size` keys per listing page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: MemoryObjectStore::with_page_size(page_size),
            recorder: Recorder::default(),
        }
    }

    /// Stores an object.
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.inner.put(bucket, key, data).expect("put");
    }

    /// Returns all recorded operations.
    pub fn operations(&self) -> Vec<CollaboratorOp> {
        self.recorder.operations()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.recorder.clear();
    }

    /// Throttles the next `calls` calls of any kind.
    pub fn throttle_next(&self, calls: u32) {
        self.recorder.throttle_next(calls);
    }

    /// Fails every call whose target starts with `prefix`.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.recorder.inject_failure(prefix.into());
    }

    /// Clears all injected faults.
    pub fn clear_failures(&self) {
        self.recorder.clear_failures();
    }
}

#[async_trait]
impl ObjectStore for TracingObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage> {
        self.recorder.record(CollaboratorOp::ListObjects {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            token: continuation.map(str::to_string),
        });
        self.recorder
            .faults
            .apply("object-store", &format!("{bucket}/{prefix}"))
            .await?;
        self.inner.list_page(bucket, prefix, continuation).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.recorder.record(CollaboratorOp::GetObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        self.recorder
            .faults
            .apply("object-store", &format!("{bucket}/{key}"))
            .await?;
        self.inner.get(bucket, key).await
    }
}

/// Job queue with operation tracing.
///
/// Failure targets are the queue name or parent id for listings and each
/// described job id for descriptions.
#[derive(Debug, Clone, Default)]
pub struct TracingJobQueue {
    inner: MemoryJobQueue,
    recorder: Recorder,
}

impl TracingJobQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue returning at most `page_size` summaries per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: MemoryJobQueue::with_page_size(page_size),
            recorder: Recorder::default(),
        }
    }

    /// Registers a top-level job.
    pub fn submit(&self, queue: &str, detail: JobDetail) {
        self.inner.submit(queue, detail).expect("submit");
    }

    /// Registers an array child.
    pub fn add_child(&self, parent: &JobId, index: u32, detail: JobDetail) {
        self.inner.add_child(parent, index, detail).expect("add child");
    }

    /// Returns all recorded operations.
    pub fn operations(&self) -> Vec<CollaboratorOp> {
        self.recorder.operations()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.recorder.clear();
    }

    /// Throttles the next `calls` calls of any kind.
    pub fn throttle_next(&self, calls: u32) {
        self.recorder.throttle_next(calls);
    }

    /// Fails every call whose target starts with `prefix`.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.recorder.inject_failure(prefix.into());
    }
}

#[async_trait]
impl JobQueue for TracingJobQueue {
    async fn list_jobs(&self, request: &ListJobsRequest) -> Result<JobPage> {
        let target = match &request.filter {
            JobFilter::Queue(queue) => queue.clone(),
            JobFilter::ArrayParent(parent) => parent.to_string(),
        };
        self.recorder.record(CollaboratorOp::ListJobs {
            target: target.clone(),
            status: request.status,
            token: request.next_token.clone(),
        });
        self.recorder.faults.apply("job-queue", &target).await?;
        self.inner.list_jobs(request).await
    }

    async fn describe_jobs(&self, ids: &[JobId]) -> Result<Vec<JobDetail>> {
        self.recorder.record(CollaboratorOp::DescribeJobs {
            ids: ids.iter().map(ToString::to_string).collect(),
        });
        for id in ids {
            self.recorder.faults.apply("job-queue", id.as_str()).await?;
        }
        self.inner.describe_jobs(ids).await
    }
}

/// Log service with operation tracing and concurrency tracking.
///
/// Failure and throttle targets are stream names.
#[derive(Debug, Clone, Default)]
pub struct TracingLogService {
    inner: MemoryLogService,
    recorder: Recorder,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl TracingLogService {
    /// Creates an empty log service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log service that sleeps `latency` before every answer.
    pub fn with_latency(latency: Duration) -> Self {
        let service = Self::default();
        service.recorder.set_latency(latency);
        service
    }

    /// Replaces the pages of `stream` (newest first).
    pub fn set_pages<P, M>(&self, group: &str, stream: &str, pages: P)
    where
        P: IntoIterator,
        P::Item: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.inner.set_pages(group, stream, pages).expect("set pages");
    }

    /// Returns all recorded operations.
    pub fn operations(&self) -> Vec<CollaboratorOp> {
        self.recorder.operations()
    }

    /// Throttles the next `calls` calls.
    pub fn throttle_next(&self, calls: u32) {
        self.recorder.throttle_next(calls);
    }

    /// Throttles the next `calls` reads of `stream`.
    pub fn throttle_stream(&self, stream: &str, calls: u32) {
        self.recorder.throttle_target(stream, calls);
    }

    /// Fails every read of a stream starting with `prefix`.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.recorder.inject_failure(prefix.into());
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogService for TracingLogService {
    async fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        backward_token: Option<&str>,
    ) -> Result<LogPage> {
        self.recorder.record(CollaboratorOp::GetLogEvents {
            group: group.to_string(),
            stream: stream.to_string(),
            token: backward_token.map(str::to_string),
        });

        let _in_flight = InFlight::enter(&self.in_flight, &self.max_in_flight);
        self.recorder.faults.apply("logs", stream).await?;
        self.inner.get_log_events(group, stream, backward_token).await
    }
}

/// Counts a call as in flight until dropped, so cancelled calls are released too.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(in_flight: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(in_flight)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn object_store_records_and_fails() {
        let store = TracingObjectStore::new();
        store.put("b", "lists/a.txt", "x");
        store.inject_failure("b/lists/broken");

        assert!(store.get("b", "lists/a.txt").await.is_ok());
        let err = store.get("b", "lists/broken.txt").await.unwrap_err();
        assert!(matches!(err, Error::Collaborator { .. }));
        assert_eq!(store.operations().len(), 2);
    }

    #[tokio::test]
    async fn throttles_exactly_n_calls() {
        let logs = TracingLogService::new();
        logs.set_pages("g", "s", [vec!["m"]]);
        logs.throttle_next(2);

        assert!(logs.get_log_events("g", "s", None).await.unwrap_err().is_retryable());
        assert!(logs.get_log_events("g", "s", None).await.unwrap_err().is_retryable());
        assert!(logs.get_log_events("g", "s", None).await.is_ok());
    }

    #[tokio::test]
    async fn stream_throttles_are_targeted() {
        let logs = TracingLogService::new();
        logs.set_pages("g", "hot", [vec!["m"]]);
        logs.set_pages("g", "cold", [vec!["m"]]);
        logs.throttle_stream("hot", 1);

        assert!(logs.get_log_events("g", "cold", None).await.is_ok());
        assert!(logs.get_log_events("g", "hot", None).await.is_err());
        assert!(logs.get_log_events("g", "hot", None).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_calls_leave_flight() {
        let logs = TracingLogService::with_latency(Duration::from_millis(100));
        logs.set_pages("g", "s", [vec!["m"]]);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), logs.get_log_events("g", "s", None))
                .await;
        assert!(cancelled.is_err());

        assert!(logs.get_log_events("g", "s", None).await.is_ok());
        assert_eq!(logs.max_in_flight(), 1);
    }
}
