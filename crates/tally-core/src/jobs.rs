//! Job queue abstraction (AWS Batch, memory).
//!
//! Mirrors the two read calls reconciliation needs from a batch scheduler:
//!
//! - [`JobQueue::list_jobs`]: paginated summaries filtered by queue or by array parent
//! - [`JobQueue::describe_jobs`]: full details for at most [`DESCRIBE_BATCH_LIMIT`] ids
//!
//! Array-job children are addressed as `{parent}:{index}` (see [`JobId::child`]).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::JobId;

/// Maximum number of ids accepted by a single `describe_jobs` call.
pub const DESCRIBE_BATCH_LIMIT: usize = 100;

/// Scheduler-side status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Accepted by the queue, not yet evaluated.
    Submitted,
    /// Waiting on dependencies.
    Pending,
    /// Ready to be placed on compute.
    Runnable,
    /// Placed, container starting.
    Starting,
    /// Executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished unsuccessfully after all scheduler retries.
    Failed,
}

impl JobStatus {
    /// Statuses a job passes through before it completes.
    pub const IN_PROGRESS: [Self; 5] = [
        Self::Submitted,
        Self::Pending,
        Self::Runnable,
        Self::Starting,
        Self::Running,
    ];

    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Pending => "PENDING",
            Self::Runnable => "RUNNABLE",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns true for the pre-completion statuses.
    #[must_use]
    pub fn is_in_progress(self) -> bool {
        Self::IN_PROGRESS.contains(&self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Ok(Self::Submitted),
            "PENDING" => Ok(Self::Pending),
            "RUNNABLE" => Ok(Self::Runnable),
            "STARTING" => Ok(Self::Starting),
            "RUNNING" => Ok(Self::Running),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("unknown job status: {other}"))),
        }
    }
}

/// Which jobs a listing targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFilter {
    /// Top-level jobs submitted to a queue.
    Queue(String),
    /// Child executions of an array job.
    ArrayParent(JobId),
}

/// A single `list_jobs` page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListJobsRequest {
    /// Queue or array parent to list.
    pub filter: JobFilter,
    /// Only jobs currently in this status.
    pub status: JobStatus,
    /// Continuation token from the previous page.
    pub next_token: Option<String>,
}

impl ListJobsRequest {
    /// Lists top-level jobs in `queue` with `status`.
    #[must_use]
    pub fn queue(queue: impl Into<String>, status: JobStatus) -> Self {
        Self {
            filter: JobFilter::Queue(queue.into()),
            status,
            next_token: None,
        }
    }

    /// Lists children of `parent` with `status`.
    #[must_use]
    pub fn children(parent: JobId, status: JobStatus) -> Self {
        Self {
            filter: JobFilter::ArrayParent(parent),
            status,
            next_token: None,
        }
    }

    /// Returns the request for the page after `token`.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.next_token = token;
        self
    }
}

/// Summary row returned by `list_jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Job id.
    pub job_id: JobId,
    /// Job name.
    pub job_name: String,
    /// Current status.
    pub status: JobStatus,
    /// Index within the parent array job, for children.
    pub array_index: Option<u32>,
}

/// One page of `list_jobs` results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPage {
    /// Summaries on this page.
    pub summaries: Vec<JobSummary>,
    /// Token for the next page, `None` when exhausted.
    pub next_token: Option<String>,
}

/// Container section of a job description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetail {
    /// Environment as ordered name/value pairs.
    pub environment: Vec<(String, String)>,
    /// Log stream, present once the container has started.
    pub log_stream_name: Option<String>,
}

/// Full description of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetail {
    /// Job id.
    pub job_id: JobId,
    /// Job name.
    pub job_name: String,
    /// Current status.
    pub status: JobStatus,
    /// Number of children, for array parents.
    pub array_size: Option<u32>,
    /// Index within the parent, for array children.
    pub array_index: Option<u32>,
    /// Container section, absent until the scheduler fills it in.
    pub container: Option<ContainerDetail>,
}

impl JobDetail {
    /// Creates a description with no array properties and no container.
    #[must_use]
    pub fn new(job_id: JobId, job_name: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id,
            job_name: job_name.into(),
            status,
            array_size: None,
            array_index: None,
            container: None,
        }
    }

    /// Marks the job as an array parent with `size` children.
    #[must_use]
    pub const fn with_array_size(mut self, size: u32) -> Self {
        self.array_size = Some(size);
        self
    }

    /// Marks the job as the array child at `index`.
    #[must_use]
    pub const fn with_array_index(mut self, index: u32) -> Self {
        self.array_index = Some(index);
        self
    }

    /// Adds an environment variable to the container section.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.container
            .get_or_insert_with(ContainerDetail::default)
            .environment
            .push((name.into(), value.into()));
        self
    }

    /// Sets the container's log stream.
    #[must_use]
    pub fn with_log_stream(mut self, stream: impl Into<String>) -> Self {
        self.container
            .get_or_insert_with(ContainerDetail::default)
            .log_stream_name = Some(stream.into());
        self
    }

    /// Looks up a container environment variable.
    #[must_use]
    pub fn env(&self, name: &str) -> Option<&str> {
        self.container.as_ref().and_then(|c| {
            c.environment
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        })
    }

    /// Returns the log stream, if the container has one yet.
    #[must_use]
    pub fn log_stream(&self) -> Option<&str> {
        self.container
            .as_ref()
            .and_then(|c| c.log_stream_name.as_deref())
    }

    /// Returns the summary row for this job.
    #[must_use]
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.job_id.clone(),
            job_name: self.job_name.clone(),
            status: self.status,
            array_index: self.array_index,
        }
    }
}

/// Job queue trait.
///
/// All calls are side-effect free reads.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Lists one page of job summaries.
    async fn list_jobs(&self, request: &ListJobsRequest) -> Result<JobPage>;

    /// Describes up to [`DESCRIBE_BATCH_LIMIT`] jobs.
    ///
    /// Unknown ids are omitted from the result rather than reported as errors.
    /// Returns `Error::InvalidInput` when more ids than the limit are passed.
    async fn describe_jobs(&self, ids: &[JobId]) -> Result<Vec<JobDetail>>;
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn list_jobs(&self, request: &ListJobsRequest) -> Result<JobPage> {
        (**self).list_jobs(request).await
    }

    async fn describe_jobs(&self, ids: &[JobId]) -> Result<Vec<JobDetail>> {
        (**self).describe_jobs(ids).await
    }
}

#[derive(Debug, Clone)]
struct StoredJob {
    queue: Option<String>,
    parent: Option<JobId>,
    detail: JobDetail,
}

/// Default number of summaries per page for [`MemoryJobQueue`].
pub const DEFAULT_MEMORY_JOB_PAGE_SIZE: usize = 100;

/// In-memory job queue for testing.
///
/// Listings are ordered by job id and the continuation token is a decimal offset.
#[derive(Debug, Clone)]
pub struct MemoryJobQueue {
    jobs: Arc<RwLock<HashMap<JobId, StoredJob>>>,
    page_size: usize,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_MEMORY_JOB_PAGE_SIZE)
    }
}

impl MemoryJobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue that returns at most `page_size` summaries per page.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            jobs: Arc::default(),
            page_size: page_size.max(1),
        }
    }

    /// Registers a top-level job on `queue`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn submit(&self, queue: &str, detail: JobDetail) -> Result<()> {
        self.insert(StoredJob {
            queue: Some(queue.to_string()),
            parent: None,
            detail,
        })
    }

    /// Registers the child of `parent`; its id and index are derived from `index`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn add_child(&self, parent: &JobId, index: u32, detail: JobDetail) -> Result<()> {
        let mut detail = detail;
        detail.job_id = parent.child(index);
        detail.array_index = Some(index);
        self.insert(StoredJob {
            queue: None,
            parent: Some(parent.clone()),
            detail,
        })
    }

    fn insert(&self, job: StoredJob) -> Result<()> {
        self.jobs
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .insert(job.detail.job_id.clone(), job);
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn list_jobs(&self, request: &ListJobsRequest) -> Result<JobPage> {
        let offset = match request.next_token.as_deref() {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Error::InvalidInput(format!("invalid next token: {token}")))?,
        };

        let jobs = self.jobs.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        let mut matching: Vec<&StoredJob> = jobs
            .values()
            .filter(|job| job.detail.status == request.status)
            .filter(|job| match &request.filter {
                JobFilter::Queue(queue) => job.queue.as_deref() == Some(queue.as_str()),
                JobFilter::ArrayParent(parent) => job.parent.as_ref() == Some(parent),
            })
            .collect();
        matching.sort_by(|a, b| a.detail.job_id.cmp(&b.detail.job_id));

        let summaries: Vec<JobSummary> = matching
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|job| job.detail.summary())
            .collect();
        let consumed = offset + summaries.len();
        let next_token = (consumed < matching.len()).then(|| consumed.to_string());
        Ok(JobPage {
            summaries,
            next_token,
        })
    }

    async fn describe_jobs(&self, ids: &[JobId]) -> Result<Vec<JobDetail>> {
        if ids.len() > DESCRIBE_BATCH_LIMIT {
            return Err(Error::InvalidInput(format!(
                "describe_jobs accepts at most {DESCRIBE_BATCH_LIMIT} ids, got {}",
                ids.len()
            )));
        }
        let jobs = self.jobs.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        Ok(ids
            .iter()
            .filter_map(|id| jobs.get(id).map(|job| job.detail.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, status: JobStatus) -> JobDetail {
        JobDetail::new(JobId::new(id).unwrap(), format!("name-{id}"), status)
    }

    #[test]
    fn status_round_trips_through_wire_name() {
        for status in JobStatus::IN_PROGRESS {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
            assert!(status.is_in_progress());
        }
        assert!(!JobStatus::Failed.is_in_progress());
        assert!("BOGUS".parse::<JobStatus>().is_err());
    }

    #[test]
    fn env_lookup_and_log_stream() {
        let detail = job("a", JobStatus::Running)
            .with_env("ACCESSION_LIST", "s3://b/k")
            .with_log_stream("stream/a");
        assert_eq!(detail.env("ACCESSION_LIST"), Some("s3://b/k"));
        assert_eq!(detail.env("MISSING"), None);
        assert_eq!(detail.log_stream(), Some("stream/a"));
        assert_eq!(job("b", JobStatus::Running).log_stream(), None);
    }

    #[tokio::test]
    async fn list_paginates_by_offset_token() {
        let queue = MemoryJobQueue::with_page_size(2);
        for id in ["a", "b", "c"] {
            queue.submit("mixed", job(id, JobStatus::Running)).unwrap();
        }
        queue.submit("other", job("d", JobStatus::Running)).unwrap();

        let request = ListJobsRequest::queue("mixed", JobStatus::Running);
        let first = queue.list_jobs(&request).await.unwrap();
        assert_eq!(first.summaries.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("2"));

        let second = queue
            .list_jobs(&request.with_token(first.next_token))
            .await
            .unwrap();
        assert_eq!(second.summaries.len(), 1);
        assert_eq!(second.summaries[0].job_id.as_str(), "c");
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn children_are_listed_by_parent_only() {
        let queue = MemoryJobQueue::new();
        let parent = JobId::new("p").unwrap();
        queue
            .submit("mixed", job("p", JobStatus::Running).with_array_size(3))
            .unwrap();
        queue
            .add_child(&parent, 1, job("ignored", JobStatus::Failed))
            .unwrap();

        let failed = queue
            .list_jobs(&ListJobsRequest::children(parent.clone(), JobStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.summaries.len(), 1);
        assert_eq!(failed.summaries[0].job_id.as_str(), "p:1");
        assert_eq!(failed.summaries[0].array_index, Some(1));

        let queued = queue
            .list_jobs(&ListJobsRequest::queue("mixed", JobStatus::Failed))
            .await
            .unwrap();
        assert!(queued.summaries.is_empty());
    }

    #[tokio::test]
    async fn describe_enforces_batch_limit() {
        let queue = MemoryJobQueue::new();
        let ids: Vec<JobId> = (0..=DESCRIBE_BATCH_LIMIT)
            .map(|i| JobId::new(format!("j{i}")).unwrap())
            .collect();
        let err = queue.describe_jobs(&ids).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let described = queue.describe_jobs(&ids[..DESCRIBE_BATCH_LIMIT]).await.unwrap();
        assert!(described.is_empty());
    }
}
