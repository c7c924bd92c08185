//! Job queue queries: active-job discovery and array-job resolution.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use tally_core::error::{Error, Result};
use tally_core::id::JobId;
use tally_core::jobs::{DESCRIBE_BATCH_LIMIT, JobDetail, JobQueue, JobStatus, ListJobsRequest};
use tally_core::retry::{RetryPolicy, retry_throttled};

use crate::paging::Cursor;

/// Environment variable naming the bucket a job writes results to.
pub const BUCKET_ENV_VAR: &str = "BUCKET_NAME";

/// Environment variable naming the results prefix a job writes below.
pub const PREFIX_ENV_VAR: &str = "PREFIX";

/// An active job and the manifest it was submitted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveJob {
    /// Parent job id.
    pub job_id: JobId,
    /// Job name.
    pub job_name: String,
    /// Status at describe time.
    pub status: JobStatus,
    /// Manifest URL from the job's environment.
    pub manifest_url: String,
}

/// Lists in-progress jobs on a queue and the manifests they carry.
#[derive(Clone)]
pub struct JobStateScanner {
    queue: Arc<dyn JobQueue>,
    manifest_env_var: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for JobStateScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStateScanner")
            .field("manifest_env_var", &self.manifest_env_var)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl JobStateScanner {
    /// Creates a scanner reading manifest URLs from `manifest_env_var`.
    #[must_use]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        manifest_env_var: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            manifest_env_var: manifest_env_var.into(),
            retry,
        }
    }

    /// Returns every job on `queue` in one of `states` that carries a manifest.
    ///
    /// Each state is listed to exhaustion, then all ids are described in
    /// batches of at most [`DESCRIBE_BATCH_LIMIT`]. Jobs without the manifest
    /// variable are left out.
    ///
    /// # Errors
    ///
    /// Returns the first collaborator error; no partial listing is returned.
    #[tracing::instrument(skip(self, states))]
    pub async fn list_active(&self, queue: &str, states: &[JobStatus]) -> Result<Vec<ActiveJob>> {
        let mut ids = BTreeSet::new();
        for &status in states {
            let request = ListJobsRequest::queue(queue, status);
            ids.extend(self.list_ids(request).await?);
        }
        let ids: Vec<JobId> = ids.into_iter().collect();

        let details = describe_all(self.queue.as_ref(), &self.retry, &ids).await?;
        let active: Vec<ActiveJob> = details
            .into_iter()
            .filter_map(|detail| {
                let manifest_url = detail.env(&self.manifest_env_var)?.to_string();
                Some(ActiveJob {
                    job_id: detail.job_id,
                    job_name: detail.job_name,
                    status: detail.status,
                    manifest_url,
                })
            })
            .collect();

        tracing::debug!(
            listed = ids.len(),
            with_manifest = active.len(),
            "listed active jobs"
        );
        Ok(active)
    }

    async fn list_ids(&self, request: ListJobsRequest) -> Result<Vec<JobId>> {
        let mut ids = Vec::new();
        let mut cursor = Cursor::new("jobs");
        loop {
            let page_request = request.clone().with_token(cursor.token().map(str::to_string));
            let page = retry_throttled(&self.retry, "list_jobs", || {
                self.queue.list_jobs(&page_request)
            })
            .await?;
            ids.extend(page.summaries.into_iter().map(|summary| summary.job_id));
            if !cursor.advance(page.next_token)? {
                return Ok(ids);
            }
        }
    }
}

/// Describes `ids` in batches of [`DESCRIBE_BATCH_LIMIT`], issuing
/// `ceil(n / limit)` calls and concatenating the results.
pub(crate) async fn describe_all(
    queue: &dyn JobQueue,
    retry: &RetryPolicy,
    ids: &[JobId],
) -> Result<Vec<JobDetail>> {
    let mut details = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(DESCRIBE_BATCH_LIMIT) {
        let batch = retry_throttled(retry, "describe_jobs", || queue.describe_jobs(chunk)).await?;
        details.extend(batch);
    }
    Ok(details)
}

/// A resolved array job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayJob {
    /// Parent job id.
    pub id: JobId,
    /// Job name.
    pub name: String,
    /// Current status.
    pub status: JobStatus,
    /// Number of child indices.
    pub size: u32,
    /// Manifest the job was submitted with.
    pub manifest_url: Option<String>,
    /// Results bucket from the job's environment.
    pub results_bucket: Option<String>,
    /// Results prefix from the job's environment.
    pub results_prefix: Option<String>,
    /// Stage count encoded as the trailing `-N` of the job name.
    pub expected_stages: Option<usize>,
}

impl ArrayJob {
    /// Builds an array job from its description.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedJob` if the job has no array properties.
    pub fn from_detail(detail: &JobDetail, manifest_env_var: &str) -> Result<Self> {
        let size = detail
            .array_size
            .ok_or_else(|| Error::malformed_job(detail.job_id.as_str(), "not an array job"))?;

        Ok(Self {
            id: detail.job_id.clone(),
            name: detail.job_name.clone(),
            status: detail.status,
            size,
            manifest_url: detail.env(manifest_env_var).map(str::to_string),
            results_bucket: detail.env(BUCKET_ENV_VAR).map(str::to_string),
            results_prefix: detail.env(PREFIX_ENV_VAR).map(str::to_string),
            expected_stages: stages_from_job_name(&detail.job_name),
        })
    }

    /// Returns the manifest URL or a `MalformedJob` error naming the variable.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedJob` if the job was submitted without a manifest.
    pub fn require_manifest(&self, manifest_env_var: &str) -> Result<&str> {
        self.manifest_url.as_deref().ok_or_else(|| {
            Error::malformed_job(
                self.id.as_str(),
                format!("environment has no {manifest_env_var}"),
            )
        })
    }
}

/// Reads the stage count from a job name ending in `-N`.
///
/// `sra-pipeline-jdoe-20190101-refs-3` yields `Some(3)`. Names without a
/// numeric suffix, or ending in `-0`, yield `None`.
#[must_use]
pub fn stages_from_job_name(name: &str) -> Option<usize> {
    let (_, suffix) = name.rsplit_once('-')?;
    suffix.parse().ok().filter(|&n| n > 0)
}

/// Resolves array jobs by id.
#[derive(Clone)]
pub struct JobResolver {
    queue: Arc<dyn JobQueue>,
    manifest_env_var: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for JobResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobResolver")
            .field("manifest_env_var", &self.manifest_env_var)
            .finish_non_exhaustive()
    }
}

impl JobResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        manifest_env_var: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            manifest_env_var: manifest_env_var.into(),
            retry,
        }
    }

    /// Describes `job_id` and checks it is an array job.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the queue does not know the job and
    /// `Error::MalformedJob` if it has no array properties.
    #[tracing::instrument(skip_all, fields(job_id = %job_id))]
    pub async fn array_job(&self, job_id: &JobId) -> Result<ArrayJob> {
        let ids = std::slice::from_ref(job_id);
        let detail = retry_throttled(&self.retry, "describe_jobs", || {
            self.queue.describe_jobs(ids)
        })
        .await?
        .into_iter()
        .find(|detail| &detail.job_id == job_id)
        .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;

        ArrayJob::from_detail(&detail, &self.manifest_env_var)
    }

    /// Returns the manifest variable this resolver reads.
    #[must_use]
    pub fn manifest_env_var(&self) -> &str {
        &self.manifest_env_var
    }
}
