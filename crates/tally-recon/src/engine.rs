//! Reconciliation engine.
//!
//! Composes the scanners into the three progress queries:
//!
//! - [`Reconciler::completed`]: items with output for every expected stage
//! - [`Reconciler::in_progress`]: items assigned to active jobs, minus failed
//!   indices and anything already completed
//! - [`Reconciler::remaining`]: items of one manifest that are not completed
//!
//! Every query recomputes its answer from the collaborators; nothing is cached
//! between calls.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;

use tally_core::config::{DEFAULT_RESULTS_PREFIX, ReconcileConfig};
use tally_core::error::{Error, Result};
use tally_core::id::{JobId, WorkItemId};
use tally_core::jobs::{JobQueue, JobStatus};
use tally_core::logs::LogService;
use tally_core::metrics::{self, QueryTimer};
use tally_core::observability::reconcile_span;
use tally_core::storage::ObjectStore;

use crate::failures::FailedIndexTracker;
use crate::jobs::{ArrayJob, JobResolver, JobStateScanner};
use crate::logs::{LogInspector, LogInspectorOptions};
use crate::manifest::{ManifestFormat, ManifestStore};
use crate::results::ResultScanner;

/// Where completed results live and what counts as complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionTarget {
    /// Results bucket.
    pub bucket: String,
    /// Results prefix.
    pub prefix: String,
    /// Distinct stages an item needs to count as completed.
    pub expected_stages: usize,
}

impl CompletionTarget {
    /// Creates a target.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an empty bucket or prefix, or zero stages.
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        expected_stages: usize,
    ) -> Result<Self> {
        let target = Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            expected_stages,
        };
        if target.bucket.is_empty() {
            return Err(Error::InvalidInput("results bucket cannot be empty".into()));
        }
        if target.prefix.trim_matches('/').is_empty() {
            return Err(Error::InvalidInput("results prefix cannot be empty".into()));
        }
        if expected_stages == 0 {
            return Err(Error::InvalidInput("expected stages must be at least 1".into()));
        }
        Ok(target)
    }
}

/// An active job whose manifest could not be read during an in-progress scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedManifest {
    /// The active job.
    pub job_id: JobId,
    /// Manifest URL from its environment.
    pub manifest_url: String,
    /// Why the fetch failed.
    pub reason: String,
}

/// Result of an in-progress query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InProgressReport {
    /// Items assigned to active jobs, not failed and not completed.
    pub items: BTreeSet<WorkItemId>,
    /// Active jobs that contributed to `items`.
    pub jobs: Vec<JobId>,
    /// Active jobs left out because their manifest could not be read.
    pub skipped: Vec<SkippedManifest>,
}

impl InProgressReport {
    /// Returns true if some active jobs were left out.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// The reconciliation engine.
#[derive(Clone)]
pub struct Reconciler {
    config: ReconcileConfig,
    queue: Arc<dyn JobQueue>,
    manifests: ManifestStore,
    results: ResultScanner,
    active: JobStateScanner,
    failures: FailedIndexTracker,
    resolver: JobResolver,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates an engine over the object store and job queue.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `config` fails validation.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn JobQueue>,
        config: ReconcileConfig,
    ) -> Result<Self> {
        config.validate()?;
        let retry = config.retry;

        Ok(Self {
            manifests: ManifestStore::new(Arc::clone(&store), retry),
            results: ResultScanner::new(store, retry),
            active: JobStateScanner::new(Arc::clone(&queue), &config.manifest_env_var, retry),
            failures: FailedIndexTracker::new(Arc::clone(&queue), retry),
            resolver: JobResolver::new(Arc::clone(&queue), &config.manifest_env_var, retry),
            queue,
            config,
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Returns the array-job resolver.
    #[must_use]
    pub fn resolver(&self) -> &JobResolver {
        &self.resolver
    }

    /// Builds a log inspector sharing this engine's job queue and settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the configured pool size is zero.
    pub fn log_inspector(&self, logs: Arc<dyn LogService>) -> Result<LogInspector> {
        LogInspector::new(
            Arc::clone(&self.queue),
            logs,
            self.resolver.clone(),
            LogInspectorOptions {
                log_group: self.config.log_group.clone(),
                pool_size: self.config.pool_size,
                call_timeout: self.config.call_timeout,
                retry: self.config.retry,
            },
        )
    }

    fn manifest_format(&self) -> ManifestFormat {
        if self.config.manifest_has_header {
            ManifestFormat::WithHeader
        } else {
            ManifestFormat::Plain
        }
    }

    /// Resolves the completion target from configuration, falling back to
    /// values carried by `job`.
    ///
    /// Configuration wins over the job's environment, except that a job's
    /// `PREFIX` replaces the default prefix when no other prefix is configured.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` when no bucket or stage count is available.
    pub fn completion_target(&self, job: Option<&ArrayJob>) -> Result<CompletionTarget> {
        let bucket = self
            .config
            .results_bucket
            .clone()
            .or_else(|| job.and_then(|j| j.results_bucket.clone()))
            .ok_or_else(|| Error::InvalidInput("no results bucket configured".into()))?;
        let prefix = match job.and_then(|j| j.results_prefix.clone()) {
            Some(prefix) if self.config.results_prefix == DEFAULT_RESULTS_PREFIX => prefix,
            _ => self.config.results_prefix.clone(),
        };
        let expected_stages = self
            .config
            .expected_stages
            .or_else(|| job.and_then(|j| j.expected_stages))
            .ok_or_else(|| Error::InvalidInput("no expected stage count configured".into()))?;

        CompletionTarget::new(bucket, prefix, expected_stages)
    }

    /// Returns the items with output for at least `target.expected_stages` stages.
    ///
    /// # Errors
    ///
    /// Returns the first collaborator error; the results listing must be read in
    /// full for an answer.
    pub async fn completed(&self, target: &CompletionTarget) -> Result<BTreeSet<WorkItemId>> {
        let _timer = QueryTimer::start("completed");
        let span = reconcile_span("completed", &target.bucket);
        async {
            let record = self.results.scan(&target.bucket, &target.prefix).await?;
            let completed = record.completed(target.expected_stages);
            tracing::info!(
                observed = record.len(),
                completed = completed.len(),
                expected_stages = target.expected_stages,
                "computed completed items"
            );
            Ok(completed)
        }
        .instrument(span)
        .await
    }

    /// Returns the items still being worked on by active jobs on `queue`.
    ///
    /// For every job in an in-progress state that carries a manifest, the items
    /// at its failed child indices are dropped; the rest are unioned across
    /// jobs and completed items are removed.
    ///
    /// A manifest that cannot be fetched is skipped and listed in
    /// [`InProgressReport::skipped`]. Every other failure aborts the query.
    ///
    /// # Errors
    ///
    /// Returns the first job queue error or results scan error.
    pub async fn in_progress(
        &self,
        queue: &str,
        target: &CompletionTarget,
    ) -> Result<InProgressReport> {
        let _timer = QueryTimer::start("in_progress");
        let span = reconcile_span("in_progress", queue);
        async {
            let active = self.active.list_active(queue, &JobStatus::IN_PROGRESS).await?;
            let mut report = InProgressReport::default();

            for job in active {
                let failed = self.failures.failed_indices(&job.job_id).await?;
                let manifest = match self
                    .manifests
                    .fetch_with(&job.manifest_url, self.manifest_format())
                    .await
                {
                    Ok(manifest) => manifest,
                    Err(err) => {
                        tracing::warn!(
                            job_id = %job.job_id,
                            manifest_url = %job.manifest_url,
                            error = %err,
                            "skipping active job with unreadable manifest"
                        );
                        metrics::record_manifest_failure();
                        report.skipped.push(SkippedManifest {
                            job_id: job.job_id,
                            manifest_url: job.manifest_url,
                            reason: err.to_string(),
                        });
                        continue;
                    }
                };

                report.items.extend(manifest.without_indices(&failed));
                report.jobs.push(job.job_id);
            }

            let completed = self.completed(target).await?;
            report.items.retain(|item| !completed.contains(item));

            tracing::info!(
                jobs = report.jobs.len(),
                skipped = report.skipped.len(),
                in_progress = report.items.len(),
                "computed in-progress items"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Returns the items of the manifest at `manifest_url` that are not completed.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` or `Error::EmptyManifest` for the manifest, or
    /// the first results scan error.
    pub async fn remaining(
        &self,
        manifest_url: &str,
        target: &CompletionTarget,
    ) -> Result<BTreeSet<WorkItemId>> {
        let _timer = QueryTimer::start("remaining");
        let span = reconcile_span("remaining", manifest_url);
        async {
            let manifest = self
                .manifests
                .fetch_with(manifest_url, self.manifest_format())
                .await?;
            let completed = self.completed(target).await?;
            let remaining: BTreeSet<WorkItemId> = manifest
                .identifiers()
                .difference(&completed)
                .cloned()
                .collect();

            tracing::info!(
                manifest = manifest.len(),
                remaining = remaining.len(),
                "computed remaining items"
            );
            Ok(remaining)
        }
        .instrument(span)
        .await
    }

    /// Resolves `job_id` and returns the items of its manifest that are not completed.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedJob` if the job has no manifest, otherwise see
    /// [`Reconciler::remaining`] and [`Reconciler::completion_target`].
    pub async fn remaining_for_job(&self, job_id: &JobId) -> Result<BTreeSet<WorkItemId>> {
        let job = self.resolver.array_job(job_id).await?;
        let target = self.completion_target(Some(&job))?;
        let url = job.require_manifest(&self.config.manifest_env_var)?;
        self.remaining(url, &target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::jobs::{JobDetail, MemoryJobQueue};
    use tally_core::storage::MemoryObjectStore;

    fn id(value: &str) -> WorkItemId {
        WorkItemId::new(value).unwrap()
    }

    fn ids(values: &[&str]) -> BTreeSet<WorkItemId> {
        values.iter().map(|v| id(v)).collect()
    }

    fn job_id(value: &str) -> JobId {
        JobId::new(value).unwrap()
    }

    fn target() -> CompletionTarget {
        CompletionTarget::new("results", "out", 2).unwrap()
    }

    fn complete(store: &MemoryObjectStore, item: &str) {
        for stage in ["hg38", "virus"] {
            store
                .put("results", &format!("out/{item}/{stage}/{item}.bam"), "x")
                .unwrap();
        }
    }

    fn engine(store: MemoryObjectStore, queue: MemoryJobQueue) -> Reconciler {
        Reconciler::new(Arc::new(store), Arc::new(queue), ReconcileConfig::default()).unwrap()
    }

    fn active_job(id: &str, url: &str) -> JobDetail {
        JobDetail::new(job_id(id), format!("run-{id}-2"), JobStatus::Running)
            .with_array_size(3)
            .with_env("ACCESSION_LIST", url)
    }

    #[tokio::test]
    async fn remaining_is_manifest_minus_completed() {
        let store = MemoryObjectStore::new();
        store.put("lists", "m.txt", "a\nb\nc\nd\n").unwrap();
        complete(&store, "b");
        complete(&store, "z");
        store.put("results", "out/c/hg38/c.bam", "x").unwrap();

        let engine = engine(store, MemoryJobQueue::new());
        let remaining = engine.remaining("s3://lists/m.txt", &target()).await.unwrap();
        let completed = engine.completed(&target()).await.unwrap();

        assert_eq!(remaining, ids(&["a", "c", "d"]));
        assert_eq!(completed, ids(&["b", "z"]));
        assert!(remaining.is_disjoint(&completed));
    }

    #[tokio::test]
    async fn remaining_fails_on_missing_manifest() {
        let engine = engine(MemoryObjectStore::new(), MemoryJobQueue::new());
        let err = engine.remaining("s3://lists/none.txt", &target()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn in_progress_excludes_failed_and_completed() {
        let store = MemoryObjectStore::new();
        store.put("lists", "one.txt", "x0\nx1\nx2\n").unwrap();
        store.put("lists", "two.txt", "y0\nx1\ny2\n").unwrap();
        complete(&store, "x2");

        let queue = MemoryJobQueue::new();
        queue.submit("mixed", active_job("one", "s3://lists/one.txt")).unwrap();
        queue.submit("mixed", active_job("two", "s3://lists/two.txt")).unwrap();
        queue
            .add_child(
                &job_id("one"),
                1,
                JobDetail::new(job_id("tmp"), "child", JobStatus::Failed),
            )
            .unwrap();
        queue
            .add_child(
                &job_id("two"),
                2,
                JobDetail::new(job_id("tmp"), "child", JobStatus::Failed),
            )
            .unwrap();

        let engine = engine(store, queue);
        let report = engine.in_progress("mixed", &target()).await.unwrap();

        // x1 failed in "one" but is still assigned to "two".
        assert_eq!(report.items, ids(&["x0", "x1", "y0"]));
        assert_eq!(report.jobs.len(), 2);
        assert!(!report.is_partial());
    }

    #[tokio::test]
    async fn in_progress_skips_unreadable_manifests() {
        let store = MemoryObjectStore::new();
        store.put("lists", "ok.txt", "a\nb\n").unwrap();

        let queue = MemoryJobQueue::new();
        queue.submit("mixed", active_job("ok", "s3://lists/ok.txt")).unwrap();
        queue.submit("mixed", active_job("gone", "s3://lists/gone.txt")).unwrap();

        let engine = engine(store, queue);
        let report = engine.in_progress("mixed", &target()).await.unwrap();

        assert_eq!(report.items, ids(&["a", "b"]));
        assert!(report.is_partial());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].job_id, job_id("gone"));
        assert_eq!(report.skipped[0].manifest_url, "s3://lists/gone.txt");
    }

    #[tokio::test]
    async fn header_manifests_drop_first_line() {
        let store = MemoryObjectStore::new();
        store.put("lists", "m.csv", "accession\na\nb\n").unwrap();
        let config = ReconcileConfig {
            manifest_has_header: true,
            ..ReconcileConfig::default()
        };
        let engine =
            Reconciler::new(Arc::new(store), Arc::new(MemoryJobQueue::new()), config).unwrap();

        let remaining = engine.remaining("s3://lists/m.csv", &target()).await.unwrap();
        assert_eq!(remaining, ids(&["a", "b"]));
    }

    #[tokio::test]
    async fn remaining_for_job_uses_job_environment() {
        let store = MemoryObjectStore::new();
        store.put("lists", "m.txt", "a\nb\n").unwrap();
        for stage in ["r1", "r2", "r3"] {
            store.put("res", &format!("custom/a/{stage}/a.bam"), "x").unwrap();
        }

        let queue = MemoryJobQueue::new();
        queue
            .submit(
                "mixed",
                JobDetail::new(job_id("p"), "sra-pipeline-20190101-3", JobStatus::Running)
                    .with_array_size(2)
                    .with_env("ACCESSION_LIST", "s3://lists/m.txt")
                    .with_env("BUCKET_NAME", "res")
                    .with_env("PREFIX", "custom"),
            )
            .unwrap();

        let engine = engine(store, queue);
        let remaining = engine.remaining_for_job(&job_id("p")).await.unwrap();
        assert_eq!(remaining, ids(&["b"]));
    }

    #[test]
    fn configuration_overrides_job_environment() {
        let config = ReconcileConfig {
            results_bucket: Some("configured".into()),
            expected_stages: Some(5),
            ..ReconcileConfig::default()
        };
        let engine = Reconciler::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryJobQueue::new()),
            config,
        )
        .unwrap();
        let job = ArrayJob {
            id: job_id("p"),
            name: "run-3".into(),
            status: JobStatus::Running,
            size: 1,
            manifest_url: None,
            results_bucket: Some("from-job".into()),
            results_prefix: Some("job-prefix".into()),
            expected_stages: Some(3),
        };

        let target = engine.completion_target(Some(&job)).unwrap();
        assert_eq!(target.bucket, "configured");
        assert_eq!(target.prefix, "job-prefix");
        assert_eq!(target.expected_stages, 5);
    }

    #[test]
    fn missing_bucket_or_stages_is_invalid() {
        let engine = engine(MemoryObjectStore::new(), MemoryJobQueue::new());
        assert!(matches!(
            engine.completion_target(None),
            Err(Error::InvalidInput(_))
        ));
        assert!(CompletionTarget::new("b", "p", 0).is_err());
        assert!(CompletionTarget::new("b", "/", 1).is_err());
    }
}
