//! Reconciliation configuration.
//!
//! Values the batch tooling used to hardcode (queue name, results prefix, log
//! group, marker string, pool size) are carried here and passed to the engine at
//! construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Default results prefix below which per-item outputs are written.
pub const DEFAULT_RESULTS_PREFIX: &str = "pipeline-results";

/// Default job queue scanned for active jobs.
pub const DEFAULT_JOB_QUEUE: &str = "mixed";

/// Default container environment variable holding a job's manifest URL.
pub const DEFAULT_MANIFEST_ENV_VAR: &str = "ACCESSION_LIST";

/// Default log group for batch job streams.
pub const DEFAULT_LOG_GROUP: &str = "/aws/batch/job";

/// Default marker searched for in child logs.
pub const DEFAULT_LOG_MARKER: &str = "finished downloading";

/// Default number of concurrent log inspections.
pub const DEFAULT_POOL_SIZE: usize = 12;

/// Default per-call deadline for log service requests.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the reconciliation engine and its scanners.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Bucket holding per-item results. May instead come from a job's `BUCKET_NAME`.
    #[serde(default)]
    pub results_bucket: Option<String>,

    /// Prefix below which results are laid out as `{prefix}/{item}/{stage}/...`.
    pub results_prefix: String,

    /// Number of distinct stages an item must produce to count as completed.
    ///
    /// When unset, the trailing `-N` of the array job's name is used.
    #[serde(default)]
    pub expected_stages: Option<usize>,

    /// Queue scanned by the in-progress query.
    pub job_queue: String,

    /// Container environment variable carrying the manifest URL.
    pub manifest_env_var: String,

    /// Whether manifests start with a header row.
    #[serde(default)]
    pub manifest_has_header: bool,

    /// Log group holding child job streams.
    pub log_group: String,

    /// Default marker for log searches.
    pub log_marker: String,

    /// Number of indices inspected concurrently.
    pub pool_size: usize,

    /// Deadline for a single log service call.
    pub call_timeout: Duration,

    /// Retry budget for throttled calls.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            results_bucket: None,
            results_prefix: DEFAULT_RESULTS_PREFIX.to_string(),
            expected_stages: None,
            job_queue: DEFAULT_JOB_QUEUE.to_string(),
            manifest_env_var: DEFAULT_MANIFEST_ENV_VAR.to_string(),
            manifest_has_header: false,
            log_group: DEFAULT_LOG_GROUP.to_string(),
            log_marker: DEFAULT_LOG_MARKER.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReconcileConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::InvalidInput("pool_size must be at least 1".into()));
        }
        if self.expected_stages == Some(0) {
            return Err(Error::InvalidInput(
                "expected_stages must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidInput(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "call_timeout must be greater than zero".into(),
            ));
        }
        if self.results_prefix.trim_matches('/').is_empty() {
            return Err(Error::InvalidInput("results_prefix cannot be empty".into()));
        }
        Ok(())
    }
}
