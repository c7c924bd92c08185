//! # tally-cli
//!
//! Command-line interface for array-job progress reconciliation.
//!
//! ## Commands
//!
//! - `tally completed` - Items with results for every expected stage
//! - `tally in-progress` - Items assigned to active jobs and not yet done
//! - `tally remaining` - Manifest items without complete results
//! - `tally search-logs` - Child indices whose log contains a marker
//! - `tally missing` - Index gaps in a list read from stdin
//! - `tally pairs` - Paired-end inputs with both mates present
//!
//! ## Configuration
//!
//! Every setting is a flag that can also come from the environment:
//!
//! - `TALLY_RESULTS_BUCKET` - Results bucket (or taken from a job's `BUCKET_NAME`)
//! - `TALLY_RESULTS_PREFIX` - Results prefix (default: `pipeline-results`)
//! - `TALLY_EXPECTED_STAGES` - Stages per completed item (or the job name's `-N`)
//! - `TALLY_JOB_QUEUE` - Queue scanned for active jobs (default: `mixed`)
//! - `TALLY_POOL_SIZE` - Concurrent log inspections (default: 12)
//!
//! Standard AWS credential and region resolution applies.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tally_core::config::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_JOB_QUEUE, DEFAULT_LOG_GROUP, DEFAULT_LOG_MARKER,
    DEFAULT_MANIFEST_ENV_VAR, DEFAULT_POOL_SIZE, DEFAULT_RESULTS_PREFIX, ReconcileConfig,
};
use tally_core::jobs::JobQueue;
use tally_core::logs::LogService;
use tally_core::observability::LogFormat;
use tally_core::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use tally_core::storage::ObjectStore;

/// Tally CLI - array-job progress reconciliation.
#[derive(Debug, Parser)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Log output format (logs go to stderr).
    #[arg(long, global = true, env = "TALLY_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// AWS region override.
    #[arg(long, global = true, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Bucket holding per-item results.
    #[arg(long, global = true, env = "TALLY_RESULTS_BUCKET")]
    pub results_bucket: Option<String>,

    /// Prefix below which results are written.
    #[arg(long, global = true, env = "TALLY_RESULTS_PREFIX", default_value = DEFAULT_RESULTS_PREFIX)]
    pub results_prefix: String,

    /// Distinct stages an item needs to count as completed.
    #[arg(long, global = true, env = "TALLY_EXPECTED_STAGES")]
    pub expected_stages: Option<usize>,

    /// Queue scanned for active jobs.
    #[arg(long, global = true, env = "TALLY_JOB_QUEUE", default_value = DEFAULT_JOB_QUEUE)]
    pub job_queue: String,

    /// Container environment variable carrying the manifest URL.
    #[arg(long, global = true, env = "TALLY_MANIFEST_ENV_VAR", default_value = DEFAULT_MANIFEST_ENV_VAR)]
    pub manifest_env_var: String,

    /// Manifests start with a header row.
    #[arg(long, global = true, env = "TALLY_MANIFEST_HEADER")]
    pub manifest_header: bool,

    /// Log group holding child job streams.
    #[arg(long, global = true, env = "TALLY_LOG_GROUP", default_value = DEFAULT_LOG_GROUP)]
    pub log_group: String,

    /// Default marker for log searches.
    #[arg(long, global = true, env = "TALLY_LOG_MARKER", default_value = DEFAULT_LOG_MARKER)]
    pub log_marker: String,

    /// Concurrent log inspections.
    #[arg(long, global = true, env = "TALLY_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Deadline in seconds for a single log service call.
    #[arg(long, global = true, env = "TALLY_CALL_TIMEOUT_SECS", default_value_t = DEFAULT_CALL_TIMEOUT.as_secs())]
    pub call_timeout_secs: u64,

    /// Attempts allowed for a throttled call.
    #[arg(long, global = true, env = "TALLY_RETRY_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub retry_max_attempts: u32,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the flags describe an invalid configuration.
    pub fn config(&self) -> Result<Config> {
        let reconcile = ReconcileConfig {
            results_bucket: self.results_bucket.clone(),
            results_prefix: self.results_prefix.clone(),
            expected_stages: self.expected_stages,
            job_queue: self.job_queue.clone(),
            manifest_env_var: self.manifest_env_var.clone(),
            manifest_has_header: self.manifest_header,
            log_group: self.log_group.clone(),
            log_marker: self.log_marker.clone(),
            pool_size: self.pool_size,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            retry: RetryPolicy::default().with_max_attempts(self.retry_max_attempts),
        };
        reconcile.validate()?;

        Ok(Config {
            reconcile,
            format: self.format,
        })
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List completed items.
    Completed(commands::completed::CompletedArgs),
    /// List items still being processed by active jobs.
    InProgress(commands::in_progress::InProgressArgs),
    /// List manifest items without complete results.
    Remaining(commands::remaining::RemainingArgs),
    /// List child indices whose log contains a marker.
    SearchLogs(commands::search_logs::SearchLogsArgs),
    /// List indices missing from a list read on stdin.
    Missing(commands::missing::MissingArgs),
    /// Count paired-end inputs with both mates present.
    Pairs(commands::pairs::PairsArgs),
}

impl Commands {
    /// Subcommand name as typed on the command line.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::InProgress(_) => "in-progress",
            Self::Remaining(_) => "remaining",
            Self::SearchLogs(_) => "search-logs",
            Self::Missing(_) => "missing",
            Self::Pairs(_) => "pairs",
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One identifier per line.
    #[default]
    Text,
    /// A single JSON document.
    Json,
}

/// Log output format flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable logs.
    #[default]
    Pretty,
    /// JSON structured logs.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Engine configuration.
    pub reconcile: ReconcileConfig,
    /// Output format.
    pub format: OutputFormat,
}

/// Collaborators the commands talk to.
#[derive(Clone)]
pub struct Services {
    /// Object store holding manifests and results.
    pub store: Arc<dyn ObjectStore>,
    /// Batch job queue.
    pub queue: Arc<dyn JobQueue>,
    /// Log service holding child job logs.
    pub logs: Arc<dyn LogService>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

impl Services {
    /// Builds AWS-backed collaborators from the default credential chain.
    pub async fn aws(region: Option<String>) -> Self {
        use tally_core::aws::{BatchJobQueue, CloudWatchLogService, S3ObjectStore, load_sdk_config};

        let sdk = load_sdk_config(region).await;
        Self {
            store: Arc::new(S3ObjectStore::new(&sdk)),
            queue: Arc::new(BatchJobQueue::new(&sdk)),
            logs: Arc::new(CloudWatchLogService::new(&sdk)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_from_flags() {
        let cli = Cli::parse_from([
            "tally",
            "--format",
            "json",
            "--results-bucket",
            "results",
            "--results-prefix",
            "out",
            "--expected-stages",
            "3",
            "--pool-size",
            "4",
            "--manifest-header",
            "completed",
        ]);

        let config = cli.config().unwrap();
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.reconcile.results_bucket.as_deref(), Some("results"));
        assert_eq!(config.reconcile.results_prefix, "out");
        assert_eq!(config.reconcile.expected_stages, Some(3));
        assert_eq!(config.reconcile.pool_size, 4);
        assert!(config.reconcile.manifest_has_header);
    }

    #[test]
    fn test_cli_defaults_match_engine_defaults() {
        let cli = Cli::parse_from(["tally", "in-progress"]);
        let config = cli.config().unwrap();
        assert_eq!(
            config.reconcile,
            ReconcileConfig {
                results_bucket: cli.results_bucket.clone(),
                expected_stages: cli.expected_stages,
                ..ReconcileConfig::default()
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["tally", "missing", "--size", "10", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Missing(ref args) if args.size == 10));
    }

    #[test]
    fn test_command_names_match_subcommands() {
        let cases: [&[&str]; 6] = [
            &["tally", "completed"],
            &["tally", "in-progress"],
            &["tally", "remaining", "s3://m/run.txt"],
            &["tally", "search-logs", "job-1"],
            &["tally", "missing", "--size", "3"],
            &["tally", "pairs", "s3://inputs/"],
        ];
        for args in cases {
            assert_eq!(Cli::parse_from(args.iter().copied()).command.name(), args[1]);
        }
    }

    #[test]
    fn test_in_progress_accepts_job_id() {
        let cli = Cli::parse_from(["tally", "in-progress", "job-9", "--queue", "highmem"]);
        let Commands::InProgress(args) = cli.command else {
            panic!("expected in-progress");
        };
        assert_eq!(args.job_id.as_deref(), Some("job-9"));
        assert_eq!(args.queue.as_deref(), Some("highmem"));
    }

    #[test]
    fn test_malformed_numeric_flag_is_rejected() {
        assert!(Cli::try_parse_from(["tally", "--pool-size", "many", "completed"]).is_err());
    }

    #[test]
    fn test_zero_pool_is_rejected() {
        let cli = Cli::parse_from(["tally", "--pool-size", "0", "in-progress"]);
        assert!(cli.config().is_err());
    }
}
