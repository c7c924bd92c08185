//! In-progress command - list items still being processed by active jobs.

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use tally_recon::{InProgressReport, Reconciler};

use super::{completion_target, emit, engine, render};
use crate::{Config, Services};

/// Arguments for the in-progress command.
#[derive(Debug, Args)]
pub struct InProgressArgs {
    /// Array job whose environment supplies the results bucket, prefix and stage count.
    #[arg()]
    pub job_id: Option<String>,

    /// Queue to scan instead of the configured one.
    #[arg(long, short = 'q')]
    pub queue: Option<String>,
}

/// Execute the in-progress command.
///
/// Manifests that could not be read are reported on stderr; the listed items
/// then cover only the remaining jobs.
///
/// # Errors
///
/// Returns an error if the queue or the results listing cannot be read.
pub async fn execute(args: InProgressArgs, config: &Config, services: &Services) -> Result<()> {
    let engine = engine(config, services)?;
    let report = in_progress(&engine, args.queue.as_deref(), args.job_id.as_deref()).await?;

    for skipped in &report.skipped {
        eprintln!(
            "{} skipped job {} ({}): {}",
            "warning:".yellow().bold(),
            skipped.job_id,
            skipped.manifest_url,
            skipped.reason
        );
    }

    emit(&render(config.format, &report.items, &report)?);
    Ok(())
}

pub(crate) async fn in_progress(
    engine: &Reconciler,
    queue: Option<&str>,
    job_id: Option<&str>,
) -> Result<InProgressReport> {
    let queue = queue.unwrap_or(&engine.config().job_queue).to_string();
    let target = completion_target(engine, job_id).await?;

    engine
        .in_progress(&queue, &target)
        .await
        .with_context(|| format!("Failed to scan queue {queue}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::config::ReconcileConfig;
    use tally_core::jobs::JobStatus;
    use tally_test_utils::{RESULTS_BUCKET, TestContext, assert_items};

    #[test]
    fn test_in_progress_args_parsing() {
        use clap::Parser;

        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: InProgressArgs,
        }

        let cli = TestCli::parse_from(["test", "-q", "highmem"]);
        assert_eq!(cli.args.queue.as_deref(), Some("highmem"));
        assert!(cli.args.job_id.is_none());

        let cli = TestCli::parse_from(["test", "job-7"]);
        assert_eq!(cli.args.job_id.as_deref(), Some("job-7"));
    }

    #[tokio::test]
    async fn reports_items_and_skipped_jobs() {
        let ctx = TestContext::new();
        let ok = ctx.put_manifest("ok.txt", &["a", "b"]);
        ctx.submit_array_job("ok", "run-2", 2, JobStatus::Running, &ok);
        ctx.submit_array_job("gone", "run-2", 1, JobStatus::Pending, "s3://manifests/gone.txt");
        ctx.put_results("b", &["hg38", "virus"]);

        let config = ReconcileConfig {
            results_bucket: Some(RESULTS_BUCKET.into()),
            expected_stages: Some(2),
            ..ReconcileConfig::default()
        };
        let engine = Reconciler::new(ctx.store.clone(), ctx.queue.clone(), config).unwrap();

        let report = in_progress(&engine, None, None).await.unwrap();
        assert_items(&report.items, &["a"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].job_id.as_str(), "gone");
    }

    #[tokio::test]
    async fn job_id_supplies_bucket_and_stages() {
        let ctx = TestContext::new();
        let url = ctx.put_manifest("run.txt", &["SRR1", "SRR2", "SRR3"]);
        ctx.submit_array_job("p", "run-refs-2", 3, JobStatus::Running, &url);
        ctx.put_results("SRR2", &["hg38", "virus"]);
        ctx.put_results("SRR3", &["hg38"]);

        let engine = Reconciler::new(
            ctx.store.clone(),
            ctx.queue.clone(),
            ReconcileConfig::default(),
        )
        .unwrap();

        let report = in_progress(&engine, None, Some("p")).await.unwrap();
        assert_items(&report.items, &["SRR1", "SRR3"]);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn without_job_or_flags_target_is_missing() {
        let ctx = TestContext::new();
        let engine = Reconciler::new(
            ctx.store.clone(),
            ctx.queue.clone(),
            ReconcileConfig::default(),
        )
        .unwrap();

        let err = in_progress(&engine, None, None).await.unwrap_err();
        assert!(err.to_string().contains("--results-bucket"));
    }
}
