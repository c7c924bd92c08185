//! Remaining command - list manifest items without complete results.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use clap::Args;

use tally_core::id::WorkItemId;
use tally_recon::Reconciler;

use super::{emit, engine, parse_job_id, render};
use crate::{Config, Services};

/// Arguments for the remaining command.
#[derive(Debug, Args)]
pub struct RemainingArgs {
    /// Manifest URL (`s3://bucket/key`).
    #[arg(required_unless_present = "job")]
    pub manifest_url: Option<String>,

    /// Array job whose manifest and environment to use.
    #[arg(long, short = 'j', conflicts_with = "manifest_url")]
    pub job: Option<String>,
}

/// Execute the remaining command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be read or the results listing fails.
pub async fn execute(args: RemainingArgs, config: &Config, services: &Services) -> Result<()> {
    let engine = engine(config, services)?;
    let remaining = remaining(&engine, &args).await?;
    emit(&render(config.format, &remaining, &remaining)?);
    Ok(())
}

pub(crate) async fn remaining(
    engine: &Reconciler,
    args: &RemainingArgs,
) -> Result<BTreeSet<WorkItemId>> {
    if let Some(job) = &args.job {
        let job_id = parse_job_id(job)?;
        return engine
            .remaining_for_job(&job_id)
            .await
            .with_context(|| format!("Failed to compute remaining items for job {job_id}"));
    }

    let url = args
        .manifest_url
        .as_deref()
        .context("A manifest URL or --job is required")?;
    let target = engine
        .completion_target(None)
        .context("Set --results-bucket and --expected-stages, or use --job")?;
    engine
        .remaining(url, &target)
        .await
        .with_context(|| format!("Failed to compute remaining items for {url}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tally_core::config::ReconcileConfig;
    use tally_test_utils::{RESULTS_BUCKET, TestContext, assert_items};

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RemainingArgs,
    }

    #[test]
    fn test_remaining_args_parsing() {
        let cli = TestCli::parse_from(["test", "s3://manifests/run.txt"]);
        assert_eq!(cli.args.manifest_url.as_deref(), Some("s3://manifests/run.txt"));

        let cli = TestCli::parse_from(["test", "--job", "job-1"]);
        assert_eq!(cli.args.job.as_deref(), Some("job-1"));

        assert!(TestCli::try_parse_from(["test"]).is_err());
        assert!(TestCli::try_parse_from(["test", "s3://m/r.txt", "--job", "j"]).is_err());
    }

    #[tokio::test]
    async fn manifest_minus_completed() {
        let ctx = TestContext::new();
        let url = ctx.put_manifest("run.txt", &["SRR1", "SRR2", "SRR3"]);
        ctx.put_results("SRR2", &["hg38", "virus"]);

        let config = ReconcileConfig {
            results_bucket: Some(RESULTS_BUCKET.into()),
            expected_stages: Some(2),
            ..ReconcileConfig::default()
        };
        let engine = Reconciler::new(ctx.store.clone(), ctx.queue.clone(), config).unwrap();
        let args = TestCli::parse_from(["test", url.as_str()]).args;

        let left = remaining(&engine, &args).await.unwrap();
        assert_items(&left, &["SRR1", "SRR3"]);
    }
}
