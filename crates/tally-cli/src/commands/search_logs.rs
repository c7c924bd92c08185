//! Search-logs command - list child indices whose log contains a marker.

use anyhow::{Context, Result};
use clap::Args;

use super::{emit, engine, parse_job_id, render};
use crate::{Config, Services};

/// Arguments for the search-logs command.
#[derive(Debug, Args)]
pub struct SearchLogsArgs {
    /// Array job whose children to search.
    #[arg()]
    pub job_id: String,

    /// Text to look for (defaults to the configured marker).
    #[arg(long, short = 'q')]
    pub query: Option<String>,
}

/// Execute the search-logs command.
///
/// # Errors
///
/// Returns an error if the job is not an array job or any child log cannot
/// be read.
pub async fn execute(args: SearchLogsArgs, config: &Config, services: &Services) -> Result<()> {
    let engine = engine(config, services)?;
    let inspector = engine.log_inspector(services.logs.clone())?;
    let job_id = parse_job_id(&args.job_id)?;
    let marker = args.query.as_deref().unwrap_or(&config.reconcile.log_marker);

    let found = inspector
        .search_job(&job_id, marker)
        .await
        .with_context(|| format!("Failed to search logs of job {job_id}"))?;

    emit(&render(config.format, &found, &found)?);
    Ok(())
}
