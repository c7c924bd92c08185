//! Completed command - list items with results for every expected stage.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use clap::Args;

use tally_core::id::WorkItemId;
use tally_recon::Reconciler;

use super::{completion_target, emit, engine, render};
use crate::{Config, Services};

/// Arguments for the completed command.
#[derive(Debug, Args)]
pub struct CompletedArgs {
    /// Array job whose environment supplies the results bucket, prefix and stage count.
    #[arg()]
    pub job_id: Option<String>,
}

/// Execute the completed command.
///
/// # Errors
///
/// Returns an error if no completion target can be resolved or the results
/// listing fails.
pub async fn execute(args: CompletedArgs, config: &Config, services: &Services) -> Result<()> {
    let engine = engine(config, services)?;
    let completed = completed(&engine, args.job_id.as_deref()).await?;
    emit(&render(config.format, &completed, &completed)?);
    Ok(())
}

pub(crate) async fn completed(
    engine: &Reconciler,
    job_id: Option<&str>,
) -> Result<BTreeSet<WorkItemId>> {
    let target = completion_target(engine, job_id).await?;

    engine
        .completed(&target)
        .await
        .context("Failed to scan results")
}
