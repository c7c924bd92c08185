//! Pairs command - count paired-end inputs with both mates present.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use tally_core::storage::ObjectUrl;
use tally_recon::PairCounter;

use super::emit;
use crate::{Config, OutputFormat, Services};

/// Arguments for the pairs command.
#[derive(Debug, Args)]
pub struct PairsArgs {
    /// Location of the inputs (`s3://bucket/prefix`).
    #[arg()]
    pub url: String,

    /// List the pair stems instead of counting them.
    #[arg(long, short = 'l')]
    pub list: bool,
}

#[derive(Debug, Serialize)]
struct PairsOutput {
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pairs: Option<BTreeSet<String>>,
}

/// Execute the pairs command.
///
/// # Errors
///
/// Returns an error if the URL is malformed or the listing fails.
pub async fn execute(args: PairsArgs, config: &Config, services: &Services) -> Result<()> {
    let location = ObjectUrl::parse(&args.url).context("Expected s3://bucket/prefix")?;
    let counter = PairCounter::new(services.store.clone(), config.reconcile.retry);
    let pairs = counter
        .complete_pairs(&location.bucket, &location.key)
        .await
        .with_context(|| format!("Failed to list {}", args.url))?;

    emit(&render(config.format, pairs, args.list)?);
    Ok(())
}

fn render(format: OutputFormat, pairs: BTreeSet<String>, list: bool) -> Result<String> {
    match (format, list) {
        (OutputFormat::Text, true) => Ok(pairs.into_iter().collect::<Vec<_>>().join("\n")),
        (OutputFormat::Text, false) => Ok(pairs.len().to_string()),
        (OutputFormat::Json, list) => Ok(serde_json::to_string_pretty(&PairsOutput {
            count: pairs.len(),
            pairs: list.then_some(pairs),
        })?),
    }
}
