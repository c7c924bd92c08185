//! CLI command implementations.

pub mod completed;
pub mod in_progress;
pub mod missing;
pub mod pairs;
pub mod remaining;
pub mod search_logs;

use std::fmt::Display;

use anyhow::{Context, Result};
use serde::Serialize;

use tally_core::id::JobId;
use tally_recon::{CompletionTarget, Reconciler};

use crate::{Config, OutputFormat, Services};

/// Builds the reconciliation engine for a command.
pub(crate) fn engine(config: &Config, services: &Services) -> Result<Reconciler> {
    Reconciler::new(
        services.store.clone(),
        services.queue.clone(),
        config.reconcile.clone(),
    )
    .context("Invalid reconciliation settings")
}

pub(crate) fn parse_job_id(value: &str) -> Result<JobId> {
    JobId::new(value).with_context(|| format!("Invalid job id '{value}'"))
}

/// Resolves the completion target, taking unset settings from `job_id`'s environment.
pub(crate) async fn completion_target(
    engine: &Reconciler,
    job_id: Option<&str>,
) -> Result<CompletionTarget> {
    let job = match job_id {
        Some(id) => {
            let id = parse_job_id(id)?;
            tracing::debug!(job_id = %id, "resolving completion target from job");
            Some(
                engine
                    .resolver()
                    .array_job(&id)
                    .await
                    .with_context(|| format!("Failed to resolve job {id}"))?,
            )
        }
        None => None,
    };
    engine
        .completion_target(job.as_ref())
        .context("Set --results-bucket and --expected-stages, or pass a job id")
}

/// Renders `items` as one per line, or `document` as JSON.
pub(crate) fn render<I, T, D>(format: OutputFormat, items: I, document: &D) -> Result<String>
where
    I: IntoIterator<Item = T>,
    T: Display,
    D: Serialize + ?Sized,
{
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(document)?),
        OutputFormat::Text => Ok(items
            .into_iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

pub(crate) fn emit(output: &str) {
    if !output.is_empty() {
        println!("{output}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn text_is_one_item_per_line() {
        let items = BTreeSet::from(["b", "a", "c"]);
        let out = render(OutputFormat::Text, &items, &items).unwrap();
        assert_eq!(out, "a\nb\nc");
    }

    #[test]
    fn json_is_single_document() {
        let items = vec![3u32, 1];
        let out = render(OutputFormat::Json, &items, &items).unwrap();
        let parsed: Vec<u32> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, vec![3, 1]);
    }

    #[test]
    fn empty_text_output() {
        let items: Vec<String> = Vec::new();
        assert_eq!(render(OutputFormat::Text, &items, &items).unwrap(), "");
    }
}
