//! Missing command - report index gaps in a list read from stdin.

use std::collections::BTreeSet;
use std::io::Read;

use anyhow::{Context, Result};
use clap::Args;

use tally_recon::{missing_indices, parse_indices};

use super::{emit, render};
use crate::Config;

/// Arguments for the missing command.
#[derive(Debug, Args)]
pub struct MissingArgs {
    /// Array size; indices run from 0 to size - 1.
    #[arg(long, short = 's')]
    pub size: u32,
}

/// Execute the missing command.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or holds a non-index line.
pub fn execute(args: &MissingArgs, config: &Config) -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read indices from stdin")?;

    let missing = missing(args.size, &input)?;
    emit(&render(config.format, &missing, &missing)?);
    Ok(())
}

fn missing(size: u32, input: &str) -> Result<BTreeSet<u32>> {
    let found = parse_indices(input).context("Invalid index list")?;
    Ok(missing_indices(size, found))
}
