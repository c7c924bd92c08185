//! Index gap reporting.

use std::collections::BTreeSet;

use tally_core::error::{Error, Result};

/// Returns the indices in `0..size` that are not in `found`.
///
/// Found indices outside the range are ignored.
pub fn missing_indices(size: u32, found: impl IntoIterator<Item = u32>) -> BTreeSet<u32> {
    let found: BTreeSet<u32> = found.into_iter().collect();
    (0..size).filter(|index| !found.contains(index)).collect()
}

/// Parses one index per line. Blank lines are skipped.
///
/// # Errors
///
/// Returns `Error::InvalidInput` naming the first line that is not an index.
pub fn parse_indices(text: &str) -> Result<BTreeSet<u32>> {
    text.lines()
        .enumerate()
        .map(|(n, line)| (n, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(n, line)| {
            line.parse::<u32>().map_err(|_| {
                Error::InvalidInput(format!("line {}: '{line}' is not an array index", n + 1))
            })
        })
        .collect()
}
