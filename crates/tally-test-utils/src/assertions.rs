//! Custom assertion helpers for integration tests.

use std::collections::BTreeSet;

use tally_core::id::WorkItemId;

use crate::collaborators::CollaboratorOp;

/// Asserts that `actual` contains exactly the identifiers in `expected`.
///
/// # Panics
///
/// Panics with both sets rendered if they differ.
pub fn assert_items(actual: &BTreeSet<WorkItemId>, expected: &[&str]) {
    let actual: BTreeSet<&str> = actual.iter().map(WorkItemId::as_str).collect();
    let expected: BTreeSet<&str> = expected.iter().copied().collect();
    assert_eq!(
        actual, expected,
        "Expected items {expected:?}, got {actual:?}"
    );
}

/// Counts operations matching `predicate`.
pub fn count_ops(ops: &[CollaboratorOp], predicate: impl Fn(&CollaboratorOp) -> bool) -> usize {
    ops.iter().filter(|op| predicate(op)).count()
}

/// Counts `describe_jobs` calls.
pub fn describe_calls(ops: &[CollaboratorOp]) -> usize {
    count_ops(ops, |op| matches!(op, CollaboratorOp::DescribeJobs { .. }))
}

/// Counts log page reads of `stream`.
pub fn log_reads(ops: &[CollaboratorOp], stream: &str) -> usize {
    count_ops(
        ops,
        |op| matches!(op, CollaboratorOp::GetLogEvents { stream: s, .. } if s == stream),
    )
}
