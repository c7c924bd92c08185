//! Failed-index tracker.

use std::collections::BTreeSet;
use std::sync::Arc;

use tally_core::error::Result;
use tally_core::id::JobId;
use tally_core::jobs::{JobQueue, JobStatus, JobSummary, ListJobsRequest};
use tally_core::retry::{RetryPolicy, retry_throttled};

use crate::paging::Cursor;

/// Finds the child indices of an array job that ended in `FAILED`.
#[derive(Clone)]
pub struct FailedIndexTracker {
    queue: Arc<dyn JobQueue>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for FailedIndexTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailedIndexTracker")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl FailedIndexTracker {
    /// Creates a tracker.
    #[must_use]
    pub fn new(queue: Arc<dyn JobQueue>, retry: RetryPolicy) -> Self {
        Self { queue, retry }
    }

    /// Returns the failed child indices of `parent`.
    ///
    /// An empty set is a normal answer: the job may have no failed children, or
    /// no children listed at all yet.
    ///
    /// # Errors
    ///
    /// Returns the first collaborator error.
    #[tracing::instrument(skip_all, fields(parent = %parent))]
    pub async fn failed_indices(&self, parent: &JobId) -> Result<BTreeSet<u32>> {
        let request = ListJobsRequest::children(parent.clone(), JobStatus::Failed);
        let mut indices = BTreeSet::new();
        let mut cursor = Cursor::new("failed_children");

        loop {
            let page_request = request.clone().with_token(cursor.token().map(str::to_string));
            let page = retry_throttled(&self.retry, "list_jobs", || {
                self.queue.list_jobs(&page_request)
            })
            .await?;

            for summary in &page.summaries {
                match child_index(summary) {
                    Some(index) => {
                        indices.insert(index);
                    }
                    None => tracing::warn!(job_id = %summary.job_id, "failed child has no array index"),
                }
            }

            if !cursor.advance(page.next_token)? {
                break;
            }
        }

        if !indices.is_empty() {
            tracing::debug!(failed = indices.len(), "found failed children");
        }
        Ok(indices)
    }
}

/// Array index of a child summary, falling back to the `{parent}:{index}` id form.
fn child_index(summary: &JobSummary) -> Option<u32> {
    summary.array_index.or_else(|| {
        let (_, index) = summary.job_id.as_str().rsplit_once(':')?;
        index.parse().ok()
    })
}
