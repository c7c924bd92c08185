//! Log inspector: marker search over array-job child logs.
//!
//! Each child's stream is read newest-first until the marker shows up or the
//! stream runs out. Searching a whole array job runs one inspection per index
//! through a bounded pool; the first unrecoverable error aborts the search and
//! is reported as [`Error::IndexFailed`] naming the index.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};

use tally_core::error::{Error, Result};
use tally_core::id::JobId;
use tally_core::jobs::JobQueue;
use tally_core::logs::{LogPage, LogService};
use tally_core::retry::{RetryPolicy, retry_throttled};

use crate::jobs::{JobResolver, describe_all};
use crate::paging::Cursor;

/// Settings for log inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogInspectorOptions {
    /// Log group holding child streams.
    pub log_group: String,
    /// Maximum concurrent inspections.
    pub pool_size: usize,
    /// Deadline for a single log service call.
    pub call_timeout: Duration,
    /// Backoff for throttled calls.
    pub retry: RetryPolicy,
}

/// Searches array-job child logs for a marker.
#[derive(Clone)]
pub struct LogInspector {
    queue: Arc<dyn JobQueue>,
    logs: Arc<dyn LogService>,
    resolver: JobResolver,
    options: LogInspectorOptions,
}

impl std::fmt::Debug for LogInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogInspector")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl LogInspector {
    /// Creates an inspector.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the pool size is zero.
    pub fn new(
        queue: Arc<dyn JobQueue>,
        logs: Arc<dyn LogService>,
        resolver: JobResolver,
        options: LogInspectorOptions,
    ) -> Result<Self> {
        if options.pool_size == 0 {
            return Err(Error::InvalidInput("log pool size must be at least 1".into()));
        }
        Ok(Self {
            queue,
            logs,
            resolver,
            options,
        })
    }

    /// Returns the inspector settings.
    #[must_use]
    pub fn options(&self) -> &LogInspectorOptions {
        &self.options
    }

    /// Returns true if the log of child `index` of `parent` contains `marker`.
    ///
    /// A child without a container or log stream has not started yet; that is
    /// answered with `false` and the log service is not contacted.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the child is unknown, `Error::RetriesExhausted`
    /// when throttling outlasts the retry budget, `Error::Timeout` when a single
    /// call exceeds the deadline, or any other collaborator error.
    pub async fn contains_marker(&self, parent: &JobId, index: u32, marker: &str) -> Result<bool> {
        let child = parent.child(index);
        let detail = describe_all(
            self.queue.as_ref(),
            &self.options.retry,
            std::slice::from_ref(&child),
        )
        .await?
        .into_iter()
        .find(|detail| detail.job_id == child)
        .ok_or_else(|| Error::NotFound(format!("job {child}")))?;

        let Some(stream) = detail.log_stream() else {
            tracing::trace!(job_id = %child, "no log stream yet");
            return Ok(false);
        };

        let mut cursor = Cursor::new("logs");
        loop {
            let page = self.read_page(stream, cursor.token()).await?;
            if page.messages.is_empty() {
                return Ok(false);
            }
            if page.messages.iter().any(|message| message.contains(marker)) {
                return Ok(true);
            }
            if !cursor.advance(page.next_backward_token)? {
                return Ok(false);
            }
        }
    }

    async fn read_page(&self, stream: &str, token: Option<&str>) -> Result<LogPage> {
        let group = self.options.log_group.as_str();
        retry_throttled(&self.options.retry, "get_log_events", || {
            with_deadline(
                "get_log_events",
                self.options.call_timeout,
                self.logs.get_log_events(group, stream, token),
            )
        })
        .await
    }

    /// Inspects every index in `indices` and returns the answer for each.
    ///
    /// At most `pool_size` inspections run at once. Results are keyed by index,
    /// so completion order does not matter.
    ///
    /// # Errors
    ///
    /// Aborts on the first failing index with `Error::IndexFailed`; inspections
    /// still in flight are dropped.
    #[tracing::instrument(skip(self, parent, indices), fields(parent = %parent))]
    pub async fn inspect_indices(
        &self,
        parent: &JobId,
        indices: impl IntoIterator<Item = u32>,
        marker: &str,
    ) -> Result<BTreeMap<u32, bool>> {
        stream::iter(indices)
            .map(|index| async move {
                self.contains_marker(parent, index, marker)
                    .await
                    .map(|found| (index, found))
                    .map_err(|source| Error::IndexFailed {
                        index,
                        source: Box::new(source),
                    })
            })
            .buffer_unordered(self.options.pool_size)
            .try_collect()
            .await
    }

    /// Returns the sorted indices in `indices` whose log contains `marker`.
    ///
    /// # Errors
    ///
    /// See [`LogInspector::inspect_indices`].
    pub async fn search_indices(
        &self,
        parent: &JobId,
        indices: impl IntoIterator<Item = u32>,
        marker: &str,
    ) -> Result<Vec<u32>> {
        let results = self.inspect_indices(parent, indices, marker).await?;
        Ok(results
            .into_iter()
            .filter_map(|(index, found)| found.then_some(index))
            .collect())
    }

    /// Resolves `parent`'s array size and searches all of its children.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` or `Error::MalformedJob` if `parent` is not a
    /// known array job, otherwise see [`LogInspector::inspect_indices`].
    pub async fn search_job(&self, parent: &JobId, marker: &str) -> Result<Vec<u32>> {
        let job = self.resolver.array_job(parent).await?;
        let found = self.search_indices(parent, 0..job.size, marker).await?;
        tracing::info!(
            parent = %parent,
            size = job.size,
            found = found.len(),
            "searched child logs"
        );
        Ok(found)
    }
}

async fn with_deadline<T>(
    operation: &str,
    after: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            after,
        }),
    }
}
