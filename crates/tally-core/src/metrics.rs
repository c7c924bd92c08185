//! Metrics for reconciliation queries.
//!
//! Recorded through the `metrics` crate facade; nothing is exported unless the
//! embedding process installs a recorder.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `tally_pages_fetched_total` | Counter | `source` | Paginated pages drained per collaborator |
//! | `tally_throttle_retries_total` | Counter | `operation` | Throttled calls that were re-issued |
//! | `tally_manifest_fetch_failures_total` | Counter | - | Manifests skipped during in-progress scans |
//! | `tally_query_duration_seconds` | Histogram | `query` | Wall time of a reconciliation query |

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: pages fetched from a paginated source.
    pub const PAGES_FETCHED_TOTAL: &str = "tally_pages_fetched_total";
    /// Counter: throttled calls re-issued after backoff.
    pub const THROTTLE_RETRIES_TOTAL: &str = "tally_throttle_retries_total";
    /// Counter: manifests that could not be fetched for an active job.
    pub const MANIFEST_FETCH_FAILURES_TOTAL: &str = "tally_manifest_fetch_failures_total";
    /// Histogram: query duration in seconds.
    pub const QUERY_DURATION_SECONDS: &str = "tally_query_duration_seconds";
}

/// Label keys used across metrics.
pub mod labels {
    /// Paginated source (`results`, `jobs`, `failed_children`, `logs`).
    pub const SOURCE: &str = "source";
    /// Retried operation name.
    pub const OPERATION: &str = "operation";
    /// Reconciliation query (`completed`, `in_progress`, `remaining`, `search_logs`).
    pub const QUERY: &str = "query";
}

/// Records that one page was drained from `source`.
pub fn record_page(source: &'static str) {
    counter!(names::PAGES_FETCHED_TOTAL, labels::SOURCE => source).increment(1);
}

/// Records one throttled retry of `operation`.
pub fn record_throttle_retry(operation: &str) {
    counter!(
        names::THROTTLE_RETRIES_TOTAL,
        labels::OPERATION => operation.to_string(),
    )
    .increment(1);
}

/// Records a manifest skipped because it could not be fetched.
pub fn record_manifest_failure() {
    counter!(names::MANIFEST_FETCH_FAILURES_TOTAL).increment(1);
}

/// RAII guard that records a query's duration when dropped.
#[derive(Debug)]
pub struct QueryTimer {
    query: &'static str,
    start: Instant,
}

impl QueryTimer {
    /// Starts timing `query`.
    #[must_use]
    pub fn start(query: &'static str) -> Self {
        Self {
            query,
            start: Instant::now(),
        }
    }

    /// Returns the elapsed time since the timer started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        histogram!(names::QUERY_DURATION_SECONDS, labels::QUERY => self.query)
            .record(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_noop() {
        record_page("results");
        record_throttle_retry("get_log_events");
        record_manifest_failure();
    }

    #[test]
    fn query_timer_tracks_elapsed() {
        let timer = QueryTimer::start("completed");
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.elapsed() >= Duration::from_millis(5));
    }
}
