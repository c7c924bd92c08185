//! Error types and result aliases for tally.
//!
//! Every reconciliation query either succeeds over fully drained sources or fails
//! with one of these errors. Only [`Error::Throttled`] is retryable; everything
//! else propagates to the caller untouched.

use std::time::Duration;

/// The result type used throughout tally.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reconciling array-job progress.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The referenced job, manifest or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A collaborator rejected the call with a rate-limit response.
    #[error("{service} throttled the request: {message}")]
    Throttled {
        /// The collaborator that throttled (e.g. `logs`).
        service: &'static str,
        /// Message reported by the collaborator.
        message: String,
    },

    /// A throttled call kept being throttled until the retry budget ran out.
    #[error("{operation} still throttled after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// The operation that was retried.
        operation: String,
        /// Number of attempts made, including the first.
        attempts: u32,
        /// Message of the final throttling error.
        last_error: String,
    },

    /// A single collaborator call exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A job exists but lacks the properties a query needs (e.g. it is not an array job).
    #[error("job {job_id} is malformed: {reason}")]
    MalformedJob {
        /// The offending job.
        job_id: String,
        /// What is missing or wrong.
        reason: String,
    },

    /// A manifest was fetched but contained no usable identifiers.
    #[error("manifest {url} contains no work items")]
    EmptyManifest {
        /// Location of the manifest.
        url: String,
    },

    /// A collaborator call failed for a reason other than throttling.
    #[error("{service} error: {message}")]
    Collaborator {
        /// The collaborator that failed (`object-store`, `job-queue`, `logs`).
        service: &'static str,
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Inspecting one array index failed; the whole pooled search is aborted.
    #[error("index {index} failed: {source}")]
    IndexFailed {
        /// The array index whose inspection failed.
        index: u32,
        /// Why it failed.
        #[source]
        source: Box<Error>,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a collaborator error with the given message.
    #[must_use]
    pub fn collaborator(service: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a collaborator error with a source cause.
    #[must_use]
    pub fn collaborator_with_source(
        service: &'static str,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Collaborator {
            service,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a throttling error.
    #[must_use]
    pub fn throttled(service: &'static str, message: impl Into<String>) -> Self {
        Self::Throttled {
            service,
            message: message.into(),
        }
    }

    /// Creates a malformed-job error.
    #[must_use]
    pub fn malformed_job(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedJob {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the failed call may succeed when re-issued unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Returns true for the not-found class.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn only_throttling_is_retryable() {
        assert!(Error::throttled("logs", "Rate exceeded").is_retryable());
        assert!(!Error::NotFound("job".into()).is_retryable());
        assert!(!Error::collaborator("logs", "AccessDenied").is_retryable());
        assert!(
            !Error::RetriesExhausted {
                operation: "get_log_events".into(),
                attempts: 3,
                last_error: "Rate exceeded".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn index_failure_keeps_cause() {
        let err = Error::IndexFailed {
            index: 7,
            source: Box::new(Error::NotFound("job abc:7".into())),
        };
        assert!(err.to_string().contains("index 7"));
        let source = err.source().expect("has source");
        assert!(source.to_string().contains("abc:7"));
    }

    #[test]
    fn malformed_job_display() {
        let err = Error::malformed_job("abc", "not an array job");
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("not an array job"));
    }
}
