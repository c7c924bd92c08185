//! # tally-core
//!
//! Core primitives for reconciling the progress of array batch jobs.
//!
//! An array job fans a manifest of work items out across many child jobs, each
//! of which writes per-stage results to an object store. This crate provides
//! the pieces every reconciliation query is built from:
//!
//! - **Identifiers**: Validated work-item and job identifiers
//! - **Collaborator Traits**: [`ObjectStore`], [`JobQueue`] and [`LogService`]
//!   with in-memory implementations for tests and local use
//! - **Retry**: Capped exponential backoff for throttled calls
//! - **Configuration**: [`ReconcileConfig`] with `TALLY_*` environment overrides
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization, spans and metrics
//!
//! The `aws` feature adds S3, AWS Batch and CloudWatch Logs implementations
//! of the collaborator traits.
//!
//! ## Example
//!
//! ```rust
//! use tally_core::prelude::*;
//!
//! let item = WorkItemId::new("SRR000001").unwrap();
//! let job = JobId::new("4f1c2d").unwrap();
//! assert_eq!(job.child(7).as_str(), "4f1c2d:7");
//! assert_eq!(item.as_str(), "SRR000001");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

#[cfg(feature = "aws")]
pub mod aws;
pub mod config;
pub mod error;
pub mod id;
pub mod jobs;
pub mod logs;
pub mod metrics;
pub mod observability;
pub mod retry;
pub mod storage;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use tally_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::ReconcileConfig;
    pub use crate::error::{Error, Result};
    pub use crate::id::{JobId, WorkItemId};
    pub use crate::jobs::{
        JobDetail, JobFilter, JobPage, JobQueue, JobStatus, JobSummary, ListJobsRequest,
        MemoryJobQueue,
    };
    pub use crate::logs::{LogPage, LogService, MemoryLogService};
    pub use crate::retry::RetryPolicy;
    pub use crate::storage::{ListPage, MemoryObjectStore, ObjectStore, ObjectUrl};
}

// Re-export key types at crate root for ergonomics
pub use config::ReconcileConfig;
pub use error::{Error, Result};
pub use id::{JobId, WorkItemId};
pub use jobs::{
    ContainerDetail, DESCRIBE_BATCH_LIMIT, JobDetail, JobFilter, JobPage, JobQueue, JobStatus,
    JobSummary, ListJobsRequest, MemoryJobQueue,
};
pub use logs::{LogPage, LogService, MemoryLogService};
pub use observability::{LogFormat, init_logging};
pub use retry::{RetryPolicy, retry_throttled};
pub use storage::{ListPage, MemoryObjectStore, ObjectStore, ObjectUrl};
