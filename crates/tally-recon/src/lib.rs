//! # tally-recon
//!
//! Progress reconciliation for array batch jobs.
//!
//! Given an array job's manifest, its results prefix and the job queue, this
//! crate answers which work items are completed, which are still in flight and
//! which remain. Each answer is recomputed from three read-only sources:
//!
//! - **Object store**: manifests and per-stage result keys
//! - **Job queue**: active jobs, their manifests and failed children
//! - **Log service**: per-child logs searched for a progress marker
//!
//! ## Components
//!
//! | Component | Module | Source |
//! |-----------|--------|--------|
//! | [`ManifestStore`] | [`manifest`] | object store |
//! | [`ResultScanner`] | [`results`] | object store |
//! | [`JobStateScanner`], [`JobResolver`] | [`jobs`] | job queue |
//! | [`FailedIndexTracker`] | [`failures`] | job queue |
//! | [`LogInspector`] | [`logs`] | job queue, log service |
//! | [`Reconciler`] | [`engine`] | all of the above |
//!
//! ## Guarantees
//!
//! - **Exhaustive**: every paginated source is drained before an aggregate is
//!   computed; a failed page fails the query rather than yielding a partial set
//! - **Bounded**: throttled calls back off with a capped attempt budget and log
//!   calls carry a deadline
//! - **Order-independent**: concurrent log inspections are keyed by index
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tally_core::{MemoryJobQueue, MemoryObjectStore, ReconcileConfig};
//! use tally_recon::{CompletionTarget, Reconciler};
//!
//! # async fn run() -> tally_core::Result<()> {
//! let store = MemoryObjectStore::new();
//! store.put("lists", "run.txt", "SRR1\nSRR2\n")?;
//! store.put("results", "out/SRR1/hg38/SRR1.bam", "...")?;
//!
//! let engine = Reconciler::new(
//!     Arc::new(store),
//!     Arc::new(MemoryJobQueue::new()),
//!     ReconcileConfig::default(),
//! )?;
//! let target = CompletionTarget::new("results", "out", 1)?;
//! let remaining = engine.remaining("s3://lists/run.txt", &target).await?;
//! assert_eq!(remaining.len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod engine;
pub mod failures;
pub mod gaps;
pub mod jobs;
pub mod logs;
pub mod manifest;
pub mod pairs;
pub mod results;

mod paging;

pub use engine::{CompletionTarget, InProgressReport, Reconciler, SkippedManifest};
pub use failures::FailedIndexTracker;
pub use gaps::{missing_indices, parse_indices};
pub use jobs::{ActiveJob, ArrayJob, JobResolver, JobStateScanner, stages_from_job_name};
pub use logs::{LogInspector, LogInspectorOptions};
pub use manifest::{Manifest, ManifestFormat, ManifestStore};
pub use pairs::PairCounter;
pub use results::{CompletionRecord, ResultScanner};
