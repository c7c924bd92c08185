//! Shared test utilities for tally integration tests.
//!
//! This crate provides:
//! - [`TracingObjectStore`], [`TracingJobQueue`], [`TracingLogService`]:
//!   collaborator fakes with operation recording and fault injection
//! - [`TestContext`]: Pre-configured collaborators and seeding helpers
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_test_utils::{TestContext, assert_items};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestContext::new();
//!     let url = ctx.put_manifest("run.txt", &["SRR1", "SRR2"]);
//!     // ... run test ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod collaborators;
pub mod fixtures;

pub use assertions::*;
pub use collaborators::*;
pub use fixtures::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tally_recon=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
