//! AWS implementations of the collaborator traits.
//!
//! This module is only compiled when the `aws` feature is enabled:
//!
//! ```toml
//! [dependencies]
//! tally-core = { version = "0.1", features = ["aws"] }
//! ```
//!
//! | Trait | Implementation | Service |
//! |-------|----------------|---------|
//! | [`ObjectStore`](crate::ObjectStore) | [`S3ObjectStore`] | S3 |
//! | [`JobQueue`](crate::JobQueue) | [`BatchJobQueue`] | AWS Batch |
//! | [`LogService`](crate::LogService) | [`CloudWatchLogService`] | CloudWatch Logs |
//!
//! SDK errors are mapped onto the tally taxonomy by error code: rate-limit codes
//! become [`Error::Throttled`], missing-resource codes become [`Error::NotFound`]
//! and everything else is [`Error::Collaborator`].

mod batch;
mod cloudwatch;
mod s3;

pub use batch::BatchJobQueue;
pub use cloudwatch::CloudWatchLogService;
pub use s3::S3ObjectStore;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use crate::error::Error;

/// Error codes AWS services use for rate limiting.
const THROTTLING_CODES: &[&str] = &[
    "ThrottlingException",
    "Throttling",
    "ProvisionedThroughputExceededException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "SlowDown",
];

/// Error codes that mean the addressed resource does not exist.
const NOT_FOUND_CODES: &[&str] = &["ResourceNotFoundException", "NoSuchKey", "NoSuchBucket"];

/// Loads shared SDK configuration from the environment.
///
/// Credentials and region follow the standard provider chain; `region`
/// overrides the discovered region when given.
pub async fn load_sdk_config(region: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    loader.load().await
}

/// Maps an SDK error onto the tally error taxonomy.
pub(crate) fn map_sdk_error<E, R>(
    service: &'static str,
    operation: &str,
    err: &SdkError<E, R>,
) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{operation}: {}", DisplayErrorContext(err));
    classify(service, err.code(), message)
}

fn classify(service: &'static str, code: Option<&str>, message: String) -> Error {
    match code {
        Some(code) if THROTTLING_CODES.contains(&code) => Error::throttled(service, message),
        Some(code) if NOT_FOUND_CODES.contains(&code) => Error::NotFound(message),
        _ => Error::collaborator(service, message),
    }
}

/// Some SDK releases model required members as `Option`, others as plain
/// references. This lets the mapping code read both shapes the same way.
pub(crate) trait Present<'a, T: ?Sized> {
    fn present(self) -> Option<&'a T>;
}

impl<'a, T: ?Sized> Present<'a, T> for &'a T {
    fn present(self) -> Option<&'a T> {
        Some(self)
    }
}

impl<'a, T: ?Sized> Present<'a, T> for Option<&'a T> {
    fn present(self) -> Option<&'a T> {
        self
    }
}
