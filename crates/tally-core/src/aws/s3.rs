//! S3-backed [`ObjectStore`].

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use bytes::Bytes;

use super::map_sdk_error;
use crate::error::{Error, Result};
use crate::storage::{ListPage, ObjectStore};

const SERVICE: &str = "object-store";

/// Object store over S3.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Creates a store from shared SDK configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_error(SERVICE, "list_objects_v2", &e))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        Ok(ListPage { keys, next_token })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(SdkError::ServiceError(service)) if service.err().is_no_such_key() => {
                return Err(Error::NotFound(format!("object not found: s3://{bucket}/{key}")));
            }
            Err(err) => return Err(map_sdk_error(SERVICE, "get_object", &err)),
        };

        let body = output.body.collect().await.map_err(|e| {
            Error::collaborator_with_source(SERVICE, format!("read s3://{bucket}/{key}"), e)
        })?;
        Ok(body.into_bytes())
    }
}
