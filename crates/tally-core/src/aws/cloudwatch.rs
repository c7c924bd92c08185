//! CloudWatch Logs-backed [`LogService`].

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudwatchlogs::Client;

use super::map_sdk_error;
use crate::error::Result;
use crate::logs::{LogPage, LogService};

const SERVICE: &str = "logs";

/// Log service over CloudWatch Logs.
#[derive(Debug, Clone)]
pub struct CloudWatchLogService {
    client: Client,
}

impl CloudWatchLogService {
    /// Creates a log client from shared SDK configuration.
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
impl LogService for CloudWatchLogService {
    async fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        backward_token: Option<&str>,
    ) -> Result<LogPage> {
        let output = self
            .client
            .get_log_events()
            .log_group_name(group)
            .log_stream_name(stream)
            .start_from_head(false)
            .set_next_token(backward_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_error(SERVICE, "get_log_events", &e))?;

        Ok(LogPage {
            messages: output
                .events()
                .iter()
                .filter_map(|event| event.message().map(str::to_string))
                .collect(),
            next_backward_token: output.next_backward_token().map(str::to_string),
        })
    }
}
