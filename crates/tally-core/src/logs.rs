//! Log service abstraction (CloudWatch Logs, memory).
//!
//! Log streams are read newest-first: the first call without a token returns the
//! most recent page and `next_backward_token` walks towards the start of the
//! stream. A page with no events means the stream is exhausted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// One page of log events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPage {
    /// Event messages on this page.
    pub messages: Vec<String>,
    /// Token for the next (older) page.
    pub next_backward_token: Option<String>,
}

/// Log service trait.
///
/// Rate-limit responses must be reported as `Error::Throttled` so callers can
/// retry them; every other failure is final.
#[async_trait]
pub trait LogService: Send + Sync + 'static {
    /// Fetches one page of events from `stream` in `group`.
    async fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        backward_token: Option<&str>,
    ) -> Result<LogPage>;
}

#[async_trait]
impl<T: LogService + ?Sized> LogService for Arc<T> {
    async fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        backward_token: Option<&str>,
    ) -> Result<LogPage> {
        (**self).get_log_events(group, stream, backward_token).await
    }
}

/// In-memory log service for testing.
///
/// Each stream holds its pages in the order they are returned (newest first).
/// Reading past the last page yields an empty page, as the real service does.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogService {
    streams: Arc<RwLock<HashMap<(String, String), Vec<Vec<String>>>>>,
}

impl MemoryLogService {
    /// Creates an empty log service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the pages of a stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn set_pages<P, M>(&self, group: &str, stream: &str, pages: P) -> Result<()>
    where
        P: IntoIterator,
        P::Item: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let pages = pages
            .into_iter()
            .map(|page| page.into_iter().map(Into::into).collect())
            .collect();
        self.streams
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .insert((group.to_string(), stream.to_string()), pages);
        Ok(())
    }
}

fn page_token(index: usize) -> String {
    format!("b/{index}")
}

fn parse_page_token(token: &str) -> Result<usize> {
    token
        .strip_prefix("b/")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| Error::InvalidInput(format!("invalid backward token: {token}")))
}

#[async_trait]
impl LogService for MemoryLogService {
    async fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        backward_token: Option<&str>,
    ) -> Result<LogPage> {
        let index = backward_token.map(parse_page_token).transpose()?.unwrap_or(0);
        let streams = self.streams.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        let pages = streams
            .get(&(group.to_string(), stream.to_string()))
            .ok_or_else(|| Error::NotFound(format!("log stream {group}/{stream}")))?;

        let messages = pages.get(index).cloned().unwrap_or_default();
        Ok(LogPage {
            messages,
            next_backward_token: Some(page_token((index + 1).min(pages.len()))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn walks_pages_then_returns_empty() {
        let logs = MemoryLogService::new();
        logs.set_pages("g", "s", [vec!["newest"], vec!["older", "oldest"]])
            .unwrap();

        let first = logs.get_log_events("g", "s", None).await.unwrap();
        assert_eq!(first.messages, vec!["newest"]);

        let token = first.next_backward_token.unwrap();
        let second = logs.get_log_events("g", "s", Some(&token)).await.unwrap();
        assert_eq!(second.messages, vec!["older", "oldest"]);

        let token = second.next_backward_token.unwrap();
        let third = logs.get_log_events("g", "s", Some(&token)).await.unwrap();
        assert!(third.messages.is_empty());
    }

    #[tokio::test]
    async fn unknown_stream_is_not_found() {
        let logs = MemoryLogService::new();
        let err = logs.get_log_events("g", "missing", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let logs = MemoryLogService::new();
        logs.set_pages("g", "s", [vec!["x"]]).unwrap();
        let err = logs.get_log_events("g", "s", Some("zzz")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
