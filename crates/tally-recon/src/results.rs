//! Result scanner: per-item stage observations from the results prefix.
//!
//! Results are laid out as `{prefix}/{item}/{stage}/...`. The scanner drains the
//! whole listing and groups the stage names seen for each item. It does not
//! decide what "completed" means; see [`CompletionRecord::completed`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use tally_core::error::{Error, Result};
use tally_core::id::WorkItemId;
use tally_core::retry::{RetryPolicy, retry_throttled};
use tally_core::storage::ObjectStore;

use crate::paging::Cursor;

/// Stage names observed per work item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CompletionRecord {
    stages: BTreeMap<WorkItemId, BTreeSet<String>>,
}

impl CompletionRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `stage` has output for `item`. Repeats are ignored.
    pub fn observe(&mut self, item: WorkItemId, stage: impl Into<String>) {
        self.stages.entry(item).or_default().insert(stage.into());
    }

    /// Returns the stages observed for `item`.
    #[must_use]
    pub fn stages(&self, item: &WorkItemId) -> Option<&BTreeSet<String>> {
        self.stages.get(item)
    }

    /// Iterates over items and their stages in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&WorkItemId, &BTreeSet<String>)> {
        self.stages.iter()
    }

    /// Number of items with at least one stage.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if nothing was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the items with at least `expected_stages` distinct stages.
    ///
    /// Items with more stages than expected still count as completed.
    #[must_use]
    pub fn completed(&self, expected_stages: usize) -> BTreeSet<WorkItemId> {
        self.stages
            .iter()
            .filter(|(_, stages)| stages.len() >= expected_stages)
            .map(|(item, _)| item.clone())
            .collect()
    }
}

/// Splits a result key into its item and stage.
///
/// `root` is the prefix with a trailing `/`. Returns `None` for keys outside the
/// `{item}/{stage}/...` layout, such as markers written directly under the prefix.
pub fn parse_result_key<'k>(root: &str, key: &'k str) -> Option<(&'k str, &'k str)> {
    let mut segments = key.strip_prefix(root)?.split('/');
    let item = segments.next().filter(|s| !s.is_empty())?;
    let stage = segments.next().filter(|s| !s.is_empty())?;
    Some((item, stage))
}

/// Scans a results prefix.
#[derive(Clone)]
pub struct ResultScanner {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ResultScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultScanner")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ResultScanner {
    /// Creates a scanner over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Lists every key below `prefix` in `bucket` and groups stage names by item.
    ///
    /// The listing is drained to the end before the record is returned. A page
    /// that fails (after throttling retries) fails the whole scan; no partial
    /// record is ever produced.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an empty prefix, or the first
    /// collaborator error.
    #[tracing::instrument(skip(self))]
    pub async fn scan(&self, bucket: &str, prefix: &str) -> Result<CompletionRecord> {
        let root = format!("{}/", prefix.trim_end_matches('/'));
        if root == "/" {
            return Err(Error::InvalidInput("results prefix cannot be empty".into()));
        }

        let mut record = CompletionRecord::new();
        let mut cursor = Cursor::new("results");
        let mut skipped = 0usize;

        loop {
            let page = retry_throttled(&self.retry, "list_objects", || {
                self.store.list_page(bucket, &root, cursor.token())
            })
            .await?;

            for key in &page.keys {
                let parsed = parse_result_key(&root, key)
                    .and_then(|(item, stage)| Some((WorkItemId::new(item).ok()?, stage)));
                match parsed {
                    Some((item, stage)) => record.observe(item, stage),
                    None => skipped += 1,
                }
            }

            if !cursor.advance(page.next_token)? {
                break;
            }
        }

        tracing::debug!(
            pages = cursor.pages(),
            items = record.len(),
            skipped,
            "scanned results prefix"
        );
        Ok(record)
    }
}
