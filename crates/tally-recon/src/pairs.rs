//! Paired-read input counting.
//!
//! Paired-end inputs are stored as `{stem}.1.fastq.gz` and `{stem}.2.fastq.gz`.
//! A sample is usable only once both mates are present, which is what sizes
//! the array job that processes them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tally_core::error::Result;
use tally_core::retry::{RetryPolicy, retry_throttled};
use tally_core::storage::ObjectStore;

use crate::paging::Cursor;

const FIRST_MATE: &str = ".1.fastq.gz";
const SECOND_MATE: &str = ".2.fastq.gz";

/// Finds complete read pairs under a prefix.
#[derive(Clone)]
pub struct PairCounter {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PairCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairCounter").finish_non_exhaustive()
    }
}

impl PairCounter {
    /// Creates a counter.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Returns the key stems under `prefix` that have both mates.
    ///
    /// # Errors
    ///
    /// Returns the first collaborator error.
    #[tracing::instrument(skip(self))]
    pub async fn complete_pairs(&self, bucket: &str, prefix: &str) -> Result<BTreeSet<String>> {
        let mut mates: BTreeMap<String, (bool, bool)> = BTreeMap::new();
        let mut cursor = Cursor::new("pairs");

        loop {
            let page = retry_throttled(&self.retry, "list_objects", || {
                self.store.list_page(bucket, prefix, cursor.token())
            })
            .await?;

            for key in page.keys {
                if let Some(stem) = key.strip_suffix(FIRST_MATE) {
                    mates.entry(stem.to_string()).or_default().0 = true;
                } else if let Some(stem) = key.strip_suffix(SECOND_MATE) {
                    mates.entry(stem.to_string()).or_default().1 = true;
                }
            }

            if !cursor.advance(page.next_token)? {
                break;
            }
        }

        Ok(mates
            .into_iter()
            .filter_map(|(stem, (first, second))| (first && second).then_some(stem))
            .collect())
    }
}
