//! Manifest store: ordered work-item lists read from the object store.
//!
//! A manifest is a newline-delimited object, one work-item identifier per
//! line, assigned one-to-one to array indices by position. Manifests are
//! immutable for the lifetime of their array job, so a fetch is all-or-nothing:
//! there are no partial manifests.

use std::collections::BTreeSet;
use std::sync::Arc;

use tally_core::error::{Error, Result};
use tally_core::id::WorkItemId;
use tally_core::retry::{RetryPolicy, retry_throttled};
use tally_core::storage::{ObjectStore, ObjectUrl};

/// Layout of a manifest object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ManifestFormat {
    /// Every non-empty line is an identifier.
    #[default]
    Plain,
    /// The first line is a header row and is skipped.
    WithHeader,
}

/// An ordered list of work items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    url: String,
    items: Vec<WorkItemId>,
}

impl Manifest {
    /// Parses manifest text.
    ///
    /// Lines are trimmed and empty lines dropped. Position in the returned
    /// manifest is the array index of the item.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the body is not UTF-8 or a line is not a
    /// valid identifier, and `Error::EmptyManifest` if no identifiers remain.
    pub fn parse(url: impl Into<String>, body: &[u8], format: ManifestFormat) -> Result<Self> {
        let url = url.into();
        let text = std::str::from_utf8(body)
            .map_err(|e| Error::InvalidInput(format!("manifest {url} is not UTF-8: {e}")))?;

        let skip = usize::from(format == ManifestFormat::WithHeader);
        let items = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .skip(skip)
            .map(WorkItemId::new)
            .collect::<Result<Vec<_>>>()?;

        if items.is_empty() {
            return Err(Error::EmptyManifest { url });
        }
        Ok(Self { url, items })
    }

    /// Returns the URL the manifest was read from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the items in index order.
    #[must_use]
    pub fn items(&self) -> &[WorkItemId] {
        &self.items
    }

    /// Returns the item assigned to `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&WorkItemId> {
        self.items.get(usize::try_from(index).ok()?)
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the manifest has no items. Parsed manifests never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the distinct identifiers.
    #[must_use]
    pub fn identifiers(&self) -> BTreeSet<WorkItemId> {
        self.items.iter().cloned().collect()
    }

    /// Returns the identifiers at `indices`. Out-of-range indices are ignored.
    #[must_use]
    pub fn at_indices(&self, indices: &BTreeSet<u32>) -> BTreeSet<WorkItemId> {
        indices
            .iter()
            .filter_map(|&index| self.get(index).cloned())
            .collect()
    }

    /// Returns the identifiers whose position is not in `excluded`.
    #[must_use]
    pub fn without_indices(&self, excluded: &BTreeSet<u32>) -> BTreeSet<WorkItemId> {
        self.items
            .iter()
            .enumerate()
            .filter(|(position, _)| {
                u32::try_from(*position).map_or(true, |index| !excluded.contains(&index))
            })
            .map(|(_, item)| item.clone())
            .collect()
    }
}

/// Reads manifests from the object store.
#[derive(Clone)]
pub struct ManifestStore {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestStore")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ManifestStore {
    /// Creates a manifest store over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Fetches a plain manifest.
    ///
    /// # Errors
    ///
    /// See [`ManifestStore::fetch_with`].
    pub async fn fetch(&self, url: &str) -> Result<Manifest> {
        self.fetch_with(url, ManifestFormat::Plain).await
    }

    /// Fetches and parses the manifest at `url` (`s3://bucket/key`).
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the object does not exist, `Error::InvalidInput`
    /// for a malformed URL or body, and `Error::EmptyManifest` if it has no items.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_with(&self, url: &str, format: ManifestFormat) -> Result<Manifest> {
        let location = ObjectUrl::parse(url)?;
        let body = retry_throttled(&self.retry, "get_object", || {
            self.store.get(&location.bucket, &location.key)
        })
        .await?;

        let manifest = Manifest::parse(url, &body, format)?;
        tracing::debug!(items = manifest.len(), "fetched manifest");
        Ok(manifest)
    }
}
