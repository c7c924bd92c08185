//! Object store abstraction (S3, memory).
//!
//! Reconciliation only ever reads from the object store: it lists result keys
//! page by page and downloads manifests. The contract is therefore two calls:
//!
//! - [`ObjectStore::list_page`]: one page of keys plus an opaque continuation token
//! - [`ObjectStore::get`]: whole-object read, `Error::NotFound` when absent
//!
//! Pagination is surfaced to callers on purpose: scanners must drain every page
//! before computing an aggregate, and they count pages for observability.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Full object keys on this page.
    pub keys: Vec<String>,
    /// Token for the next page, `None` when the listing is exhausted.
    pub next_token: Option<String>,
}

/// Object storage trait.
///
/// All backends (S3, memory) implement this trait. Every call is a read.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Lists one page of keys under `prefix`.
    ///
    /// Pass the previous page's `next_token` to continue. Keys are returned in
    /// backend order; callers must not rely on it.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage>;

    /// Reads an entire object.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage> {
        (**self).list_page(bucket, prefix, continuation).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        (**self).get(bucket, key).await
    }
}

/// A parsed `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl {
    /// Bucket name.
    pub bucket: String,
    /// Object key (no leading slash).
    pub key: String,
}

impl ObjectUrl {
    /// Parses an `s3://bucket/key` URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for other schemes or a missing bucket/key.
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .trim()
            .strip_prefix("s3://")
            .ok_or_else(|| Error::InvalidInput(format!("not an s3:// url: {url}")))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        let key = key.trim_start_matches('/');
        if bucket.is_empty() {
            return Err(Error::InvalidInput(format!("url has no bucket: {url}")));
        }
        if key.is_empty() {
            return Err(Error::InvalidInput(format!("url has no key: {url}")));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Default number of keys per page for [`MemoryObjectStore`].
pub const DEFAULT_MEMORY_PAGE_SIZE: usize = 1000;

/// In-memory object store for testing.
///
/// Thread-safe via `RwLock`. Keys are kept sorted so the continuation token can
/// simply be the last key of the previous page.
#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    buckets: Arc<RwLock<HashMap<String, BTreeMap<String, Bytes>>>>,
    page_size: usize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_MEMORY_PAGE_SIZE)
    }
}

impl MemoryObjectStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that returns at most `page_size` keys per listing page.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            buckets: Arc::default(),
            page_size: page_size.max(1),
        }
    }

    /// Stores an object, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Bytes>) -> Result<()> {
        self.buckets
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage> {
        let buckets = self.buckets.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        let Some(objects) = buckets.get(bucket) else {
            return Ok(ListPage::default());
        };

        let mut matching = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| continuation.is_none_or(|after| k.as_str() > after));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let next_token = if matching.next().is_some() {
            keys.last().cloned()
        } else {
            None
        };
        Ok(ListPage { keys, next_token })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let buckets = self.buckets.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object not found: s3://{bucket}/{key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_s3_url() {
        let url = ObjectUrl::parse("s3://results-bucket/manifests/2019-10.txt").unwrap();
        assert_eq!(url.bucket, "results-bucket");
        assert_eq!(url.key, "manifests/2019-10.txt");
        assert_eq!(url.to_string(), "s3://results-bucket/manifests/2019-10.txt");
    }

    #[test]
    fn parse_rejects_other_schemes_and_missing_parts() {
        assert!(ObjectUrl::parse("https://bucket/key").is_err());
        assert!(ObjectUrl::parse("s3://bucket").is_err());
        assert!(ObjectUrl::parse("s3://bucket/").is_err());
        assert!(ObjectUrl::parse("s3:///key").is_err());
    }

    #[tokio::test]
    async fn memory_store_paginates_in_key_order() {
        let store = MemoryObjectStore::with_page_size(2);
        for key in ["p/a/x", "p/b/x", "p/c/x", "q/d/x"] {
            store.put("bkt", key, "data").unwrap();
        }

        let first = store.list_page("bkt", "p/", None).await.unwrap();
        assert_eq!(first.keys, vec!["p/a/x", "p/b/x"]);
        let token = first.next_token.expect("more pages");

        let second = store.list_page("bkt", "p/", Some(&token)).await.unwrap();
        assert_eq!(second.keys, vec!["p/c/x"]);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn memory_store_exact_page_boundary_has_no_token() {
        let store = MemoryObjectStore::with_page_size(2);
        store.put("bkt", "p/a", "1").unwrap();
        store.put("bkt", "p/b", "2").unwrap();

        let page = store.list_page("bkt", "p/", None).await.unwrap();
        assert_eq!(page.keys.len(), 2);
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn memory_store_get_missing_is_not_found() {
        let store = MemoryObjectStore::new();
        let err = store.get("bkt", "missing.txt").await.unwrap_err();
        assert!(err.is_not_found());

        store.put("bkt", "present.txt", "hello").unwrap();
        assert_eq!(
            store.get("bkt", "present.txt").await.unwrap(),
            Bytes::from("hello")
        );
    }

    #[tokio::test]
    async fn unknown_bucket_lists_empty() {
        let store = MemoryObjectStore::new();
        let page = store.list_page("nope", "", None).await.unwrap();
        assert!(page.keys.is_empty());
        assert!(page.next_token.is_none());
    }
}
