//! Identifiers for jobs and work items.
//!
//! Both are opaque strings owned by external systems, so unlike generated ids they
//! are only validated for the properties tally relies on: a [`WorkItemId`] must be
//! usable as a single object-store key segment, and a [`JobId`] must be non-empty.
//!
//! # Example
//!
//! ```rust
//! use tally_core::id::JobId;
//!
//! let parent = JobId::new("6f1c2a").unwrap();
//! assert_eq!(parent.child(4).as_str(), "6f1c2a:4");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Identifier of one unit of work (an accession or sample name).
///
/// Appears both as a manifest line and as the first key segment below a
/// results prefix, so it may not contain `/` or surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(String);

impl WorkItemId {
    /// Creates a work-item id after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty, padded, or contains `/`.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidInput("work item id cannot be empty".into()));
        }
        if id.trim() != id {
            return Err(Error::InvalidInput(format!(
                "work item id '{id}' has surrounding whitespace"
            )));
        }
        if id.contains('/') {
            return Err(Error::InvalidInput(format!(
                "work item id '{id}' cannot contain '/'"
            )));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Identifier of a job in the job queue.
///
/// Child executions of an array job are addressed as `{parent}:{index}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a job id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is blank.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("job id cannot be empty".into()));
        }
        Ok(Self(id))
    }

    /// Returns the id of the child execution at `index`.
    #[must_use]
    pub fn child(&self, index: u32) -> Self {
        Self(format!("{}:{index}", self.0))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_item_rejects_key_separators() {
        assert!(WorkItemId::new("SRR123/extra").is_err());
        assert!(WorkItemId::new("").is_err());
        assert!(WorkItemId::new(" SRR1").is_err());
        assert_eq!(WorkItemId::new("SRR123").unwrap().as_str(), "SRR123");
    }

    #[test]
    fn child_ids_use_colon_suffix() {
        let parent: JobId = "abc-123".parse().unwrap();
        assert_eq!(parent.child(0).to_string(), "abc-123:0");
        assert_eq!(parent.child(41).as_str(), "abc-123:41");
    }

    #[test]
    fn ids_order_lexically() {
        let mut ids = vec![
            WorkItemId::new("b").unwrap(),
            WorkItemId::new("a").unwrap(),
        ];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
    }
}
