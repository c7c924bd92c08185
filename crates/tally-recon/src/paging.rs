//! Continuation-token bookkeeping shared by the paginated scanners.

use tally_core::error::{Error, Result};
use tally_core::metrics;

/// Tracks a continuation cursor while a source is drained.
///
/// A scan is only complete once the source stops returning a token. A source
/// that hands back the token it was just given would never finish, so that is
/// reported as a collaborator error instead of looping.
#[derive(Debug)]
pub(crate) struct Cursor {
    source: &'static str,
    token: Option<String>,
    pages: usize,
}

impl Cursor {
    pub(crate) const fn new(source: &'static str) -> Self {
        Self {
            source,
            token: None,
            pages: 0,
        }
    }

    /// Token to pass to the next page request.
    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Records a drained page. Returns `true` while more pages remain.
    pub(crate) fn advance(&mut self, next: Option<String>) -> Result<bool> {
        self.pages += 1;
        metrics::record_page(self.source);

        match next {
            Some(next) if self.token.as_deref() == Some(next.as_str()) => {
                Err(Error::collaborator(
                    self.source,
                    format!("continuation token did not advance after page {}", self.pages),
                ))
            }
            Some(next) => {
                self.token = Some(next);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pages drained so far.
    pub(crate) const fn pages(&self) -> usize {
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_follows_tokens_until_exhausted() {
        let mut cursor = Cursor::new("results");
        assert_eq!(cursor.token(), None);
        assert!(cursor.advance(Some("a".into())).unwrap());
        assert_eq!(cursor.token(), Some("a"));
        assert!(cursor.advance(Some("b".into())).unwrap());
        assert!(!cursor.advance(None).unwrap());
        assert_eq!(cursor.pages(), 3);
    }

    #[test]
    fn repeated_token_is_an_error() {
        let mut cursor = Cursor::new("jobs");
        cursor.advance(Some("same".into())).unwrap();
        let err = cursor.advance(Some("same".into())).unwrap_err();
        assert!(matches!(err, Error::Collaborator { service: "jobs", .. }));
    }
}
