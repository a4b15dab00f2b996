//! Duplicate detection against the destination's recent feed
//!
//! The feed snapshot is taken once per run. Matching is exact after trimming,
//! and case-sensitive.

use crate::types::FeedEntry;

/// A unit about to be published
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub text: &'a str,
    /// URI of the intended parent when the unit is a reply
    pub reply_parent: Option<&'a str>,
}

/// Read-only snapshot of recently published destination posts
#[derive(Debug, Clone, Default)]
pub struct DuplicateGuard {
    feed: Vec<FeedEntry>,
}

impl DuplicateGuard {
    pub fn new(feed: Vec<FeedEntry>) -> Self {
        Self { feed }
    }

    pub fn len(&self) -> usize {
        self.feed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_empty()
    }

    /// Find the feed entry `candidate` duplicates, if any.
    ///
    /// A reply only matches an entry replying to the same parent.
    pub fn find(&self, candidate: &Candidate<'_>) -> Option<&FeedEntry> {
        let text = candidate.text.trim();
        self.feed.iter().find(|entry| {
            entry.text.trim() == text
                && match candidate.reply_parent {
                    Some(parent) => entry.reply_parent.as_deref() == Some(parent),
                    None => true,
                }
        })
    }

    pub fn is_duplicate(&self, candidate: &Candidate<'_>) -> bool {
        self.find(candidate).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(uri: &str, text: &str, reply_parent: Option<&str>) -> FeedEntry {
        FeedEntry {
            uri: uri.to_string(),
            cid: format!("cid-{}", uri),
            text: text.to_string(),
            reply_parent: reply_parent.map(str::to_string),
        }
    }

    fn top_level(text: &str) -> Candidate<'_> {
        Candidate {
            text,
            reply_parent: None,
        }
    }

    #[test]
    fn test_exact_text_is_duplicate() {
        let guard = DuplicateGuard::new(vec![entry("at://1", "hello", None)]);
        assert!(guard.is_duplicate(&top_level("hello")));
    }

    #[test]
    fn test_whitespace_variant_is_duplicate() {
        let guard = DuplicateGuard::new(vec![entry("at://1", "hello", None)]);
        assert!(guard.is_duplicate(&top_level("hello  ")));
        assert!(guard.is_duplicate(&top_level("\n hello")));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let guard = DuplicateGuard::new(vec![entry("at://1", "hello", None)]);
        assert!(!guard.is_duplicate(&top_level("Hello  ")));
        assert!(!guard.is_duplicate(&top_level("HELLO")));
    }

    #[test]
    fn test_feed_entry_is_trimmed_too() {
        let guard = DuplicateGuard::new(vec![entry("at://1", "  hello\n", None)]);
        assert!(guard.is_duplicate(&top_level("hello")));
    }

    #[test]
    fn test_no_fuzzy_matching() {
        let guard = DuplicateGuard::new(vec![entry("at://1", "hello world", None)]);
        assert!(!guard.is_duplicate(&top_level("hello")));
        assert!(!guard.is_duplicate(&top_level("hello world!")));
    }

    #[test]
    fn test_top_level_candidate_matches_on_text_alone() {
        let guard = DuplicateGuard::new(vec![entry("at://2", "hello", Some("at://1"))]);
        assert!(guard.is_duplicate(&top_level("hello")));
    }

    #[test]
    fn test_reply_requires_matching_parent() {
        let guard = DuplicateGuard::new(vec![
            entry("at://2", "", Some("at://1")),
            entry("at://4", "part two [2/2]", Some("at://3")),
        ]);

        let same_parent = Candidate {
            text: " ",
            reply_parent: Some("at://1"),
        };
        assert_eq!(guard.find(&same_parent).map(|e| e.uri.as_str()), Some("at://2"));

        let other_parent = Candidate {
            text: " ",
            reply_parent: Some("at://9"),
        };
        assert!(!guard.is_duplicate(&other_parent));

        let top_level_reply_text = Candidate {
            text: "part two [2/2]",
            reply_parent: Some("at://1"),
        };
        assert!(!guard.is_duplicate(&top_level_reply_text));
    }

    #[test]
    fn test_empty_feed_has_no_duplicates() {
        let guard = DuplicateGuard::default();
        assert!(guard.is_empty());
        assert!(!guard.is_duplicate(&top_level("anything")));
    }
}
