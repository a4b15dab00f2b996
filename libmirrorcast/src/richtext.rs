//! Link, hashtag and mention facets for post text
//!
//! Facet offsets are UTF-8 byte ranges into the final record text.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::platforms::Destination;
use crate::record::{ByteSlice, Facet, FacetFeature};

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").expect("link pattern is valid"));

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(#[^\s#]+)").expect("tag pattern is valid"));

static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)(@[a-zA-Z0-9][a-zA-Z0-9.-]*)").expect("mention pattern is valid")
});

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '"', '\''];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanKind {
    Link(String),
    Tag(String),
    /// Handle without the leading `@`
    Mention(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub kind: SpanKind,
}

/// Find facet candidates in `text`, in order of appearance.
pub fn detect_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();

    for m in LINK.find_iter(text) {
        let uri = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        spans.push(Span {
            start: m.start(),
            end: m.start() + uri.len(),
            kind: SpanKind::Link(uri.to_string()),
        });
    }

    for caps in TAG.captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        let raw = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        let tag = &raw[1..];
        if tag.is_empty() || tag.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        spans.push(Span {
            start: m.start(),
            end: m.start() + raw.len(),
            kind: SpanKind::Tag(tag.to_string()),
        });
    }

    for caps in MENTION.captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        let raw = m.as_str().trim_end_matches(['.', '-']);
        let handle = &raw[1..];
        if !handle.contains('.') {
            continue;
        }
        spans.push(Span {
            start: m.start(),
            end: m.start() + raw.len(),
            kind: SpanKind::Mention(handle.to_string()),
        });
    }

    // Links win over tags or mentions that happen to sit inside them
    let links: Vec<(usize, usize)> = spans
        .iter()
        .filter(|s| matches!(s.kind, SpanKind::Link(_)))
        .map(|s| (s.start, s.end))
        .collect();
    spans.retain(|s| {
        matches!(s.kind, SpanKind::Link(_))
            || !links.iter().any(|(start, end)| s.start < *end && *start < s.end)
    });

    spans.sort_by_key(|s| s.start);
    spans
}

/// Build facets for `text`, resolving mentions through the destination.
///
/// A mention that can't be resolved is left as plain text.
pub async fn build_facets(text: &str, destination: &dyn Destination) -> Vec<Facet> {
    let mut facets = Vec::new();

    for span in detect_spans(text) {
        let feature = match span.kind {
            SpanKind::Link(uri) => FacetFeature::Link { uri },
            SpanKind::Tag(tag) => FacetFeature::Tag { tag },
            SpanKind::Mention(handle) => match destination.resolve_handle(&handle).await {
                Ok(Some(did)) => FacetFeature::Mention { did },
                Ok(None) => continue,
                Err(e) => {
                    warn!("Could not resolve mention @{}: {}", handle, e);
                    continue;
                }
            },
        };
        facets.push(Facet {
            index: ByteSlice {
                byte_start: span.start,
                byte_end: span.end,
            },
            features: vec![feature],
        });
    }

    facets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockDestination;

    #[test]
    fn test_link_with_trailing_punctuation() {
        let text = "See https://example.com/a?b=1. Thanks";
        let spans = detect_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(&text[spans[0].start..spans[0].end], "https://example.com/a?b=1");
        assert_eq!(spans[0].kind, SpanKind::Link("https://example.com/a?b=1".to_string()));
    }

    #[test]
    fn test_hashtags_and_numeric_tags() {
        let text = "#rust is fun #2024 and #Tokio!";
        let spans = detect_spans(text);
        let tags: Vec<&SpanKind> = spans.iter().map(|s| &s.kind).collect();
        assert_eq!(
            tags,
            vec![
                &SpanKind::Tag("rust".to_string()),
                &SpanKind::Tag("Tokio".to_string())
            ]
        );
        assert_eq!(&text[spans[1].start..spans[1].end], "#Tokio");
    }

    #[test]
    fn test_mentions_require_a_domain() {
        let text = "hi @alice.bsky.social and @bob.";
        let spans = detect_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, SpanKind::Mention("alice.bsky.social".to_string()));
        assert_eq!(&text[spans[0].start..spans[0].end], "@alice.bsky.social");
    }

    #[test]
    fn test_fragment_inside_link_is_not_a_tag() {
        let text = "https://example.com/page#section";
        let spans = detect_spans(text);
        assert_eq!(spans.len(), 1);
        assert!(matches!(spans[0].kind, SpanKind::Link(_)));
    }

    #[test]
    fn test_offsets_are_utf8_bytes() {
        let text = "héllo #café";
        let spans = detect_spans(text);
        assert_eq!(spans[0].start, "héllo ".len());
        assert_eq!(spans[0].end, text.len());
    }

    #[tokio::test]
    async fn test_build_facets_resolves_known_mentions_only() {
        let destination = MockDestination::new("me.bsky.social");
        destination.add_handle("alice.bsky.social", "did:plc:alice");

        let facets =
            build_facets("@alice.bsky.social meet @carol.example.com", &destination).await;
        assert_eq!(facets.len(), 1);
        assert_eq!(
            facets[0].features[0],
            FacetFeature::Mention {
                did: "did:plc:alice".to_string()
            }
        );
    }
}
