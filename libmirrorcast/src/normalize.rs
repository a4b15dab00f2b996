//! Normalizing source statuses into destination-ready content
//!
//! Sanitization is a set of pure functions driven by [`SanitizeRules`]. The
//! rules are built from configuration at the call site, so a changed handle or
//! keyword list takes effect on the next call without any cached state.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Card, Image, MediaKind, PostContent, SourceCard, SourceStatus};
use crate::video::{segment_video, SEGMENT_CEILING_SECS};

/// Appended to content mentioning a giveaway the destination can't take part in
pub const GIVEAWAY_DISCLAIMER: &str = "\n\n (Offer not valid on Bluesky.)";

/// Artifact left behind by Twitter cross-posting bridges
const TWITTER_ARTIFACT: &str = "@twitter.com";

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break pattern is valid"));

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));

/// Account-specific rewriting rules
#[derive(Debug, Clone, Default)]
pub struct SanitizeRules {
    /// Source account handle, e.g. `@alice@mastodon.social`
    pub source_handle: String,
    /// Destination account handle, e.g. `alice.bsky.social`
    pub destination_handle: String,
    /// Case-insensitive keywords that trigger the giveaway disclaimer
    pub giveaways: Vec<String>,
}

impl SanitizeRules {
    pub fn new(source_handle: &str, destination_handle: &str, giveaways: &[String]) -> Self {
        Self {
            source_handle: source_handle.trim().to_string(),
            destination_handle: destination_handle.trim().trim_start_matches('@').to_string(),
            giveaways: giveaways.to_vec(),
        }
    }

    /// The source handle in `@user@server` form
    fn source_mention(&self) -> Option<String> {
        let bare = self.source_handle.trim_start_matches('@');
        if bare.is_empty() {
            return None;
        }
        Some(format!("@{}", bare))
    }

    /// `@server` suffix carried by mentions of accounts on the source server
    fn server_suffix(&self) -> Option<String> {
        self.source_handle
            .trim_start_matches('@')
            .split_once('@')
            .map(|(_, server)| server)
            .filter(|server| !server.is_empty())
            .map(|server| format!("@{}", server))
    }
}

/// Turn HTML-bearing source text into plain destination text.
///
/// The steps run in a fixed order; the giveaway check runs last so that it
/// sees the final text.
pub fn sanitize_content(content: &str, rules: &SanitizeRules) -> String {
    let mut text = content.replace(TWITTER_ARTIFACT, "");

    if let Some(mention) = rules.source_mention() {
        if !rules.destination_handle.is_empty() {
            text = text.replace(&mention, &format!("@{}", rules.destination_handle));
        }
    }

    if let Some(suffix) = rules.server_suffix() {
        text = text.replace(&suffix, "");
    }

    text = text
        .replace("&nbsp;", "")
        .replace("\\\"", "\"")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .replace("</p><p>", "\n\n");

    text = LINE_BREAK.replace_all(&text, "\n").into_owned();
    text = HTML_TAG.replace_all(&text, "").into_owned();

    if contains_giveaway(&text, &rules.giveaways) {
        text.push_str(GIVEAWAY_DISCLAIMER);
    }

    text
}

/// Whether any non-empty keyword occurs in `text`, ignoring case
pub fn contains_giveaway(text: &str, keywords: &[String]) -> bool {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .any(|k| haystack.contains(&k.to_lowercase()))
}

fn convert_card(card: &SourceCard) -> Card {
    Card {
        uri: card.url.clone().unwrap_or_default(),
        title: card.title.clone().unwrap_or_default(),
        description: card.description.clone().unwrap_or_default(),
        image: card.image.clone().filter(|i| !i.is_empty()),
    }
}

/// Normalize one source status.
///
/// Unsupported attachments are dropped. Only the first attachment can be a
/// video source; a video anywhere else is ignored.
pub fn normalize_status(status: &SourceStatus, rules: &SanitizeRules) -> PostContent {
    let images = status
        .attachments
        .iter()
        .filter(|a| a.kind() == MediaKind::Image)
        .map(|a| Image {
            url: a.url.clone().unwrap_or_default(),
            alt: a.description.clone().unwrap_or_default(),
        })
        .collect();

    let videos = match status.attachments.first() {
        Some(first) if first.kind() == MediaKind::Video => segment_video(
            first.url.as_deref().unwrap_or_default(),
            first.duration,
            first.width,
            first.height,
            first.preview_url.as_deref(),
            SEGMENT_CEILING_SECS,
        ),
        _ => Vec::new(),
    };

    PostContent {
        created_at: status.created_at,
        content: sanitize_content(&status.content, rules),
        images,
        videos,
        card: status.card.as_ref().map(convert_card),
    }
}

/// Normalize a batch of source statuses, oldest first, skipping boosts.
pub fn normalize_batch(statuses: &[SourceStatus], rules: &SanitizeRules) -> Vec<PostContent> {
    let mut posts: Vec<PostContent> = statuses
        .iter()
        .filter(|s| !s.is_reblog)
        .map(|s| normalize_status(s, rules))
        .collect();
    posts.sort_by_key(|p| p.created_at);
    posts
}
