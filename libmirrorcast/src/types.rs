//! Core types for Mirrorcast
//!
//! Source-side types (`SourceStatus` and friends) are the neutral shape a
//! [`SourceFeed`](crate::platforms::SourceFeed) hands to the pipeline. The
//! normalized `PostContent` is what the thread composer works from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Source Types
// ============================================================================

/// Attachment classification, decided once when a source status is read
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Unsupported,
}

/// A media attachment on a source status
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceAttachment {
    pub kind: Option<MediaKind>,
    pub url: Option<String>,
    pub preview_url: Option<String>,
    pub description: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Duration in seconds (videos only)
    pub duration: Option<f64>,
}

impl SourceAttachment {
    /// The attachment kind; a missing kind counts as unsupported
    pub fn kind(&self) -> MediaKind {
        self.kind.unwrap_or(MediaKind::Unsupported)
    }
}

/// A link-preview card on a source status
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceCard {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// A status as read from the source account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceStatus {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// HTML-bearing rich text
    pub content: String,
    /// Boosts of someone else's status are never mirrored
    pub is_reblog: bool,
    pub attachments: Vec<SourceAttachment>,
    pub card: Option<SourceCard>,
}

// ============================================================================
// Normalized Content
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    pub url: String,
    pub alt: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Seconds covered by this segment
    pub duration: f64,
    /// Source poster frame at this segment's start. Never uploaded:
    /// `app.bsky.embed.video` has no thumbnail field, the destination renders
    /// its own.
    pub preview_url: Option<String>,
}

/// A bounded-duration slice of a source video
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VideoSegment {
    /// Source URL carrying a `#t=start[,end]` media fragment
    pub url: String,
    pub metadata: VideoMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub uri: String,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
}

/// Platform-neutral form of one source post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostContent {
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub images: Vec<Image>,
    pub videos: Vec<VideoSegment>,
    pub card: Option<Card>,
}

// ============================================================================
// Destination Types
// ============================================================================

/// Identifiers the destination assigns to a published post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

impl StrongRef {
    pub fn new(uri: impl Into<String>, cid: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cid: cid.into(),
        }
    }
}

/// One entry of the destination account's recent feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub uri: String,
    pub cid: String,
    pub text: String,
    /// URI of the post this entry replies to, if any
    pub reply_parent: Option<String>,
}

impl FeedEntry {
    pub fn strong_ref(&self) -> StrongRef {
        StrongRef::new(self.uri.clone(), self.cid.clone())
    }
}

// ============================================================================
// Media Types
// ============================================================================

/// Image MIME types the destination accepts for blobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse a `Content-Type` value, ignoring parameters such as `; charset=`
    pub fn from_mime_str(s: &str) -> Option<Self> {
        let essence = s.split(';').next().unwrap_or_default().trim();
        match essence.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Guess from the extension of a URL path
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let ext = path.rsplit_once('.')?.1;
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub const VIDEO_MIME: &str = "video/mp4";
