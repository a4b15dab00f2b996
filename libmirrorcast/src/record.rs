//! `app.bsky.feed.post` record shape
//!
//! Only the subset of the lexicon the mirror writes is modeled here.

use serde::{Deserialize, Serialize};

use crate::chunker::{char_len, MAX_POST_LENGTH};
use crate::error::{PlatformError, Result};
use crate::thread::ReplyRefs;
use crate::types::StrongRef;

pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Most images one post may embed
pub const MAX_IMAGES: usize = 4;

/// Reference to an uploaded blob, as returned by `uploadBlob`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobRef {
    #[serde(rename = "$type", default = "blob_type")]
    pub blob_type: String,
    #[serde(rename = "ref")]
    pub link: BlobLink,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub size: u64,
}

fn blob_type() -> String {
    "blob".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobLink {
    #[serde(rename = "$link")]
    pub link: String,
}

impl BlobRef {
    pub fn new(link: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            blob_type: blob_type(),
            link: BlobLink { link: link.into() },
            mime_type: mime_type.into(),
            size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Both dimensions must be known for the ratio to be valid
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageItem {
    pub image: BlobRef,
    pub alt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImagesEmbed {
    pub images: Vec<ImageItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoEmbed {
    pub video: BlobRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct External {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<BlobRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalEmbed {
    pub external: External,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "$type")]
pub enum RecordEmbed {
    #[serde(rename = "app.bsky.embed.images")]
    Images(ImagesEmbed),
    #[serde(rename = "app.bsky.embed.video")]
    Video(VideoEmbed),
    #[serde(rename = "app.bsky.embed.external")]
    External(ExternalEmbed),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

impl From<&ReplyRefs> for ReplyRef {
    fn from(refs: &ReplyRefs) -> Self {
        Self {
            root: refs.root.clone(),
            parent: refs.parent.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub text: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Vec<Facet>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<RecordEmbed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
}

impl PostRecord {
    pub fn new(text: String, created_at: String) -> Self {
        Self {
            record_type: POST_COLLECTION.to_string(),
            text,
            created_at,
            facets: None,
            embed: None,
            reply: None,
        }
    }

    /// Check the record against the destination's constraints before submitting.
    pub fn validate(&self) -> Result<()> {
        let len = char_len(&self.text);
        if len > MAX_POST_LENGTH {
            return Err(PlatformError::Validation(format!(
                "Text exceeds Bluesky's {} character limit (current: {} characters)",
                MAX_POST_LENGTH, len
            ))
            .into());
        }

        if let Some(RecordEmbed::Images(images)) = &self.embed {
            if images.images.len() > MAX_IMAGES {
                return Err(PlatformError::Validation(format!(
                    "Too many images: {} (maximum {})",
                    images.images.len(),
                    MAX_IMAGES
                ))
                .into());
            }
        }

        if self.text.trim().is_empty() && self.embed.is_none() {
            return Err(
                PlatformError::Validation("Post has neither text nor embed".to_string()).into(),
            );
        }

        Ok(())
    }
}
