//! Composing a normalized post into an ordered thread of destination units
//!
//! A post that fits in one destination post and has no video becomes a single
//! unit. Anything longer, or carrying a multi-segment video, becomes a linear
//! reply chain: unit 0 is the root, every later unit replies to the one
//! before it.

use serde::Serialize;

use crate::chunker::{char_len, split_into_chunks, MARKER_RESERVE, MAX_POST_LENGTH};
use crate::types::{Card, Image, PostContent, StrongRef, VideoSegment};

/// Text carried by a unit that exists only to hold a video segment
pub const PLACEHOLDER_TEXT: &str = " ";

/// One destination post, before upload and publishing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadUnit {
    pub text: String,
    pub video: Option<VideoSegment>,
    pub images: Vec<Image>,
    pub card: Option<Card>,
    pub is_reply: bool,
}

/// The single embed a unit publishes with
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitEmbed<'a> {
    Video(&'a VideoSegment),
    Images(&'a [Image]),
    Card(&'a Card),
    None,
}

impl ThreadUnit {
    /// Resolve the embed by priority: video, then images, then card.
    pub fn embed(&self) -> UnitEmbed<'_> {
        if let Some(video) = &self.video {
            UnitEmbed::Video(video)
        } else if !self.images.is_empty() {
            UnitEmbed::Images(&self.images)
        } else if let Some(card) = &self.card {
            UnitEmbed::Card(card)
        } else {
            UnitEmbed::None
        }
    }
}

/// Reply references for one thread.
///
/// `root` is fixed by the first published unit; `parent` always points at the
/// most recently published one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyRefs {
    pub root: StrongRef,
    pub parent: StrongRef,
}

impl ReplyRefs {
    /// Fold a newly published unit into the chain.
    pub fn advance(previous: Option<ReplyRefs>, published: StrongRef) -> ReplyRefs {
        match previous {
            Some(refs) => ReplyRefs {
                root: refs.root,
                parent: published,
            },
            None => ReplyRefs {
                root: published.clone(),
                parent: published,
            },
        }
    }
}

/// Build the ordered units for one post.
pub fn compose_thread(post: &PostContent) -> Vec<ThreadUnit> {
    let fits = char_len(&post.content) <= MAX_POST_LENGTH;

    let chunks = if fits {
        vec![post.content.clone()]
    } else {
        split_into_chunks(&post.content, MAX_POST_LENGTH, MARKER_RESERVE)
    };

    if post.videos.is_empty() {
        return chunks
            .into_iter()
            .enumerate()
            .map(|(i, text)| ThreadUnit {
                text,
                video: None,
                images: if i == 0 { post.images.clone() } else { Vec::new() },
                card: if i == 0 { post.card.clone() } else { None },
                is_reply: i > 0,
            })
            .collect();
    }

    let count = chunks.len().max(post.videos.len());
    (0..count)
        .map(|i| ThreadUnit {
            text: chunks
                .get(i)
                .cloned()
                .unwrap_or_else(|| PLACEHOLDER_TEXT.to_string()),
            video: post.videos.get(i).cloned(),
            images: if i == 0 { post.images.clone() } else { Vec::new() },
            card: if i == 0 { post.card.clone() } else { None },
            is_reply: i > 0,
        })
        .collect()
}
