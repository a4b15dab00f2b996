//! Platform abstraction and implementations
//!
//! The pipeline talks to three collaborators through traits so that the whole
//! run can be exercised against the in-memory [`mock`] implementations:
//!
//! - [`SourceFeed`]: where posts come from (Mastodon)
//! - [`Destination`]: where they go (Bluesky)
//! - [`MediaFetcher`]: raw bytes for media referenced by source posts

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{BlobRef, PostRecord};
use crate::types::{FeedEntry, SourceStatus, StrongRef};

pub mod bluesky;
pub mod mastodon;
pub mod media;

// Mock platforms are available for all builds (not just tests) to support integration tests
pub mod mock;

/// Read side of the source account
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Fetch up to `limit` of the account's most recent statuses.
    ///
    /// Order is not significant; the pipeline sorts by creation time.
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<SourceStatus>>;

    /// Lowercase platform identifier (e.g. "mastodon")
    fn name(&self) -> &str;
}

/// The account posts are mirrored to
#[async_trait]
pub trait Destination: Send + Sync {
    /// Establish a session. Must succeed before any other call.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` for rejected credentials.
    async fn authenticate(&mut self) -> Result<()>;

    /// The account's most recent posts, newest first
    async fn recent_posts(&self, limit: u8) -> Result<Vec<FeedEntry>>;

    /// Upload raw media and return a reference usable in an embed
    async fn upload_blob(&self, bytes: Vec<u8>, mime_type: &str) -> Result<BlobRef>;

    /// Publish a post record and return its identifiers
    async fn create_post(&self, record: &PostRecord) -> Result<StrongRef>;

    /// Resolve a handle to a DID; `Ok(None)` when the handle doesn't exist
    async fn resolve_handle(&self, handle: &str) -> Result<Option<String>>;

    /// Lowercase platform identifier (e.g. "bluesky")
    fn name(&self) -> &str;
}

/// Media bytes plus the content type the server reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Downloads media referenced by source posts
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch at most `max_bytes` of `url` using a range request.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Upload` when the server can't satisfy the
    /// request (including an unsatisfiable range).
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<FetchedMedia>;
}
