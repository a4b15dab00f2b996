//! In-memory platforms for testing
//!
//! Each mock shares its state behind `Arc<Mutex<..>>`, so a test can keep a
//! clone for inspection after handing another clone to the pipeline.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::{PlatformError, Result};
use crate::platforms::{Destination, FetchedMedia, MediaFetcher, SourceFeed};
use crate::record::{BlobRef, PostRecord};
use crate::types::{FeedEntry, SourceStatus, StrongRef};

/// DID every mock destination account uses
pub const MOCK_DID: &str = "did:plc:mockaccount";

/// A blob the mock destination received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBlob {
    pub size: usize,
    pub mime_type: String,
}

#[derive(Debug, Default)]
struct DestinationState {
    /// Newest first, like the real author feed
    feed: Vec<FeedEntry>,
    posts: Vec<PostRecord>,
    uploads: Vec<UploadedBlob>,
    handles: HashMap<String, String>,
    auth_calls: usize,
    auth_error: Option<String>,
    feed_error: Option<String>,
    upload_error: Option<String>,
    post_error: Option<String>,
    next_id: usize,
}

/// Mock destination account
#[derive(Debug, Clone)]
pub struct MockDestination {
    handle: String,
    authenticated: bool,
    state: Arc<Mutex<DestinationState>>,
}

impl MockDestination {
    /// Create an empty account that accepts everything
    pub fn new(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            authenticated: false,
            state: Arc::new(Mutex::new(DestinationState::default())),
        }
    }

    /// Create an account whose login is rejected
    pub fn auth_failure(handle: &str, error: &str) -> Self {
        let destination = Self::new(handle);
        destination.state.lock().unwrap().auth_error = Some(error.to_string());
        destination
    }

    /// Create an account that rejects every `createRecord`
    pub fn post_failure(handle: &str, error: &str) -> Self {
        let destination = Self::new(handle);
        destination.state.lock().unwrap().post_error = Some(error.to_string());
        destination
    }

    /// Create an account that rejects every blob upload
    pub fn upload_failure(handle: &str, error: &str) -> Self {
        let destination = Self::new(handle);
        destination.state.lock().unwrap().upload_error = Some(error.to_string());
        destination
    }

    /// Make `recent_posts` fail
    pub fn fail_feed(&self, error: &str) {
        self.state.lock().unwrap().feed_error = Some(error.to_string());
    }

    /// Register a handle for `resolve_handle`
    pub fn add_handle(&self, handle: &str, did: &str) {
        self.state
            .lock()
            .unwrap()
            .handles
            .insert(handle.to_string(), did.to_string());
    }

    /// Seed the feed with an existing post. Seeded entries count as newest.
    pub fn add_feed_entry(&self, entry: FeedEntry) {
        self.state.lock().unwrap().feed.insert(0, entry);
    }

    /// Records created so far, in publish order
    pub fn posts(&self) -> Vec<PostRecord> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn uploads(&self) -> Vec<UploadedBlob> {
        self.state.lock().unwrap().uploads.clone()
    }

    /// The account feed, newest first
    pub fn feed(&self) -> Vec<FeedEntry> {
        self.state.lock().unwrap().feed.clone()
    }

    pub fn auth_call_count(&self) -> usize {
        self.state.lock().unwrap().auth_calls
    }

    fn require_auth(&self) -> Result<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(PlatformError::Authentication("Not authenticated".to_string()).into())
        }
    }
}

#[async_trait]
impl Destination for MockDestination {
    async fn authenticate(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.auth_calls += 1;

        if let Some(error) = &state.auth_error {
            return Err(PlatformError::Authentication(error.clone()).into());
        }

        drop(state);
        self.authenticated = true;
        Ok(())
    }

    async fn recent_posts(&self, limit: u8) -> Result<Vec<FeedEntry>> {
        self.require_auth()?;
        let state = self.state.lock().unwrap();
        if let Some(error) = &state.feed_error {
            return Err(PlatformError::Network(error.clone()).into());
        }
        Ok(state.feed.iter().take(limit as usize).cloned().collect())
    }

    async fn upload_blob(&self, bytes: Vec<u8>, mime_type: &str) -> Result<BlobRef> {
        self.require_auth()?;
        let mut state = self.state.lock().unwrap();
        if let Some(error) = &state.upload_error {
            return Err(PlatformError::Upload(error.clone()).into());
        }

        state.next_id += 1;
        let link = format!("bafkreimock{}", state.next_id);
        state.uploads.push(UploadedBlob {
            size: bytes.len(),
            mime_type: mime_type.to_string(),
        });
        Ok(BlobRef::new(link, mime_type, bytes.len() as u64))
    }

    async fn create_post(&self, record: &PostRecord) -> Result<StrongRef> {
        self.require_auth()?;
        let mut state = self.state.lock().unwrap();
        if let Some(error) = &state.post_error {
            return Err(PlatformError::Posting(error.clone()).into());
        }

        state.next_id += 1;
        let published = StrongRef::new(
            format!("at://{}/app.bsky.feed.post/{}", MOCK_DID, state.next_id),
            format!("bafyreimock{}", state.next_id),
        );
        state.posts.push(record.clone());
        state.feed.insert(
            0,
            FeedEntry {
                uri: published.uri.clone(),
                cid: published.cid.clone(),
                text: record.text.clone(),
                reply_parent: record.reply.as_ref().map(|r| r.parent.uri.clone()),
            },
        );
        Ok(published)
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<String>> {
        if let Some(did) = self.state.lock().unwrap().handles.get(handle) {
            return Ok(Some(did.clone()));
        }
        Ok((handle == self.handle).then(|| MOCK_DID.to_string()))
    }

    fn name(&self) -> &str {
        "mock-bluesky"
    }
}

/// Mock source account serving a fixed list of statuses
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    statuses: Vec<SourceStatus>,
    error: Option<String>,
    requested_limits: Arc<Mutex<Vec<u32>>>,
}

impl MockSource {
    pub fn new(statuses: Vec<SourceStatus>) -> Self {
        Self {
            statuses,
            ..Default::default()
        }
    }

    /// A source whose timeline can't be read
    pub fn failure(error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    /// Limits passed to `fetch_recent`, in call order
    pub fn requested_limits(&self) -> Vec<u32> {
        self.requested_limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceFeed for MockSource {
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<SourceStatus>> {
        self.requested_limits.lock().unwrap().push(limit);
        if let Some(error) = &self.error {
            return Err(PlatformError::Network(error.clone()).into());
        }
        Ok(self.statuses.iter().take(limit as usize).cloned().collect())
    }

    fn name(&self) -> &str {
        "mock-mastodon"
    }
}

/// Mock media host.
///
/// Unknown URLs succeed with a small body and no content type. URLs marked
/// with [`MockFetcher::fail`] return an upload error.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<HashMap<String, FetchedMedia>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    requests: Arc<Mutex<Vec<(String, u64)>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` with `content_type` for `url`
    pub fn serve(&self, url: &str, bytes: Vec<u8>, content_type: Option<&str>) {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            FetchedMedia {
                bytes,
                content_type: content_type.map(str::to_string),
            },
        );
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    /// `(url, max_bytes)` for every fetch, in call order
    pub fn requests(&self) -> Vec<(String, u64)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<FetchedMedia> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), max_bytes));

        if self.failing.lock().unwrap().contains(url) {
            return Err(PlatformError::Upload(format!("HTTP 404 fetching {}", url)).into());
        }

        let mut media = self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchedMedia {
                bytes: b"mock-media".to_vec(),
                content_type: None,
            });
        media.bytes.truncate(max_bytes as usize);
        Ok(media)
    }
}
