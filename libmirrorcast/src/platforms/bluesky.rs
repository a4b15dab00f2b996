//! Bluesky destination over XRPC

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{PlatformError, Result};
use crate::platforms::Destination;
use crate::record::{BlobRef, PostRecord, POST_COLLECTION};
use crate::types::{FeedEntry, StrongRef};

/// Map an XRPC failure to PlatformError
///
/// `status` is the HTTP status when the server answered at all; `detail`
/// carries the XRPC error name and message (or the transport error text).
fn map_bluesky_error(status: Option<StatusCode>, detail: &str, context: &str) -> PlatformError {
    let code = status.map(|s| s.as_u16());

    if matches!(code, Some(401) | Some(403))
        || detail.contains("AuthenticationRequired")
        || detail.contains("InvalidToken")
        || detail.contains("ExpiredToken")
    {
        return PlatformError::Authentication(format!(
            "Bluesky authentication failed during {}: {}. Please check your credentials and re-authenticate.",
            context, detail
        ));
    }

    if detail.contains("InvalidCredentials")
        || detail.contains("AccountNotFound")
        || (context == "authentication" && code == Some(400))
    {
        return PlatformError::Authentication(format!(
            "Invalid Bluesky credentials: {}. Please check your handle and app password.",
            detail
        ));
    }

    if code == Some(429) || detail.contains("RateLimitExceeded") {
        return PlatformError::RateLimit(format!(
            "Bluesky rate limit exceeded during {}: {}. Please wait before trying again.",
            context, detail
        ));
    }

    if code.is_none() {
        return PlatformError::Network(format!(
            "Network error while connecting to Bluesky PDS during {}: {}. Check your internet connection and PDS availability.",
            context, detail
        ));
    }

    if context == "upload" {
        return PlatformError::Upload(format!("Bluesky rejected the blob: {}", detail));
    }

    if code == Some(400) || detail.contains("InvalidRequest") || detail.contains("InvalidRecord") {
        return PlatformError::Validation(format!(
            "Bluesky rejected the request during {}: {}. Check content format and length.",
            context, detail
        ));
    }

    PlatformError::Posting(format!(
        "Bluesky operation failed during {}: {}",
        context, detail
    ))
}

/// XRPC error body, e.g. `{"error":"InvalidRequest","message":"..."}`
#[derive(Debug, Default, Deserialize)]
struct XrpcError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl XrpcError {
    fn describe(&self, status: StatusCode) -> String {
        match (&self.error, &self.message) {
            (Some(error), Some(message)) => format!("{}: {}", error, message),
            (Some(error), None) => error.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => format!("HTTP {}", status),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_jwt: String,
    did: String,
}

#[derive(Debug, Deserialize)]
struct AuthorFeed {
    #[serde(default)]
    feed: Vec<FeedViewPost>,
}

#[derive(Debug, Deserialize)]
struct FeedViewPost {
    post: PostView,
}

#[derive(Debug, Deserialize)]
struct PostView {
    uri: String,
    cid: String,
    record: FeedRecord,
}

#[derive(Debug, Default, Deserialize)]
struct FeedRecord {
    #[serde(default)]
    text: String,
    #[serde(default)]
    reply: Option<FeedReply>,
}

#[derive(Debug, Deserialize)]
struct FeedReply {
    parent: StrongRef,
}

impl From<FeedViewPost> for FeedEntry {
    fn from(item: FeedViewPost) -> Self {
        FeedEntry {
            uri: item.post.uri,
            cid: item.post.cid,
            text: item.post.record.text,
            reply_parent: item.post.record.reply.map(|r| r.parent.uri),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadBlobResponse {
    blob: BlobRef,
}

#[derive(Debug, Deserialize)]
struct ResolveHandleResponse {
    did: String,
}

#[derive(Serialize)]
struct CreateRecordRequest<'a> {
    repo: &'a str,
    collection: &'a str,
    record: &'a PostRecord,
}

struct Session {
    access_jwt: SecretString,
    did: String,
}

pub struct BlueskyClient {
    http: Client,
    service: String,
    handle: String,
    password: SecretString,
    session: Option<Session>,
}

impl BlueskyClient {
    /// Create a client for `service` (e.g. "https://bsky.social")
    ///
    /// No request is made until [`Destination::authenticate`].
    pub fn new(service: &str, handle: String, password: SecretString) -> Self {
        Self {
            http: Client::new(),
            service: service.trim_end_matches('/').to_string(),
            handle,
            password,
            session: None,
        }
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| PlatformError::Authentication("Not authenticated".to_string()).into())
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let session = self.session()?;
        Ok(request.header(
            AUTHORIZATION,
            format!("Bearer {}", session.access_jwt.expose_secret()),
        ))
    }

    /// Send an XRPC request and decode the JSON body
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, context: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| map_bluesky_error(e.status(), &e.to_string(), context))?;

        let status = response.status();
        if !status.is_success() {
            let body: XrpcError = response.json().await.unwrap_or_default();
            return Err(map_bluesky_error(Some(status), &body.describe(status), context).into());
        }

        response.json::<T>().await.map_err(|e| {
            PlatformError::Posting(format!(
                "Unexpected Bluesky response during {}: {}",
                context, e
            ))
            .into()
        })
    }
}

#[async_trait]
impl Destination for BlueskyClient {
    async fn authenticate(&mut self) -> Result<()> {
        tracing::debug!("Creating Bluesky session for handle: {}", self.handle);

        let request = self
            .http
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.handle,
                "password": self.password.expose_secret(),
            }));
        let session: SessionResponse = self.send(request, "authentication").await?;

        tracing::debug!("Bluesky session created for {}", session.did);
        self.session = Some(Session {
            access_jwt: SecretString::from(session.access_jwt),
            did: session.did,
        });
        Ok(())
    }

    async fn recent_posts(&self, limit: u8) -> Result<Vec<FeedEntry>> {
        let limit = limit.to_string();
        let request = self.authorized(
            self.http
                .get(self.xrpc_url("app.bsky.feed.getAuthorFeed"))
                .query(&[("actor", self.handle.as_str()), ("limit", limit.as_str())]),
        )?;
        let feed: AuthorFeed = self.send(request, "feed lookup").await?;
        Ok(feed.feed.into_iter().map(FeedEntry::from).collect())
    }

    async fn upload_blob(&self, bytes: Vec<u8>, mime_type: &str) -> Result<BlobRef> {
        tracing::debug!("Uploading {} byte blob ({})", bytes.len(), mime_type);

        let request = self.authorized(
            self.http
                .post(self.xrpc_url("com.atproto.repo.uploadBlob"))
                .header(CONTENT_TYPE, mime_type)
                .body(bytes),
        )?;
        let uploaded: UploadBlobResponse = self.send(request, "upload").await?;
        Ok(uploaded.blob)
    }

    async fn create_post(&self, record: &PostRecord) -> Result<StrongRef> {
        let session = self.session()?;
        tracing::debug!("Posting to Bluesky: {} characters", record.text.chars().count());

        let request = self.authorized(
            self.http
                .post(self.xrpc_url("com.atproto.repo.createRecord"))
                .json(&CreateRecordRequest {
                    repo: &session.did,
                    collection: POST_COLLECTION,
                    record,
                }),
        )?;
        let published: StrongRef = self.send(request, "posting").await?;

        tracing::debug!("Posted to Bluesky: {}", published.uri);
        Ok(published)
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<String>> {
        let request = self
            .http
            .get(self.xrpc_url("com.atproto.identity.resolveHandle"))
            .query(&[("handle", handle)]);

        match self.send::<ResolveHandleResponse>(request, "handle resolution").await {
            Ok(resolved) => Ok(Some(resolved.did)),
            Err(crate::error::MirrorError::Platform(PlatformError::Validation(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "bluesky"
    }
}
