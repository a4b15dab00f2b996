//! HTTP media fetcher

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RANGE};
use reqwest::{Client, StatusCode};

use crate::error::{PlatformError, Result};
use crate::platforms::{FetchedMedia, MediaFetcher};

/// Byte ceiling for an image fetch
pub const MAX_IMAGE_BYTES: u64 = 1_000_000;

/// Byte ceiling for a video segment fetch
pub const MAX_VIDEO_BYTES: u64 = 20_000_000;

/// Fetches media with a `Range: bytes=0-N` header.
///
/// A `206 Partial Content` body is read up to the ceiling and cut there. A
/// full `200` body that exceeds the ceiling is an upload error, detected from
/// `Content-Length` or while streaming, and never read past the ceiling.
#[derive(Debug, Clone, Default)]
pub struct HttpMediaFetcher {
    http: Client,
}

impl HttpMediaFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

fn range_header(max_bytes: u64) -> String {
    format!("bytes=0-{}", max_bytes.saturating_sub(1))
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<FetchedMedia> {
        tracing::debug!("Fetching media {} (max {} bytes)", url, max_bytes);

        let mut response = self
            .http
            .get(url)
            .header(RANGE, range_header(max_bytes))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(
                PlatformError::Upload(format!("HTTP {} fetching {}", status, url)).into(),
            );
        }

        // A full response larger than the ceiling would upload a corrupt file
        let partial = status == StatusCode::PARTIAL_CONTENT;
        if !partial && response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(oversized(url, max_bytes).into());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PlatformError::Network(format!("Failed to read {}: {}", url, e)))?
        {
            let room = limit - bytes.len();
            if chunk.len() > room {
                if !partial {
                    return Err(oversized(url, max_bytes).into());
                }
                bytes.extend_from_slice(&chunk[..room]);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedMedia {
            bytes,
            content_type,
        })
    }
}

fn oversized(url: &str, max_bytes: u64) -> PlatformError {
    PlatformError::Upload(format!(
        "{} ignored the Range header and is larger than {} bytes",
        url, max_bytes
    ))
}
