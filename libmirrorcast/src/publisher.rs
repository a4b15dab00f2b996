//! Turning a thread unit into a published destination post
//!
//! For each unit the publisher uploads the embed's media, builds and
//! validates the `app.bsky.feed.post` record, then either submits it or (in
//! dry-run mode) prints it.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::error::{PlatformError, Result};
use crate::platforms::media::{MAX_IMAGE_BYTES, MAX_VIDEO_BYTES};
use crate::platforms::{Destination, MediaFetcher};
use crate::record::{
    AspectRatio, BlobRef, External, ExternalEmbed, ImageItem, ImagesEmbed, PostRecord,
    RecordEmbed, ReplyRef, VideoEmbed,
};
use crate::richtext::build_facets;
use crate::thread::{ReplyRefs, ThreadUnit, UnitEmbed};
use crate::types::{Card, Image, ImageMimeType, StrongRef, VideoSegment, VIDEO_MIME};

/// Alt text used when an image is replaced by the fallback
pub const FALLBACK_ALT: &str = "Fallback image";

/// What happened to one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The post exists on the destination (or was rendered, in dry-run mode)
    Published(StrongRef),
    /// The record failed validation and was not submitted
    Rejected(String),
}

pub struct Publisher<'a> {
    destination: &'a dyn Destination,
    fetcher: &'a dyn MediaFetcher,
    fallback_image: Option<String>,
    dry_run: bool,
    dry_run_count: AtomicUsize,
}

impl<'a> Publisher<'a> {
    pub fn new(destination: &'a dyn Destination, fetcher: &'a dyn MediaFetcher) -> Self {
        Self {
            destination,
            fetcher,
            fallback_image: None,
            dry_run: false,
            dry_run_count: AtomicUsize::new(0),
        }
    }

    /// Image substituted for any image or card thumbnail that fails to upload
    pub fn with_fallback_image(mut self, url: Option<String>) -> Self {
        self.fallback_image = url.filter(|u| !u.trim().is_empty());
        self
    }

    /// Render records on stdout instead of uploading and submitting them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Publish one unit.
    ///
    /// `refs` is the chain so far; it is attached as the record's `reply`
    /// only when the unit is a reply.
    ///
    /// # Errors
    ///
    /// Any failure other than record validation: media that can't be fetched
    /// or uploaded (after the fallback, for images) and destination rejections.
    pub async fn publish(
        &self,
        unit: &ThreadUnit,
        created_at: DateTime<Utc>,
        refs: Option<&ReplyRefs>,
    ) -> Result<PublishOutcome> {
        let record = self.build_record(unit, created_at, refs).await?;

        if let Err(e) = record.validate() {
            if e.is_validation() {
                warn!("Skipping unit that failed validation: {}", e);
                return Ok(PublishOutcome::Rejected(e.to_string()));
            }
            return Err(e);
        }

        if self.dry_run {
            return self.render(&record).map(PublishOutcome::Published);
        }

        let published = self.destination.create_post(&record).await?;
        info!("Published {}", published.uri);
        Ok(PublishOutcome::Published(published))
    }

    /// Build the record for a unit, uploading its embed media.
    pub async fn build_record(
        &self,
        unit: &ThreadUnit,
        created_at: DateTime<Utc>,
        refs: Option<&ReplyRefs>,
    ) -> Result<PostRecord> {
        let text = unit.text.trim().to_string();
        let mut record = PostRecord::new(
            text,
            created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        record.embed = match unit.embed() {
            UnitEmbed::Video(segment) => Some(self.video_embed(segment).await?),
            UnitEmbed::Images(images) => Some(self.images_embed(images).await?),
            UnitEmbed::Card(card) => Some(self.card_embed(card).await?),
            UnitEmbed::None => None,
        };

        if unit.is_reply {
            record.reply = refs.map(ReplyRef::from);
        }

        let facets = build_facets(&record.text, self.destination).await;
        if !facets.is_empty() {
            record.facets = Some(facets);
        }

        Ok(record)
    }

    async fn video_embed(&self, segment: &VideoSegment) -> Result<RecordEmbed> {
        // Video failures are never retried
        let video = self
            .upload(&segment.url, MAX_VIDEO_BYTES, VIDEO_MIME.to_string())
            .await?;
        Ok(RecordEmbed::Video(VideoEmbed {
            video,
            aspect_ratio: AspectRatio::from_dimensions(
                segment.metadata.width,
                segment.metadata.height,
            ),
        }))
    }

    async fn images_embed(&self, images: &[Image]) -> Result<RecordEmbed> {
        let uploads = images.iter().map(|image| async move {
            let (blob, replaced) = self.upload_image_with_fallback(&image.url).await?;
            Ok::<_, crate::error::MirrorError>(ImageItem {
                image: blob,
                alt: if replaced {
                    FALLBACK_ALT.to_string()
                } else {
                    image.alt.clone()
                },
            })
        });
        let images = try_join_all(uploads).await?;
        Ok(RecordEmbed::Images(ImagesEmbed { images }))
    }

    async fn card_embed(&self, card: &Card) -> Result<RecordEmbed> {
        let thumb = match &card.image {
            Some(url) => Some(self.upload_image_with_fallback(url).await?.0),
            None => None,
        };
        Ok(RecordEmbed::External(ExternalEmbed {
            external: External {
                uri: card.uri.clone(),
                title: card.title.clone(),
                description: card.description.clone(),
                thumb,
            },
        }))
    }

    /// Upload an image, retrying once with the fallback image if configured.
    ///
    /// Returns the blob and whether the fallback was used. A failing
    /// fallback is returned as the error.
    async fn upload_image_with_fallback(&self, url: &str) -> Result<(BlobRef, bool)> {
        match self.upload_image(url).await {
            Ok(blob) => Ok((blob, false)),
            Err(e) => match &self.fallback_image {
                Some(fallback) => {
                    warn!("Image {} failed ({}); using fallback {}", url, e, fallback);
                    Ok((self.upload_image(fallback).await?, true))
                }
                None => Err(e),
            },
        }
    }

    async fn upload_image(&self, url: &str) -> Result<BlobRef> {
        let guessed = ImageMimeType::from_url(url).unwrap_or(ImageMimeType::Jpeg);
        self.upload(url, MAX_IMAGE_BYTES, guessed.as_str().to_string())
            .await
    }

    /// Fetch `url` and upload it as a blob.
    ///
    /// The server's content type wins over `mime_type` for images.
    async fn upload(&self, url: &str, max_bytes: u64, mime_type: String) -> Result<BlobRef> {
        if self.dry_run {
            return Ok(BlobRef::new(format!("dry-run:{}", url), mime_type, 0));
        }

        let media = self.fetcher.fetch(url, max_bytes).await?;
        if media.bytes.is_empty() {
            return Err(PlatformError::Upload(format!("Empty response body from {}", url)).into());
        }

        let mime_type = if mime_type == VIDEO_MIME {
            mime_type
        } else {
            media
                .content_type
                .as_deref()
                .and_then(ImageMimeType::from_mime_str)
                .map(|m| m.as_str().to_string())
                .unwrap_or(mime_type)
        };

        debug!("Uploading {} ({} bytes, {})", url, media.bytes.len(), mime_type);
        self.destination.upload_blob(media.bytes, &mime_type).await
    }

    fn render(&self, record: &PostRecord) -> Result<StrongRef> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| PlatformError::Posting(format!("Failed to render record: {}", e)))?;
        println!("{}", json);

        let n = self.dry_run_count.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(StrongRef::new(
            format!("at://dry-run/app.bsky.feed.post/{}", n),
            format!("dry-run-{}", n),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{MockDestination, MockFetcher};
    use crate::types::VideoMetadata;
    use chrono::TimeZone;

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn unit(text: &str) -> ThreadUnit {
        ThreadUnit {
            text: text.to_string(),
            video: None,
            images: Vec::new(),
            card: None,
            is_reply: false,
        }
    }

    fn image(url: &str, alt: &str) -> Image {
        Image {
            url: url.to_string(),
            alt: alt.to_string(),
        }
    }

    async fn authenticated() -> MockDestination {
        let mut destination = MockDestination::new("me.bsky.social");
        destination.authenticate().await.unwrap();
        destination
    }

    #[tokio::test]
    async fn test_text_only_unit_is_published_trimmed() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        let publisher = Publisher::new(&destination, &fetcher);

        let outcome = publisher
            .publish(&unit("  hello world \n"), created_at(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, PublishOutcome::Published(_)));

        let posts = destination.posts();
        assert_eq!(posts[0].text, "hello world");
        assert_eq!(posts[0].created_at, "2024-05-01T12:00:00Z");
        assert!(posts[0].embed.is_none());
        assert!(posts[0].reply.is_none());
    }

    #[tokio::test]
    async fn test_images_use_server_content_type() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        fetcher.serve("https://m/a", vec![1; 8], Some("image/png"));
        fetcher.serve("https://m/b.gif", vec![2; 4], None);
        let publisher = Publisher::new(&destination, &fetcher);

        let mut u = unit("pics");
        u.images = vec![image("https://m/a", "first"), image("https://m/b.gif", "second")];
        publisher.publish(&u, created_at(), None).await.unwrap();

        let uploads = destination.uploads();
        assert_eq!(uploads.len(), 2);
        let mimes: Vec<&str> = uploads.iter().map(|u| u.mime_type.as_str()).collect();
        assert!(mimes.contains(&"image/png"));
        assert!(mimes.contains(&"image/gif"));

        match &destination.posts()[0].embed {
            Some(RecordEmbed::Images(embed)) => {
                assert_eq!(embed.images[0].alt, "first");
                assert_eq!(embed.images[1].alt, "second");
            }
            other => panic!("Expected images embed, got {:?}", other),
        }

        let limits: Vec<u64> = fetcher.requests().iter().map(|(_, max)| *max).collect();
        assert_eq!(limits, vec![MAX_IMAGE_BYTES, MAX_IMAGE_BYTES]);
    }

    #[tokio::test]
    async fn test_failed_image_falls_back_once() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        fetcher.fail("https://m/broken.jpg");
        let publisher = Publisher::new(&destination, &fetcher)
            .with_fallback_image(Some("https://m/fallback.png".to_string()));

        let mut u = unit("pic");
        u.images = vec![image("https://m/broken.jpg", "original alt")];
        publisher.publish(&u, created_at(), None).await.unwrap();

        match &destination.posts()[0].embed {
            Some(RecordEmbed::Images(embed)) => assert_eq!(embed.images[0].alt, FALLBACK_ALT),
            other => panic!("Expected images embed, got {:?}", other),
        }
        let urls: Vec<String> = fetcher.requests().into_iter().map(|(u, _)| u).collect();
        assert_eq!(urls, vec!["https://m/broken.jpg", "https://m/fallback.png"]);
    }

    #[tokio::test]
    async fn test_failing_fallback_raises() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        fetcher.fail("https://m/broken.jpg");
        fetcher.fail("https://m/fallback.png");
        let publisher = Publisher::new(&destination, &fetcher)
            .with_fallback_image(Some("https://m/fallback.png".to_string()));

        let mut u = unit("pic");
        u.images = vec![image("https://m/broken.jpg", "alt")];
        let err = publisher.publish(&u, created_at(), None).await.unwrap_err();

        assert!(!err.is_validation());
        assert_eq!(fetcher.requests().len(), 2);
        assert!(destination.posts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_image_without_fallback_raises() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        fetcher.fail("https://m/broken.jpg");
        let publisher = Publisher::new(&destination, &fetcher);

        let mut u = unit("pic");
        u.images = vec![image("https://m/broken.jpg", "alt")];
        assert!(publisher.publish(&u, created_at(), None).await.is_err());
        assert!(destination.posts().is_empty());
    }

    #[tokio::test]
    async fn test_video_failure_is_not_retried() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        fetcher.fail("https://m/v.mp4#t=0,60");
        let publisher = Publisher::new(&destination, &fetcher)
            .with_fallback_image(Some("https://m/fallback.png".to_string()));

        let mut u = unit("clip");
        u.video = Some(VideoSegment {
            url: "https://m/v.mp4#t=0,60".to_string(),
            metadata: VideoMetadata {
                width: 640,
                height: 480,
                duration: 60.0,
                preview_url: None,
            },
        });

        assert!(publisher.publish(&u, created_at(), None).await.is_err());
        assert_eq!(fetcher.requests().len(), 1);
        assert_eq!(fetcher.requests()[0].1, MAX_VIDEO_BYTES);
    }

    #[tokio::test]
    async fn test_video_embed_carries_aspect_ratio() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        let publisher = Publisher::new(&destination, &fetcher);

        let mut u = unit(" ");
        u.video = Some(VideoSegment {
            url: "https://m/v.mp4#t=60,120".to_string(),
            metadata: VideoMetadata {
                width: 1280,
                height: 720,
                duration: 60.0,
                preview_url: None,
            },
        });
        publisher.publish(&u, created_at(), None).await.unwrap();

        let post = &destination.posts()[0];
        assert_eq!(post.text, "");
        match &post.embed {
            Some(RecordEmbed::Video(embed)) => {
                assert_eq!(embed.video.mime_type, VIDEO_MIME);
                assert_eq!(
                    embed.aspect_ratio,
                    Some(AspectRatio {
                        width: 1280,
                        height: 720
                    })
                );
            }
            other => panic!("Expected video embed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_video_preview_is_not_uploaded() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        let publisher = Publisher::new(&destination, &fetcher);

        let mut u = unit("clip");
        u.video = Some(VideoSegment {
            url: "https://m/v.mp4#t=0,60".to_string(),
            metadata: VideoMetadata {
                width: 1280,
                height: 720,
                duration: 60.0,
                preview_url: Some("https://m/v.png#t=0".to_string()),
            },
        });
        publisher.publish(&u, created_at(), None).await.unwrap();

        let fetched: Vec<String> = fetcher.requests().into_iter().map(|(url, _)| url).collect();
        assert_eq!(fetched, vec!["https://m/v.mp4#t=0,60".to_string()]);
        assert_eq!(destination.uploads().len(), 1);

        let json = serde_json::to_value(&destination.posts()[0]).unwrap();
        assert_eq!(json["embed"]["$type"], "app.bsky.embed.video");
        assert!(json["embed"].get("thumb").is_none());
    }

    #[tokio::test]
    async fn test_card_without_image_has_no_thumb() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        let publisher = Publisher::new(&destination, &fetcher);

        let mut u = unit("read this");
        u.card = Some(Card {
            uri: "https://example.com".to_string(),
            title: "Example".to_string(),
            description: "An example".to_string(),
            image: None,
        });
        publisher.publish(&u, created_at(), None).await.unwrap();

        match &destination.posts()[0].embed {
            Some(RecordEmbed::External(embed)) => {
                assert_eq!(embed.external.uri, "https://example.com");
                assert!(embed.external.thumb.is_none());
            }
            other => panic!("Expected external embed, got {:?}", other),
        }
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_card_thumb_falls_back() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        fetcher.fail("https://example.com/og.png");
        let publisher = Publisher::new(&destination, &fetcher)
            .with_fallback_image(Some("https://m/fallback.png".to_string()));

        let mut u = unit("read this");
        u.card = Some(Card {
            uri: "https://example.com".to_string(),
            title: "Example".to_string(),
            description: String::new(),
            image: Some("https://example.com/og.png".to_string()),
        });
        publisher.publish(&u, created_at(), None).await.unwrap();

        match &destination.posts()[0].embed {
            Some(RecordEmbed::External(embed)) => assert!(embed.external.thumb.is_some()),
            other => panic!("Expected external embed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reply_attached_only_to_reply_units() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        let publisher = Publisher::new(&destination, &fetcher);
        let refs = ReplyRefs::advance(None, StrongRef::new("at://root", "cid-root"));

        publisher
            .publish(&unit("not a reply"), created_at(), Some(&refs))
            .await
            .unwrap();

        let mut reply = unit("a reply");
        reply.is_reply = true;
        publisher
            .publish(&reply, created_at(), Some(&refs))
            .await
            .unwrap();

        let posts = destination.posts();
        assert!(posts[0].reply.is_none());
        let reply_ref = posts[1].reply.as_ref().unwrap();
        assert_eq!(reply_ref.root.uri, "at://root");
        assert_eq!(reply_ref.parent.cid, "cid-root");
    }

    #[tokio::test]
    async fn test_validation_failure_is_rejected_not_raised() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        let publisher = Publisher::new(&destination, &fetcher);

        let outcome = publisher
            .publish(&unit(&"a".repeat(301)), created_at(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, PublishOutcome::Rejected(msg) if msg.contains("301")));

        let outcome = publisher.publish(&unit("   "), created_at(), None).await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Rejected(_)));

        assert!(destination.posts().is_empty());
    }

    #[tokio::test]
    async fn test_destination_rejection_raises() {
        let mut destination = MockDestination::post_failure("me.bsky.social", "InternalServerError");
        destination.authenticate().await.unwrap();
        let fetcher = MockFetcher::new();
        let publisher = Publisher::new(&destination, &fetcher);

        let err = publisher
            .publish(&unit("hello"), created_at(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InternalServerError"));
    }

    #[tokio::test]
    async fn test_dry_run_neither_uploads_nor_posts() {
        let destination = authenticated().await;
        let fetcher = MockFetcher::new();
        let publisher = Publisher::new(&destination, &fetcher).with_dry_run(true);

        let mut u = unit("pic");
        u.images = vec![image("https://m/a.png", "alt")];
        let first = publisher.publish(&u, created_at(), None).await.unwrap();
        let second = publisher.publish(&unit("more"), created_at(), None).await.unwrap();

        assert_eq!(
            first,
            PublishOutcome::Published(StrongRef::new(
                "at://dry-run/app.bsky.feed.post/1",
                "dry-run-1"
            ))
        );
        assert!(matches!(second, PublishOutcome::Published(r) if r.uri.ends_with("/2")));
        assert!(fetcher.requests().is_empty());
        assert!(destination.uploads().is_empty());
        assert!(destination.posts().is_empty());
    }

    #[tokio::test]
    async fn test_record_gets_facets() {
        let destination = authenticated().await;
        destination.add_handle("bob.bsky.social", "did:plc:bob");
        let fetcher = MockFetcher::new();
        let publisher = Publisher::new(&destination, &fetcher);

        let record = publisher
            .build_record(
                &unit("hey @bob.bsky.social see https://example.com #rust"),
                created_at(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(record.facets.map(|f| f.len()), Some(3));
    }
}
