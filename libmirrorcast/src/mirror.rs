//! One mirror pass
//!
//! Log in, snapshot the destination feed, read recent source posts, then
//! publish every post's thread in order. Source posts and units are handled
//! strictly one after another.

use tracing::{info, warn};

use crate::dedup::{Candidate, DuplicateGuard};
use crate::error::Result;
use crate::normalize::{normalize_batch, SanitizeRules};
use crate::platforms::{Destination, MediaFetcher, SourceFeed};
use crate::publisher::{PublishOutcome, Publisher};
use crate::thread::{compose_thread, ReplyRefs};
use crate::types::PostContent;

/// How many destination posts the duplicate guard sees
pub const FEED_SNAPSHOT_SIZE: u8 = 20;

/// Default number of source posts read per run
pub const DEFAULT_SOURCE_LIMIT: u32 = 20;

#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub limit: u32,
    pub dry_run: bool,
    pub fallback_image: Option<String>,
    pub rules: SanitizeRules,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SOURCE_LIMIT,
            dry_run: false,
            fallback_image: None,
            rules: SanitizeRules::default(),
        }
    }
}

/// Unit counts for a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Source posts considered (boosts excluded)
    pub posts: usize,
    pub published: usize,
    pub duplicates: usize,
    /// Units skipped because their record failed validation
    pub rejected: usize,
}

/// Run one mirror pass.
///
/// # Errors
///
/// The first unrecoverable failure (authentication, source or feed reads,
/// media, destination rejections) aborts the run. Units already published
/// stay published; the next run skips them as duplicates.
pub async fn run(
    options: &MirrorOptions,
    source: &dyn SourceFeed,
    destination: &mut dyn Destination,
    fetcher: &dyn MediaFetcher,
) -> Result<RunSummary> {
    destination.authenticate().await?;
    let destination: &dyn Destination = destination;

    let guard = DuplicateGuard::new(destination.recent_posts(FEED_SNAPSHOT_SIZE).await?);
    info!(
        "Loaded {} recent {} posts for duplicate detection",
        guard.len(),
        destination.name()
    );

    let statuses = source.fetch_recent(options.limit).await?;
    let posts = normalize_batch(&statuses, &options.rules);
    info!(
        "Fetched {} {} statuses, {} to mirror",
        statuses.len(),
        source.name(),
        posts.len()
    );

    let publisher = Publisher::new(destination, fetcher)
        .with_fallback_image(options.fallback_image.clone())
        .with_dry_run(options.dry_run);

    let mut summary = RunSummary::default();
    for post in &posts {
        summary.posts += 1;
        mirror_post(post, &guard, &publisher, &mut summary).await?;
    }

    info!(
        "Mirror pass complete: {} published, {} duplicates, {} rejected",
        summary.published, summary.duplicates, summary.rejected
    );
    Ok(summary)
}

async fn mirror_post(
    post: &PostContent,
    guard: &DuplicateGuard,
    publisher: &Publisher<'_>,
    summary: &mut RunSummary,
) -> Result<()> {
    let units = compose_thread(post);
    let mut refs: Option<ReplyRefs> = None;

    for (i, unit) in units.iter().enumerate() {
        let candidate = Candidate {
            text: &unit.text,
            reply_parent: if unit.is_reply {
                refs.as_ref().map(|r| r.parent.uri.as_str())
            } else {
                None
            },
        };

        if let Some(existing) = guard.find(&candidate) {
            info!(
                "Unit {}/{} already published as {}, skipping",
                i + 1,
                units.len(),
                existing.uri
            );
            summary.duplicates += 1;
            refs = Some(ReplyRefs::advance(refs, existing.strong_ref()));
            continue;
        }

        match publisher.publish(unit, post.created_at, refs.as_ref()).await? {
            PublishOutcome::Published(published) => {
                summary.published += 1;
                refs = Some(ReplyRefs::advance(refs, published));
            }
            PublishOutcome::Rejected(reason) => {
                warn!("Unit {}/{} rejected: {}", i + 1, units.len(), reason);
                summary.rejected += 1;
            }
        }
    }

    Ok(())
}
