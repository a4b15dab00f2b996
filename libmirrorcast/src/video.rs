//! Video segmentation
//!
//! The destination caps a single post's video at [`SEGMENT_CEILING_SECS`].
//! Longer videos become an ordered run of segments, one per post, each
//! pointing back at the source file with a `#t=start,end` media fragment.

use crate::types::{VideoMetadata, VideoSegment};

/// Longest video a single destination post may carry, in seconds
pub const SEGMENT_CEILING_SECS: f64 = 60.0;

/// Most segments one video may produce. Longer durations are treated as
/// unknown.
pub const MAX_SEGMENTS: usize = 100;

/// Split a video into contiguous segments of at most `ceiling` seconds.
///
/// A missing or zero duration yields a single segment that stands for the
/// whole video, and so does a duration needing more than [`MAX_SEGMENTS`]
/// segments. Segment URLs are a pure function of the inputs, so segmenting
/// the same video twice gives byte-identical URLs.
pub fn segment_video(
    url: &str,
    duration: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    preview_url: Option<&str>,
    ceiling: f64,
) -> Vec<VideoSegment> {
    let duration = duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .filter(|d| ceiling > 0.0 && (d / ceiling).ceil() <= MAX_SEGMENTS as f64)
        .unwrap_or(0.0);
    let width = width.unwrap_or(0);
    let height = height.unwrap_or(0);

    let metadata = |start: f64, length: f64| VideoMetadata {
        width,
        height,
        duration: length,
        preview_url: preview_url
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}#t={}", p, start)),
    };

    if duration == 0.0 {
        return vec![VideoSegment {
            url: format!("{}#t=0", url),
            metadata: metadata(0.0, ceiling),
        }];
    }

    let count = (duration / ceiling).ceil() as usize;
    (0..count)
        .map(|i| {
            let start = i as f64 * ceiling;
            let end = if i + 1 == count {
                duration
            } else {
                (i + 1) as f64 * ceiling
            };
            VideoSegment {
                url: format!("{}#t={},{}", url, start, end),
                metadata: metadata(start, end - start),
            }
        })
        .collect()
}
