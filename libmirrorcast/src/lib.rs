//! Mirrorcast - mirror a Mastodon account onto Bluesky
//!
//! The pipeline turns each source status into one or more destination posts:
//! content is sanitized ([`normalize`]), long videos are cut into segments
//! ([`video`]), long text is split into numbered chunks ([`chunker`]), and
//! the pieces are composed into a reply chain ([`thread`]). Each unit is
//! checked against the destination's recent feed ([`dedup`]) before the
//! [`publisher`] uploads its media and submits the record.

pub mod chunker;
pub mod config;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod normalize;
pub mod platforms;
pub mod publisher;
pub mod record;
pub mod richtext;
pub mod thread;
pub mod types;
pub mod video;

// Re-export commonly used types
pub use config::Config;
pub use error::{ConfigError, MirrorError, PlatformError, Result};
pub use mirror::{run, MirrorOptions, RunSummary};
pub use record::PostRecord;
pub use thread::{compose_thread, ReplyRefs, ThreadUnit};
pub use types::{PostContent, SourceStatus, StrongRef};
