//! Mastodon source
//!
//! Reads an account's public timeline through megalodon and converts each
//! status into the neutral [`SourceStatus`] shape. Everything that touches
//! megalodon's entity types stays in this file.

use async_trait::async_trait;
use megalodon::entities::attachment::AttachmentType;
use megalodon::megalodon::GetAccountStatusesInputOptions;
use megalodon::{Megalodon, SNS};

use crate::error::{PlatformError, Result};
use crate::platforms::SourceFeed;
use crate::types::{MediaKind, SourceAttachment, SourceCard, SourceStatus};

/// Mastodon API page size ceiling
const MAX_PAGE_SIZE: u32 = 40;

pub struct MastodonSource {
    client: Box<dyn Megalodon + Send + Sync>,
    account_id: String,
}

impl MastodonSource {
    /// Create a source for `account_id` on `instance`.
    ///
    /// The instance may be given without a scheme ("mastodon.social").
    /// Public timelines need no token.
    pub fn new(instance: &str, account_id: String, access_token: Option<String>) -> Result<Self> {
        let client = megalodon::generator(
            SNS::Mastodon,
            normalize_instance_url(instance),
            access_token,
            None,
        )
        .map_err(|e| map_megalodon_error(e, "create client"))?;

        Ok(Self { client, account_id })
    }
}

fn normalize_instance_url(instance: &str) -> String {
    let trimmed = instance.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

fn convert_status(status: megalodon::entities::Status) -> SourceStatus {
    let attachments = status
        .media_attachments
        .into_iter()
        .map(|attachment| {
            let kind = match attachment.r#type {
                AttachmentType::Image => MediaKind::Image,
                AttachmentType::Video | AttachmentType::Gifv => MediaKind::Video,
                _ => MediaKind::Unsupported,
            };
            let original = attachment.meta.and_then(|meta| meta.original);
            SourceAttachment {
                kind: Some(kind),
                url: Some(attachment.url),
                preview_url: attachment.preview_url,
                description: attachment.description,
                width: original.as_ref().and_then(|o| o.width),
                height: original.as_ref().and_then(|o| o.height),
                duration: original.as_ref().and_then(|o| o.duration),
            }
        })
        .collect();

    let card = status.card.map(|card| SourceCard {
        url: non_empty(card.url),
        title: non_empty(card.title),
        description: non_empty(card.description),
        image: card.image,
    });

    SourceStatus {
        id: status.id,
        created_at: status.created_at,
        content: status.content,
        is_reblog: status.reblog.is_some(),
        attachments,
        card,
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

#[async_trait]
impl SourceFeed for MastodonSource {
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<SourceStatus>> {
        let options = GetAccountStatusesInputOptions {
            limit: Some(limit.min(MAX_PAGE_SIZE)),
            ..Default::default()
        };

        tracing::debug!(
            "Fetching up to {} statuses for account {}",
            limit,
            self.account_id
        );

        let response = self
            .client
            .get_account_statuses(self.account_id.clone(), Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "fetch statuses"))?;

        Ok(response.json.into_iter().map(convert_status).collect())
    }

    fn name(&self) -> &str {
        "mastodon"
    }
}

/// Map megalodon errors to PlatformError
fn map_megalodon_error(error: megalodon::error::Error, context: &str) -> PlatformError {
    classify_error(&error.to_string(), context)
}

/// Classify a megalodon error message.
///
/// - HTTP 401/403 → `Authentication`
/// - HTTP 404 → `Validation` (unknown account id)
/// - HTTP 429 → `RateLimit`
/// - anything else → `Network`
fn classify_error(error_str: &str, context: &str) -> PlatformError {
    let error_lower = error_str.to_lowercase();

    match extract_http_status(error_str) {
        Some(401) | Some(403) => PlatformError::Authentication(format!(
            "Mastodon authentication failed ({}): {}. \
                Suggestion: Public timelines need no token; check MASTODON_API points at the right instance.",
            context, error_str
        )),
        Some(404) => PlatformError::Validation(format!(
            "Mastodon account not found ({}): {}. \
                Suggestion: Check MASTODON_ACCOUNT_ID is the numeric account id, not the handle.",
            context, error_str
        )),
        Some(429) => PlatformError::RateLimit(format!(
            "Mastodon rate limit exceeded ({}): {}. Suggestion: Wait a few minutes before retrying.",
            context, error_str
        )),
        Some(500..=599) => PlatformError::Network(format!(
            "Mastodon server error ({}): {}. Suggestion: The instance may be experiencing issues.",
            context, error_str
        )),
        Some(_) => {
            PlatformError::Network(format!("Mastodon HTTP error ({}): {}", context, error_str))
        }
        None if error_lower.contains("rate limit") || error_lower.contains("too many requests") => {
            PlatformError::RateLimit(format!(
                "Mastodon rate limit exceeded ({}): {}",
                context, error_str
            ))
        }
        None if error_lower.contains("url") => PlatformError::Network(format!(
            "Invalid Mastodon instance URL ({}): {}. \
                Suggestion: It should be in the format 'https://mastodon.social'.",
            context, error_str
        )),
        None => PlatformError::Network(format!(
            "Mastodon error ({}): {}. \
                Suggestion: Check your network connection and instance availability.",
            context, error_str
        )),
    }
}

/// Pull an HTTP status out of an error message like "HTTP 401", "status 403"
/// or "Error: 429: ...".
fn extract_http_status(error_str: &str) -> Option<u16> {
    let in_range = |code: u16| (100..=599).contains(&code).then_some(code);

    for prefix in ["HTTP ", "status ", "code: ", "status_code: "] {
        if let Some(pos) = error_str.find(prefix) {
            let code = error_str
                .get(pos + prefix.len()..pos + prefix.len() + 3)
                .and_then(|s| s.parse::<u16>().ok())
                .and_then(in_range);
            if code.is_some() {
                return code;
            }
        }
    }

    let bytes = error_str.as_bytes();
    bytes.windows(4).enumerate().find_map(|(i, w)| {
        let standalone = i == 0 || !bytes[i - 1].is_ascii_digit();
        let shaped = w[..3].iter().all(u8::is_ascii_digit) && (w[3] == b':' || w[3] == b' ');
        if !(standalone && shaped) {
            return None;
        }
        std::str::from_utf8(&w[..3])
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .and_then(in_range)
    })
}
