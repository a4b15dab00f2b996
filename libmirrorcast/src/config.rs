//! Configuration management for Mirrorcast
//!
//! Settings come from an optional TOML file overlaid by environment
//! variables. Environment always wins; the file is a convenience for
//! long-lived deployments.
//!
//! ```toml
//! [bluesky]
//! api = "https://bsky.social"
//! handle = "alice.bsky.social"
//!
//! [mastodon]
//! api = "https://mastodon.social"
//! handle = "@alice@mastodon.social"
//! account_id = "109999999999999999"
//!
//! [mirror]
//! giveaways = ["retweet", "giveaway"]
//! ```

use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::normalize::SanitizeRules;

pub const CONFIG_PATH_ENV: &str = "MIRRORCAST_CONFIG";

pub const DEFAULT_BSKY_API: &str = "https://bsky.social";
pub const DEFAULT_MASTODON_API: &str = "https://mastodon.social";
pub const DEFAULT_GIVEAWAYS: &str = "retweet";

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub bluesky: BlueskySection,
    pub mastodon: MastodonSection,
    pub mirror: MirrorSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BlueskySection {
    pub api: Option<String>,
    pub handle: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MastodonSection {
    pub api: Option<String>,
    pub handle: Option<String>,
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MirrorSection {
    pub alt_card_img: Option<String>,
    pub giveaways: Option<Vec<String>>,
    pub dry_run: Option<bool>,
}

impl FileConfig {
    /// Load from `path`; a missing file is an empty configuration.
    pub fn load_optional(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: FileConfig = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }
}

#[derive(Debug)]
pub struct BlueskyConfig {
    pub api: String,
    pub handle: String,
    pub password: SecretString,
}

#[derive(Debug, Clone)]
pub struct MastodonConfig {
    pub api: String,
    /// Full handle, e.g. `@alice@mastodon.social`
    pub handle: String,
    pub account_id: String,
}

/// Resolved runtime configuration
#[derive(Debug)]
pub struct Config {
    pub bluesky: BlueskyConfig,
    pub mastodon: MastodonConfig,
    /// Fallback image for failed image and card-thumbnail uploads
    pub alt_card_img: Option<String>,
    pub giveaways: Vec<String>,
    pub dry_run: bool,
}

impl Config {
    /// Load from the default config file location and the process environment
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = resolve_config_path(&lookup)?;
        let file = FileConfig::load_optional(&path)?;
        let config = Self::from_sources(file, &lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment values onto a file configuration
    pub fn from_sources<F>(file: FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bsky_handle = required(env("BSKY_HANDLE").or(file.bluesky.handle), "BSKY_HANDLE")?;
        let bsky_password =
            required(env("BSKY_PASSWORD").or(file.bluesky.password), "BSKY_PASSWORD")?;
        let mastodon_handle = required(
            env("MASTODON_HANDLE").or(file.mastodon.handle),
            "MASTODON_HANDLE",
        )?;
        let account_id = required(
            env("MASTODON_ACCOUNT_ID").or(file.mastodon.account_id),
            "MASTODON_ACCOUNT_ID",
        )?;

        let giveaways = match env("GIVEAWAYS") {
            Some(list) => split_list(&list),
            None => file
                .mirror
                .giveaways
                .unwrap_or_else(|| split_list(DEFAULT_GIVEAWAYS)),
        };

        let dry_run = match env("DRY_RUN") {
            Some(value) => parse_bool("DRY_RUN", &value)?,
            None => file.mirror.dry_run.unwrap_or(false),
        };

        Ok(Self {
            bluesky: BlueskyConfig {
                api: env("BSKY_API")
                    .or(file.bluesky.api)
                    .unwrap_or_else(|| DEFAULT_BSKY_API.to_string()),
                handle: bsky_handle.trim().trim_start_matches('@').to_string(),
                password: SecretString::from(bsky_password),
            },
            mastodon: MastodonConfig {
                api: env("MASTODON_API")
                    .or(file.mastodon.api)
                    .unwrap_or_else(|| DEFAULT_MASTODON_API.to_string()),
                handle: mastodon_handle.trim().to_string(),
                account_id: account_id.trim().to_string(),
            },
            alt_card_img: env("ALT_CARD_IMG").or(file.mirror.alt_card_img),
            giveaways,
            dry_run,
        })
    }

    /// Check values that would otherwise only fail once the run is underway.
    pub fn validate(&self) -> Result<()> {
        check_url("BSKY_API", &self.bluesky.api)?;
        check_url("MASTODON_API", &self.mastodon.api)?;
        if let Some(img) = &self.alt_card_img {
            check_url("ALT_CARD_IMG", img)?;
        }

        if !self.mastodon.account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue {
                name: "MASTODON_ACCOUNT_ID".to_string(),
                message: format!(
                    "expected a numeric account id, got '{}'",
                    self.mastodon.account_id
                ),
            }
            .into());
        }

        if !self.bluesky.handle.contains('.') {
            return Err(ConfigError::InvalidValue {
                name: "BSKY_HANDLE".to_string(),
                message: format!(
                    "expected a domain handle such as alice.bsky.social, got '{}'",
                    self.bluesky.handle
                ),
            }
            .into());
        }

        Ok(())
    }

    /// Rewriting rules for source content
    pub fn sanitize_rules(&self) -> SanitizeRules {
        SanitizeRules::new(&self.mastodon.handle, &self.bluesky.handle, &self.giveaways)
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value.ok_or_else(|| ConfigError::MissingField(name.to_string()).into())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("expected true or false, got '{}'", other),
        }
        .into()),
    }
}

fn check_url(name: &str, value: &str) -> Result<()> {
    if value.starts_with("https://") || value.starts_with("http://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("expected an http(s) URL, got '{}'", value),
        }
        .into())
    }
}

/// Resolve the configuration file path following XDG conventions
pub fn resolve_config_path<F>(lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("mirrorcast").join("config.toml"))
}
