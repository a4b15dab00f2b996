//! mirrorcast - Mirror a Mastodon account onto Bluesky

use clap::Parser;
use libmirrorcast::logging::{LogFormat, LoggingConfig, LOG_FORMAT_ENV, LOG_LEVEL_ENV};
use libmirrorcast::mirror::{self, MirrorOptions, DEFAULT_SOURCE_LIMIT};
use libmirrorcast::platforms::bluesky::BlueskyClient;
use libmirrorcast::platforms::mastodon::MastodonSource;
use libmirrorcast::platforms::media::HttpMediaFetcher;
use libmirrorcast::{Config, Result};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mirrorcast")]
#[command(version)]
#[command(about = "Mirror a Mastodon account onto Bluesky")]
#[command(long_about = "\
mirrorcast - Mirror a Mastodon account onto Bluesky

DESCRIPTION:
    mirrorcast reads the most recent statuses of a Mastodon account and
    republishes them on Bluesky. Text longer than 300 characters becomes a
    numbered reply thread; videos longer than 60 seconds are split into
    one post per segment. Posts already present in the Bluesky account's
    20 most recent posts are skipped, so running it repeatedly is safe.

    Each invocation performs one pass and exits. Schedule it with cron or
    a systemd timer.

USAGE:
    # Mirror the 20 most recent statuses
    mirrorcast

    # Show the records that would be published, without publishing
    mirrorcast --dry-run | jq .

CONFIGURATION:
    Environment variables (override the config file):
        BSKY_API              Bluesky PDS (default: https://bsky.social)
        BSKY_HANDLE           Bluesky handle (required)
        BSKY_PASSWORD         Bluesky app password (required)
        MASTODON_API          Mastodon instance (default: https://mastodon.social)
        MASTODON_HANDLE       Mastodon handle, e.g. @alice@mastodon.social (required)
        MASTODON_ACCOUNT_ID   Numeric Mastodon account id (required)
        ALT_CARD_IMG          Fallback image for media that fails to upload
        GIVEAWAYS             Comma-separated disclaimer keywords (default: retweet)
        DRY_RUN               true/false

    Config file: ~/.config/mirrorcast/config.toml (or MIRRORCAST_CONFIG)

EXIT CODES:
    0 - Success
    1 - Configuration, network or posting error
    2 - Authentication failed
")]
struct Cli {
    /// Print records as JSON instead of publishing them
    #[arg(long)]
    dry_run: bool,

    /// Number of recent source statuses to consider
    #[arg(long, value_name = "N", default_value_t = DEFAULT_SOURCE_LIMIT)]
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    limit: u32,

    /// Log output format (text, json, pretty)
    #[arg(long, env = LOG_FORMAT_ENV, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Minimum log level
    #[arg(long, env = LOG_LEVEL_ENV, default_value = "info")]
    log_level: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, cli.log_level.clone(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("Mirror pass failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let options = MirrorOptions {
        limit: cli.limit,
        dry_run: cli.dry_run || config.dry_run,
        fallback_image: config.alt_card_img.clone(),
        rules: config.sanitize_rules(),
    };
    if options.dry_run {
        info!("Dry run: records will be printed, nothing is published");
    }

    let source = MastodonSource::new(
        &config.mastodon.api,
        config.mastodon.account_id.clone(),
        None,
    )?;
    let mut destination = BlueskyClient::new(
        &config.bluesky.api,
        config.bluesky.handle.clone(),
        config.bluesky.password,
    );
    let fetcher = HttpMediaFetcher::new();

    let summary = mirror::run(&options, &source, &mut destination, &fetcher).await?;
    info!(
        "Done: {} source posts, {} published, {} already present, {} rejected",
        summary.posts, summary.published, summary.duplicates, summary.rejected
    );

    Ok(())
}
