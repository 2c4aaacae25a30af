//! synd-post - Publish a blog post to every configured platform

use anyhow::{Context, Result};
use clap::Parser;
use libsyndicast::credentials::ProcessEnv;
use libsyndicast::logging::LoggingConfig;
use libsyndicast::{
    Config, MultiPlatformPublisher, Platform, PostMetadata, PublishMode, PublishReport,
    SyndicastError,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "synd-post")]
#[command(version, about = "Publish a blog post to every configured platform")]
#[command(long_about = r#"Publish a blog post to every configured platform.

The post is described by a JSON metadata file (slug, title, description, tags,
publishedDate, canonicalUrl, ...) and a markdown body read from --body or stdin.
Each platform gets its own adapted rendering. Platforms that already have the
post in the publish log are skipped unless --force is given.

Credentials are read from environment variables, never from the config file:
    DEVTO_API_KEY, MEDIUM_INTEGRATION_TOKEN, HASHNODE_TOKEN,
    HASHNODE_PUBLICATION_ID, TWITTER_ACCESS_TOKEN, LINKEDIN_ACCESS_TOKEN,
    TYPEFULLY_API_KEY, TYPEFULLY_SOCIAL_SET_ID, NEWSLETTER_PROVIDER and the
    provider's own variables.

EXAMPLES:
    # Publish to the default platforms from the config file
    synd-post --metadata post.json --body post.md

    # Body from stdin, two platforms
    cat post.md | synd-post --metadata post.json -p devto -p hashnode

    # Check formatting and credentials without touching any API
    synd-post --metadata post.json --body post.md --dry-run

    # Create drafts where the platform supports them
    synd-post --metadata post.json --body post.md --staged

    # Machine-readable report
    synd-post --metadata post.json --body post.md --format json | jq '.results[]'

EXIT CODES:
    0 - Every platform succeeded (or was already published)
    1 - At least one platform failed
    2 - A platform rejected its credentials
    3 - Invalid input (metadata, body, platform name)
"#)]
struct Cli {
    /// JSON file with the post metadata
    #[arg(short, long, value_name = "FILE")]
    metadata: PathBuf,

    /// Markdown body (reads from stdin if not provided or "-")
    #[arg(short, long, value_name = "FILE")]
    body: Option<PathBuf>,

    /// Target platform; repeat for several (default: [defaults] platforms)
    #[arg(short, long = "platform", value_name = "PLATFORM")]
    platforms: Vec<String>,

    /// Publish mode
    #[arg(long, default_value = "live", value_name = "MODE")]
    #[arg(value_parser = ["live", "dry-run", "staged"])]
    mode: String,

    /// Shorthand for --mode dry-run
    #[arg(long, conflicts_with_all = ["staged", "mode"])]
    dry_run: bool,

    /// Shorthand for --mode staged
    #[arg(long, conflicts_with = "mode")]
    staged: bool,

    /// Publish again even where the log says it is already published
    #[arg(long)]
    force: bool,

    /// Overall deadline per platform, e.g. "90s" or "5m" (overrides config)
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    deadline: Option<Duration>,

    /// Configuration file (default: $SYNDICAST_CONFIG or ~/.config/syndicast/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn publish_mode(&self) -> Result<PublishMode> {
        if self.dry_run {
            return Ok(PublishMode::DryRun);
        }
        if self.staged {
            return Ok(PublishMode::Staged);
        }
        self.mode
            .parse()
            .map_err(|message: String| SyndicastError::InvalidInput(message).into())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    LoggingConfig::from_env(cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<SyndicastError>()
                .map(SyndicastError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config =
        Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(deadline) = cli.deadline {
        config.defaults.publish_deadline_secs = deadline.as_secs().max(1);
    }

    let mode = cli.publish_mode()?;
    let meta = read_metadata(&cli.metadata)?;
    let body = read_body(cli.body.as_deref())?;
    let meta = meta.measure(&body);

    let platforms = if cli.platforms.is_empty() {
        config.default_platforms()?
    } else {
        parse_platforms(&cli.platforms)?
    };
    if platforms.is_empty() {
        return Err(SyndicastError::InvalidInput(
            "No platforms selected; pass --platform or set [defaults] platforms".to_string(),
        )
        .into());
    }

    let cancel = CancellationToken::new();
    install_signal_handler(cancel.clone());

    let publisher = MultiPlatformPublisher::from_config(&config, &ProcessEnv, &platforms, mode, cancel)?;
    let report = publisher.publish_all(&meta, &body, cli.force).await;

    match cli.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }

    Ok(report_exit_code(&report))
}

fn read_metadata(path: &Path) -> Result<PostMetadata> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        SyndicastError::InvalidInput(format!("Cannot read metadata {}: {}", path.display(), e))
    })?;
    let meta: PostMetadata = serde_json::from_str(&raw).map_err(|e| {
        SyndicastError::InvalidInput(format!("Invalid metadata {}: {}", path.display(), e))
    })?;
    if meta.slug.trim().is_empty() {
        return Err(SyndicastError::InvalidInput("Metadata slug is empty".to_string()).into());
    }
    Ok(meta)
}

fn read_body(path: Option<&Path>) -> Result<String> {
    let body = match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path).map_err(|e| {
            SyndicastError::InvalidInput(format!("Cannot read body {}: {}", path.display(), e))
        })?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| SyndicastError::InvalidInput(format!("Cannot read stdin: {}", e)))?;
            buffer
        }
    };

    if body.trim().is_empty() {
        return Err(SyndicastError::InvalidInput("Post body is empty".to_string()).into());
    }
    Ok(body)
}

fn parse_platforms(names: &[String]) -> Result<Vec<Platform>> {
    let mut platforms = Vec::new();
    for name in names.iter().flat_map(|n| n.split(',')) {
        let platform: Platform = name.trim().parse().map_err(SyndicastError::InvalidInput)?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

fn print_text(report: &PublishReport) {
    for result in &report.results {
        let symbol = if result.success { "✓" } else { "✗" };
        let detail = if result.success {
            result.url.clone().unwrap_or_default()
        } else {
            result.error.clone().unwrap_or_default()
        };
        let mut flags = Vec::new();
        if result.metadata.get("skipped").is_some() {
            flags.push("skipped");
        }
        if result.metadata.get("dryRun").is_some() {
            flags.push("dry run");
        }
        if result.partial {
            flags.push("partial");
        }
        if flags.is_empty() {
            println!("{} {}: {}", symbol, result.platform, detail);
        } else {
            println!("{} {}: {} ({})", symbol, result.platform, detail, flags.join(", "));
        }
    }
    println!("{}", report.summary);
}

fn report_exit_code(report: &PublishReport) -> i32 {
    if report.all_succeeded() {
        0
    } else if report
        .results
        .iter()
        .any(|r| r.error_kind.as_deref() == Some("authentication"))
    {
        2
    } else {
        1
    }
}

/// Cancel in-flight publishes on SIGINT / SIGTERM
#[cfg(unix)]
fn install_signal_handler(cancel: CancellationToken) {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            tracing::warn!("Signal setup failed, Ctrl-C will not cancel cleanly: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            tracing::info!(signal, "Received shutdown signal, cancelling publishes");
            cancel.cancel();
        }
    });
}

#[cfg(not(unix))]
fn install_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, cancelling publishes");
            cancel.cancel();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platforms_accepts_commas_and_repeats() {
        let names = vec!["devto,medium".to_string(), "devto".to_string(), "x".to_string()];
        let platforms = parse_platforms(&names).unwrap();
        assert_eq!(
            platforms,
            vec![Platform::DevTo, Platform::Medium, Platform::Twitter]
        );
    }

    #[test]
    fn test_unknown_platform_is_invalid_input() {
        let err = parse_platforms(&["myspace".to_string()]).unwrap_err();
        let code = err
            .downcast_ref::<SyndicastError>()
            .map(SyndicastError::exit_code);
        assert_eq!(code, Some(3));
    }

    #[test]
    fn test_mode_shorthands() {
        let cli = Cli::parse_from(["synd-post", "--metadata", "m.json", "--dry-run"]);
        assert_eq!(cli.publish_mode().unwrap(), PublishMode::DryRun);
        let cli = Cli::parse_from(["synd-post", "--metadata", "m.json", "--staged"]);
        assert_eq!(cli.publish_mode().unwrap(), PublishMode::Staged);
        let cli = Cli::parse_from(["synd-post", "--metadata", "m.json"]);
        assert_eq!(cli.publish_mode().unwrap(), PublishMode::Live);
    }
}
