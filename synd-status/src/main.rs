use anyhow::{Context, Result};
use clap::Parser;
use libsyndicast::publish_log::{PublishLog, PublishLogEntry};
use libsyndicast::{Config, Platform, PublishLogStore, SyndicastError};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "synd-status")]
#[command(version, about = "Query the publish log for a blog post")]
#[command(long_about = r#"Query the publish log for a blog post.

Reads <log dir>/<slug>/publish-log.json, the record synd-post keeps of where a
post went, and prints one line per platform.

EXAMPLES:
    # Everything recorded for a post
    synd-status hello-world

    # One platform, as JSON
    synd-status hello-world --platform devto --format json

    # Gate a script on the post being live everywhere it should be
    synd-status hello-world --check -p devto -p hashnode && echo "all live"

    # Published URLs only
    synd-status hello-world --format json | jq -r '.[] | select(.published) | .url'

EXIT CODES:
    0 - Success (with --check: published on every requested platform)
    1 - Error, or with --check: missing on at least one platform
    3 - Invalid input (slug, platform name)
"#)]
struct Args {
    /// Post slug
    slug: String,

    /// Platform to show; repeat for several (default: all recorded)
    #[arg(short, long = "platform", value_name = "PLATFORM")]
    platforms: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Exit 1 unless the post is published on every requested platform
    /// (default for --check: [defaults] platforms)
    #[arg(long)]
    check: bool,

    /// Configuration file (default: $SYNDICAST_CONFIG or ~/.config/syndicast/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Publish log directory (overrides config)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match run(args).await {
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

async fn run(args: Args) -> Result<i32> {
    let config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    let log_dir = args.log_dir.clone().unwrap_or_else(|| config.log_dir());
    let store = PublishLogStore::new(log_dir);

    let requested = parse_platforms(&args.platforms)?;
    // Surface a bad slug as invalid input rather than "not published"
    store
        .log_path(&args.slug)
        .map_err(|e| SyndicastError::InvalidInput(e.to_string()))?;

    if args.check {
        let platforms = if requested.is_empty() {
            config.default_platforms()?
        } else {
            requested
        };
        return check(&store, &args.slug, &platforms, &args.format).await;
    }

    let log = store.read(&args.slug).await?;
    let log = filter_log(log, &requested);
    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&log)?),
        _ => print_text(&args.slug, &log),
    }
    Ok(0)
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

fn filter_log(log: PublishLog, requested: &[Platform]) -> PublishLog {
    if requested.is_empty() {
        return log;
    }
    log.into_iter()
        .filter(|(name, _)| requested.iter().any(|p| p.as_str() == name))
        .collect()
}

/// Fail-open reading: unreadable logs count as not published
async fn check(
    store: &PublishLogStore,
    slug: &str,
    platforms: &[Platform],
    format: &str,
) -> Result<i32> {
    let mut missing = Vec::new();
    let mut status = serde_json::Map::new();
    for &platform in platforms {
        let published = store.is_published(slug, platform).await;
        if !published {
            missing.push(platform.as_str());
        }
        status.insert(platform.as_str().to_string(), published.into());
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if missing.is_empty() {
        println!("'{}' is published on {} platform(s)", slug, platforms.len());
    } else {
        println!("'{}' is not published on: {}", slug, missing.join(", "));
    }

    Ok(if missing.is_empty() { 0 } else { 1 })
}

fn print_text(slug: &str, log: &PublishLog) {
    if log.is_empty() {
        println!("No publish records for '{}'", slug);
        return;
    }
    for (platform, entry) in log {
        println!("{}", describe(platform, entry));
    }
}

fn describe(platform: &str, entry: &PublishLogEntry) -> String {
    let symbol = if entry.published { "✓" } else { "✗" };
    let mut line = format!("{} {}", symbol, platform);
    if let Some(url) = &entry.url {
        line.push_str(&format!(": {}", url));
    }
    if let Some(at) = entry.published_at {
        line.push_str(&format!(" (published {})", at.format("%Y-%m-%d %H:%M:%S")));
    }
    if let Some(error) = &entry.error {
        line.push_str(&format!("\n    last error: {}", error));
    }
    line
}
