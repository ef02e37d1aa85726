//! Arachni spider entry point
//!
//! Crawls a site from a seed URL and prints the resulting sitemap.

use arachni_spider::config::{load_config_with_hash, CrawlConfig};
use arachni_spider::url::{normalize_url, UrlFilter};
use arachni_spider::Spider;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Arachni spider: maps every page reachable from a seed URL
///
/// The crawl honors depth, link-count and redirect limits, include/exclude
/// patterns and, optionally, robots.txt. Every visited URL is printed once,
/// one per line.
#[derive(Parser, Debug)]
#[command(name = "arachni-spider")]
#[command(version)]
#[command(about = "Crawls a site and prints its sitemap", long_about = None)]
struct Cli {
    /// Seed URL the crawl starts from
    #[arg(value_name = "URL")]
    url: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and seed and show the crawl policy without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            match load_config_with_hash(path) {
                Ok((config, hash)) => {
                    tracing::info!("Configuration loaded successfully (hash: {})", hash);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to load configuration: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => CrawlConfig::default(),
    };

    if cli.dry_run {
        handle_dry_run(&cli.url, &config)?;
    } else {
        handle_crawl(&cli.url, config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so the sitemap on stdout stays clean.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("arachni_spider=info,warn"),
            1 => EnvFilter::new("arachni_spider=debug,info"),
            2 => EnvFilter::new("arachni_spider=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and seed and shows the policy
fn handle_dry_run(seed: &str, config: &CrawlConfig) -> Result<(), Box<dyn std::error::Error>> {
    arachni_spider::config::validate(config)?;
    let seed_url = normalize_url(seed, None)?;
    let filter = UrlFilter::new(config, &seed_url)?;

    println!("=== Arachni Spider Dry Run ===\n");

    println!("Seed: {}", seed_url);
    println!("  Scope check: {:?}", filter.classify(&seed_url));

    println!("\nCrawl Policy:");
    println!("  Workers: {}", config.threads);
    println!("  Delay: {}ms", config.delay);
    println!("  Request timeout: {}ms", config.request_timeout);
    println!("  Depth limit: {}", describe_limit(config.depth_limit));
    println!("  Link count limit: {}", describe_limit(config.link_count_limit));
    println!("  Redirect limit: {}", describe_limit(config.redirect_limit));
    println!("  Follow subdomains: {}", config.follow_subdomains);
    println!("  Obey robots.txt: {}", config.obey_robots_txt);
    println!("  Discard page bodies: {}", config.discard_page_bodies);

    println!("\nRequests:");
    println!("  User agent: {}", config.effective_user_agent());
    println!("  Cookies: {}", config.cookies.len());
    if let Some(path) = &config.cookie_jar {
        println!("  Cookie file: {}", path.display());
    }
    println!("  Accept cookies: {}", config.accept_cookies);
    match arachni_spider::config::proxy_url(config)? {
        Some(proxy) => println!("  Proxy: {}://{}", proxy.scheme(), proxy.host_str().unwrap_or("")),
        None => println!("  Proxy: none"),
    }

    println!("\nInclude Patterns ({}):", config.include.len());
    for pattern in &config.include {
        println!("  - {}", pattern);
    }

    println!("\nExclude Patterns ({}):", config.exclude.len());
    for pattern in &config.exclude {
        println!("  - {}", pattern);
    }

    println!("\nRedundancy Rules ({}):", config.redundant.len());
    for rule in &config.redundant {
        println!("  - {} (max {})", rule.pattern, rule.count);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

fn describe_limit<T: std::fmt::Display>(limit: Option<T>) -> String {
    limit.map_or_else(|| "unbounded".to_string(), |limit| limit.to_string())
}

/// Handles the main crawl operation
///
/// Ctrl-C cancels the crawl; the partial sitemap is still printed.
async fn handle_crawl(seed: &str, config: CrawlConfig) -> Result<(), Box<dyn std::error::Error>> {
    let spider = Spider::new(config)?;

    let cancel = spider.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            cancel.cancel();
        }
    });

    match spider.run(seed).await {
        Ok(sitemap) => {
            tracing::info!("Crawl completed successfully ({} URLs)", sitemap.len());
            for url in sitemap {
                println!("{}", url);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
