//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The frontier of scheduled URLs and its visited set
//! - HTTP fetching with cookies, proxying and manual redirects
//! - HTML parsing and link extraction
//! - The per-page callback pipeline
//! - Overall crawl coordination

mod cookies;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod pipeline;

pub use cookies::CookieJar;
pub use coordinator::Spider;
pub use fetcher::{build_http_client, FetchError, HttpFetcher, Page};
pub use frontier::{Frontier, UrlTask, VisitedSet};
pub use parser::extract_links;
pub use pipeline::{CallbackPipeline, HookError, PageHandler, PageHook};

use crate::config::CrawlConfig;
use crate::Result;

/// Runs a complete crawl operation
///
/// This is the main entry point for a crawl without handler or hooks. It
/// will:
/// 1. Validate the configuration and build the HTTP client
/// 2. Normalize and schedule the seed URL
/// 3. Fetch pages with `config.threads` workers
/// 4. Extract and follow links within the configured scope
/// 5. Return the sitemap
///
/// # Arguments
///
/// * `seed` - The URL the crawl starts from
/// * `config` - The crawl policy
///
/// # Returns
///
/// * `Ok(Vec<String>)` - Every delivered URL, once, in completion order
/// * `Err(SpiderError)` - Invalid configuration or seed URL
pub async fn crawl(seed: &str, config: CrawlConfig) -> Result<Vec<String>> {
    Spider::new(config)?.run(seed).await
}
