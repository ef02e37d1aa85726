//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files. It is only consulted when the crawl obeys robots.txt.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::{product_token, ParsedRobots};

use crate::SpiderError;
use reqwest::Client;
use url::Url;

/// Fetches robots.txt for the origin of `url`
///
/// # Arguments
///
/// * `client` - The HTTP client to use (carries the user agent and proxy)
/// * `url` - Any URL on the origin whose robots.txt is wanted
///
/// # Returns
///
/// * `Ok(ParsedRobots)` - The parsed file, or allow-all when the server has none
/// * `Err(SpiderError)` - The request itself failed
pub async fn fetch_robots(client: &Client, url: &Url) -> Result<ParsedRobots, SpiderError> {
    let robots_url = url.join("/robots.txt")?;
    tracing::debug!("Fetching robots.txt: {}", robots_url);

    let response = client.get(robots_url.clone()).send().await?;
    let status = response.status();

    if !status.is_success() {
        tracing::debug!("No robots.txt at {} (HTTP {})", robots_url, status.as_u16());
        return Ok(ParsedRobots::allow_all());
    }

    let body = response.text().await?;
    Ok(ParsedRobots::from_content(&body))
}

