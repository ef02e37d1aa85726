//! Robots.txt caching implementation
//!
//! robots.txt is fetched at most once per origin and shared by every worker.
//! Entries expire after 24 hours so that long crawls pick up changes.

use crate::robots::{fetch_robots, ParsedRobots};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use url::Url;

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new CachedRobots stamped with the current time
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached robots.txt is older than 24 hours
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::hours(24)
    }

    /// Returns how long ago the robots.txt was fetched
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    /// Checks if a URL is allowed according to the cached robots.txt
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.content.is_allowed(url, user_agent)
    }

    /// Gets the crawl delay from the cached robots.txt
    pub fn crawl_delay(&self, user_agent: &str) -> Option<std::time::Duration> {
        self.content.crawl_delay(user_agent)
    }
}

type Slot = Arc<OnceCell<Arc<CachedRobots>>>;

/// Lazily populated, shared robots.txt store keyed by origin
///
/// Concurrent lookups for the same origin wait on a single fetch.
pub struct RobotsCache {
    client: Client,
    user_agent: String,
    entries: Mutex<HashMap<String, Slot>>,
}

impl RobotsCache {
    /// Creates an empty cache that fetches with `client`
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the robots.txt policy for the URL's origin, fetching it if needed
    ///
    /// A failed fetch is cached as allow-all; it is never fatal.
    pub async fn get(&self, url: &Url) -> Arc<CachedRobots> {
        let origin = url.origin().ascii_serialization();

        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = entries.entry(origin.clone()).or_default();
            if slot.get().is_some_and(|cached| cached.is_stale()) {
                tracing::debug!("robots.txt for {} is stale, refetching", origin);
                *slot = Slot::default();
            }
            slot.clone()
        };

        slot.get_or_init(|| async {
            let robots = match fetch_robots(&self.client, url).await {
                Ok(robots) => robots,
                Err(e) => {
                    tracing::warn!("Failed to fetch robots.txt for {}: {} (allowing all)", origin, e);
                    ParsedRobots::allow_all()
                }
            };
            Arc::new(CachedRobots::new(robots))
        })
        .await
        .clone()
    }

    /// Checks a URL against its origin's robots.txt
    pub async fn is_allowed(&self, url: &Url) -> bool {
        self.get(url).await.is_allowed(url.as_str(), &self.user_agent)
    }

    /// Crawl delay requested by the URL's origin for our user agent
    pub async fn crawl_delay(&self, url: &Url) -> Option<std::time::Duration> {
        self.get(url).await.crawl_delay(&self.user_agent)
    }

    /// Number of origins with a cache slot
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no origin has been looked up yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
