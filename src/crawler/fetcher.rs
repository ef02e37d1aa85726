//! HTTP fetcher implementation
//!
//! This module performs the HTTP exchange for a single [`UrlTask`]:
//! - Building the HTTP client (user agent, `From`, proxy, timeouts)
//! - Installing the shared cookie store as the client's cookie provider
//! - Following redirects manually so every hop is counted and scope-checked
//! - Classifying transport failures into [`FetchError`]

use crate::config::{proxy_url, CrawlConfig};
use crate::crawler::cookies::CookieJar;
use crate::crawler::frontier::UrlTask;
use crate::robots::RobotsCache;
use crate::url::{normalize_url, UrlFilter};
use crate::{ConfigError, SpiderError};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, FROM, LOCATION, SET_COOKIE};
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Per-request failure, recorded on the [`Page`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Redirect limit of {limit} exceeded")]
    RedirectLimit { limit: u32 },

    #[error("Redirect loop detected at {url}")]
    RedirectLoop { url: String },

    #[error("Invalid redirect target: {0}")]
    InvalidRedirect(String),

    #[error("Redirect to {url} leaves the crawl scope")]
    RedirectOutOfScope { url: String },

    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Result of fetching one task
///
/// A failed fetch still produces a page: `error` is set, `status` and `body`
/// are absent.
#[derive(Debug, Clone)]
pub struct Page {
    /// The URL that was scheduled
    pub url: Url,

    /// The URL that produced the response, after redirects
    pub final_url: Url,

    /// Link-hops from the seed
    pub depth: u32,

    pub status: Option<u16>,

    /// Response headers (case-insensitive lookup)
    pub headers: HeaderMap,

    pub body: Option<String>,

    pub error: Option<FetchError>,
}

impl Page {
    fn failed(task: &UrlTask, final_url: Url, error: FetchError) -> Self {
        Self {
            url: task.url.clone(),
            final_url,
            depth: task.depth,
            status: None,
            headers: HeaderMap::new(),
            body: None,
            error: Some(error),
        }
    }

    /// Returns true if the HTTP exchange completed
    pub fn is_fetched(&self) -> bool {
        self.error.is_none()
    }

    /// Looks up a response header as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Returns true if links should be extracted from the body
    ///
    /// A missing `Content-Type` is treated as HTML.
    pub fn is_html(&self) -> bool {
        match self.content_type() {
            Some(content_type) => {
                let content_type = content_type.to_ascii_lowercase();
                content_type.contains("text/html") || content_type.contains("application/xhtml")
            }
            None => true,
        }
    }

    /// All `Set-Cookie` values of the response, one per line
    pub fn set_cookie_header(&self) -> String {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are disabled on the client; [`HttpFetcher`] follows them itself.
/// `cookies` is the crawl-wide store every request reads from and, when
/// cookies are accepted, writes to.
///
/// # Example
///
/// ```
/// use arachni_spider::config::CrawlConfig;
/// use arachni_spider::crawler::{build_http_client, CookieJar};
/// use std::sync::Arc;
///
/// let config = CrawlConfig {
///     authed_by: Some("Jane Doe <jane@example.com>".to_string()),
///     ..CrawlConfig::default()
/// };
/// let cookies = Arc::new(CookieJar::new(config.accept_cookies));
/// assert!(build_http_client(&config, cookies).is_ok());
/// ```
pub fn build_http_client(config: &CrawlConfig, cookies: Arc<CookieJar>) -> Result<Client, SpiderError> {
    let mut headers = HeaderMap::new();
    if let Some(who) = &config.authed_by {
        let value = HeaderValue::from_str(who)
            .map_err(|e| ConfigError::Validation(format!("authed-by is not a valid header: {}", e)))?;
        headers.insert(FROM, value);
    }

    let timeout = config.request_timeout();
    let mut builder = Client::builder()
        .user_agent(config.effective_user_agent())
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none()) // Handle redirects manually
        .cookie_provider(cookies)
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy_url(config)? {
        let proxy = Proxy::all(proxy.as_str()).map_err(|e| ConfigError::InvalidProxy(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Fetches pages for the worker pool
///
/// Shared by all workers. Redirect targets go through the same scope filter
/// and robots.txt check as scheduled URLs.
pub struct HttpFetcher {
    client: Client,
    filter: UrlFilter,
    robots: Option<Arc<RobotsCache>>,
    redirect_limit: Option<u32>,
}

impl HttpFetcher {
    pub fn new(
        client: Client,
        filter: UrlFilter,
        robots: Option<Arc<RobotsCache>>,
        config: &CrawlConfig,
    ) -> Self {
        Self {
            client,
            filter,
            robots,
            redirect_limit: config.redirect_limit,
        }
    }

    /// Fetches a task, following redirects
    ///
    /// # Redirect Handling
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | 3xx with `Location` | Next hop, counted against the redirect limit |
    /// | More hops than `redirect_limit` | `FetchError::RedirectLimit` |
    /// | Target already seen in this chain | `FetchError::RedirectLoop` |
    /// | Target rejected by the scope filter or robots.txt | `FetchError::RedirectOutOfScope` |
    /// | Unparsable or non-HTTP(S) target | `FetchError::InvalidRedirect` |
    /// | 3xx without `Location` | Treated as the final response |
    ///
    /// Never fails: errors are returned on the page.
    pub async fn fetch(&self, task: &UrlTask) -> Page {
        let mut current = task.url.clone();
        let mut chain = HashSet::from([current.as_str().to_string()]);
        let mut hops = 0u32;

        loop {
            let response = match self.client.get(current.clone()).send().await {
                Ok(response) => response,
                Err(e) => return Page::failed(task, current, e.into()),
            };

            let status = response.status();
            let location = status
                .is_redirection()
                .then(|| response.headers().get(LOCATION))
                .flatten();

            if let Some(location) = location {
                let target = location
                    .to_str()
                    .ok()
                    .and_then(|location| normalize_url(location, Some(&current)).ok());
                let Some(target) = target else {
                    let raw = String::from_utf8_lossy(location.as_bytes()).into_owned();
                    return Page::failed(task, current, FetchError::InvalidRedirect(raw));
                };

                hops += 1;
                if let Some(limit) = self.redirect_limit.filter(|limit| hops > *limit) {
                    tracing::debug!("Redirect limit reached for {} at {}", task.url, target);
                    return Page::failed(task, current, FetchError::RedirectLimit { limit });
                }
                if !chain.insert(target.as_str().to_string()) {
                    let url = target.to_string();
                    return Page::failed(task, current, FetchError::RedirectLoop { url });
                }
                if !self.allows_hop(&target).await {
                    tracing::debug!("Not following redirect {} -> {}", current, target);
                    let url = target.to_string();
                    return Page::failed(task, current, FetchError::RedirectOutOfScope { url });
                }

                tracing::debug!("Following redirect {} -> {}", current, target);
                current = target;
                continue;
            }

            let headers = response.headers().clone();
            return match response.text().await {
                Ok(body) => Page {
                    url: task.url.clone(),
                    final_url: current,
                    depth: task.depth,
                    status: Some(status.as_u16()),
                    headers,
                    body: Some(body),
                    error: None,
                },
                Err(e) => Page::failed(task, current, FetchError::Body(e.to_string())),
            };
        }
    }

    async fn allows_hop(&self, target: &Url) -> bool {
        if !self.filter.accepts(target) {
            return false;
        }
        match &self.robots {
            Some(robots) => robots.is_allowed(target).await,
            None => true,
        }
    }
}
