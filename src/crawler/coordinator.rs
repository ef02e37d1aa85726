//! Crawler coordinator - main crawl orchestration logic
//!
//! This module wires the crawl together:
//! - Validating the configuration, loading cookies and building the HTTP client
//! - Seeding the frontier
//! - Running the fixed pool of fetch workers
//! - Watching for external cancellation
//! - Returning the sitemap once the frontier drains or the crawl terminates

use crate::config::{validate, CrawlConfig};
use crate::crawler::cookies::CookieJar;
use crate::crawler::fetcher::{build_http_client, HttpFetcher, Page};
use crate::crawler::frontier::Frontier;
use crate::crawler::pipeline::{CallbackPipeline, HookError, PageHandler, PageHook};
use crate::robots::RobotsCache;
use crate::state::{CrawlState, LimitEnforcer, Sitemap};
use crate::url::{normalize_url, UrlFilter};
use crate::{Result, SpiderError};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A configured crawl, ready to run
///
/// # Example
///
/// ```no_run
/// use arachni_spider::{CrawlConfig, Spider};
///
/// # async fn example() -> arachni_spider::Result<()> {
/// let sitemap = Spider::new(CrawlConfig::default())?
///     .with_handler(|url, body, _cookies| println!("{} ({} bytes)", url, body.len()))
///     .on_every_page(|page| {
///         println!("{} at depth {}", page.url, page.depth);
///         Ok(())
///     })
///     .run("http://testfire.net/")
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Spider {
    config: CrawlConfig,
    client: Client,
    cookies: Arc<CookieJar>,
    handler: Option<PageHandler>,
    hooks: Vec<PageHook>,
    cancel: CancellationToken,
}

impl Spider {
    /// Validates the configuration and builds the HTTP client
    ///
    /// The cookie file named by `cookie_jar`, if any, is loaded here.
    ///
    /// # Returns
    ///
    /// * `Ok(Spider)` - Ready to run
    /// * `Err(SpiderError)` - Invalid configuration or proxy, unreadable
    ///   cookie file, or the client could not be built
    pub fn new(config: CrawlConfig) -> Result<Self> {
        validate(&config)?;

        let cookies = Arc::new(CookieJar::new(config.accept_cookies));
        if let Some(path) = &config.cookie_jar {
            let loaded = cookies.load_netscape(path)?;
            tracing::info!("Loaded {} cookies from {}", loaded, path.display());
        }
        let client = build_http_client(&config, Arc::clone(&cookies))?;

        Ok(Self {
            config,
            client,
            cookies,
            handler: None,
            hooks: Vec::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Sets the primary page handler, replacing any previous one
    ///
    /// Called with `(url, body, set_cookie)` for every delivered page. The
    /// body is passed even when page bodies are discarded for hooks.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &str, &str) + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Registers a hook run for every delivered page
    ///
    /// Hooks run in registration order. An error or panic in one hook is
    /// logged and does not affect the others.
    pub fn on_every_page<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Page) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Token that stops the crawl when cancelled
    ///
    /// Cancellation behaves like reaching the link-count limit: nothing new
    /// is scheduled, in-flight fetches finish, and `run` returns the partial
    /// sitemap.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Crawls from `seed` until the frontier drains or the crawl terminates
    ///
    /// Returns the sitemap: every delivered URL, once, in completion order.
    /// A seed rejected by the crawl policy yields an empty sitemap.
    pub async fn run(self, seed: &str) -> Result<Vec<String>> {
        let seed_url = normalize_url(seed, None).map_err(|source| SpiderError::InvalidSeed {
            url: seed.to_string(),
            source,
        })?;

        let filter = UrlFilter::new(&self.config, &seed_url)?;
        let robots = self.config.obey_robots_txt.then(|| {
            Arc::new(RobotsCache::new(
                self.client.clone(),
                self.config.effective_user_agent(),
            ))
        });
        let fetcher = Arc::new(HttpFetcher::new(
            self.client.clone(),
            filter.clone(),
            robots.clone(),
            &self.config,
        ));
        let frontier = Arc::new(Frontier::new(&self.config, filter, robots.clone())?);
        let state = Arc::new(CrawlState::new());
        let sitemap = Arc::new(Sitemap::new());

        self.cookies
            .seed(&self.config.cookies, &seed_url, self.config.follow_subdomains);
        let pipeline = Arc::new(CallbackPipeline::new(
            self.handler,
            self.hooks,
            Arc::clone(&frontier),
            Arc::clone(&state),
            LimitEnforcer::new(self.config.link_count_limit),
            Arc::clone(&sitemap),
            self.config.discard_page_bodies,
        ));

        tracing::info!(
            "Starting crawl of {} with {} workers",
            seed_url,
            self.config.threads
        );
        let started = Instant::now();

        if !frontier.try_enqueue(seed_url.as_str(), 0, None).await {
            tracing::warn!("Seed URL {} is excluded by the crawl policy", seed_url);
            return Ok(Vec::new());
        }

        let watcher = {
            let cancel = self.cancel.clone();
            let frontier = Arc::clone(&frontier);
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                cancel.cancelled().await;
                if state.terminate() {
                    tracing::info!("Crawl cancelled, waiting for in-flight pages");
                }
                frontier.close();
            })
        };

        let mut workers = JoinSet::new();
        for id in 0..self.config.threads {
            let worker = Worker {
                id,
                frontier: Arc::clone(&frontier),
                fetcher: Arc::clone(&fetcher),
                pipeline: Arc::clone(&pipeline),
                robots: robots.clone(),
                delay: self.config.delay(),
            };
            workers.spawn(worker.run());
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("Worker task failed: {}", e);
            }
        }
        watcher.abort();

        let snapshot = state.snapshot();
        tracing::info!(
            "Crawl complete: {} pages delivered, {} failed in {:.2}s",
            snapshot.processed,
            snapshot.failed,
            started.elapsed().as_secs_f64()
        );

        drop(pipeline);
        Ok(match Arc::try_unwrap(sitemap) {
            Ok(sitemap) => sitemap.into_urls(),
            Err(shared) => shared.snapshot(),
        })
    }
}

/// One member of the fetch pool
struct Worker {
    id: usize,
    frontier: Arc<Frontier>,
    fetcher: Arc<HttpFetcher>,
    pipeline: Arc<CallbackPipeline>,
    robots: Option<Arc<RobotsCache>>,
    delay: Duration,
}

impl Worker {
    async fn run(self) {
        tracing::debug!("Worker {} started", self.id);

        while let Some(task) = self.frontier.dequeue().await {
            let _in_flight = InFlight(&self.frontier);

            let delay = self.pacing_delay(&task.url).await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.frontier.is_closed() {
                continue;
            }

            tracing::debug!("Worker {} fetching {}", self.id, task.url);
            let page = self.fetcher.fetch(&task).await;
            self.pipeline.process(page, &task).await;
        }

        tracing::debug!("Worker {} finished", self.id);
    }

    /// Configured delay, raised to the robots.txt crawl-delay when obeyed
    async fn pacing_delay(&self, url: &Url) -> Duration {
        let Some(robots) = &self.robots else {
            return self.delay;
        };

        match robots.crawl_delay(url).await {
            Some(crawl_delay) => self.delay.max(crawl_delay),
            None => self.delay,
        }
    }
}

/// Marks a dequeued task complete when dropped, including on panic
struct InFlight<'a>(&'a Frontier);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.complete();
    }
}
