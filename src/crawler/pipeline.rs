//! Per-page processing after a fetch
//!
//! For every successfully fetched page the pipeline, in order:
//! 1. reserves a sitemap slot with the [`LimitEnforcer`]
//! 2. appends the URL to the sitemap
//! 3. calls the primary handler
//! 4. extracts links from the unmodified body
//! 5. calls every hook in registration order
//! 6. feeds the extracted links back into the frontier at `depth + 1`
//!
//! Handler and hook failures are caught and logged; they never stop the
//! crawl.

use crate::crawler::fetcher::Page;
use crate::crawler::frontier::{Frontier, UrlTask};
use crate::crawler::parser::extract_links;
use crate::state::{CrawlState, LimitEnforcer, Sitemap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Error returned by a page hook
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Callback run for every delivered page, in registration order
pub type PageHook = Box<dyn Fn(&Page) -> Result<(), HookError> + Send + Sync>;

/// Primary consumer of pages: `(url, body, set_cookie)`
///
/// `set_cookie` holds the response's `Set-Cookie` values separated by
/// newlines, or is empty.
pub type PageHandler = Box<dyn Fn(&str, &str, &str) + Send + Sync>;

pub struct CallbackPipeline {
    handler: Option<PageHandler>,
    hooks: Vec<PageHook>,
    frontier: Arc<Frontier>,
    state: Arc<CrawlState>,
    limits: LimitEnforcer,
    sitemap: Arc<Sitemap>,
    discard_page_bodies: bool,
    started: Instant,
}

impl CallbackPipeline {
    pub fn new(
        handler: Option<PageHandler>,
        hooks: Vec<PageHook>,
        frontier: Arc<Frontier>,
        state: Arc<CrawlState>,
        limits: LimitEnforcer,
        sitemap: Arc<Sitemap>,
        discard_page_bodies: bool,
    ) -> Self {
        Self {
            handler,
            hooks,
            frontier,
            state,
            limits,
            sitemap,
            discard_page_bodies,
            started: Instant::now(),
        }
    }

    /// Processes one fetched page
    ///
    /// Returns true if the page was delivered (added to the sitemap).
    pub async fn process(&self, mut page: Page, task: &UrlTask) -> bool {
        if let Some(error) = &page.error {
            tracing::warn!("Failed to fetch {}: {}", page.url, error);
            self.state.record_failure();
            return false;
        }

        let Some(position) = self.limits.admit(&self.state) else {
            tracing::debug!("Crawl is terminating, dropping {}", page.url);
            return false;
        };

        if self.limits.should_terminate(&self.state) {
            self.frontier.close();
        }

        self.sitemap.push(&page.url);
        tracing::debug!(
            "Delivered {} (status {:?}, depth {})",
            page.url,
            page.status,
            page.depth
        );

        if position % 10 == 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                position as f64 / elapsed
            } else {
                0.0
            };
            tracing::info!(
                "Progress: {} pages crawled, {} in frontier, {:.2} pages/sec",
                position,
                self.frontier.len(),
                rate
            );
        }

        let body = page.body.take().unwrap_or_default();
        self.call_handler(&page, &body);

        let links = if page.is_html() {
            extract_links(&body, &page.final_url)
        } else {
            Vec::new()
        };

        if !self.discard_page_bodies {
            page.body = Some(body);
        }
        self.call_hooks(&page);

        if !self.frontier.is_closed() {
            let mut scheduled = 0;
            for link in &links {
                if self
                    .frontier
                    .try_enqueue(link, task.depth + 1, Some(&page.final_url))
                    .await
                {
                    scheduled += 1;
                }
            }
            tracing::debug!(
                "Found {} links on {}, scheduled {}",
                links.len(),
                page.url,
                scheduled
            );
        }

        true
    }

    fn call_handler(&self, page: &Page, body: &str) {
        let Some(handler) = &self.handler else {
            return;
        };

        let set_cookie = page.set_cookie_header();
        let result = catch_unwind(AssertUnwindSafe(|| {
            handler(page.url.as_str(), body, &set_cookie)
        }));
        if result.is_err() {
            tracing::error!("Page handler panicked on {}", page.url);
        }
    }

    fn call_hooks(&self, page: &Page) {
        for (index, hook) in self.hooks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| hook(page))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!("Hook #{} failed on {}: {}", index, page.url, e);
                }
                Err(_) => {
                    tracing::error!("Hook #{} panicked on {}", index, page.url);
                }
            }
        }
    }
}
