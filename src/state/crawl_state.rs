use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared counters for a running crawl
///
/// Every worker updates the same instance; all fields are atomics so no lock
/// is held while pages are processed.
#[derive(Debug, Default)]
pub struct CrawlState {
    /// Pages admitted to the sitemap
    processed: AtomicUsize,

    /// Pages whose fetch failed
    failed: AtomicUsize,

    /// Set once a limit is reached or the crawl is cancelled
    terminated: AtomicBool,
}

/// Point-in-time copy of [`CrawlState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSnapshot {
    pub processed: usize,
    pub failed: usize,
    pub terminated: bool,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages admitted to the sitemap so far
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Pages whose fetch failed so far
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Records a failed fetch
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns true once the crawl has stopped scheduling
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Marks the crawl as terminated
    ///
    /// Returns true only for the call that flipped the flag.
    pub fn terminate(&self) -> bool {
        !self.terminated.swap(true, Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CrawlSnapshot {
        CrawlSnapshot {
            processed: self.processed(),
            failed: self.failed(),
            terminated: self.is_terminated(),
        }
    }
}

/// Enforces the link-count limit
///
/// Depth is enforced by the frontier at enqueue time and redirects by the
/// fetcher, so the only limit left here is the number of delivered pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitEnforcer {
    link_count_limit: Option<usize>,
}

impl LimitEnforcer {
    pub fn new(link_count_limit: Option<usize>) -> Self {
        Self { link_count_limit }
    }

    /// Atomically reserves a sitemap slot for one page
    ///
    /// Returns the 1-based position of the admitted page, or `None` when the
    /// crawl is terminated or the limit is exhausted. The page that reaches
    /// the limit is admitted and terminates the crawl.
    pub fn admit(&self, state: &CrawlState) -> Option<usize> {
        if state.is_terminated() {
            return None;
        }

        let limit = self.link_count_limit;
        let previous = state
            .processed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match limit {
                Some(limit) if n >= limit => None,
                _ => Some(n + 1),
            })
            .ok()?;

        let position = previous + 1;
        if limit.is_some_and(|limit| position >= limit) && state.terminate() {
            tracing::info!("Link count limit of {} reached", position);
        }

        Some(position)
    }

    /// Returns true when no further pages should be scheduled
    pub fn should_terminate(&self, state: &CrawlState) -> bool {
        state.is_terminated()
            || self
                .link_count_limit
                .is_some_and(|limit| state.processed() >= limit)
    }

    /// Number of pages that may still be admitted, if limited
    pub fn remaining(&self, state: &CrawlState) -> Option<usize> {
        self.link_count_limit
            .map(|limit| limit.saturating_sub(state.processed()))
    }
}
