//! Crawl frontier: the queue of URLs waiting to be fetched
//!
//! Every candidate URL passes through [`Frontier::try_enqueue`], which is the
//! single gate that applies normalization, the depth ceiling, the scope
//! filter, robots.txt and deduplication. The check against the visited set,
//! the insert and the push happen under one lock, so two workers that
//! discover the same link concurrently schedule it exactly once.
//!
//! Workers block in [`Frontier::dequeue`] until a task is available. The
//! frontier is drained when nothing is queued and no task is in flight; at
//! that point every waiting worker receives `None`.

use crate::config::{compile_pattern, CrawlConfig};
use crate::robots::RobotsCache;
use crate::url::{normalize_url, UrlFilter};
use crate::ConfigError;
use regex::Regex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use url::Url;

/// A URL scheduled for fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTask {
    /// Normalized absolute URL
    pub url: Url,

    /// Link-hops from the seed (seed = 0)
    pub depth: u32,

    /// Page on which the link was found
    pub discovered_from: Option<Url>,
}

/// Set of every URL ever accepted into the frontier
///
/// Keys are normalized URL strings. Entries are never removed.
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: HashSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a URL, returning false if it was already present
    pub fn insert(&mut self, url: &Url) -> bool {
        self.urls.insert(url.as_str().to_string())
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.urls.contains(url.as_str())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Compiled redundancy rule with its running count
#[derive(Debug)]
struct RedundancyCounter {
    pattern: Regex,
    limit: usize,
    seen: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    /// Pending tasks bucketed by depth; buckets are never left empty
    pending: BTreeMap<u32, VecDeque<UrlTask>>,
    queued: usize,
    visited: VisitedSet,
    redundancy: Vec<RedundancyCounter>,
    in_flight: usize,
    closed: bool,
}

impl QueueState {
    fn pop(&mut self) -> Option<UrlTask> {
        let mut bucket = self.pending.first_entry()?;
        let task = bucket.get_mut().pop_front();
        if bucket.get().is_empty() {
            bucket.remove();
        }
        if task.is_some() {
            self.queued -= 1;
        }
        task
    }

    fn push(&mut self, task: UrlTask) {
        self.pending.entry(task.depth).or_default().push_back(task);
        self.queued += 1;
    }

    /// Returns true if a redundancy rule has exhausted its budget for `url`
    fn is_redundant(&self, url: &Url) -> bool {
        self.redundancy
            .iter()
            .any(|rule| rule.seen >= rule.limit && rule.pattern.is_match(url.as_str()))
    }

    fn count_redundancy(&mut self, url: &Url) {
        for rule in &mut self.redundancy {
            if rule.pattern.is_match(url.as_str()) {
                rule.seen += 1;
            }
        }
    }
}

/// Shared, depth-ordered work queue
pub struct Frontier {
    filter: UrlFilter,
    robots: Option<Arc<RobotsCache>>,
    depth_limit: Option<u32>,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// `robots` is only consulted when present; pass `None` when robots.txt
    /// is not obeyed.
    pub fn new(
        config: &CrawlConfig,
        filter: UrlFilter,
        robots: Option<Arc<RobotsCache>>,
    ) -> Result<Self, ConfigError> {
        let redundancy = config
            .redundant
            .iter()
            .map(|rule| {
                Ok(RedundancyCounter {
                    pattern: compile_pattern(&rule.pattern)?,
                    limit: rule.count,
                    seen: 0,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            filter,
            robots,
            depth_limit: config.depth_limit,
            state: Mutex::new(QueueState {
                redundancy,
                ..QueueState::default()
            }),
            notify: Notify::new(),
        })
    }

    /// Offers a discovered link to the frontier
    ///
    /// `href` is resolved against `parent` when given. Returns true if a new
    /// task was scheduled.
    pub async fn try_enqueue(&self, href: &str, depth: u32, parent: Option<&Url>) -> bool {
        let url = match normalize_url(href, parent) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping link {}: {}", href, e);
                return false;
            }
        };

        if self.depth_limit.is_some_and(|limit| depth > limit) {
            tracing::debug!("Skipping {}: depth {} exceeds limit", url, depth);
            return false;
        }

        let scope = self.filter.classify(&url);
        if !scope.should_crawl() {
            tracing::debug!("Skipping {}: {:?}", url, scope);
            return false;
        }

        // Cheap rejections before a possible robots.txt fetch
        {
            let state = self.lock();
            if state.closed || state.visited.contains(&url) {
                return false;
            }
        }

        if let Some(robots) = &self.robots {
            if !robots.is_allowed(&url).await {
                tracing::debug!("URL {} disallowed by robots.txt", url);
                return false;
            }
        }

        {
            let mut state = self.lock();
            if state.closed || state.visited.contains(&url) {
                return false;
            }
            if state.is_redundant(&url) {
                tracing::debug!("Skipping {}: redundancy limit reached", url);
                return false;
            }

            state.visited.insert(&url);
            state.count_redundancy(&url);
            state.push(UrlTask {
                url,
                depth,
                discovered_from: parent.cloned(),
            });
        }

        self.notify.notify_one();
        true
    }

    /// Takes the next task, waiting while other tasks are in flight
    ///
    /// Tasks of lower depth are handed out first. Returns `None` once the
    /// frontier is closed, or when it is empty and nothing is in flight.
    /// Every returned task must be paired with a call to [`Frontier::complete`].
    pub async fn dequeue(&self) -> Option<UrlTask> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(task) = state.pop() {
                    state.in_flight += 1;
                    return Some(task);
                }
                if state.in_flight == 0 {
                    drop(state);
                    self.notify.notify_waiters();
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks one dequeued task as finished
    pub fn complete(&self) {
        let drained = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.in_flight == 0 && state.queued == 0
        };

        if drained {
            self.notify.notify_waiters();
        }
    }

    /// Stops the frontier: queued tasks are discarded and no new ones accepted
    ///
    /// Returns the number of discarded tasks.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            state.pending.clear();
            std::mem::take(&mut state.queued)
        };

        if discarded > 0 {
            tracing::debug!("Frontier closed, discarded {} queued URLs", discarded);
        }
        self.notify.notify_waiters();
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.lock().queued
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tasks dequeued but not yet completed
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Number of distinct URLs ever accepted
    pub fn visited(&self) -> usize {
        self.lock().visited.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
