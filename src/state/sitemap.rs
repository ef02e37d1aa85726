use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use url::Url;

/// Append-only, deduplicated list of processed URLs
///
/// Entries keep the order in which workers finished processing them. With a
/// single worker that is also the dequeue order.
#[derive(Debug, Default)]
pub struct Sitemap {
    inner: Mutex<SitemapInner>,
}

#[derive(Debug, Default)]
struct SitemapInner {
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl Sitemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a URL unless it is already present
    ///
    /// Returns true if the URL was added.
    pub fn push(&self, url: &Url) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.seen.insert(url.as_str().to_string()) {
            return false;
        }
        inner.urls.push(url.as_str().to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .urls
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the current entries
    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .urls
            .clone()
    }

    /// Consumes the sitemap, returning its entries in order
    pub fn into_urls(self) -> Vec<String> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .urls
    }
}
