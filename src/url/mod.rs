//! URL handling module for the spider
//!
//! This module provides URL normalization, domain extraction, pattern
//! matching, and the scope filter that decides which discovered URLs may be
//! scheduled.

mod domain;
mod matcher;
mod normalize;

use crate::config::CrawlConfig;
use crate::ConfigError;
use url::Url;

// Re-export main functions
pub use domain::{extract_domain, registrable_domain};
pub use matcher::PatternSet;
pub use normalize::normalize_url;

/// Outcome of checking a URL against the crawl scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeClassification {
    /// Within scope - may be scheduled
    Accepted,
    /// Matched an exclude pattern
    Excluded,
    /// Matched none of the include patterns
    NotIncluded,
    /// Different host (or registrable domain) than the seed, or not HTTP(S)
    OutOfScope,
}

impl ScopeClassification {
    /// Returns true if the URL should be crawled
    pub fn should_crawl(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Pure predicate over candidate URLs
///
/// Built once per crawl from the configuration and the seed URL. It never
/// touches crawl state; robots.txt checks live in [`crate::robots`].
#[derive(Debug, Clone)]
pub struct UrlFilter {
    include: PatternSet,
    exclude: PatternSet,
    seed_host: String,
    seed_domain: Option<String>,
    follow_subdomains: bool,
}

impl UrlFilter {
    /// Compiles the include/exclude patterns and records the seed's scope
    pub fn new(config: &CrawlConfig, seed: &Url) -> Result<Self, ConfigError> {
        let seed_host = extract_domain(seed)
            .ok_or_else(|| ConfigError::InvalidUrl(format!("Seed URL has no host: {}", seed)))?;

        Ok(Self {
            include: PatternSet::new(&config.include)?,
            exclude: PatternSet::new(&config.exclude)?,
            seed_host,
            seed_domain: registrable_domain(seed),
            follow_subdomains: config.follow_subdomains,
        })
    }

    /// Classifies a normalized URL
    ///
    /// Checks run in this order:
    /// 1. Exclude patterns (highest priority)
    /// 2. Include patterns (empty list matches everything)
    /// 3. Host / subdomain scope
    ///
    /// # Examples
    ///
    /// ```
    /// use arachni_spider::config::CrawlConfig;
    /// use arachni_spider::url::{ScopeClassification, UrlFilter};
    /// use url::Url;
    ///
    /// let mut config = CrawlConfig::default();
    /// config.exclude = vec!["/admin".to_string()];
    /// let seed = Url::parse("http://a.test/").unwrap();
    /// let filter = UrlFilter::new(&config, &seed).unwrap();
    ///
    /// let admin = Url::parse("http://a.test/admin").unwrap();
    /// assert_eq!(filter.classify(&admin), ScopeClassification::Excluded);
    /// ```
    pub fn classify(&self, url: &Url) -> ScopeClassification {
        let candidate = url.as_str();

        if self.exclude.matches(candidate) {
            return ScopeClassification::Excluded;
        }

        if !self.include.is_empty() && !self.include.matches(candidate) {
            return ScopeClassification::NotIncluded;
        }

        if !self.in_scope(url) {
            return ScopeClassification::OutOfScope;
        }

        ScopeClassification::Accepted
    }

    /// Convenience wrapper around [`UrlFilter::classify`]
    pub fn accepts(&self, url: &Url) -> bool {
        self.classify(url).should_crawl()
    }

    fn in_scope(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        let host = match extract_domain(url) {
            Some(host) => host,
            None => return false,
        };

        if host == self.seed_host {
            return true;
        }

        if !self.follow_subdomains {
            return false;
        }

        match (&self.seed_domain, registrable_domain(url)) {
            (Some(seed_domain), Some(domain)) => *seed_domain == domain,
            _ => false,
        }
    }
}
