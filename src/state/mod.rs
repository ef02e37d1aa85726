//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: atomic counters shared by all workers
//! - `LimitEnforcer`: decides when the link-count limit ends the crawl
//! - `Sitemap`: ordered, deduplicated record of processed URLs

mod crawl_state;
mod sitemap;

// Re-export main types
pub use crawl_state::{CrawlSnapshot, CrawlState, LimitEnforcer};
pub use sitemap::Sitemap;
