//! Configuration module for the spider
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. A configuration can also be built in code from
//! [`CrawlConfig::default`].
//!
//! # Example
//!
//! ```no_run
//! use arachni_spider::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("spider.toml")).unwrap();
//! println!("Crawler will use {} workers", config.threads);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CrawlConfig, ProxyType, RedundantRule, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_THREADS,
    DEFAULT_USER_AGENT,
};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{compile_pattern, proxy_url, validate};
