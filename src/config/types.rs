use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of concurrent workers
pub const DEFAULT_THREADS: usize = 3;

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "Arachni/0.1";

/// Default per-request timeout (milliseconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Crawl policy supplied by the caller
///
/// Constructed once and treated as immutable for the duration of a crawl.
/// Every field is optional in the TOML representation; absent limits mean
/// "unbounded".
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Number of concurrent fetch workers
    pub threads: usize,

    /// Drop page bodies before they reach hooks
    pub discard_page_bodies: bool,

    /// User agent sent with every request
    pub user_agent: String,

    /// Person that authorized the scan, appended to the user agent and sent as `From`
    pub authed_by: Option<String>,

    /// Pause before each request, per worker (milliseconds)
    pub delay: u64,

    /// Timeout for a single HTTP exchange (milliseconds)
    pub request_timeout: u64,

    /// Skip URLs disallowed by the target host's robots.txt
    pub obey_robots_txt: bool,

    /// Maximum link-hops from the seed
    pub depth_limit: Option<u32>,

    /// Maximum number of pages delivered to the handler and sitemap
    pub link_count_limit: Option<usize>,

    /// Maximum redirects followed within one fetch
    pub redirect_limit: Option<u32>,

    /// Initial cookie jar (name => value)
    pub cookies: BTreeMap<String, String>,

    /// Netscape-format cookie file loaded into the jar before the crawl
    pub cookie_jar: Option<PathBuf>,

    /// Store cookies set by responses in the shared jar
    pub accept_cookies: bool,

    /// Proxy host name or address
    pub proxy_addr: Option<String>,

    /// Proxy port
    pub proxy_port: Option<u16>,

    /// Proxy user name
    pub proxy_user: Option<String>,

    /// Proxy password
    pub proxy_pass: Option<String>,

    /// Proxy protocol
    pub proxy_type: ProxyType,

    /// Only URLs matching one of these patterns are followed (empty = all)
    pub include: Vec<String>,

    /// URLs matching any of these patterns are never followed
    pub exclude: Vec<String>,

    /// Caps on how many distinct URLs matching a pattern are followed
    pub redundant: Vec<RedundantRule>,

    /// Follow URLs on other subdomains of the seed's registrable domain
    pub follow_subdomains: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            discard_page_bodies: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            authed_by: None,
            delay: 0,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_MS,
            obey_robots_txt: false,
            depth_limit: None,
            link_count_limit: None,
            redirect_limit: None,
            cookies: BTreeMap::new(),
            cookie_jar: None,
            accept_cookies: true,
            proxy_addr: None,
            proxy_port: None,
            proxy_user: None,
            proxy_pass: None,
            proxy_type: ProxyType::default(),
            include: Vec::new(),
            exclude: Vec::new(),
            redundant: Vec::new(),
            follow_subdomains: false,
        }
    }
}

impl CrawlConfig {
    /// Pacing pause applied before each request
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay)
    }

    /// Timeout for a single HTTP exchange
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    /// The user agent string actually sent on the wire
    pub fn effective_user_agent(&self) -> String {
        match &self.authed_by {
            Some(who) => format!("{} (Scan authorized by: {})", self.user_agent, who),
            None => self.user_agent.clone(),
        }
    }
}

/// Supported proxy protocols
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    #[serde(alias = "socks")]
    Socks5,
}

impl ProxyType {
    /// URL scheme reqwest expects for this proxy type
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyType::Http => "http",
            ProxyType::Socks5 => "socks5",
        }
    }
}

/// Limits how many distinct URLs matching `pattern` get scheduled
#[derive(Debug, Clone, Deserialize)]
pub struct RedundantRule {
    /// Regular expression matched against the normalized URL
    pub pattern: String,

    /// Number of matching URLs to follow before the rest are dropped
    pub count: usize,
}
