//! Shared cookie store
//!
//! One store is shared by every worker for the whole crawl. It is installed
//! on the HTTP client as its cookie provider: reqwest attaches the matching
//! cookies to each request and hands every `Set-Cookie` back to the store.
//! Parsing, expiry and domain/path scoping are done by
//! [`reqwest::cookie::Jar`]; this wrapper decides whether responses may write
//! to it and loads the initial cookies.

use crate::ConfigError;
use chrono::{TimeZone, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

/// Prefix curl writes in front of the domain of `HttpOnly` cookies
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Crawl-wide cookie store
#[derive(Debug)]
pub struct CookieJar {
    jar: Jar,
    accept: bool,
}

impl CookieJar {
    /// Creates an empty store
    ///
    /// When `accept_cookies` is false, `Set-Cookie` responses are ignored and
    /// only the initial cookies are ever sent.
    pub fn new(accept_cookies: bool) -> Self {
        Self {
            jar: Jar::default(),
            accept: accept_cookies,
        }
    }

    pub fn accepts_cookies(&self) -> bool {
        self.accept
    }

    /// Adds a cookie in `Set-Cookie` syntax as if `url` had set it
    ///
    /// Bypasses `accept_cookies`: used for cookies the caller supplies.
    pub fn add_cookie_str(&self, cookie: &str, url: &Url) {
        self.jar.add_cookie_str(cookie, url);
    }

    /// Adds the configured `name => value` cookies for the seed's site
    ///
    /// The cookies apply to every path. With `include_subdomains` they are
    /// also sent to subdomains of the seed host (IP hosts stay host-only).
    pub fn seed(&self, cookies: &BTreeMap<String, String>, seed: &Url, include_subdomains: bool) {
        let domain = seed.domain().filter(|_| include_subdomains);

        for (name, value) in cookies {
            let mut cookie = format!("{}={}; Path=/", name, value);
            if let Some(domain) = domain {
                cookie.push_str("; Domain=");
                cookie.push_str(domain);
            }
            self.add_cookie_str(&cookie, seed);
        }
    }

    /// Loads a Netscape/curl-format cookie file
    ///
    /// Each line holds seven tab-separated fields: domain, include
    /// subdomains, path, secure, expiry (unix seconds, 0 for a session
    /// cookie), name and value. Comment lines start with `#`, except for the
    /// `#HttpOnly_` domain prefix. Malformed lines are skipped.
    ///
    /// Returns the number of cookies read.
    pub fn load_netscape(&self, path: &Path) -> Result<usize, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut loaded = 0;

        for (number, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
                Some(rest) => (rest, true),
                None if line.starts_with('#') => continue,
                None => (line, false),
            };

            match netscape_entry(line, http_only) {
                Some((cookie, url)) => {
                    self.add_cookie_str(&cookie, &url);
                    loaded += 1;
                }
                None => {
                    tracing::warn!(
                        "Skipping malformed cookie at {}:{}",
                        path.display(),
                        number + 1
                    );
                }
            }
        }

        Ok(loaded)
    }

    /// The `Cookie` header that would be sent to `url`
    pub fn header_value(&self, url: &Url) -> Option<String> {
        self.jar
            .cookies(url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        if self.accept {
            self.jar.set_cookies(cookie_headers, url);
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}

/// Turns one cookie-file line into a `Set-Cookie` string and its origin URL
fn netscape_entry(line: &str, http_only: bool) -> Option<(String, Url)> {
    let fields: Vec<&str> = line.split('\t').collect();
    let [domain, subdomains, path, secure, expires, name, value] = fields.as_slice() else {
        return None;
    };

    let host = domain.trim_start_matches('.');
    if host.is_empty() || name.is_empty() {
        return None;
    }
    let secure = secure.eq_ignore_ascii_case("TRUE");
    let path = if path.starts_with('/') { *path } else { "/" };
    let expires: i64 = expires.trim().parse().ok()?;

    let scheme = if secure { "https" } else { "http" };
    let url = Url::parse(&format!("{}://{}{}", scheme, host, path)).ok()?;

    let mut cookie = format!("{}={}; Path={}", name, value, path);
    if subdomains.eq_ignore_ascii_case("TRUE") {
        cookie.push_str("; Domain=");
        cookie.push_str(host);
    }
    if secure {
        cookie.push_str("; Secure");
    }
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if expires > 0 {
        let expires = Utc.timestamp_opt(expires, 0).single()?;
        cookie.push_str(&expires.format("; Expires=%a, %d %b %Y %H:%M:%S GMT").to_string());
    }

    Some((cookie, url))
}
