use crate::config::types::CrawlConfig;
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Upper bound on concurrent workers
const MAX_THREADS: usize = 256;

/// Validates the entire configuration
pub fn validate(config: &CrawlConfig) -> Result<(), ConfigError> {
    validate_workers(config)?;
    validate_limits(config)?;
    validate_user_agent(config)?;
    validate_patterns(config)?;
    validate_proxy(config)?;
    Ok(())
}

fn validate_workers(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.threads < 1 || config.threads > MAX_THREADS {
        return Err(ConfigError::Validation(format!(
            "threads must be between 1 and {}, got {}",
            MAX_THREADS, config.threads
        )));
    }

    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request_timeout must be greater than 0ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_limits(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.link_count_limit == Some(0) {
        return Err(ConfigError::Validation(
            "link_count_limit must be at least 1 (omit it for no limit)".to_string(),
        ));
    }

    Ok(())
}

fn validate_user_agent(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if let Some(who) = &config.authed_by {
        if who.contains(['\r', '\n']) {
            return Err(ConfigError::Validation(format!(
                "authed_by must be a single line, got '{}'",
                who.escape_debug()
            )));
        }
    }

    Ok(())
}

fn validate_patterns(config: &CrawlConfig) -> Result<(), ConfigError> {
    for pattern in config.include.iter().chain(config.exclude.iter()) {
        compile_pattern(pattern)?;
    }

    for rule in &config.redundant {
        compile_pattern(&rule.pattern)?;
    }

    Ok(())
}

/// Compiles a user-supplied URL pattern
pub fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern)
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
}

fn validate_proxy(config: &CrawlConfig) -> Result<(), ConfigError> {
    proxy_url(config).map(|_| ())
}

/// Builds the proxy URL described by the configuration, if any
///
/// Credentials are embedded as URL userinfo so that both HTTP and SOCKS
/// proxies receive them.
pub fn proxy_url(config: &CrawlConfig) -> Result<Option<Url>, ConfigError> {
    let addr = match config.proxy_addr.as_deref() {
        Some(addr) if !addr.trim().is_empty() => addr.trim(),
        _ => {
            if config.proxy_port.is_some()
                || config.proxy_user.is_some()
                || config.proxy_pass.is_some()
            {
                return Err(ConfigError::InvalidProxy(
                    "proxy_port/proxy_user/proxy_pass given without proxy_addr".to_string(),
                ));
            }
            return Ok(None);
        }
    };

    if config.proxy_pass.is_some() && config.proxy_user.is_none() {
        return Err(ConfigError::InvalidProxy(
            "proxy_pass given without proxy_user".to_string(),
        ));
    }

    let port = config.proxy_port.ok_or_else(|| {
        ConfigError::InvalidProxy(format!("proxy_addr '{}' has no proxy_port", addr))
    })?;

    let mut url = Url::parse(&format!("{}://{}:{}", config.proxy_type.scheme(), addr, port))
        .map_err(|e| ConfigError::InvalidProxy(format!("'{}:{}': {}", addr, port, e)))?;

    if let Some(user) = &config.proxy_user {
        url.set_username(user)
            .map_err(|_| ConfigError::InvalidProxy("cannot set proxy user".to_string()))?;
        url.set_password(config.proxy_pass.as_deref())
            .map_err(|_| ConfigError::InvalidProxy("cannot set proxy password".to_string()))?;
    }

    Ok(Some(url))
}
