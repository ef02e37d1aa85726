use crate::UrlError;
use url::Url;

/// Normalizes a discovered link into the canonical form used for deduplication
///
/// # Normalization Steps
///
/// 1. Resolve the link against `base` (if given); reject if malformed
/// 2. Accept only `http` and `https`
/// 3. Lowercase the host and drop the scheme's default port (done by parsing)
/// 4. Remove dot segments from the path (done by parsing)
/// 5. Remove the fragment
/// 6. Remove an empty query string (trailing `?`)
///
/// Paths, query parameter order and trailing slashes are left untouched;
/// servers under audit are free to treat them as distinct resources.
///
/// # Arguments
///
/// * `href` - The link as found in the page, absolute or relative
/// * `base` - The URL of the page the link was found on
///
/// # Returns
///
/// * `Ok(Url)` - Normalized absolute URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use arachni_spider::url::normalize_url;
/// use url::Url;
///
/// let base = Url::parse("http://a.test/dir/page").unwrap();
/// let url = normalize_url("../b#top", Some(&base)).unwrap();
/// assert_eq!(url.as_str(), "http://a.test/b");
/// ```
pub fn normalize_url(href: &str, base: Option<&Url>) -> Result<Url, UrlError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(UrlError::Malformed("empty URL".to_string()));
    }

    let mut url = match base {
        Some(base) => base.join(href),
        None => Url::parse(href),
    }
    .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);

    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}
