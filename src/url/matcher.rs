use crate::config::compile_pattern;
use crate::ConfigError;
use regex::Regex;

/// A compiled list of URL patterns
///
/// Matches when any of its patterns matches anywhere in the candidate.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compiles every pattern, failing on the first invalid one
    ///
    /// # Examples
    ///
    /// ```
    /// use arachni_spider::url::PatternSet;
    ///
    /// let set = PatternSet::new(&["/admin".to_string(), r"\.pdf$".to_string()]).unwrap();
    /// assert!(set.matches("http://a.test/admin/users"));
    /// assert!(set.matches("http://a.test/doc.pdf"));
    /// assert!(!set.matches("http://a.test/"));
    /// ```
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// True if any pattern matches the candidate
    pub fn matches(&self, candidate: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(candidate))
    }

    /// True if the set holds no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
