//! Host allowlist for outbound URLs.
//!
//! Supports exact matches and `*.domain` wildcard patterns.

use std::fmt;

/// Pattern for matching allowed hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPattern {
    /// The pattern as written (e.g., "api.example.com" or "*.example.com").
    pattern: String,
    /// Whether this is a wildcard pattern.
    is_wildcard: bool,
    /// The base domain for wildcard matching.
    base_domain: String,
}

impl DomainPattern {
    /// Create a new domain pattern.
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.trim();
        let is_wildcard = pattern.starts_with("*.");
        let base_domain = if is_wildcard {
            pattern[2..].to_lowercase()
        } else {
            pattern.to_lowercase()
        };

        Self {
            pattern: pattern.to_string(),
            is_wildcard,
            base_domain,
        }
    }

    /// Check if a host matches this pattern.
    pub fn matches(&self, host: &str) -> bool {
        let host_lower = host.to_lowercase();

        if self.is_wildcard {
            // *.example.com matches foo.example.com, bar.baz.example.com, example.com
            host_lower == self.base_domain
                || host_lower
                    .strip_suffix(self.base_domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        } else {
            host_lower == self.base_domain
        }
    }

    /// Get the pattern string.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

/// Set of host patterns a URL must match.
///
/// An empty policy places no restriction beyond the public-host check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlAllowPolicy {
    patterns: Vec<DomainPattern>,
}

impl UrlAllowPolicy {
    /// Create a policy from pattern strings. Blank entries are skipped.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .filter(|p| !p.as_ref().trim().is_empty())
                .map(|p| DomainPattern::new(p.as_ref()))
                .collect(),
        }
    }

    /// Parse a comma separated list such as `"api.example.com, *.github.com"`.
    pub fn from_csv(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Add a pattern to the policy.
    pub fn add(&mut self, pattern: &str) {
        self.patterns.push(DomainPattern::new(pattern));
    }

    /// Check if a host is permitted. Always true for an empty policy.
    pub fn permits(&self, host: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(host))
    }

    /// Get all patterns in the policy.
    pub fn patterns(&self) -> &[DomainPattern] {
        &self.patterns
    }

    /// Check if the policy is empty.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Get the number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}
