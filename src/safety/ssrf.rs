//! SSRF guard for outbound URLs.
//!
//! A URL is accepted only when it parses, uses http or https, names a host
//! that classifies as public, and that host is permitted by the allow
//! policy. Every failure rejects.

use reqwest::Url;

use crate::safety::host::{HostClass, classify};
use crate::safety::{Location, Severity, UrlAllowPolicy, Violation, ViolationKind};

/// Rate-limit key used for URLs whose host cannot be extracted.
pub const UNKNOWN_HOST: &str = "unknown";

/// Why a URL was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlRejection {
    #[error("invalid URL: {0}")]
    Unparseable(String),

    #[error("scheme '{0}' is not allowed, only http and https")]
    Scheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("host '{host}' is not public ({class:?})")]
    NonPublicHost { host: String, class: HostClass },

    #[error("host '{0}' is not in the allowed hosts list")]
    NotAllowlisted(String),
}

/// Check a URL, returning the parsed form on success.
pub fn check_url(url: &str, policy: &UrlAllowPolicy) -> Result<Url, UrlRejection> {
    let parsed = Url::parse(url.trim()).map_err(|e| UrlRejection::Unparseable(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UrlRejection::Scheme(parsed.scheme().to_string()));
    }

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlRejection::MissingHost)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let class = classify(host);
    if !class.is_public() {
        return Err(UrlRejection::NonPublicHost {
            host: host.to_string(),
            class,
        });
    }

    if !policy.permits(host) {
        return Err(UrlRejection::NotAllowlisted(host.to_string()));
    }

    Ok(parsed)
}

/// Boolean form of [`check_url`].
pub fn validate_url(url: &str, policy: &UrlAllowPolicy) -> bool {
    match check_url(url, policy) {
        Ok(_) => true,
        Err(reason) => {
            tracing::debug!(url, %reason, "URL rejected");
            false
        }
    }
}

/// Validate every URL, returning one violation per rejected URL.
pub fn validate_batch<S: AsRef<str>>(urls: &[S], policy: &UrlAllowPolicy) -> Vec<Violation> {
    urls.iter()
        .enumerate()
        .filter_map(|(index, url)| {
            let url = url.as_ref();
            check_url(url, policy)
                .err()
                .map(|reason| ssrf_violation(url, index, &reason))
        })
        .collect()
}

pub(crate) fn ssrf_violation(url: &str, index: usize, reason: &UrlRejection) -> Violation {
    Violation::new(
        ViolationKind::Ssrf,
        Severity::High,
        format!("URL blocked by SSRF protection: {}", url),
    )
    .with_suggestion(format!(
        "{}; only public http(s) hosts on the allowed list may be fetched",
        reason
    ))
    .with_location(Location::BatchItem(index))
}

/// Host name used to key rate limits for a URL.
pub fn host_key(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}
