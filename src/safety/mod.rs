//! Network and command safety.
//!
//! This module provides the validators that sit in front of tool calls:
//! - Classifying hosts so requests to internal addresses are refused
//! - Checking URLs against scheme, host class and an allowlist (SSRF guard)
//! - Scanning shell commands for destructive or exfiltrating patterns
//! - Bounding how often each remote host may be hit
//! - Linting written files for leaked secrets and leftover debug code

pub mod allowlist;
pub mod host;
pub mod lint;
mod policy;
pub mod rate_limit;
pub mod ssrf;
mod violation;

pub use allowlist::{DomainPattern, UrlAllowPolicy};
pub use host::{HostClass, classify};
pub use lint::{LintCategory, LintIssue, LintSeverity};
pub use policy::{CommandScanner, Severity, ThreatRule, default_rules, scan_command};
pub use rate_limit::{QuotaTable, RateLimitState, RateLimiter, RateQuota};
pub use ssrf::{UrlRejection, check_url, host_key, validate_batch, validate_url};
pub use violation::{Location, Violation, ViolationKind};
