//! Configuration loaded from the environment.
//!
//! | Variable                    | Default | Meaning                              |
//! |-----------------------------|---------|--------------------------------------|
//! | `ALLOWED_HOSTS`             | empty   | comma separated host patterns        |
//! | `RATE_LIMIT_MAX_REQUESTS`   | 100     | permits per window                   |
//! | `RATE_LIMIT_WINDOW`         | `1m`    | window length, `<n>[smhd]`           |
//! | `RATE_LIMIT_OVERRIDES`      | empty   | `host=<max>/<window>`, comma separated |
//! | `GUARD_MAX_OUTPUT_WARNINGS` | 3       | lint warnings that block a write     |

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::safety::lint::DEFAULT_WARNING_THRESHOLD;
use crate::safety::rate_limit::DEFAULT_WINDOW_MS;
use crate::safety::{QuotaTable, RateQuota, UrlAllowPolicy};

/// Guard configuration.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Hosts outbound requests may target. Empty means any public host.
    pub allowed_hosts: UrlAllowPolicy,
    /// Default quota plus per-host overrides.
    pub quotas: QuotaTable,
    /// Warning count at which the output linter blocks.
    pub max_output_warnings: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: UrlAllowPolicy::default(),
            quotas: QuotaTable::default(),
            max_output_warnings: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

impl GuardConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars())
    }

    /// Build from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let allowed_hosts = get("ALLOWED_HOSTS")
            .map(UrlAllowPolicy::from_csv)
            .unwrap_or_default();

        let max_tokens = match get("RATE_LIMIT_MAX_REQUESTS") {
            Some(raw) => parse_number("RATE_LIMIT_MAX_REQUESTS", raw)?,
            None => RateQuota::default().max_tokens,
        };
        let window_ms = match get("RATE_LIMIT_WINDOW") {
            Some(raw) => parse_window("RATE_LIMIT_WINDOW", raw)?,
            None => DEFAULT_WINDOW_MS,
        };

        let mut quotas = QuotaTable::new(RateQuota::new(max_tokens, window_ms));
        if let Some(raw) = get("RATE_LIMIT_OVERRIDES") {
            for (pattern, quota) in parse_overrides(raw)? {
                quotas = quotas.with_override(&pattern, quota);
            }
        }

        let max_output_warnings = match get("GUARD_MAX_OUTPUT_WARNINGS") {
            Some(raw) => parse_number("GUARD_MAX_OUTPUT_WARNINGS", raw)? as usize,
            None => DEFAULT_WARNING_THRESHOLD,
        };

        Ok(Self {
            allowed_hosts,
            quotas,
            max_output_warnings,
        })
    }
}

/// Parse a window such as `30s`, `5m`, `1h` or `1d` into milliseconds.
///
/// Anything else falls back to one minute.
pub fn parse_time_window(window: &str) -> u64 {
    parse_time_window_strict(window).unwrap_or(DEFAULT_WINDOW_MS)
}

/// Like [`parse_time_window`] but returns `None` for malformed input.
pub fn parse_time_window_strict(window: &str) -> Option<u64> {
    let window = window.trim().to_ascii_lowercase();
    let unit = window.chars().last()?;
    let amount = &window[..window.len() - unit.len_utf8()];
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = amount.parse().ok()?;
    let scale = match unit {
        's' => 1_000,
        'm' => 60 * 1_000,
        'h' => 60 * 60 * 1_000,
        'd' => 24 * 60 * 60 * 1_000,
        _ => return None,
    };
    amount.checked_mul(scale)
}

fn parse_number(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{}' is not a non-negative integer", raw),
    })
}

fn parse_window(key: &str, raw: &str) -> Result<u64, ConfigError> {
    match parse_time_window_strict(raw) {
        Some(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "window must be longer than zero".to_string(),
        }),
        Some(ms) => Ok(ms),
        None => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}' is not a duration like 30s, 5m, 1h or 1d", raw),
        }),
    }
}

/// Parse `host=<max>/<window>` entries.
fn parse_overrides(raw: &str) -> Result<Vec<(String, RateQuota)>, ConfigError> {
    const KEY: &str = "RATE_LIMIT_OVERRIDES";
    let invalid = |entry: &str| ConfigError::InvalidValue {
        key: KEY.to_string(),
        message: format!("'{}' is not of the form host=<max>/<window>", entry),
    };

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (host, quota) = entry.split_once('=').ok_or_else(|| invalid(entry))?;
            let (max, window) = quota.split_once('/').ok_or_else(|| invalid(entry))?;
            let host = host.trim();
            if host.is_empty() {
                return Err(invalid(entry));
            }
            let max_tokens = parse_number(KEY, max.trim())?;
            let window_ms = parse_window(KEY, window)?;
            Ok((host.to_string(), RateQuota::new(max_tokens, window_ms)))
        })
        .collect()
}
