//! Error types for toolguard.

use std::time::Duration;

use crate::sandbox::SandboxError;

/// Top-level error type.
///
/// Mirrors the four failure classes a guard decision can end in, plus
/// configuration problems discovered at startup.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Malformed or unparseable request data. Not a security finding.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A specific construct, name, module, URL or command was disallowed.
    #[error("Policy violation: {0}")]
    Policy(String),

    /// Quota for a resource is exhausted; retry after the window elapses.
    #[error("Rate limit exceeded for {key}, retry after {retry_after:?}")]
    RateLimited { key: String, retry_after: Duration },

    /// Source text could not be parsed.
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<SandboxError> for GuardError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Syntax {
                message,
                line,
                column,
            } => GuardError::Syntax {
                message,
                line,
                column,
            },
            SandboxError::Disallowed(violation) => GuardError::Policy(violation.to_string()),
        }
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        GuardError::InvalidInput(err.to_string())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, GuardError>;
