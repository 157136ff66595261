//! Error types for the code sandbox validator.

use crate::sandbox::node::{NodeKind, Position};

/// A disallowed construct. Always names the exact offending token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityViolation {
    #[error("Disallowed syntax node: {kind}")]
    NodeKind { kind: NodeKind, position: Position },

    #[error("Disallowed built-in function: {name}")]
    Builtin { name: String, position: Position },

    #[error("Disallowed module import: {module}")]
    Module { module: String, position: Position },
}

impl SecurityViolation {
    pub fn position(&self) -> Position {
        match self {
            Self::NodeKind { position, .. }
            | Self::Builtin { position, .. }
            | Self::Module { position, .. } => *position,
        }
    }

    /// The offending node kind, builtin or module name.
    pub fn token(&self) -> String {
        match self {
            Self::NodeKind { kind, .. } => kind.as_str().to_string(),
            Self::Builtin { name, .. } => name.clone(),
            Self::Module { module, .. } => module.clone(),
        }
    }
}

/// Errors that can occur when validating source text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    /// Source did not parse. Checked before any policy evaluation.
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    /// The tree contains a construct outside the allowlist.
    #[error(transparent)]
    Disallowed(#[from] SecurityViolation),
}

impl SandboxError {
    pub(crate) fn syntax(message: impl Into<String>, position: Position) -> Self {
        SandboxError::Syntax {
            message: message.into(),
            line: position.line,
            column: position.column,
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, SandboxError::Syntax { .. })
    }
}

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
