//! Violations reported by the validators.

use std::fmt;
use std::ops::Range;

use serde::Serialize;

use crate::safety::Severity;

/// What produced a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViolationKind {
    /// A dangerous shell pattern matched.
    CommandThreat { rule_id: String },
    /// A URL was rejected by the SSRF guard.
    Ssrf,
    /// A resource quota was exhausted.
    RateLimit,
    /// The code sandbox rejected a construct, builtin or module.
    Sandbox,
    /// Source text did not parse.
    Syntax,
}

impl ViolationKind {
    pub fn label(&self) -> &str {
        match self {
            Self::CommandThreat { rule_id } => rule_id,
            Self::Ssrf => "ssrf",
            Self::RateLimit => "rate_limit",
            Self::Sandbox => "sandbox",
            Self::Syntax => "syntax",
        }
    }
}

/// Where in the input a violation was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// Byte range into a command string.
    Bytes(Range<usize>),
    /// Line and column (1-based) in source text.
    Source { line: usize, column: usize },
    /// Index of the offending item in a batch.
    BatchItem(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(range) => write!(f, "bytes {}..{}", range.start, range.end),
            Self::Source { line, column } => write!(f, "line {}, column {}", line, column),
            Self::BatchItem(index) => write!(f, "item {}", index),
        }
    }
}

/// A single finding. Produced per call and handed straight to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Human-readable description naming the offending token.
    pub message: String,
    /// Remediation hint, if the rule has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Violation {
    pub fn new(kind: ViolationKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            suggestion: None,
            location: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref location) = self.location {
            write!(f, " ({})", location)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location() {
        let v = Violation::new(ViolationKind::Sandbox, Severity::High, "Disallowed module import: os")
            .with_location(Location::Source { line: 1, column: 8 });
        assert_eq!(v.to_string(), "Disallowed module import: os (line 1, column 8)");
    }

    #[test]
    fn test_serializes_kind_tag() {
        let v = Violation::new(
            ViolationKind::CommandThreat {
                rule_id: "recursive_delete".to_string(),
            },
            Severity::Critical,
            "Recursive forced delete",
        );
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["kind"]["type"], "command_threat");
        assert_eq!(json["kind"]["rule_id"], "recursive_delete");
        assert_eq!(json["severity"], "critical");
        assert!(json.get("suggestion").is_none());
    }
}
