//! Tool hook envelope.
//!
//! The agent host sends one JSON object per hook invocation. Before a tool
//! runs the envelope is mapped to an [`Action`] for the engine; after it
//! runs, written files are linted and fetch responses scored.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::Action;
use crate::error::{GuardError, Result};
use crate::safety::lint::{self, LintIssue};
use crate::scoring::{ResponseScore, score_response};

/// Hook input as sent by the agent host.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookEnvelope {
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub tool_response: Value,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Structured verdict printed to stdout to block after a tool ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockResponse {
    pub decision: &'static str,
    pub reason: String,
}

impl BlockResponse {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            decision: "block",
            reason: reason.into(),
        }
    }
}

/// Result of reviewing a finished tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum PostToolReport {
    /// Nothing to review for this tool.
    Skipped,
    /// Lint findings for written content.
    Lint { issues: Vec<LintIssue>, block: bool },
    /// Quality score for a fetch response.
    Score(ResponseScore),
}

impl HookEnvelope {
    /// Parse an envelope. Malformed JSON is an input error.
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn input_str(&self, field: &str) -> Option<&str> {
        self.tool_input.get(field).and_then(Value::as_str)
    }

    /// Map the tool call to an action, or `None` when no validator applies.
    pub fn action(&self) -> Result<Option<Action>> {
        if self.tool_name == "Bash" {
            return Ok(self
                .input_str("command")
                .filter(|c| !c.is_empty())
                .map(|c| Action::ShellCommand(c.to_string())));
        }

        if self.tool_name.contains("MultiAPIFetch") {
            let endpoints = match self.tool_input.get("api_endpoints") {
                None | Some(Value::Null) => return Ok(None),
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(GuardError::InvalidInput(
                        "api_endpoints must be an array of URLs".to_string(),
                    ));
                }
            };
            let urls = endpoints
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        GuardError::InvalidInput(format!("api_endpoints entry is not a string: {}", v))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok((!urls.is_empty()).then_some(Action::NetworkBatch(urls)));
        }

        if let Some(code) = self.input_str("code")
            && (self.tool_name.contains("PythonExec") || !code.is_empty())
        {
            return Ok(Some(Action::CodeSnippet(code.to_string())));
        }
        if self.tool_name.contains("PythonExec") {
            return Err(GuardError::InvalidInput(
                "PythonExec call without a code field".to_string(),
            ));
        }

        Ok(None)
    }

    /// Review a finished tool call.
    ///
    /// `Write` content is linted from the input; `Edit` lints the file on
    /// disk, skipping it when unreadable. A `MultiAPIFetch` response is
    /// scored.
    pub fn post_tool_review(&self, warning_threshold: usize) -> PostToolReport {
        let name = self.tool_name.as_str();

        if name.contains("MultiAPIFetch") && !is_empty(&self.tool_response) {
            return PostToolReport::Score(score_response(&self.tool_response));
        }

        let (path, content) = if name.contains("Write") {
            let path = self.input_str("file_path").unwrap_or_default();
            match self.input_str("content") {
                Some(content) => (path.to_string(), content.to_string()),
                None => return PostToolReport::Skipped,
            }
        } else if name.contains("Edit") {
            let Some(path) = self.input_str("file_path").filter(|p| !p.is_empty()) else {
                return PostToolReport::Skipped;
            };
            match std::fs::read_to_string(path) {
                Ok(content) => (path.to_string(), content),
                Err(err) => {
                    tracing::debug!(path, %err, "Skipping lint of unreadable file");
                    return PostToolReport::Skipped;
                }
            }
        } else {
            return PostToolReport::Skipped;
        };

        let issues = lint::lint_content(Path::new(&path), &content);
        let block = lint::should_block(&issues, warning_threshold);
        PostToolReport::Lint { issues, block }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn envelope(value: Value) -> HookEnvelope {
        HookEnvelope::parse(&value.to_string()).unwrap()
    }

    #[test]
    fn test_malformed_json_is_input_error() {
        let err = HookEnvelope::parse("{not json").unwrap_err();
        assert!(matches!(err, GuardError::InvalidInput(_)));
    }

    #[test]
    fn test_bash_maps_to_shell_command() {
        let env = envelope(json!({ "tool_name": "Bash", "tool_input": { "command": "ls -la" } }));
        assert_eq!(
            env.action().unwrap(),
            Some(Action::ShellCommand("ls -la".to_string()))
        );

        let env = envelope(json!({ "tool_name": "Bash", "tool_input": {} }));
        assert_eq!(env.action().unwrap(), None);
    }

    #[test]
    fn test_fetch_maps_to_network_batch() {
        let env = envelope(json!({
            "tool_name": "mcp__server__MultiAPIFetch",
            "tool_input": { "api_endpoints": ["https://a.com", "http://10.0.0.1"] }
        }));
        assert_eq!(
            env.action().unwrap(),
            Some(Action::NetworkBatch(vec![
                "https://a.com".to_string(),
                "http://10.0.0.1".to_string(),
            ]))
        );

        let env = envelope(json!({
            "tool_name": "MultiAPIFetch",
            "tool_input": { "api_endpoints": [42] }
        }));
        assert!(matches!(env.action(), Err(GuardError::InvalidInput(_))));
    }

    #[test]
    fn test_code_maps_to_snippet() {
        let env = envelope(json!({ "tool_name": "PythonExec", "tool_input": { "code": "print(1)" } }));
        assert_eq!(
            env.action().unwrap(),
            Some(Action::CodeSnippet("print(1)".to_string()))
        );

        let env = envelope(json!({ "tool_name": "PythonExec", "tool_input": {} }));
        assert!(env.action().is_err());
    }

    #[test]
    fn test_other_tools_are_ignored() {
        let env = envelope(json!({ "tool_name": "Read", "tool_input": { "file_path": "/etc/hosts" } }));
        assert_eq!(env.action().unwrap(), None);
        assert_eq!(env.post_tool_review(3), PostToolReport::Skipped);
    }

    #[test]
    fn test_write_is_linted() {
        let env = envelope(json!({
            "tool_name": "Write",
            "tool_input": { "file_path": "config.py", "content": "password = \"hunter22\"\n" }
        }));
        match env.post_tool_review(3) {
            PostToolReport::Lint { issues, block } => {
                assert!(block);
                assert!(!issues.is_empty());
            }
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[test]
    fn test_edit_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.js");
        std::fs::write(&path, "function f() {\n  return 1;\n}\n").unwrap();

        let env = envelope(json!({
            "tool_name": "Edit",
            "tool_input": { "file_path": path.to_str().unwrap() }
        }));
        assert_eq!(
            env.post_tool_review(3),
            PostToolReport::Lint {
                issues: Vec::new(),
                block: false
            }
        );

        let missing = envelope(json!({
            "tool_name": "Edit",
            "tool_input": { "file_path": dir.path().join("gone.js").to_str().unwrap() }
        }));
        assert_eq!(missing.post_tool_review(3), PostToolReport::Skipped);
    }

    #[test]
    fn test_fetch_response_is_scored() {
        let env = envelope(json!({
            "tool_name": "MultiAPIFetch",
            "tool_input": { "api_endpoints": ["https://a.com"] },
            "tool_response": { "content": [{ "text": "{\"results\": [{\"success\": true, \"data\": \"ok\", \"response_time\": 0}]}" }] },
            "session_id": "abc"
        }));
        match env.post_tool_review(3) {
            PostToolReport::Score(score) => assert_eq!(score.completeness, 1.0),
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[test]
    fn test_block_response_shape() {
        let json = serde_json::to_value(BlockResponse::new("too many warnings")).unwrap();
        assert_eq!(json, json!({ "decision": "block", "reason": "too many warnings" }));
    }
}
