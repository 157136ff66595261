//! Output quality linting for files written by the agent.
//!
//! Unrelated to the security decision for tool calls: this flags
//! leftovers such as TODO markers, debug statements and hardcoded secrets
//! in content after a write.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Default number of warnings that blocks on its own.
pub const DEFAULT_WARNING_THRESHOLD: usize = 3;

const CODE_EXTENSIONS: &[&str] = &[
    "ts", "js", "tsx", "jsx", "py", "go", "java", "cpp", "c", "h", "rs",
];

/// Which rule family produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LintCategory {
    Security,
    CodeQuality,
    TypescriptQuality,
    JsonQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    Error,
    Warning,
    Info,
}

/// A single lint finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintIssue {
    pub category: LintCategory,
    pub severity: LintSeverity,
    pub message: String,
    pub suggestion: String,
    /// 1-based line of the match.
    pub line: usize,
}

struct LintRule {
    category: LintCategory,
    severity: LintSeverity,
    message: &'static str,
    suggestion: &'static str,
    pattern: Regex,
}

impl LintRule {
    fn new(
        category: LintCategory,
        severity: LintSeverity,
        pattern: &str,
        case_insensitive: bool,
        message: &'static str,
        suggestion: &'static str,
    ) -> Self {
        Self {
            category,
            severity,
            message,
            suggestion,
            pattern: RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .multi_line(true)
                .build()
                .expect("Invalid lint regex"),
        }
    }

    fn apply(&self, content: &str, issues: &mut Vec<LintIssue>) {
        for m in self.pattern.find_iter(content) {
            issues.push(LintIssue {
                category: self.category,
                severity: self.severity,
                message: self.message.to_string(),
                suggestion: self.suggestion.to_string(),
                line: line_of(content, m.start()),
            });
        }
    }
}

static SECURITY_RULES: LazyLock<Vec<LintRule>> = LazyLock::new(|| {
    use LintCategory::Security;
    use LintSeverity::Error;
    vec![
        LintRule::new(
            Security,
            Error,
            r#"password\s*=\s*["'][^"']+["']"#,
            true,
            "Hardcoded password detected",
            "Use environment variables for sensitive data",
        ),
        LintRule::new(
            Security,
            Error,
            r#"api[_-]?key\s*=\s*["'][^"']+["']"#,
            true,
            "Hardcoded API key detected",
            "Use environment variables for API keys",
        ),
        LintRule::new(
            Security,
            Error,
            r#"token\s*=\s*["'][^"']+["']"#,
            true,
            "Hardcoded token detected",
            "Use secure token management",
        ),
    ]
});

static CODE_QUALITY_RULES: LazyLock<Vec<LintRule>> = LazyLock::new(|| {
    use LintCategory::CodeQuality;
    use LintSeverity::{Error, Warning};
    vec![
        LintRule::new(
            CodeQuality,
            Warning,
            r"\bTODO:?\s",
            true,
            "Code contains unresolved TODO items",
            "Complete or remove TODO items before finalizing",
        ),
        LintRule::new(
            CodeQuality,
            Error,
            r"\bFIXME:?\s",
            true,
            "Code contains FIXME comments",
            "Address FIXME issues before proceeding",
        ),
        LintRule::new(
            CodeQuality,
            Error,
            r"\bXXX:?\s",
            true,
            "Code contains XXX markers",
            "Resolve XXX markers indicating problematic code",
        ),
        LintRule::new(
            CodeQuality,
            Warning,
            r"console\.log\(",
            true,
            "Debug console.log statements found",
            "Remove debug logging before production",
        ),
        LintRule::new(
            CodeQuality,
            Error,
            r"debugger;",
            true,
            "Debugger statements found",
            "Remove debugger statements",
        ),
    ]
});

static TYPESCRIPT_RULES: LazyLock<Vec<LintRule>> = LazyLock::new(|| {
    use LintCategory::TypescriptQuality;
    use LintSeverity::{Info, Warning};
    vec![
        LintRule::new(
            TypescriptQuality,
            Warning,
            r":\s*any\b",
            false,
            "TypeScript any types detected",
            "Use specific types instead of any for better type safety",
        ),
        LintRule::new(
            TypescriptQuality,
            Warning,
            r"@ts-ignore",
            false,
            "TypeScript ignore comments found",
            "Address TypeScript errors instead of ignoring them",
        ),
        LintRule::new(
            TypescriptQuality,
            Info,
            r"function\s+\w+\([^)]*\)\s*\{\s*\}",
            false,
            "Empty function detected",
            "Implement the function body",
        ),
    ]
});

static JSON_RULES: LazyLock<Vec<LintRule>> = LazyLock::new(|| {
    vec![LintRule::new(
        LintCategory::JsonQuality,
        LintSeverity::Error,
        r",\s*[}\]]",
        false,
        "Trailing commas in JSON",
        "Remove trailing commas for valid JSON",
    )]
});

/// Lint `content` as if it were written to `path`.
///
/// Security rules apply to every file; the rest are chosen by extension.
pub fn lint_content(path: &Path, content: &str) -> Vec<LintIssue> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let mut issues = Vec::new();
    for rule in SECURITY_RULES.iter() {
        rule.apply(content, &mut issues);
    }
    if CODE_EXTENSIONS.contains(&extension.as_str()) {
        for rule in CODE_QUALITY_RULES.iter() {
            rule.apply(content, &mut issues);
        }
    }
    if matches!(extension.as_str(), "ts" | "tsx") {
        for rule in TYPESCRIPT_RULES.iter() {
            rule.apply(content, &mut issues);
        }
    }
    if extension == "json" {
        for rule in JSON_RULES.iter() {
            rule.apply(content, &mut issues);
        }
    }
    issues
}

/// Any error, any security finding, or too many warnings blocks.
pub fn should_block(issues: &[LintIssue], warning_threshold: usize) -> bool {
    let warnings = issues
        .iter()
        .filter(|i| i.severity == LintSeverity::Warning)
        .count();

    issues
        .iter()
        .any(|i| i.severity == LintSeverity::Error || i.category == LintCategory::Security)
        || warnings >= warning_threshold
}

/// Render issues grouped by severity.
pub fn format_feedback(issues: &[LintIssue]) -> String {
    if issues.is_empty() {
        return "Output validation passed successfully.".to_string();
    }

    let mut out = String::from("Output validation found the following issues:");
    let groups = [
        (LintSeverity::Error, "ERRORS (must be fixed):", true),
        (LintSeverity::Warning, "WARNINGS (should be addressed):", true),
        (LintSeverity::Info, "INFO (consider addressing):", false),
    ];

    for (severity, heading, with_suggestion) in groups {
        let group: Vec<_> = issues.iter().filter(|i| i.severity == severity).collect();
        if group.is_empty() {
            continue;
        }
        out.push_str("\n\n");
        out.push_str(heading);
        for issue in group {
            out.push_str(&format!("\n  • {} (line {})", issue.message, issue.line));
            if with_suggestion {
                out.push_str(&format!("\n    → {}", issue.suggestion));
            }
        }
    }
    out
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_file() {
        let issues = lint_content(Path::new("main.py"), "def add(a, b):\n    return a + b\n");
        assert!(issues.is_empty());
        assert!(!should_block(&issues, DEFAULT_WARNING_THRESHOLD));
        assert_eq!(format_feedback(&issues), "Output validation passed successfully.");
    }

    #[test]
    fn test_security_rules_apply_everywhere() {
        let issues = lint_content(Path::new("notes.md"), "config:\napi_key = \"sk-123\"\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, LintCategory::Security);
        assert_eq!(issues[0].line, 2);
        assert!(should_block(&issues, DEFAULT_WARNING_THRESHOLD));
    }

    #[test]
    fn test_code_rules_only_for_code() {
        let content = "// TODO: later\nconsole.log(x);\n";
        assert_eq!(lint_content(Path::new("a.js"), content).len(), 2);
        assert!(lint_content(Path::new("a.txt"), content).is_empty());
    }

    #[test]
    fn test_warning_threshold() {
        let content = "// TODO: a\n// TODO: b\nconsole.log(1)\n";
        let issues = lint_content(Path::new("x.js"), content);
        assert_eq!(issues.len(), 3);
        assert!(should_block(&issues, 3));
        assert!(!should_block(&issues, 4));
    }

    #[test]
    fn test_errors_block() {
        let issues = lint_content(Path::new("x.ts"), "function f() {}\ndebugger;\n");
        assert!(issues.iter().any(|i| i.severity == LintSeverity::Info));
        assert!(issues.iter().any(|i| i.message == "Debugger statements found"));
        assert!(should_block(&issues, DEFAULT_WARNING_THRESHOLD));
    }

    #[test]
    fn test_typescript_rules() {
        let issues = lint_content(Path::new("x.TSX"), "let a: any = 1;\n// @ts-ignore\n");
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.category == LintCategory::TypescriptQuality));
    }

    #[test]
    fn test_json_trailing_comma() {
        let issues = lint_content(Path::new("package.json"), "{\n  \"a\": 1,\n}\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, 2);
    }

    #[test]
    fn test_feedback_groups() {
        let issues = lint_content(Path::new("x.ts"), "// FIXME: x\n// TODO: y\nfunction f() {}\n");
        let text = format_feedback(&issues);
        let errors = text.find("ERRORS").unwrap();
        let warnings = text.find("WARNINGS").unwrap();
        let info = text.find("INFO").unwrap();
        assert!(errors < warnings && warnings < info);
        assert!(text.contains("→ Address FIXME issues before proceeding"));
        assert!(!text.contains("→ Implement the function body"));
    }
}
