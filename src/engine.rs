//! Guardrail engine.
//!
//! Dispatches a proposed [`Action`] to the validators that cover it and
//! folds their findings into one [`Decision`]. The engine owns the rate
//! limiter state; everything else it holds is read-only configuration.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::safety::ssrf::ssrf_violation;
use crate::safety::{
    CommandScanner, Location, QuotaTable, RateLimiter, Severity, UrlAllowPolicy, Violation,
    ViolationKind, check_url, host_key,
};
use crate::sandbox::{AllowlistPolicy, SandboxError, sandbox_validate};

/// A proposed agent action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A shell command line.
    ShellCommand(String),
    /// URLs about to be fetched together.
    NetworkBatch(Vec<String>),
    /// Source code about to be executed.
    CodeSnippet(String),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::ShellCommand(_) => "shell_command",
            Action::NetworkBatch(_) => "network_batch",
            Action::CodeSnippet(_) => "code_snippet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Block,
}

/// Outcome of evaluating an action. Blocks iff there are violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub violations: Vec<Violation>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            verdict: Verdict::Allow,
            violations: Vec::new(),
        }
    }

    pub fn from_violations(violations: Vec<Violation>) -> Self {
        let verdict = if violations.is_empty() {
            Verdict::Allow
        } else {
            Verdict::Block
        };
        Self {
            verdict,
            violations,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Block
    }

    /// Highest severity among the violations.
    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }

    /// Human-readable report: one bullet per violation, followed by its
    /// suggestion where there is one.
    pub fn render(&self) -> String {
        if !self.is_blocked() {
            return "Action allowed.".to_string();
        }

        let mut out = String::from("Security validation failed:\n");
        for violation in &self.violations {
            let _ = writeln!(out, "• {}", violation);
            if let Some(ref suggestion) = violation.suggestion {
                let _ = writeln!(out, "  → {}", suggestion);
            }
        }
        out.push_str("\nThis action has been blocked for security reasons.");
        out
    }
}

/// Validators plus the shared rate limiter.
pub struct GuardrailEngine {
    scanner: CommandScanner,
    url_policy: UrlAllowPolicy,
    quotas: QuotaTable,
    limiter: Arc<RateLimiter>,
    sandbox_policy: AllowlistPolicy,
    clock: Arc<dyn Clock>,
}

impl GuardrailEngine {
    /// Engine with the default rule set and sandbox policy, and the URL
    /// policy and quotas from `config`.
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            scanner: CommandScanner::default(),
            url_policy: config.allowed_hosts.clone(),
            quotas: config.quotas.clone(),
            limiter: Arc::new(RateLimiter::new()),
            sandbox_policy: AllowlistPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a limiter between engines.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_scanner(mut self, scanner: CommandScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_sandbox_policy(mut self, policy: AllowlistPolicy) -> Self {
        self.sandbox_policy = policy;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn scanner(&self) -> &CommandScanner {
        &self.scanner
    }

    pub fn url_policy(&self) -> &UrlAllowPolicy {
        &self.url_policy
    }

    pub fn sandbox_policy(&self) -> &AllowlistPolicy {
        &self.sandbox_policy
    }

    /// Evaluate an action at the engine clock's current time.
    pub fn evaluate(&self, action: &Action) -> Decision {
        self.evaluate_at(action, self.clock.now_millis())
    }

    /// Evaluate an action at an explicit time.
    pub fn evaluate_at(&self, action: &Action, now_ms: u64) -> Decision {
        let decision = match action {
            Action::ShellCommand(command) => Decision::from_violations(self.scanner.scan(command)),
            Action::NetworkBatch(urls) => self.evaluate_batch(urls, now_ms),
            Action::CodeSnippet(source) => self.evaluate_code(source),
        };

        if decision.is_blocked() {
            warn!(
                action = action.kind(),
                violations = decision.violations.len(),
                "Action blocked"
            );
        } else {
            debug!(action = action.kind(), "Action allowed");
        }
        decision
    }

    /// Take one permit for `host`.
    pub fn acquire(&self, host: &str, now_ms: u64) -> Result<(), GuardError> {
        let quota = self.quotas.quota_for(host);
        if self.limiter.try_acquire(host, quota, now_ms) {
            return Ok(());
        }
        let retry_after = self.limiter.retry_after_ms(host, quota.window_ms, now_ms);
        Err(GuardError::RateLimited {
            key: host.to_string(),
            retry_after: Duration::from_millis(retry_after),
        })
    }

    fn evaluate_batch(&self, urls: &[String], now_ms: u64) -> Decision {
        let mut violations = Vec::new();

        for (index, url) in urls.iter().enumerate() {
            let host = host_key(url);

            if let Err(GuardError::RateLimited { key, retry_after }) = self.acquire(&host, now_ms) {
                let status = self.limiter.get_status(&key);
                violations.push(
                    Violation::new(
                        ViolationKind::RateLimit,
                        Severity::Medium,
                        format!(
                            "Rate limit exceeded for {}: {} requests, {} tokens remaining",
                            key, status.request_count, status.tokens
                        ),
                    )
                    .with_suggestion(format!(
                        "Retry after {} seconds",
                        retry_after.as_secs().max(1)
                    ))
                    .with_location(Location::BatchItem(index)),
                );
            }

            if let Err(reason) = check_url(url, &self.url_policy) {
                debug!(url = %url, %reason, "URL rejected");
                violations.push(ssrf_violation(url, index, &reason));
            }
        }

        Decision::from_violations(violations)
    }

    fn evaluate_code(&self, source: &str) -> Decision {
        match sandbox_validate(source, &self.sandbox_policy) {
            Ok(()) => Decision::allow(),
            Err(err) => Decision::from_violations(vec![sandbox_violation(&err)]),
        }
    }
}

fn sandbox_violation(err: &SandboxError) -> Violation {
    match err {
        SandboxError::Syntax { line, column, .. } => {
            Violation::new(ViolationKind::Syntax, Severity::Medium, err.to_string())
                .with_suggestion("Fix the syntax error before submitting the code")
                .with_location(Location::Source {
                    line: *line,
                    column: *column,
                })
        }
        SandboxError::Disallowed(violation) => {
            let position = violation.position();
            Violation::new(ViolationKind::Sandbox, Severity::High, err.to_string())
                .with_suggestion(format!(
                    "Remove '{}'; only allowlisted syntax, built-ins and modules may run",
                    violation.token()
                ))
                .with_location(Location::Source {
                    line: position.line,
                    column: position.column,
                })
        }
    }
}
