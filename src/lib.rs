//! Guardrails for autonomous agent tool calls.
//!
//! Before a tool runs, the [`GuardrailEngine`] decides whether the proposed
//! action may proceed:
//! - shell commands are scanned for destructive patterns
//! - batches of URLs are rate limited per host and checked against SSRF rules
//! - code snippets are parsed and validated against a syntax allowlist
//!
//! After a tool runs, written files can be linted and fetch responses scored.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod hook;
pub mod safety;
pub mod sandbox;
pub mod scoring;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GuardConfig;
pub use engine::{Action, Decision, GuardrailEngine, Verdict};
pub use error::{ConfigError, GuardError, Result};
