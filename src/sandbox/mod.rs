//! Syntax-tree sandbox for submitted source code.
//!
//! Source is parsed into a generic node tree and checked against three
//! allowlists before anything is allowed to run:
//!
//! ```text
//! source ──► lexer ──► parser ──► Node tree ──► validator ──► Ok / SandboxError
//!                                                   │
//!                                     AllowlistPolicy (node kinds,
//!                                     builtins, modules)
//! ```

mod error;
pub mod lexer;
pub mod node;
pub mod parser;
mod policy;
mod validator;

pub use error::{Result, SandboxError, SecurityViolation};
pub use node::{Node, NodeKind, Position, UnknownNodeKind};
pub use parser::parse_module;
pub use policy::AllowlistPolicy;
pub use validator::{sandbox_validate, validate_tree};
