//! Allowlist-driven syntax tree validation.
//!
//! The validator never executes anything. It parses the source, then walks
//! the tree in pre-order and rejects the first node that falls outside the
//! policy. Attribute access (`x.y`) is not checked: the attribute a value
//! exposes is not tracked.

use tracing::debug;

use crate::sandbox::error::{Result, SandboxError, SecurityViolation};
use crate::sandbox::node::{Node, NodeKind};
use crate::sandbox::parser::parse_module;
use crate::sandbox::policy::AllowlistPolicy;

/// Parse `source` and validate the resulting tree.
///
/// A parse failure is reported as [`SandboxError::Syntax`] before any
/// policy check runs.
pub fn sandbox_validate(source: &str, policy: &AllowlistPolicy) -> Result<()> {
    let tree = parse_module(source)?;
    validate_tree(&tree, policy).map_err(|violation| {
        debug!(
            token = %violation.token(),
            line = violation.position().line,
            "Sandbox rejected source"
        );
        SandboxError::from(violation)
    })
}

/// Validate an already parsed tree, stopping at the first violation.
pub fn validate_tree(
    tree: &Node,
    policy: &AllowlistPolicy,
) -> std::result::Result<(), SecurityViolation> {
    tree.walk().try_for_each(|node| check_node(node, policy))
}

fn check_node(node: &Node, policy: &AllowlistPolicy) -> std::result::Result<(), SecurityViolation> {
    if !policy.allows_kind(node.kind) {
        return Err(SecurityViolation::NodeKind {
            kind: node.kind,
            position: node.position,
        });
    }

    match node.kind {
        NodeKind::Call => {
            // Only bare identifiers; `obj.method()` targets are attributes.
            if let Some(target) = node.children.first()
                && target.kind == NodeKind::Name
                && let Some(name) = target.ident()
                && !policy.allows_builtin(name)
            {
                return Err(SecurityViolation::Builtin {
                    name: name.to_string(),
                    position: target.position,
                });
            }
        }
        NodeKind::Import => {
            for alias in node.children.iter().filter(|c| c.kind == NodeKind::Alias) {
                let module = alias.ident().unwrap_or_default();
                if !policy.allows_module(module) {
                    return Err(SecurityViolation::Module {
                        module: module.to_string(),
                        position: alias.position,
                    });
                }
            }
        }
        NodeKind::ImportFrom => {
            let module = node.ident().unwrap_or_default();
            if !policy.allows_module(module) {
                return Err(SecurityViolation::Module {
                    module: module.to_string(),
                    position: node.position,
                });
            }
        }
        _ => {}
    }
    Ok(())
}
