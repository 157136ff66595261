//! Allowlist policy for the code sandbox.

use std::collections::HashSet;

use crate::sandbox::node::{NodeKind, UnknownNodeKind};

/// Syntax nodes permitted by default.
///
/// Literals, operators, control flow, comprehensions, plain function and
/// lambda definitions, exception handling and imports. Classes, async
/// forms, assignment expressions, f-strings and starred unpacking are left
/// out.
const DEFAULT_NODE_KINDS: &[NodeKind] = &[
    NodeKind::Module,
    NodeKind::Expr,
    NodeKind::Name,
    NodeKind::Constant,
    NodeKind::Attribute,
    NodeKind::Call,
    NodeKind::Keyword,
    NodeKind::Assign,
    NodeKind::AugAssign,
    NodeKind::BinOp,
    NodeKind::Add,
    NodeKind::Sub,
    NodeKind::Mult,
    NodeKind::Div,
    NodeKind::Mod,
    NodeKind::Pow,
    NodeKind::LShift,
    NodeKind::RShift,
    NodeKind::BitOr,
    NodeKind::BitXor,
    NodeKind::BitAnd,
    NodeKind::FloorDiv,
    NodeKind::Invert,
    NodeKind::Not,
    NodeKind::UAdd,
    NodeKind::USub,
    NodeKind::Compare,
    NodeKind::Eq,
    NodeKind::NotEq,
    NodeKind::Lt,
    NodeKind::LtE,
    NodeKind::Gt,
    NodeKind::GtE,
    NodeKind::Is,
    NodeKind::IsNot,
    NodeKind::In,
    NodeKind::NotIn,
    NodeKind::BoolOp,
    NodeKind::And,
    NodeKind::Or,
    NodeKind::UnaryOp,
    NodeKind::Lambda,
    NodeKind::IfExp,
    NodeKind::Dict,
    NodeKind::Set,
    NodeKind::ListComp,
    NodeKind::SetComp,
    NodeKind::DictComp,
    NodeKind::GeneratorExp,
    NodeKind::Comprehension,
    NodeKind::Await,
    NodeKind::Yield,
    NodeKind::YieldFrom,
    NodeKind::Subscript,
    NodeKind::Slice,
    NodeKind::List,
    NodeKind::Tuple,
    NodeKind::Pass,
    NodeKind::Continue,
    NodeKind::Break,
    NodeKind::For,
    NodeKind::While,
    NodeKind::If,
    NodeKind::With,
    NodeKind::WithItem,
    NodeKind::Raise,
    NodeKind::Try,
    NodeKind::ExceptHandler,
    NodeKind::Assert,
    NodeKind::Delete,
    NodeKind::Global,
    NodeKind::Nonlocal,
    NodeKind::Return,
    NodeKind::FunctionDef,
    NodeKind::Arguments,
    NodeKind::Arg,
    NodeKind::Import,
    NodeKind::ImportFrom,
    NodeKind::Alias,
];

/// Built-in callables permitted by default. Reflection helpers that reach
/// attributes or scopes by name are not in the set.
const DEFAULT_BUILTINS: &[&str] = &[
    "print", "len", "range", "int", "float", "str", "bool", "abs", "all", "any", "ascii", "bin",
    "callable", "chr", "classmethod", "complex", "dict", "dir", "divmod", "enumerate", "filter",
    "format", "frozenset", "hasattr", "hash", "hex", "id", "isinstance", "issubclass", "iter",
    "list", "map", "max", "min", "next", "object", "oct", "ord", "pow", "property", "repr",
    "reversed", "round", "set", "slice", "sorted", "staticmethod", "sum", "super", "tuple",
    "type", "zip",
];

/// Modules importable by default.
const DEFAULT_MODULES: &[&str] = &[
    "math",
    "random",
    "datetime",
    "time",
    "json",
    "re",
    "collections",
    "functools",
    "itertools",
    "operator",
    "string",
];

/// The three allowlists the validator enforces.
///
/// Built once and shared read-only; validation never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowlistPolicy {
    pub allowed_node_kinds: HashSet<NodeKind>,
    pub allowed_builtins: HashSet<String>,
    pub allowed_modules: HashSet<String>,
}

impl Default for AllowlistPolicy {
    fn default() -> Self {
        Self {
            allowed_node_kinds: DEFAULT_NODE_KINDS.iter().copied().collect(),
            allowed_builtins: DEFAULT_BUILTINS.iter().map(|s| s.to_string()).collect(),
            allowed_modules: DEFAULT_MODULES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AllowlistPolicy {
    pub fn new(
        allowed_node_kinds: impl IntoIterator<Item = NodeKind>,
        allowed_builtins: impl IntoIterator<Item = impl Into<String>>,
        allowed_modules: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            allowed_node_kinds: allowed_node_kinds.into_iter().collect(),
            allowed_builtins: allowed_builtins.into_iter().map(Into::into).collect(),
            allowed_modules: allowed_modules.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a policy from node kind names in their canonical spelling
    /// (`"BinOp"`, `"comprehension"`).
    pub fn from_names<'a>(
        node_kinds: impl IntoIterator<Item = &'a str>,
        builtins: impl IntoIterator<Item = &'a str>,
        modules: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, UnknownNodeKind> {
        let kinds = node_kinds
            .into_iter()
            .map(|name| name.trim().parse::<NodeKind>())
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Self::new(kinds, builtins, modules))
    }

    /// Add modules to the allowlist.
    pub fn with_modules(mut self, modules: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_modules
            .extend(modules.into_iter().map(Into::into));
        self
    }

    /// Add builtins to the allowlist.
    pub fn with_builtins(mut self, builtins: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_builtins
            .extend(builtins.into_iter().map(Into::into));
        self
    }

    pub fn allows_kind(&self, kind: NodeKind) -> bool {
        self.allowed_node_kinds.contains(&kind)
    }

    pub fn allows_builtin(&self, name: &str) -> bool {
        self.allowed_builtins.contains(name)
    }

    /// Exact match on the dotted module name.
    pub fn allows_module(&self, module: &str) -> bool {
        self.allowed_modules.contains(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_excludes_dangerous_entries() {
        let policy = AllowlistPolicy::default();
        for name in ["eval", "exec", "open", "__import__", "compile", "getattr", "globals"] {
            assert!(!policy.allows_builtin(name), "{name} should be denied");
        }
        for module in ["os", "sys", "subprocess", "socket", "shutil", "os.path"] {
            assert!(!policy.allows_module(module), "{module} should be denied");
        }
        assert!(!policy.allows_kind(NodeKind::ClassDef));
        assert!(!policy.allows_kind(NodeKind::JoinedStr));
        assert!(policy.allows_kind(NodeKind::Constant));
        assert!(policy.allows_builtin("print"));
        assert!(policy.allows_module("math"));
    }

    #[test]
    fn test_from_names() {
        let policy =
            AllowlistPolicy::from_names(["Module", " Expr", "Call", "comprehension"], ["len"], ["json"])
                .unwrap();
        assert_eq!(policy.allowed_node_kinds.len(), 4);
        assert!(policy.allows_kind(NodeKind::Comprehension));
        assert!(policy.allows_builtin("len"));

        let err = AllowlistPolicy::from_names(["Exec"], [], []).unwrap_err();
        assert_eq!(err, UnknownNodeKind("Exec".to_string()));
    }

    #[test]
    fn test_extend_defaults() {
        let policy = AllowlistPolicy::default()
            .with_modules(["statistics"])
            .with_builtins(["open"]);
        assert!(policy.allows_module("statistics"));
        assert!(policy.allows_builtin("open"));
        assert!(policy.allows_module("math"));
    }
}
