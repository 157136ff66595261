//! Generic syntax tree handed to the sandbox validator.
//!
//! Every node is a kind tag, an optional identifier and ordered children.
//! The validator only depends on this shape, not on the parser.

use std::fmt;
use std::str::FromStr;

macro_rules! node_kinds {
    ($($variant:ident => $name:literal,)*) => {
        /// Syntax node kinds, named after the Python AST classes they mirror.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum NodeKind {
            $($variant,)*
        }

        impl NodeKind {
            /// Every kind, in declaration order.
            pub const ALL: &'static [NodeKind] = &[$(NodeKind::$variant,)*];

            /// Canonical name, as used in policy configuration.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(NodeKind::$variant => $name,)*
                }
            }
        }

        impl FromStr for NodeKind {
            type Err = UnknownNodeKind;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(NodeKind::$variant),)*
                    other => Err(UnknownNodeKind(other.to_string())),
                }
            }
        }
    };
}

node_kinds! {
    // Module and statements
    Module => "Module",
    FunctionDef => "FunctionDef",
    AsyncFunctionDef => "AsyncFunctionDef",
    ClassDef => "ClassDef",
    Return => "Return",
    Delete => "Delete",
    Assign => "Assign",
    AugAssign => "AugAssign",
    AnnAssign => "AnnAssign",
    For => "For",
    AsyncFor => "AsyncFor",
    While => "While",
    If => "If",
    With => "With",
    AsyncWith => "AsyncWith",
    Raise => "Raise",
    Try => "Try",
    Assert => "Assert",
    Import => "Import",
    ImportFrom => "ImportFrom",
    Global => "Global",
    Nonlocal => "Nonlocal",
    Expr => "Expr",
    Pass => "Pass",
    Break => "Break",
    Continue => "Continue",
    // Expressions
    BoolOp => "BoolOp",
    NamedExpr => "NamedExpr",
    BinOp => "BinOp",
    UnaryOp => "UnaryOp",
    Lambda => "Lambda",
    IfExp => "IfExp",
    Dict => "Dict",
    Set => "Set",
    ListComp => "ListComp",
    SetComp => "SetComp",
    DictComp => "DictComp",
    GeneratorExp => "GeneratorExp",
    Await => "Await",
    Yield => "Yield",
    YieldFrom => "YieldFrom",
    Compare => "Compare",
    Call => "Call",
    FormattedValue => "FormattedValue",
    JoinedStr => "JoinedStr",
    Constant => "Constant",
    Attribute => "Attribute",
    Subscript => "Subscript",
    Starred => "Starred",
    Name => "Name",
    List => "List",
    Tuple => "Tuple",
    Slice => "Slice",
    // Boolean, binary and unary operators
    And => "And",
    Or => "Or",
    Add => "Add",
    Sub => "Sub",
    Mult => "Mult",
    MatMult => "MatMult",
    Div => "Div",
    Mod => "Mod",
    Pow => "Pow",
    LShift => "LShift",
    RShift => "RShift",
    BitOr => "BitOr",
    BitXor => "BitXor",
    BitAnd => "BitAnd",
    FloorDiv => "FloorDiv",
    Invert => "Invert",
    Not => "Not",
    UAdd => "UAdd",
    USub => "USub",
    // Comparison operators
    Eq => "Eq",
    NotEq => "NotEq",
    Lt => "Lt",
    LtE => "LtE",
    Gt => "Gt",
    GtE => "GtE",
    Is => "Is",
    IsNot => "IsNot",
    In => "In",
    NotIn => "NotIn",
    // Auxiliary nodes
    Comprehension => "comprehension",
    ExceptHandler => "ExceptHandler",
    Arguments => "arguments",
    Arg => "arg",
    Keyword => "keyword",
    Alias => "alias",
    WithItem => "withitem",
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a node kind name that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node kind: {0}")]
pub struct UnknownNodeKind(pub String);

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A syntax tree node.
///
/// `ident` carries the identifier a node names: the variable of a `Name`,
/// the attribute of an `Attribute`, the dotted module of an `alias` or
/// `ImportFrom`, the name of a definition, keyword or argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub ident: Option<String>,
    pub children: Vec<Node>,
    pub position: Position,
}

impl Node {
    pub fn new(kind: NodeKind, position: Position) -> Self {
        Self {
            kind,
            ident: None,
            children: Vec::new(),
            position,
        }
    }

    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    /// The identifier as a string slice.
    pub fn ident(&self) -> Option<&str> {
        self.ident.as_deref()
    }

    /// Pre-order iterator over this node and all descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Number of nodes in the subtree.
    pub fn size(&self) -> usize {
        self.walk().count()
    }
}

// Deep trees (long operator chains) would overflow the stack with the
// default recursive drop.
impl Drop for Node {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

/// Depth-first, pre-order traversal using an explicit stack.
pub struct Walk<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in NodeKind::ALL {
            assert_eq!(kind.as_str().parse::<NodeKind>(), Ok(*kind));
        }
        assert_eq!(NodeKind::Keyword.to_string(), "keyword");
        assert!("Exec".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_walk_is_preorder() {
        let p = Position::default();
        let tree = Node::new(NodeKind::Module, p).with_children(vec![
            Node::new(NodeKind::Expr, p).with_children(vec![
                Node::new(NodeKind::Call, p).with_children(vec![
                    Node::new(NodeKind::Name, p).with_ident("print"),
                    Node::new(NodeKind::Constant, p),
                ]),
            ]),
            Node::new(NodeKind::Pass, p),
        ]);

        let kinds: Vec<_> = tree.walk().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Module,
                NodeKind::Expr,
                NodeKind::Call,
                NodeKind::Name,
                NodeKind::Constant,
                NodeKind::Pass,
            ]
        );
        assert_eq!(tree.size(), 6);
    }
}
