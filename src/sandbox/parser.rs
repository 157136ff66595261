//! Recursive-descent parser producing the generic [`Node`] tree.
//!
//! Covers the statement and expression grammar of Python 3 closely enough
//! for sandbox validation. Anything it does not understand is reported as
//! a syntax error, so unsupported syntax is always rejected.

use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::lexer::{StrLit, Token, TokenKind, tokenize, tokenize_from};
use crate::sandbox::node::{Node, NodeKind, Position};

/// Maximum recursion depth for nested statements and expressions.
pub const MAX_NESTING: usize = 64;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const AUGMENTED_OPS: &[(&str, NodeKind)] = &[
    ("+=", NodeKind::Add),
    ("-=", NodeKind::Sub),
    ("*=", NodeKind::Mult),
    ("@=", NodeKind::MatMult),
    ("/=", NodeKind::Div),
    ("%=", NodeKind::Mod),
    ("**=", NodeKind::Pow),
    ("<<=", NodeKind::LShift),
    (">>=", NodeKind::RShift),
    ("|=", NodeKind::BitOr),
    ("^=", NodeKind::BitXor),
    ("&=", NodeKind::BitAnd),
    ("//=", NodeKind::FloorDiv),
];

const BITOR_OPS: &[(&str, NodeKind)] = &[("|", NodeKind::BitOr)];
const BITXOR_OPS: &[(&str, NodeKind)] = &[("^", NodeKind::BitXor)];
const BITAND_OPS: &[(&str, NodeKind)] = &[("&", NodeKind::BitAnd)];
const SHIFT_OPS: &[(&str, NodeKind)] = &[("<<", NodeKind::LShift), (">>", NodeKind::RShift)];
const ARITH_OPS: &[(&str, NodeKind)] = &[("+", NodeKind::Add), ("-", NodeKind::Sub)];
const TERM_OPS: &[(&str, NodeKind)] = &[
    ("*", NodeKind::Mult),
    ("/", NodeKind::Div),
    ("%", NodeKind::Mod),
    ("//", NodeKind::FloorDiv),
    ("@", NodeKind::MatMult),
];

/// Parse a module.
pub fn parse_module(source: &str) -> Result<Node> {
    let tokens = tokenize(source)?;
    Parser::new(tokens, 0).module()
}

fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth,
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn position(&self) -> Position {
        self.peek().position
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check_op(&self, op: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Op(o) if *o == op)
    }

    fn check_op_at(&self, offset: usize, op: &str) -> bool {
        matches!(self.peek_kind_at(offset), Some(TokenKind::Op(o)) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<Position> {
        if self.check_op(op) {
            Ok(self.advance().position)
        } else {
            Err(self.error(format!("expected '{}'", op)))
        }
    }

    fn check_kw(&self, kw: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Name(n) if n == kw)
    }

    fn check_kw_at(&self, offset: usize, kw: &str) -> bool {
        matches!(self.peek_kind_at(offset), Some(TokenKind::Name(n)) if n == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.check_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<Position> {
        if self.check_kw(kw) {
            Ok(self.advance().position)
        } else {
            Err(self.error(format!("expected '{}'", kw)))
        }
    }

    fn check_identifier(&self) -> bool {
        matches!(&self.peek().kind, TokenKind::Name(n) if !is_keyword(n))
    }

    fn expect_identifier(&mut self) -> Result<(String, Position)> {
        match &self.peek().kind {
            TokenKind::Name(n) if !is_keyword(n) => {
                let name = n.clone();
                let position = self.advance().position;
                Ok((name, position))
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn check_newline(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline)
    }

    fn at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::EndMarker)
    }

    fn at_statement_end(&self) -> bool {
        self.check_newline() || self.at_end() || self.check_op(";")
    }

    fn error(&self, message: impl Into<String>) -> SandboxError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Name(n) => format!("'{}'", n),
            TokenKind::Number(n) => format!("'{}'", n),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Op(o) => format!("'{}'", o),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::EndMarker => "end of input".to_string(),
        };
        SandboxError::syntax(format!("{}, found {}", message.into(), found), token.position)
    }

    /// Run `f` one nesting level deeper, failing once the limit is hit.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(SandboxError::syntax(
                "too many nested blocks or parentheses",
                self.position(),
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// True if the current token can begin an expression.
    fn starts_expression(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Name(n) => {
                !is_keyword(n)
                    || matches!(
                        n.as_str(),
                        "None" | "True" | "False" | "not" | "lambda" | "await"
                    )
            }
            TokenKind::Number(_) | TokenKind::Str(_) => true,
            TokenKind::Op(o) => matches!(*o, "(" | "[" | "{" | "-" | "+" | "~" | "*" | "..."),
            _ => false,
        }
    }

    // ---- statements ----

    fn module(mut self) -> Result<Node> {
        let mut module = Node::new(NodeKind::Module, Position::new(1, 1));
        while !self.at_end() {
            if self.check_newline() {
                self.advance();
                continue;
            }
            let statements = self.statement()?;
            module.children.extend(statements);
        }
        Ok(module)
    }

    fn statement(&mut self) -> Result<Vec<Node>> {
        let leading = match &self.peek().kind {
            TokenKind::Indent => return Err(self.error("unexpected indent")),
            TokenKind::Dedent => return Err(self.error("unexpected dedent")),
            TokenKind::Op("@") => "@".to_string(),
            TokenKind::Name(n) => n.clone(),
            _ => String::new(),
        };

        let compound = match leading.as_str() {
            "@" => self.nested(|p| p.decorated())?,
            "if" => self.nested(|p| p.if_statement())?,
            "while" => self.nested(|p| p.while_statement())?,
            "for" => self.nested(|p| p.for_statement(false))?,
            "try" => self.nested(|p| p.try_statement())?,
            "with" => self.nested(|p| p.with_statement(false))?,
            "def" => self.nested(|p| p.function_def(Vec::new(), false))?,
            "class" => self.nested(|p| p.class_def(Vec::new()))?,
            "async" => self.nested(|p| p.async_statement())?,
            _ => return self.simple_statements(),
        };
        Ok(vec![compound])
    }

    fn block(&mut self) -> Result<Vec<Node>> {
        self.expect_op(":")?;
        if !self.check_newline() {
            return self.simple_statements();
        }
        self.advance();
        if !matches!(self.peek().kind, TokenKind::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.advance();

        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::EndMarker => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn simple_statements(&mut self) -> Result<Vec<Node>> {
        let mut statements = vec![self.small_statement()?];
        while self.eat_op(";") {
            if self.check_newline() || self.at_end() {
                break;
            }
            statements.push(self.small_statement()?);
        }
        if self.check_newline() {
            self.advance();
        } else if !self.at_end() {
            return Err(self.error("invalid syntax"));
        }
        Ok(statements)
    }

    fn small_statement(&mut self) -> Result<Node> {
        let position = self.position();
        let keyword = match &self.peek().kind {
            TokenKind::Name(n) if is_keyword(n) => Some(n.clone()),
            _ => None,
        };

        match keyword.as_deref() {
            Some("pass") => {
                self.advance();
                Ok(Node::new(NodeKind::Pass, position))
            }
            Some("break") => {
                self.advance();
                Ok(Node::new(NodeKind::Break, position))
            }
            Some("continue") => {
                self.advance();
                Ok(Node::new(NodeKind::Continue, position))
            }
            Some("return") => {
                self.advance();
                let mut node = Node::new(NodeKind::Return, position);
                if !self.at_statement_end() {
                    node.push(self.star_expressions()?);
                }
                Ok(node)
            }
            Some("raise") => {
                self.advance();
                let mut node = Node::new(NodeKind::Raise, position);
                if !self.at_statement_end() {
                    node.push(self.test()?);
                    if self.eat_kw("from") {
                        node.push(self.test()?);
                    }
                }
                Ok(node)
            }
            Some(kw @ ("global" | "nonlocal")) => {
                let kind = if kw == "global" {
                    NodeKind::Global
                } else {
                    NodeKind::Nonlocal
                };
                self.advance();
                let mut names = vec![self.expect_identifier()?.0];
                while self.eat_op(",") {
                    names.push(self.expect_identifier()?.0);
                }
                Ok(Node::new(kind, position).with_ident(names.join(", ")))
            }
            Some("del") => {
                self.advance();
                let targets = self.target_list()?;
                Ok(Node::new(NodeKind::Delete, position).with_children(flatten_tuple(targets)))
            }
            Some("assert") => {
                self.advance();
                let mut node = Node::new(NodeKind::Assert, position);
                node.push(self.test()?);
                if self.eat_op(",") {
                    node.push(self.test()?);
                }
                Ok(node)
            }
            Some("import") => self.import_statement(),
            Some("from") => self.from_import_statement(),
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) -> Result<Node> {
        let position = self.position();
        let first = self.star_expressions_or_yield()?;

        if self.eat_op(":") {
            let mut node = Node::new(NodeKind::AnnAssign, position);
            node.push(first);
            node.push(self.test()?);
            if self.eat_op("=") {
                node.push(self.star_expressions_or_yield()?);
            }
            return Ok(node);
        }

        if let Some(&(op, kind)) = AUGMENTED_OPS.iter().find(|(op, _)| self.check_op(op)) {
            let op_position = self.expect_op(op)?;
            let value = self.star_expressions_or_yield()?;
            return Ok(Node::new(NodeKind::AugAssign, position).with_children(vec![
                first,
                Node::new(kind, op_position),
                value,
            ]));
        }

        if self.check_op("=") {
            let mut parts = vec![first];
            while self.eat_op("=") {
                parts.push(self.star_expressions_or_yield()?);
            }
            return Ok(Node::new(NodeKind::Assign, position).with_children(parts));
        }

        Ok(Node::new(NodeKind::Expr, position).with_children(vec![first]))
    }

    fn import_statement(&mut self) -> Result<Node> {
        let position = self.expect_kw("import")?;
        let mut node = Node::new(NodeKind::Import, position);
        loop {
            let alias_position = self.position();
            let module = self.dotted_name()?;
            if self.eat_kw("as") {
                self.expect_identifier()?;
            }
            node.push(Node::new(NodeKind::Alias, alias_position).with_ident(module));
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(node)
    }

    fn from_import_statement(&mut self) -> Result<Node> {
        let position = self.expect_kw("from")?;
        let mut module = String::new();
        loop {
            if self.eat_op(".") {
                module.push('.');
            } else if self.eat_op("...") {
                module.push_str("...");
            } else {
                break;
            }
        }
        if !self.check_kw("import") {
            module.push_str(&self.dotted_name()?);
        }
        if module.is_empty() {
            return Err(self.error("expected module name"));
        }
        self.expect_kw("import")?;

        let mut node = Node::new(NodeKind::ImportFrom, position).with_ident(module);
        if self.check_op("*") {
            let star = self.advance().position;
            node.push(Node::new(NodeKind::Alias, star).with_ident("*"));
            return Ok(node);
        }

        let parenthesized = self.eat_op("(");
        loop {
            let (name, alias_position) = self.expect_identifier()?;
            if self.eat_kw("as") {
                self.expect_identifier()?;
            }
            node.push(Node::new(NodeKind::Alias, alias_position).with_ident(name));
            if !self.eat_op(",") {
                break;
            }
            if parenthesized && self.check_op(")") {
                break;
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        Ok(node)
    }

    fn dotted_name(&mut self) -> Result<String> {
        let mut name = self.expect_identifier()?.0;
        while self.check_op(".") {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_identifier()?.0);
        }
        Ok(name)
    }

    fn if_statement(&mut self) -> Result<Node> {
        let position = self.position();
        self.advance(); // `if` or `elif`
        let mut node = Node::new(NodeKind::If, position);
        node.push(self.named_expression()?);
        node.children.extend(self.block()?);

        if self.check_kw("elif") {
            let elif = self.nested(|p| p.if_statement())?;
            node.push(elif);
        } else if self.eat_kw("else") {
            node.children.extend(self.block()?);
        }
        Ok(node)
    }

    fn while_statement(&mut self) -> Result<Node> {
        let position = self.expect_kw("while")?;
        let mut node = Node::new(NodeKind::While, position);
        node.push(self.named_expression()?);
        node.children.extend(self.block()?);
        if self.eat_kw("else") {
            node.children.extend(self.block()?);
        }
        Ok(node)
    }

    fn for_statement(&mut self, is_async: bool) -> Result<Node> {
        let position = self.expect_kw("for")?;
        let kind = if is_async {
            NodeKind::AsyncFor
        } else {
            NodeKind::For
        };
        let mut node = Node::new(kind, position);
        node.push(self.target_list()?);
        self.expect_kw("in")?;
        node.push(self.star_expressions()?);
        node.children.extend(self.block()?);
        if self.eat_kw("else") {
            node.children.extend(self.block()?);
        }
        Ok(node)
    }

    fn try_statement(&mut self) -> Result<Node> {
        let position = self.expect_kw("try")?;
        let mut node = Node::new(NodeKind::Try, position);
        node.children.extend(self.block()?);

        let mut handlers = 0;
        while self.check_kw("except") {
            let handler_position = self.advance().position;
            self.eat_op("*");
            let mut handler = Node::new(NodeKind::ExceptHandler, handler_position);
            if !self.check_op(":") {
                handler.push(self.test()?);
                if self.eat_kw("as") {
                    let (name, _) = self.expect_identifier()?;
                    handler.ident = Some(name);
                }
            }
            handler.children.extend(self.block()?);
            node.push(handler);
            handlers += 1;
        }

        if handlers > 0 && self.eat_kw("else") {
            node.children.extend(self.block()?);
        }
        let has_finally = self.eat_kw("finally");
        if has_finally {
            node.children.extend(self.block()?);
        }
        if handlers == 0 && !has_finally {
            return Err(self.error("expected 'except' or 'finally' block"));
        }
        Ok(node)
    }

    fn with_statement(&mut self, is_async: bool) -> Result<Node> {
        let position = self.expect_kw("with")?;
        let kind = if is_async {
            NodeKind::AsyncWith
        } else {
            NodeKind::With
        };
        let mut node = Node::new(kind, position);
        loop {
            let item_position = self.position();
            let mut item = Node::new(NodeKind::WithItem, item_position);
            item.push(self.test()?);
            if self.eat_kw("as") {
                item.push(self.star_target()?);
            }
            node.push(item);
            if !self.eat_op(",") {
                break;
            }
        }
        node.children.extend(self.block()?);
        Ok(node)
    }

    fn async_statement(&mut self) -> Result<Node> {
        self.expect_kw("async")?;
        if self.check_kw("def") {
            self.function_def(Vec::new(), true)
        } else if self.check_kw("for") {
            self.for_statement(true)
        } else if self.check_kw("with") {
            self.with_statement(true)
        } else {
            Err(self.error("expected 'def', 'for' or 'with' after 'async'"))
        }
    }

    fn decorated(&mut self) -> Result<Node> {
        let mut decorators = Vec::new();
        while self.eat_op("@") {
            decorators.push(self.named_expression()?);
            if !self.check_newline() {
                return Err(self.error("expected newline after decorator"));
            }
            self.advance();
        }

        if self.check_kw("def") {
            self.function_def(decorators, false)
        } else if self.check_kw("class") {
            self.class_def(decorators)
        } else if self.check_kw("async") && self.check_kw_at(1, "def") {
            self.advance();
            self.function_def(decorators, true)
        } else {
            Err(self.error("expected function or class definition after decorator"))
        }
    }

    fn function_def(&mut self, decorators: Vec<Node>, is_async: bool) -> Result<Node> {
        let position = self.expect_kw("def")?;
        let (name, _) = self.expect_identifier()?;
        let kind = if is_async {
            NodeKind::AsyncFunctionDef
        } else {
            NodeKind::FunctionDef
        };
        let mut node = Node::new(kind, position).with_ident(name);

        let params_position = self.expect_op("(")?;
        node.push(self.parameters(")", true, params_position)?);
        self.expect_op(")")?;

        let returns = if self.eat_op("->") {
            Some(self.test()?)
        } else {
            None
        };
        node.children.extend(self.block()?);
        node.children.extend(decorators);
        if let Some(returns) = returns {
            node.push(returns);
        }
        Ok(node)
    }

    fn class_def(&mut self, decorators: Vec<Node>) -> Result<Node> {
        let position = self.expect_kw("class")?;
        let (name, _) = self.expect_identifier()?;
        let mut node = Node::new(NodeKind::ClassDef, position).with_ident(name);
        if self.eat_op("(") {
            let (args, keywords) = self.arguments()?;
            node.children.extend(args);
            node.children.extend(keywords);
        }
        node.children.extend(self.block()?);
        node.children.extend(decorators);
        Ok(node)
    }

    /// Parameter list up to (not including) `closer`.
    fn parameters(&mut self, closer: &str, annotated: bool, position: Position) -> Result<Node> {
        let mut args = Vec::new();
        let mut defaults = Vec::new();

        while !self.check_op(closer) {
            if self.eat_op("/") {
                // Positional-only marker.
            } else if self.check_op("*") || self.check_op("**") {
                self.advance();
                if !(self.check_op(",") || self.check_op(closer)) {
                    args.push(self.parameter(annotated)?);
                }
            } else {
                args.push(self.parameter(annotated)?);
                if self.eat_op("=") {
                    defaults.push(self.test()?);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }

        let mut node = Node::new(NodeKind::Arguments, position).with_children(args);
        node.children.extend(defaults);
        Ok(node)
    }

    fn parameter(&mut self, annotated: bool) -> Result<Node> {
        let (name, position) = self.expect_identifier()?;
        let mut arg = Node::new(NodeKind::Arg, position).with_ident(name);
        if annotated && self.eat_op(":") {
            arg.push(self.test()?);
        }
        Ok(arg)
    }

    // ---- expressions ----

    /// Comma separated expressions, possibly starred; a tuple if more than
    /// one or a trailing comma.
    fn star_expressions(&mut self) -> Result<Node> {
        let position = self.position();
        let first = self.star_or_named()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.starts_expression() {
                break;
            }
            items.push(self.star_or_named()?);
        }
        Ok(Node::new(NodeKind::Tuple, position).with_children(items))
    }

    fn star_expressions_or_yield(&mut self) -> Result<Node> {
        if self.check_kw("yield") {
            self.yield_expression()
        } else {
            self.star_expressions()
        }
    }

    fn yield_expression(&mut self) -> Result<Node> {
        let position = self.expect_kw("yield")?;
        if self.eat_kw("from") {
            let value = self.test()?;
            return Ok(Node::new(NodeKind::YieldFrom, position).with_children(vec![value]));
        }
        let mut node = Node::new(NodeKind::Yield, position);
        if self.starts_expression() {
            node.push(self.star_expressions()?);
        }
        Ok(node)
    }

    fn star_or_named(&mut self) -> Result<Node> {
        if self.check_op("*") {
            let position = self.advance().position;
            let value = self.bitwise_or()?;
            Ok(Node::new(NodeKind::Starred, position).with_children(vec![value]))
        } else {
            self.named_expression()
        }
    }

    fn named_expression(&mut self) -> Result<Node> {
        let position = self.position();
        let target = self.test()?;
        if self.check_op(":=") {
            if target.kind != NodeKind::Name {
                return Err(self.error("cannot use assignment expression here"));
            }
            self.advance();
            let value = self.test()?;
            return Ok(Node::new(NodeKind::NamedExpr, position).with_children(vec![target, value]));
        }
        Ok(target)
    }

    fn test(&mut self) -> Result<Node> {
        self.nested(|p| p.test_inner())
    }

    fn test_inner(&mut self) -> Result<Node> {
        if self.check_kw("lambda") {
            return self.lambda();
        }
        let position = self.position();
        let body = self.or_test()?;
        if self.eat_kw("if") {
            let condition = self.or_test()?;
            self.expect_kw("else")?;
            let orelse = self.test()?;
            return Ok(Node::new(NodeKind::IfExp, position).with_children(vec![
                condition,
                body,
                orelse,
            ]));
        }
        Ok(body)
    }

    fn lambda(&mut self) -> Result<Node> {
        let position = self.expect_kw("lambda")?;
        let params_position = self.position();
        let params = self.parameters(":", false, params_position)?;
        self.expect_op(":")?;
        let body = self.test()?;
        Ok(Node::new(NodeKind::Lambda, position).with_children(vec![params, body]))
    }

    fn or_test(&mut self) -> Result<Node> {
        self.bool_chain("or", NodeKind::Or, |p| p.and_test())
    }

    fn and_test(&mut self) -> Result<Node> {
        self.bool_chain("and", NodeKind::And, |p| p.not_test())
    }

    fn bool_chain(
        &mut self,
        keyword: &str,
        op: NodeKind,
        operand: fn(&mut Self) -> Result<Node>,
    ) -> Result<Node> {
        let position = self.position();
        let first = operand(self)?;
        if !self.check_kw(keyword) {
            return Ok(first);
        }
        let mut node = Node::new(NodeKind::BoolOp, position);
        node.push(Node::new(op, self.position()));
        node.push(first);
        while self.eat_kw(keyword) {
            node.push(operand(self)?);
        }
        Ok(node)
    }

    fn not_test(&mut self) -> Result<Node> {
        if self.check_kw("not") {
            let position = self.advance().position;
            let operand = self.nested(|p| p.not_test())?;
            return Ok(Node::new(NodeKind::UnaryOp, position)
                .with_children(vec![Node::new(NodeKind::Not, position), operand]));
        }
        self.comparison()
    }

    fn comparison_operator(&mut self) -> Option<Node> {
        let position = self.position();
        // (kind, tokens consumed)
        let (kind, width) = match &self.peek().kind {
            TokenKind::Op("<") => (NodeKind::Lt, 1),
            TokenKind::Op(">") => (NodeKind::Gt, 1),
            TokenKind::Op("==") => (NodeKind::Eq, 1),
            TokenKind::Op(">=") => (NodeKind::GtE, 1),
            TokenKind::Op("<=") => (NodeKind::LtE, 1),
            TokenKind::Op("!=") => (NodeKind::NotEq, 1),
            TokenKind::Name(n) if n == "in" => (NodeKind::In, 1),
            TokenKind::Name(n) if n == "not" && self.check_kw_at(1, "in") => (NodeKind::NotIn, 2),
            TokenKind::Name(n) if n == "is" && self.check_kw_at(1, "not") => (NodeKind::IsNot, 2),
            TokenKind::Name(n) if n == "is" => (NodeKind::Is, 1),
            _ => return None,
        };
        for _ in 0..width {
            self.advance();
        }
        Some(Node::new(kind, position))
    }

    fn comparison(&mut self) -> Result<Node> {
        let position = self.position();
        let left = self.bitwise_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_operator() {
            ops.push(op);
            comparators.push(self.bitwise_or()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        let mut node = Node::new(NodeKind::Compare, position);
        node.push(left);
        node.children.extend(ops);
        node.children.extend(comparators);
        Ok(node)
    }

    fn binary_chain(
        &mut self,
        ops: &[(&str, NodeKind)],
        operand: fn(&mut Self) -> Result<Node>,
    ) -> Result<Node> {
        let position = self.position();
        let mut left = operand(self)?;
        while let Some(&(op, kind)) = ops.iter().find(|(op, _)| self.check_op(op)) {
            let op_position = self.expect_op(op)?;
            let right = operand(self)?;
            left = Node::new(NodeKind::BinOp, position).with_children(vec![
                left,
                Node::new(kind, op_position),
                right,
            ]);
        }
        Ok(left)
    }

    fn bitwise_or(&mut self) -> Result<Node> {
        self.binary_chain(BITOR_OPS, |p| p.bitwise_xor())
    }

    fn bitwise_xor(&mut self) -> Result<Node> {
        self.binary_chain(BITXOR_OPS, |p| p.bitwise_and())
    }

    fn bitwise_and(&mut self) -> Result<Node> {
        self.binary_chain(BITAND_OPS, |p| p.shift_expr())
    }

    fn shift_expr(&mut self) -> Result<Node> {
        self.binary_chain(SHIFT_OPS, |p| p.arith_expr())
    }

    fn arith_expr(&mut self) -> Result<Node> {
        self.binary_chain(ARITH_OPS, |p| p.term())
    }

    fn term(&mut self) -> Result<Node> {
        self.binary_chain(TERM_OPS, |p| p.factor())
    }

    fn factor(&mut self) -> Result<Node> {
        let position = self.position();
        let op = match &self.peek().kind {
            TokenKind::Op("+") => Some(NodeKind::UAdd),
            TokenKind::Op("-") => Some(NodeKind::USub),
            TokenKind::Op("~") => Some(NodeKind::Invert),
            _ => None,
        };
        match op {
            Some(kind) => {
                self.advance();
                let operand = self.nested(|p| p.factor())?;
                Ok(Node::new(NodeKind::UnaryOp, position)
                    .with_children(vec![Node::new(kind, position), operand]))
            }
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node> {
        let position = self.position();
        let base = self.await_primary()?;
        if self.check_op("**") {
            let op_position = self.advance().position;
            let exponent = self.nested(|p| p.factor())?;
            return Ok(Node::new(NodeKind::BinOp, position).with_children(vec![
                base,
                Node::new(NodeKind::Pow, op_position),
                exponent,
            ]));
        }
        Ok(base)
    }

    fn await_primary(&mut self) -> Result<Node> {
        if self.check_kw("await") {
            let position = self.advance().position;
            let value = self.primary()?;
            return Ok(Node::new(NodeKind::Await, position).with_children(vec![value]));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node> {
        let mut node = self.atom()?;
        loop {
            let position = self.position();
            if self.eat_op("(") {
                let (args, keywords) = self.arguments()?;
                let mut call = Node::new(NodeKind::Call, node.position);
                call.push(node);
                call.children.extend(args);
                call.children.extend(keywords);
                node = call;
            } else if self.eat_op("[") {
                let index = self.subscripts()?;
                self.expect_op("]")?;
                node = Node::new(NodeKind::Subscript, node.position).with_children(vec![node, index]);
            } else if self.eat_op(".") {
                let (attr, _) = self.expect_identifier()?;
                node = Node::new(NodeKind::Attribute, position)
                    .with_ident(attr)
                    .with_children(vec![node]);
            } else {
                return Ok(node);
            }
        }
    }

    /// Call arguments after the opening parenthesis, consuming the closing
    /// one. Returns positional arguments and keywords separately.
    fn arguments(&mut self) -> Result<(Vec<Node>, Vec<Node>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();

        while !self.check_op(")") {
            let position = self.position();
            if self.eat_op("**") {
                let value = self.test()?;
                keywords.push(Node::new(NodeKind::Keyword, position).with_children(vec![value]));
            } else if self.check_op("*") {
                args.push(self.star_or_named()?);
            } else if self.check_identifier() && self.check_op_at(1, "=") {
                let (name, _) = self.expect_identifier()?;
                self.expect_op("=")?;
                let value = self.test()?;
                keywords.push(
                    Node::new(NodeKind::Keyword, position)
                        .with_ident(name)
                        .with_children(vec![value]),
                );
            } else {
                let value = self.named_expression()?;
                if self.check_comprehension() {
                    let generators = self.comprehension_clauses()?;
                    let mut generator = Node::new(NodeKind::GeneratorExp, position);
                    generator.push(value);
                    generator.children.extend(generators);
                    args.push(generator);
                } else {
                    args.push(value);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok((args, keywords))
    }

    fn subscripts(&mut self) -> Result<Node> {
        let position = self.position();
        let first = self.subscript()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            items.push(self.subscript()?);
        }
        Ok(Node::new(NodeKind::Tuple, position).with_children(items))
    }

    fn subscript(&mut self) -> Result<Node> {
        let position = self.position();
        let lower = if self.check_op(":") {
            None
        } else {
            let value = self.star_or_named()?;
            if !self.check_op(":") {
                return Ok(value);
            }
            Some(value)
        };

        let mut slice = Node::new(NodeKind::Slice, position);
        slice.children.extend(lower);
        self.expect_op(":")?;
        if !self.check_op("]") && !self.check_op(",") && !self.check_op(":") {
            slice.push(self.test()?);
        }
        if self.eat_op(":") && !self.check_op("]") && !self.check_op(",") {
            slice.push(self.test()?);
        }
        Ok(slice)
    }

    fn check_comprehension(&self) -> bool {
        self.check_kw("for") || (self.check_kw("async") && self.check_kw_at(1, "for"))
    }

    fn comprehension_clauses(&mut self) -> Result<Vec<Node>> {
        let mut clauses = Vec::new();
        while self.check_comprehension() {
            self.eat_kw("async");
            let position = self.expect_kw("for")?;
            let mut clause = Node::new(NodeKind::Comprehension, position);
            clause.push(self.target_list()?);
            self.expect_kw("in")?;
            clause.push(self.or_test()?);
            while self.eat_kw("if") {
                clause.push(self.nested(|p| p.or_test())?);
            }
            clauses.push(clause);
        }
        Ok(clauses)
    }

    /// Assignment targets for `for`, `del` and comprehensions.
    fn target_list(&mut self) -> Result<Node> {
        let position = self.position();
        let first = self.star_target()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_kw("in") || self.at_statement_end() || self.check_op("=") {
                break;
            }
            items.push(self.star_target()?);
        }
        Ok(Node::new(NodeKind::Tuple, position).with_children(items))
    }

    fn star_target(&mut self) -> Result<Node> {
        if self.check_op("*") {
            let position = self.advance().position;
            let value = self.bitwise_or()?;
            return Ok(Node::new(NodeKind::Starred, position).with_children(vec![value]));
        }
        self.bitwise_or()
    }

    fn atom(&mut self) -> Result<Node> {
        let position = self.position();
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Op("(") => {
                self.advance();
                self.nested(|p| p.parenthesized(position))
            }
            TokenKind::Op("[") => {
                self.advance();
                self.nested(|p| p.list_display(position))
            }
            TokenKind::Op("{") => {
                self.advance();
                self.nested(|p| p.brace_display(position))
            }
            TokenKind::Op("...") => {
                self.advance();
                Ok(Node::new(NodeKind::Constant, position).with_ident("..."))
            }
            TokenKind::Number(literal) => {
                self.advance();
                Ok(Node::new(NodeKind::Constant, position).with_ident(literal))
            }
            TokenKind::Str(_) => self.strings(),
            TokenKind::Name(name) => {
                let kind = if matches!(name.as_str(), "None" | "True" | "False") {
                    NodeKind::Constant
                } else if is_keyword(&name) {
                    return Err(self.error("invalid syntax"));
                } else {
                    NodeKind::Name
                };
                self.advance();
                Ok(Node::new(kind, position).with_ident(name))
            }
            _ => Err(self.error("invalid syntax")),
        }
    }

    fn parenthesized(&mut self, position: Position) -> Result<Node> {
        if self.eat_op(")") {
            return Ok(Node::new(NodeKind::Tuple, position));
        }
        if self.check_kw("yield") {
            let value = self.yield_expression()?;
            self.expect_op(")")?;
            return Ok(value);
        }

        let first = self.star_or_named()?;
        if self.check_comprehension() {
            let generators = self.comprehension_clauses()?;
            self.expect_op(")")?;
            let mut node = Node::new(NodeKind::GeneratorExp, position);
            node.push(first);
            node.children.extend(generators);
            return Ok(node);
        }
        if self.eat_op(")") {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op(")") {
                break;
            }
            items.push(self.star_or_named()?);
        }
        self.expect_op(")")?;
        Ok(Node::new(NodeKind::Tuple, position).with_children(items))
    }

    fn list_display(&mut self, position: Position) -> Result<Node> {
        if self.eat_op("]") {
            return Ok(Node::new(NodeKind::List, position));
        }
        let first = self.star_or_named()?;
        if self.check_comprehension() {
            let generators = self.comprehension_clauses()?;
            self.expect_op("]")?;
            let mut node = Node::new(NodeKind::ListComp, position);
            node.push(first);
            node.children.extend(generators);
            return Ok(node);
        }

        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            items.push(self.star_or_named()?);
        }
        self.expect_op("]")?;
        Ok(Node::new(NodeKind::List, position).with_children(items))
    }

    fn brace_display(&mut self, position: Position) -> Result<Node> {
        if self.eat_op("}") {
            return Ok(Node::new(NodeKind::Dict, position));
        }

        // Dictionary: `**mapping` or `key: value` as first entry.
        if self.check_op("**") {
            return self.dict_display(position, None);
        }
        let first = self.star_or_named()?;
        if self.check_op(":") {
            if first.kind == NodeKind::Starred {
                return Err(self.error("cannot use a starred expression as a dictionary key"));
            }
            return self.dict_display(position, Some(first));
        }

        if self.check_comprehension() {
            let generators = self.comprehension_clauses()?;
            self.expect_op("}")?;
            let mut node = Node::new(NodeKind::SetComp, position);
            node.push(first);
            node.children.extend(generators);
            return Ok(node);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op("}") {
                break;
            }
            items.push(self.star_or_named()?);
        }
        self.expect_op("}")?;
        Ok(Node::new(NodeKind::Set, position).with_children(items))
    }

    /// Dictionary entries after the opening brace. `first_key` is a key the
    /// caller already parsed while telling a dict from a set.
    fn dict_display(&mut self, position: Position, mut first_key: Option<Node>) -> Result<Node> {
        let mut entries = Vec::new();
        let mut first_entry = true;
        loop {
            if first_key.is_none() && self.eat_op("**") {
                entries.push(self.bitwise_or()?);
            } else {
                let key = match first_key.take() {
                    Some(key) => key,
                    None => self.test()?,
                };
                self.expect_op(":")?;
                let value = self.test()?;
                if first_entry && self.check_comprehension() {
                    let generators = self.comprehension_clauses()?;
                    self.expect_op("}")?;
                    let mut node = Node::new(NodeKind::DictComp, position);
                    node.push(key);
                    node.push(value);
                    node.children.extend(generators);
                    return Ok(node);
                }
                entries.push(key);
                entries.push(value);
            }
            first_entry = false;
            if !self.eat_op(",") || self.check_op("}") {
                break;
            }
        }
        self.expect_op("}")?;
        Ok(Node::new(NodeKind::Dict, position).with_children(entries))
    }

    /// One or more adjacent string literals.
    fn strings(&mut self) -> Result<Node> {
        let position = self.position();
        let mut literals: Vec<(StrLit, Position)> = Vec::new();
        while let TokenKind::Str(lit) = &self.peek().kind {
            let lit = lit.clone();
            let token_position = self.advance().position;
            literals.push((lit, token_position));
        }

        let bytes = literals.iter().filter(|(lit, _)| lit.bytes).count();
        if bytes != 0 && bytes != literals.len() {
            return Err(SandboxError::syntax(
                "cannot mix bytes and nonbytes literals",
                position,
            ));
        }

        if !literals.iter().any(|(lit, _)| lit.formatted) {
            return Ok(Node::new(NodeKind::Constant, position));
        }

        let mut joined = Node::new(NodeKind::JoinedStr, position);
        for (lit, token_position) in &literals {
            if lit.formatted {
                let values = self.fstring_fields(&lit.body, *token_position)?;
                joined.children.extend(values);
            }
        }
        Ok(joined)
    }

    /// Parse the replacement fields of an f-string body into
    /// `FormattedValue` nodes.
    fn fstring_fields(&mut self, body: &str, position: Position) -> Result<Vec<Node>> {
        if self.depth >= MAX_NESTING {
            return Err(SandboxError::syntax("f-string nested too deeply", position));
        }

        let chars: Vec<char> = body.chars().collect();
        let mut values = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '{' if chars.get(i + 1) == Some(&'{') => i += 2,
                '}' if chars.get(i + 1) == Some(&'}') => i += 2,
                '}' => {
                    return Err(SandboxError::syntax(
                        "f-string: single '}' is not allowed",
                        position,
                    ));
                }
                '{' => {
                    let field = scan_replacement_field(&chars, i + 1).ok_or_else(|| {
                        SandboxError::syntax("f-string: expecting '}'", position)
                    })?;
                    values.push(self.formatted_value(&field, position)?);
                    i = field.end + 1;
                }
                _ => i += 1,
            }
        }
        Ok(values)
    }

    fn formatted_value(&mut self, field: &ReplacementField, position: Position) -> Result<Node> {
        let expression = field.expression.trim();
        let expression = expression
            .strip_suffix('=')
            .filter(|e| !e.ends_with(['=', '!', '<', '>']))
            .unwrap_or(expression);
        if expression.trim().is_empty() {
            return Err(SandboxError::syntax(
                "f-string: empty expression not allowed",
                position,
            ));
        }

        let tokens = tokenize_from(&format!("({})", expression), position)?;
        let mut inner = Parser::new(tokens, self.depth + 1);
        let value = inner.star_expressions_or_yield()?;
        if inner.check_newline() {
            inner.advance();
        }
        if !inner.at_end() {
            return Err(inner.error("f-string: invalid expression"));
        }

        let mut node = Node::new(NodeKind::FormattedValue, position);
        node.push(value);
        if let Some(spec) = &field.format_spec {
            self.depth += 1;
            let spec_fields = self.fstring_fields(spec, position);
            self.depth -= 1;
            let spec_fields = spec_fields?;
            if !spec_fields.is_empty() {
                node.push(Node::new(NodeKind::JoinedStr, position).with_children(spec_fields));
            }
        }
        Ok(node)
    }
}

/// Nodes of a tuple target, or the target itself.
fn flatten_tuple(mut node: Node) -> Vec<Node> {
    if node.kind == NodeKind::Tuple {
        std::mem::take(&mut node.children)
    } else {
        vec![node]
    }
}

struct ReplacementField {
    expression: String,
    format_spec: Option<String>,
    /// Index of the closing `}`.
    end: usize,
}

/// Scan an f-string replacement field starting just after its `{`.
fn scan_replacement_field(chars: &[char], start: usize) -> Option<ReplacementField> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = start;
    let mut expression_end = None;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == '\\' {
                i += 1;
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth > 0 => depth -= 1,
            '}' => {
                let end_expr = expression_end.unwrap_or(i);
                return Some(build_field(chars, start, end_expr, i));
            }
            '!' if depth == 0 && chars.get(i + 1) != Some(&'=') => {
                expression_end.get_or_insert(i);
            }
            ':' if depth == 0 => {
                let end_expr = expression_end.unwrap_or(i);
                let spec_end = scan_format_spec(chars, i + 1)?;
                let mut field = build_field(chars, start, end_expr, spec_end);
                field.format_spec = Some(chars[i + 1..spec_end].iter().collect());
                return Some(field);
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn build_field(chars: &[char], start: usize, expression_end: usize, end: usize) -> ReplacementField {
    ReplacementField {
        expression: chars[start..expression_end].iter().collect(),
        format_spec: None,
        end,
    }
}

/// Index of the `}` closing a format spec that begins at `start`.
fn scan_format_spec(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in chars[start..].iter().enumerate() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(start + offset),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<NodeKind> {
        parse_module(source)
            .unwrap()
            .walk()
            .map(|n| n.kind)
            .collect()
    }

    fn idents(source: &str, kind: NodeKind) -> Vec<String> {
        parse_module(source)
            .unwrap()
            .walk()
            .filter(|n| n.kind == kind)
            .filter_map(|n| n.ident.clone())
            .collect()
    }

    #[test]
    fn test_call_with_binop() {
        use NodeKind::*;
        assert_eq!(
            kinds("print(1+2)"),
            vec![Module, Expr, Call, Name, BinOp, Constant, Add, Constant]
        );
    }

    #[test]
    fn test_imports() {
        assert_eq!(idents("import os", NodeKind::Alias), vec!["os"]);
        assert_eq!(
            idents("import os.path as p, json", NodeKind::Alias),
            vec!["os.path", "json"]
        );
        assert_eq!(
            idents("from collections import (deque,\n OrderedDict,)", NodeKind::ImportFrom),
            vec!["collections"]
        );
        assert_eq!(idents("from . import x", NodeKind::ImportFrom), vec!["."]);
        assert_eq!(idents("from ..pkg.mod import *", NodeKind::ImportFrom), vec!["..pkg.mod"]);
    }

    #[test]
    fn test_compound_statements() {
        let source = "\
def fib(n: int = 10) -> list:
    a, b = 0, 1
    out = []
    for _ in range(n):
        out.append(a)
        a, b = b, a + b
    return out

while True:
    try:
        x = fib(5)
    except (ValueError, TypeError) as e:
        raise RuntimeError('bad') from e
    else:
        break
    finally:
        pass
";
        let found = kinds(source);
        for kind in [
            NodeKind::FunctionDef,
            NodeKind::Arguments,
            NodeKind::Arg,
            NodeKind::For,
            NodeKind::Return,
            NodeKind::While,
            NodeKind::Try,
            NodeKind::ExceptHandler,
            NodeKind::Raise,
            NodeKind::Break,
            NodeKind::Pass,
            NodeKind::Attribute,
            NodeKind::Tuple,
        ] {
            assert!(found.contains(&kind), "missing {kind}");
        }
    }

    #[test]
    fn test_comprehensions_and_lambda() {
        let found = kinds(
            "squares = [x ** 2 for x in range(10) if x % 2]\n\
             pairs = {k: v for k, v in items}\n\
             uniq = {x for x in data}\n\
             total = sum(x for x in data)\n\
             f = lambda a, b=2: a if a > b else b\n",
        );
        for kind in [
            NodeKind::ListComp,
            NodeKind::DictComp,
            NodeKind::SetComp,
            NodeKind::GeneratorExp,
            NodeKind::Comprehension,
            NodeKind::Lambda,
            NodeKind::IfExp,
            NodeKind::Pow,
        ] {
            assert!(found.contains(&kind), "missing {kind}");
        }
    }

    #[test]
    fn test_displays_and_subscripts() {
        let found = kinds("d = {'a': 1, **extra}\ns = {1, 2}\nx = items[1:10:2]\ny = m[a, b]\nz = ()\n");
        assert!(found.contains(&NodeKind::Dict));
        assert!(found.contains(&NodeKind::Set));
        assert!(found.contains(&NodeKind::Slice));
        assert!(found.contains(&NodeKind::Subscript));
    }

    #[test]
    fn test_fstring_fields_are_parsed() {
        let tree = parse_module("msg = f'{name!r:>{width}} = {eval(\"1\")}'\n").unwrap();
        let names: Vec<_> = tree
            .walk()
            .filter(|n| n.kind == NodeKind::Name)
            .filter_map(|n| n.ident())
            .collect();
        assert_eq!(names, vec!["msg", "name", "width", "eval"]);
        assert!(tree.walk().any(|n| n.kind == NodeKind::FormattedValue));
    }

    #[test]
    fn test_fstring_escaped_braces() {
        let tree = parse_module("s = f'{{literal}}'\n").unwrap();
        assert!(!tree.walk().any(|n| n.kind == NodeKind::FormattedValue));
    }

    #[test]
    fn test_keyword_arguments_and_star_args() {
        let tree = parse_module("f(1, *rest, key=2, **opts)\n").unwrap();
        let call = tree.walk().find(|n| n.kind == NodeKind::Call).unwrap();
        let kinds: Vec<_> = call.children.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Name,
                NodeKind::Constant,
                NodeKind::Starred,
                NodeKind::Keyword,
                NodeKind::Keyword,
            ]
        );
    }

    #[test]
    fn test_decorators_and_class() {
        let found = kinds("@decorator\nclass A(Base, metaclass=M):\n    x: int = 1\n");
        assert!(found.contains(&NodeKind::ClassDef));
        assert!(found.contains(&NodeKind::AnnAssign));
        assert!(found.contains(&NodeKind::Keyword));
    }

    #[test]
    fn test_async_and_walrus() {
        let found = kinds(
            "async def main():\n    async with lock:\n        if (n := await fetch()) > 1:\n            yield n\n",
        );
        assert!(found.contains(&NodeKind::AsyncFunctionDef));
        assert!(found.contains(&NodeKind::AsyncWith));
        assert!(found.contains(&NodeKind::NamedExpr));
        assert!(found.contains(&NodeKind::Await));
        assert!(found.contains(&NodeKind::Yield));
    }

    #[test]
    fn test_comparisons() {
        use NodeKind::*;
        assert_eq!(
            kinds("a < b is not c not in d"),
            vec![Module, Expr, Compare, Name, Lt, IsNot, NotIn, Name, Name, Name]
        );
    }

    #[test]
    fn test_syntax_errors() {
        for source in [
            "def (:",
            "x = = 1",
            "if x\n    y",
            "return return",
            "import",
            "f(a for a in b",
            "x = b'a' 'b'",
            "try:\n    pass\n",
            "class:",
            "lambda: (yield",
            "    x = 1",
            "f'{}'",
            "f'{x'",
            "match x:\n    case 1:\n        pass\n",
        ] {
            let err = parse_module(source).unwrap_err();
            assert!(err.is_syntax(), "{source:?} gave {err:?}");
        }
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("x = {}1{}", "(".repeat(MAX_NESTING + 5), ")".repeat(MAX_NESTING + 5));
        assert!(parse_module(&deep).unwrap_err().is_syntax());

        let ok = format!("x = {}1{}", "(".repeat(10), ")".repeat(10));
        assert!(parse_module(&ok).is_ok());
    }

    #[test]
    fn test_nested_braces_parse_in_linear_time() {
        let depth = 30;
        let sets = format!("x = {}1{}", "{".repeat(depth), "}".repeat(depth));
        let dicts = format!("x = {}1{}", "{1: ".repeat(depth), "}".repeat(depth));
        let mixed = format!("x = {}1{}", "{**{1: {".repeat(depth / 3), "}}}".repeat(depth / 3));

        let started = std::time::Instant::now();
        for source in [&sets, &dicts, &mixed] {
            parse_module(source).unwrap();
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        let sets = kinds(&sets);
        assert_eq!(sets.iter().filter(|k| **k == NodeKind::Set).count(), depth);
        let dicts = kinds(&dicts);
        assert_eq!(dicts.iter().filter(|k| **k == NodeKind::Dict).count(), depth);
    }

    #[test]
    fn test_brace_displays() {
        use NodeKind::*;
        assert_eq!(kinds("{1: 2, **m}"), vec![Module, Expr, Dict, Constant, Constant, Name]);
        assert_eq!(kinds("{*a, 1}"), vec![Module, Expr, Set, Starred, Name, Constant]);
        assert_eq!(kinds("{k: v for k in d}")[2], DictComp);
        assert_eq!(kinds("{k for k in d}")[2], SetComp);
        assert!(parse_module("{*a: 1}").unwrap_err().is_syntax());
    }

    #[test]
    fn test_numbers_before_keywords() {
        use NodeKind::*;
        assert_eq!(
            kinds("0x1for x in y"),
            vec![Module, Expr, BoolOp, Or, Constant, Compare, Name, In, Name]
        );
        assert_eq!(
            kinds("1if x else 0"),
            vec![Module, Expr, IfExp, Name, Constant, Constant]
        );
        assert!(parse_module("1abc").unwrap_err().is_syntax());
    }

    #[test]
    fn test_long_operator_chain() {
        let source = format!("x = {}1", "1 + ".repeat(20_000));
        let tree = parse_module(&source).unwrap();
        assert!(tree.size() > 40_000);
    }

    #[test]
    fn test_positions() {
        let tree = parse_module("x = 1\nimport os\n").unwrap();
        let alias = tree.walk().find(|n| n.kind == NodeKind::Alias).unwrap();
        assert_eq!(alias.position, Position::new(2, 8));
    }
}
