//! Tokenizer for the sandboxed source language.
//!
//! Produces Python-style tokens including `Newline`, `Indent` and `Dedent`.
//! Newlines inside brackets and after a backslash continuation are joined.
//! `\r\n` and a lone `\r` both end a line, as `\n` does.

use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::node::Position;

const TAB_SIZE: usize = 8;
const ALT_TAB_SIZE: usize = 1;

const OPERATORS_3: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
const OPERATORS_2: &[&str] = &[
    "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "->", ":=", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "@=",
];
const OPERATORS_1: &[&str] = &[
    "+", "-", "*", "/", "%", "@", "&", "|", "^", "~", "<", ">", "(", ")", "[", "]", "{", "}",
    ",", ":", ".", ";", "=",
];

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

/// A string literal with its prefix flags. `body` is the raw text between
/// the quotes, escapes left as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrLit {
    pub body: String,
    pub raw: bool,
    pub bytes: bool,
    pub formatted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Name(String),
    Number(String),
    Str(StrLit),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    EndMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

/// Tokenize `source` starting at line 1, column 1.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    tokenize_from(source, Position::new(1, 1))
}

/// Tokenize `source` whose first character sits at `origin`.
pub fn tokenize_from(source: &str, origin: Position) -> Result<Vec<Token>> {
    Lexer::new(source, origin).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    indents: Vec<usize>,
    alt_indents: Vec<usize>,
    brackets: Vec<char>,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str, origin: Position) -> Self {
        Self {
            chars: source.replace("\r\n", "\n").replace('\r', "\n").chars().collect(),
            pos: 0,
            line: origin.line,
            column: origin.column,
            indents: vec![0],
            alt_indents: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn push(&mut self, kind: TokenKind, position: Position) {
        self.tokens.push(Token { kind, position });
    }

    fn ends_logical_line(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.kind),
            Some(kind) if !matches!(kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent)
        )
    }

    fn run(mut self) -> Result<Vec<Token>> {
        loop {
            if self.at_line_start && self.brackets.is_empty() {
                if !self.handle_indentation()? {
                    break;
                }
                continue;
            }

            let Some(c) = self.peek() else { break };
            let start = self.here();

            match c {
                ' ' | '\t' | '\x0c' => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                '\\' => {
                    self.bump();
                    if self.bump() != Some('\n') {
                        return Err(SandboxError::syntax(
                            "unexpected character after line continuation character",
                            start,
                        ));
                    }
                }
                '\n' => {
                    self.bump();
                    if self.brackets.is_empty() {
                        if self.ends_logical_line() {
                            self.push(TokenKind::Newline, start);
                        }
                        self.at_line_start = true;
                    }
                }
                '"' | '\'' => {
                    let lit = self.read_string("", start)?;
                    self.push(TokenKind::Str(lit), start);
                }
                c if c.is_ascii_digit() => {
                    let number = self.read_number();
                    self.push(TokenKind::Number(number), start);
                }
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                    let number = self.read_number();
                    self.push(TokenKind::Number(number), start);
                }
                c if c == '_' || c.is_alphabetic() => {
                    let name = self.read_name();
                    let lower = name.to_ascii_lowercase();
                    if matches!(self.peek(), Some('"' | '\''))
                        && STRING_PREFIXES.contains(&lower.as_str())
                    {
                        let lit = self.read_string(&lower, start)?;
                        self.push(TokenKind::Str(lit), start);
                    } else {
                        self.push(TokenKind::Name(name), start);
                    }
                }
                _ => {
                    let op = self.read_operator(start)?;
                    self.push(TokenKind::Op(op), start);
                }
            }
        }

        if let Some(open) = self.brackets.last() {
            return Err(SandboxError::syntax(
                format!("'{}' was never closed", open),
                self.here(),
            ));
        }
        if self.ends_logical_line() {
            let here = self.here();
            self.push(TokenKind::Newline, here);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            let here = self.here();
            self.push(TokenKind::Dedent, here);
        }
        let here = self.here();
        self.push(TokenKind::EndMarker, here);
        Ok(self.tokens)
    }

    /// Measure indentation at the start of a line and emit Indent/Dedent.
    /// Blank and comment-only lines are skipped. Returns false at EOF.
    ///
    /// Widths are measured twice, with tabs of 8 and of 1 columns. Both
    /// measures must order the levels the same way, otherwise the mix of
    /// tabs and spaces is ambiguous and rejected.
    fn handle_indentation(&mut self) -> Result<bool> {
        let mut width = 0;
        let mut alt_width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => {
                    width += 1;
                    alt_width += 1;
                }
                '\t' => {
                    width = (width / TAB_SIZE + 1) * TAB_SIZE;
                    alt_width = (alt_width / ALT_TAB_SIZE + 1) * ALT_TAB_SIZE;
                }
                '\x0c' => {
                    width = 0;
                    alt_width = 0;
                }
                _ => break,
            }
            self.bump();
        }

        match self.peek() {
            None => return Ok(false),
            Some('#') => {
                self.skip_comment();
                return Ok(true);
            }
            Some('\n') => {
                self.bump();
                return Ok(true);
            }
            Some(_) => {}
        }

        self.at_line_start = false;
        let position = self.here();
        let current = self.indents.last().copied().unwrap_or(0);
        let alt_current = self.alt_indents.last().copied().unwrap_or(0);

        if width > current {
            if alt_width <= alt_current {
                return Err(inconsistent_tabs(position));
            }
            self.indents.push(width);
            self.alt_indents.push(alt_width);
            self.push(TokenKind::Indent, position);
        } else if width < current {
            while self.indents.last().is_some_and(|&level| level > width) {
                self.indents.pop();
                self.alt_indents.pop();
                self.push(TokenKind::Dedent, position);
            }
            if self.indents.last().copied() != Some(width) {
                return Err(SandboxError::syntax(
                    "unindent does not match any outer indentation level",
                    position,
                ));
            }
            if self.alt_indents.last().copied() != Some(alt_width) {
                return Err(inconsistent_tabs(position));
            }
        } else if alt_width != alt_current {
            return Err(inconsistent_tabs(position));
        }
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.bump();
        }
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        name
    }

    /// Read a numeric literal. Stops at the first character the literal
    /// grammar does not accept, so `1if` is `1` followed by `if`.
    fn read_number(&mut self) -> String {
        let mut number = String::new();
        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.take(&mut number, 2);
                self.take_digits(&mut number, radix);
                return number;
            }
        }

        self.take_digits(&mut number, 10);
        if self.peek() == Some('.') {
            self.take(&mut number, 1);
            self.take_digits(&mut number, 10);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let digit_at = if matches!(self.peek_at(1), Some('+' | '-')) { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.take(&mut number, digit_at);
                self.take_digits(&mut number, 10);
            }
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            self.take(&mut number, 1);
        }
        number
    }

    fn take(&mut self, into: &mut String, count: usize) {
        for _ in 0..count {
            if let Some(c) = self.bump() {
                into.push(c);
            }
        }
    }

    fn take_digits(&mut self, into: &mut String, radix: u32) {
        while let Some(c) = self.peek().filter(|c| *c == '_' || c.is_digit(radix)) {
            into.push(c);
            self.bump();
        }
    }

    fn read_string(&mut self, prefix: &str, start: Position) -> Result<StrLit> {
        let quote = self.bump().unwrap_or('"');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut body = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(SandboxError::syntax("unterminated string literal", start));
            };
            if c == '\\' {
                body.push(c);
                self.bump();
                if let Some(escaped) = self.bump() {
                    body.push(escaped);
                }
                continue;
            }
            if c == quote {
                if !triple {
                    self.bump();
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    break;
                }
            }
            if c == '\n' && !triple {
                return Err(SandboxError::syntax("unterminated string literal", start));
            }
            body.push(c);
            self.bump();
        }

        Ok(StrLit {
            body,
            raw: prefix.contains('r'),
            bytes: prefix.contains('b'),
            formatted: prefix.contains('f'),
        })
    }

    fn read_operator(&mut self, start: Position) -> Result<&'static str> {
        let ahead: String = self.chars[self.pos..].iter().take(3).collect();
        let op = OPERATORS_3
            .iter()
            .chain(OPERATORS_2)
            .chain(OPERATORS_1)
            .find(|op| ahead.starts_with(**op))
            .copied()
            .ok_or_else(|| {
                SandboxError::syntax(
                    format!("invalid character '{}'", ahead.chars().next().unwrap_or(' ')),
                    start,
                )
            })?;

        match op {
            "(" | "[" | "{" => self.brackets.push(op.chars().next().unwrap_or('(')),
            ")" | "]" | "}" => {
                let expected = match op {
                    ")" => '(',
                    "]" => '[',
                    _ => '{',
                };
                if self.brackets.pop() != Some(expected) {
                    return Err(SandboxError::syntax(format!("unmatched '{}'", op), start));
                }
            }
            _ => {}
        }

        for _ in 0..op.len() {
            self.bump();
        }
        Ok(op)
    }
}

fn inconsistent_tabs(position: Position) -> SandboxError {
    SandboxError::syntax("inconsistent use of tabs and spaces in indentation", position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn name(s: &str) -> TokenKind {
        TokenKind::Name(s.to_string())
    }

    #[test]
    fn test_simple_expression() {
        assert_eq!(
            kinds("print(1+2)"),
            vec![
                name("print"),
                TokenKind::Op("("),
                TokenKind::Number("1".to_string()),
                TokenKind::Op("+"),
                TokenKind::Number("2".to_string()),
                TokenKind::Op(")"),
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
    }

    #[test]
    fn test_indent_dedent() {
        let toks = kinds("if x:\n    y\n\n    # comment\nz\n");
        assert_eq!(
            toks,
            vec![
                name("if"),
                name("x"),
                TokenKind::Op(":"),
                TokenKind::Newline,
                TokenKind::Indent,
                name("y"),
                TokenKind::Newline,
                TokenKind::Dedent,
                name("z"),
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
    }

    #[test]
    fn test_dedent_at_eof() {
        let toks = kinds("def f():\n    return 1");
        assert_eq!(&toks[toks.len() - 3..], &[
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::EndMarker
        ]);
    }

    #[test]
    fn test_brackets_join_lines() {
        let toks = kinds("x = [1,\n     2]\n");
        assert_eq!(toks.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
        assert!(!toks.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_line_continuation() {
        let toks = kinds("x = 1 + \\\n    2\n");
        assert_eq!(toks.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
    }

    #[test]
    fn test_string_prefixes() {
        let toks = kinds("f'{x}' rb\"a\\\"b\" '''multi\nline'''");
        match &toks[0] {
            TokenKind::Str(lit) => {
                assert!(lit.formatted);
                assert_eq!(lit.body, "{x}");
            }
            other => panic!("expected string, got {other:?}"),
        }
        match &toks[1] {
            TokenKind::Str(lit) => {
                assert!(lit.raw && lit.bytes);
                assert_eq!(lit.body, "a\\\"b");
            }
            other => panic!("expected string, got {other:?}"),
        }
        match &toks[2] {
            TokenKind::Str(lit) => assert_eq!(lit.body, "multi\nline"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn test_numbers_and_operators() {
        let toks = kinds("a **= 1.5e-3 // 0x1F")
            .into_iter()
            .take(5)
            .collect::<Vec<_>>();
        assert_eq!(
            toks,
            vec![
                name("a"),
                TokenKind::Op("**="),
                TokenKind::Number("1.5e-3".to_string()),
                TokenKind::Op("//"),
                TokenKind::Number("0x1F".to_string()),
            ]
        );
    }

    #[test]
    fn test_carriage_returns_end_lines() {
        let expected = vec![
            name("x"),
            TokenKind::Newline,
            name("y"),
            TokenKind::Newline,
            TokenKind::EndMarker,
        ];
        assert_eq!(kinds("x\ry\r"), expected);
        assert_eq!(kinds("x\r\ny\r\n"), expected);
        assert_eq!(kinds("# note\rx\ny"), expected);

        let toks = tokenize("a = 1\r\nb = 2").unwrap();
        assert_eq!(toks[4].position, Position::new(2, 1));
        assert_eq!(kinds("x = 1 + \\\r\n    2\r\n").len(), 7);
    }

    #[test]
    fn test_numbers_stop_before_keywords() {
        let number = |s: &str| TokenKind::Number(s.to_string());
        let cases = [
            ("1and x", vec![number("1"), name("and"), name("x")]),
            ("1if x", vec![number("1"), name("if"), name("x")]),
            ("1else", vec![number("1"), name("else")]),
            ("1.5or x", vec![number("1.5"), name("or"), name("x")]),
            ("1e5in x", vec![number("1e5"), name("in"), name("x")]),
            ("2jis x", vec![number("2j"), name("is"), name("x")]),
            ("0x1for x", vec![number("0x1f"), name("or"), name("x")]),
            ("0b1not", vec![number("0b1"), name("not")]),
            ("0o7if", vec![number("0o7"), name("if")]),
            ("1_000.5e-3j", vec![number("1_000.5e-3j")]),
            (".5", vec![number(".5")]),
        ];
        for (source, expected) in cases {
            let mut toks = kinds(source);
            toks.truncate(expected.len());
            assert_eq!(toks, expected, "{source:?}");
        }
    }

    #[test]
    fn test_mixed_tabs_and_spaces() {
        assert!(tokenize("if x:\n\ty\n\tz\n").is_ok());
        assert!(tokenize("if x:\n    \ty\n").is_ok());

        for source in [
            "if x:\n\ty\n        z\n",
            "if x:\n        y\n\tz\n",
            "if x:\n    if y:\n\tz\n",
        ] {
            let err = tokenize(source).unwrap_err();
            assert!(
                err.to_string().contains("inconsistent use of tabs"),
                "{source:?} gave {err}"
            );
        }
    }

    #[test]
    fn test_positions() {
        let toks = tokenize("x = 1\nyy = 2\n").unwrap();
        assert_eq!(toks[0].position, Position::new(1, 1));
        assert_eq!(toks[2].position, Position::new(1, 5));
        assert_eq!(toks[4].position, Position::new(2, 1));
    }

    #[test]
    fn test_errors() {
        assert!(tokenize("'abc").is_err());
        assert!(tokenize("(1, 2").is_err());
        assert!(tokenize("1)").is_err());
        assert!(tokenize("a $ b").is_err());
        assert!(tokenize("if x:\n        a\n    b\n").is_err());
        assert!(tokenize("x = 1 \\ 2").is_err());
    }
}
