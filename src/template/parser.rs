//! Parser for the attribute template language
//!
//! The language is plain text interleaved with:
//!
//! * references: `$name`, `${name}`, optionally followed by allow-listed transforms such as
//!   `$name.substring(0,20)` or `${name.toLowerCase()}`
//! * `#set( $name = "text with $references" )`
//! * `#if( $flag ) ... #elseif( !$other ) ... #else ... #end`
//!
//! A `$` or `#` that doesn't start one of those is kept as literal text.

use crate::error::{Error, Result};

/// Deepest `#if` nesting a template may use
pub(crate) const MAX_NESTING: usize = 32;

/// A node of a parsed template
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Node {
    Text(String),
    Reference(Reference),
    Set { name: String, value: Expr },
    If { branches: Vec<Branch>, otherwise: Vec<Node> },
}

/// A variable lookup followed by transforms
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Reference {
    pub(crate) name: String,
    pub(crate) transforms: Vec<Transform>,
}

/// Allow-listed string transforms
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Transform {
    /// Characters `start..end`, clamped to the value length
    Substring(usize, Option<usize>),
    ToLowerCase,
    ToUpperCase,
    /// Bound the value to a number of characters with the digest-suffix strategy
    Truncate(usize),
}

/// Right-hand side of a `#set`
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Expr {
    /// Double-quoted string, made of [`Node::Text`] and [`Node::Reference`] only
    Interpolated(Vec<Node>),
    /// Single-quoted string
    Literal(String),
    Reference(Reference),
    Flag(bool),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Condition {
    pub(crate) negated: bool,
    pub(crate) reference: Reference,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Branch {
    pub(crate) condition: Condition,
    pub(crate) body: Vec<Node>,
}

enum Terminator {
    Eof,
    Else,
    ElseIf(Condition),
    End,
}

enum Directive {
    Set { name: String, value: Expr },
    If(Condition),
    ElseIf(Condition),
    Else,
    End,
}

/// Parse template source into nodes
pub(crate) fn parse(source: &str) -> Result<Vec<Node>> {
    let mut parser = Parser {
        chars: source.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let (nodes, terminator) = parser.parse_block()?;
    match terminator {
        Terminator::Eof => Ok(nodes),
        Terminator::Else | Terminator::ElseIf(_) => Err(parser.error("#else outside of #if")),
        Terminator::End => Err(parser.error("#end without a matching #if")),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn error(&self, message: &str) -> Error {
        Error::Template(format!("{message} (at offset {})", self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected `{expected}`")))
        }
    }

    fn is_identifier_start(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_'
    }

    fn is_identifier_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }

    fn identifier(&mut self) -> Option<String> {
        if !self.peek().is_some_and(Self::is_identifier_start) {
            return None;
        }
        let start = self.pos;
        while self.peek().is_some_and(Self::is_identifier_char) {
            self.pos += 1;
        }
        Some(self.chars[start..self.pos].iter().collect())
    }

    fn number(&mut self) -> Result<usize> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits
            .parse()
            .map_err(|_| self.error("expected a non-negative integer argument"))
    }

    fn parse_block(&mut self) -> Result<(Vec<Node>, Terminator)> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        let terminator = loop {
            let Some(c) = self.peek() else {
                break Terminator::Eof;
            };
            match c {
                '$' => match self.reference()? {
                    Some(reference) => {
                        flush(&mut text, &mut nodes);
                        nodes.push(Node::Reference(reference));
                    }
                    None => {
                        text.push(c);
                        self.pos += 1;
                    }
                },
                '#' => match self.directive()? {
                    Some(Directive::Set { name, value }) => {
                        flush(&mut text, &mut nodes);
                        nodes.push(Node::Set { name, value });
                    }
                    Some(Directive::If(condition)) => {
                        flush(&mut text, &mut nodes);
                        if self.depth >= MAX_NESTING {
                            return Err(
                                self.error(&format!("#if nested deeper than {MAX_NESTING}"))
                            );
                        }
                        self.depth += 1;
                        nodes.push(self.parse_if(condition)?);
                        self.depth -= 1;
                    }
                    Some(Directive::ElseIf(condition)) => break Terminator::ElseIf(condition),
                    Some(Directive::Else) => break Terminator::Else,
                    Some(Directive::End) => break Terminator::End,
                    None => {
                        text.push(c);
                        self.pos += 1;
                    }
                },
                _ => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        };

        flush(&mut text, &mut nodes);
        Ok((nodes, terminator))
    }

    fn parse_if(&mut self, mut condition: Condition) -> Result<Node> {
        let mut branches = Vec::new();
        loop {
            let (body, terminator) = self.parse_block()?;
            branches.push(Branch { condition, body });
            match terminator {
                Terminator::End => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    })
                }
                Terminator::ElseIf(next) => condition = next,
                Terminator::Else => {
                    let (otherwise, terminator) = self.parse_block()?;
                    return match terminator {
                        Terminator::End => Ok(Node::If {
                            branches,
                            otherwise,
                        }),
                        Terminator::Eof => Err(self.error("unterminated #if, missing #end")),
                        Terminator::Else | Terminator::ElseIf(_) => {
                            Err(self.error("#else or #elseif after #else"))
                        }
                    };
                }
                Terminator::Eof => return Err(self.error("unterminated #if, missing #end")),
            }
        }
    }

    /// Parse a reference starting at `$`. Returns `None`, without consuming anything, if the `$`
    /// doesn't start a reference
    fn reference(&mut self) -> Result<Option<Reference>> {
        let start = self.pos;
        self.pos += 1;

        if self.peek() == Some('{') {
            self.pos += 1;
            let Some(name) = self.identifier() else {
                self.pos = start;
                return Ok(None);
            };
            let mut transforms = Vec::new();
            while self.peek() == Some('.') {
                self.pos += 1;
                transforms.push(self.transform()?);
            }
            if self.peek() != Some('}') {
                return Err(self.error("unterminated `${` reference"));
            }
            self.pos += 1;
            return Ok(Some(Reference { name, transforms }));
        }

        let Some(name) = self.identifier() else {
            self.pos = start;
            return Ok(None);
        };
        let mut transforms = Vec::new();
        while self.is_transform_ahead() {
            self.pos += 1;
            transforms.push(self.transform()?);
        }
        Ok(Some(Reference { name, transforms }))
    }

    /// Whether the input continues with `.identifier(`
    fn is_transform_ahead(&self) -> bool {
        if self.peek() != Some('.') || !self.peek_at(1).is_some_and(Self::is_identifier_start) {
            return false;
        }
        let mut offset = 1;
        while self.peek_at(offset).is_some_and(Self::is_identifier_char) {
            offset += 1;
        }
        self.peek_at(offset) == Some('(')
    }

    /// Parse `name(args)` after the dot of a transform
    fn transform(&mut self) -> Result<Transform> {
        let Some(name) = self.identifier() else {
            return Err(self.error("expected a transform name"));
        };
        self.expect('(')?;
        self.skip_whitespace();
        let mut args = Vec::new();
        if self.peek() != Some(')') {
            loop {
                args.push(self.number()?);
                self.skip_whitespace();
                if self.peek() == Some(',') {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(')')?;

        match (name.as_str(), args.as_slice()) {
            ("substring", [start]) => Ok(Transform::Substring(*start, None)),
            ("substring", [start, end]) if start <= end => {
                Ok(Transform::Substring(*start, Some(*end)))
            }
            ("substring", [_, _]) => Err(self.error("substring end is before its start")),
            ("toLowerCase", []) => Ok(Transform::ToLowerCase),
            ("toUpperCase", []) => Ok(Transform::ToUpperCase),
            ("truncate", [limit]) => Ok(Transform::Truncate(*limit)),
            ("substring" | "toLowerCase" | "toUpperCase" | "truncate", _) => Err(self.error(
                &format!("wrong number of arguments for `{name}`"),
            )),
            _ => Err(self.error(&format!("unsupported transform `{name}`"))),
        }
    }

    /// Parse a directive starting at `#`. Returns `None`, without consuming anything, if the `#`
    /// doesn't start a known directive
    fn directive(&mut self) -> Result<Option<Directive>> {
        let start = self.pos;
        self.pos += 1;
        let name = self.identifier();
        let directive = match name.as_deref() {
            Some("set") => {
                self.expect('(')?;
                self.expect('$')?;
                let Some(name) = self.identifier() else {
                    return Err(self.error("expected a variable name in #set"));
                };
                self.expect('=')?;
                self.skip_whitespace();
                let value = self.expression()?;
                self.expect(')')?;
                Directive::Set { name, value }
            }
            Some("if") => Directive::If(self.condition()?),
            Some("elseif") => Directive::ElseIf(self.condition()?),
            Some("else") => Directive::Else,
            Some("end") => Directive::End,
            _ => {
                self.pos = start;
                return Ok(None);
            }
        };
        Ok(Some(directive))
    }

    fn condition(&mut self) -> Result<Condition> {
        self.expect('(')?;
        self.skip_whitespace();
        let negated = self.peek() == Some('!');
        if negated {
            self.pos += 1;
            self.skip_whitespace();
        }
        if self.peek() != Some('$') {
            return Err(self.error("expected a `$` reference in condition"));
        }
        let Some(reference) = self.reference()? else {
            return Err(self.error("expected a variable name in condition"));
        };
        self.expect(')')?;
        Ok(Condition { negated, reference })
    }

    fn expression(&mut self) -> Result<Expr> {
        match self.peek() {
            Some('"') => {
                self.pos += 1;
                let mut nodes = Vec::new();
                let mut text = String::new();
                loop {
                    match self.peek() {
                        None => return Err(self.error("unterminated string in #set")),
                        Some('"') => {
                            self.pos += 1;
                            break;
                        }
                        Some('\\') if matches!(self.peek_at(1), Some('"' | '\\')) => {
                            text.extend(self.peek_at(1));
                            self.pos += 2;
                        }
                        Some('$') => match self.reference()? {
                            Some(reference) => {
                                flush(&mut text, &mut nodes);
                                nodes.push(Node::Reference(reference));
                            }
                            None => {
                                text.push('$');
                                self.pos += 1;
                            }
                        },
                        Some(c) => {
                            text.push(c);
                            self.pos += 1;
                        }
                    }
                }
                flush(&mut text, &mut nodes);
                Ok(Expr::Interpolated(nodes))
            }
            Some('\'') => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != '\'') {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("unterminated string in #set"));
                }
                let literal = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(Expr::Literal(literal))
            }
            Some('$') => match self.reference()? {
                Some(reference) => Ok(Expr::Reference(reference)),
                None => Err(self.error("expected a variable name in #set")),
            },
            _ => match self.identifier().as_deref() {
                Some("true") => Ok(Expr::Flag(true)),
                Some("false") => Ok(Expr::Flag(false)),
                _ => Err(self.error("expected a string, a reference or a boolean in #set")),
            },
        }
    }
}

fn flush(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}
