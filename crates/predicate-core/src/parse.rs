//! Textual parser for the expression language.
//!
//! An expression is either a literal or `(name expr*)`. Literals are `null`,
//! single-quoted strings where `\` escapes the next character, integers
//! (`-?[0-9]+`) and floats (`-?[0-9]+\.[0-9]+`). Names are
//! `[A-Za-z0-9_]+`. Whitespace between tokens is insignificant.
//!
//! Parsing builds detached nodes through a [`CallFactory`]; merge the result
//! with [`MergeGraph::add_root`] or [`MergeGraph::replace`]. Nodes are created
//! in textual order, each call before its arguments.

use thiserror::Error;

use crate::error::CoreError;
use crate::factory::CallFactory;
use crate::id::NodeId;
use crate::literal::Literal;
use crate::merge_graph::MergeGraph;

/// Failure to parse an expression. Positions are byte offsets.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },

    /// The text is well formed but a node could not be built.
    #[error("at {position}: {source}")]
    Call {
        position: usize,
        #[source]
        source: CoreError,
    },
}

impl ParseError {
    pub fn position(&self) -> usize {
        match self {
            ParseError::Syntax { position, .. } | ParseError::Call { position, .. } => *position,
        }
    }
}

fn syntax(position: usize, message: impl Into<String>) -> ParseError {
    ParseError::Syntax {
        position,
        message: message.into(),
    }
}

/// Parses a complete expression, literal or call.
pub fn parse_expression(
    text: &str,
    factory: &CallFactory,
    graph: &mut MergeGraph,
) -> Result<NodeId, ParseError> {
    let mut parser = Parser::new(text);
    let node = parser.expression(factory, graph)?;
    parser.end()?;
    Ok(node)
}

/// Parses a complete call expression.
pub fn parse_call(
    text: &str,
    factory: &CallFactory,
    graph: &mut MergeGraph,
) -> Result<NodeId, ParseError> {
    let mut parser = Parser::new(text);
    parser.skip_whitespace();
    if parser.peek() != Some(b'(') {
        return Err(syntax(parser.pos, "expected a call"));
    }
    let node = parser.expression(factory, graph)?;
    parser.end()?;
    Ok(node)
}

/// Parses a complete literal.
pub fn parse_literal(text: &str) -> Result<Literal, ParseError> {
    let mut parser = Parser::new(text);
    parser.skip_whitespace();
    let literal = parser.literal()?;
    parser.end()?;
    Ok(literal)
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Parser { text, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn end(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(()),
            Some(b')') => Err(syntax(self.pos, "unbalanced ')'")),
            Some(_) => Err(syntax(self.pos, "unexpected input after expression")),
        }
    }

    /// Consumes `[A-Za-z0-9_]*`.
    fn name(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    fn expression(
        &mut self,
        factory: &CallFactory,
        graph: &mut MergeGraph,
    ) -> Result<NodeId, ParseError> {
        let mut open: Vec<NodeId> = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let node = match self.peek() {
                None if open.is_empty() => return Err(syntax(start, "empty expression")),
                None => return Err(syntax(start, "unterminated call")),
                Some(b')') => {
                    self.pos += 1;
                    match open.pop() {
                        Some(node) if open.is_empty() => return Ok(node),
                        Some(_) => continue,
                        None => return Err(syntax(start, "unbalanced ')'")),
                    }
                }
                Some(b'(') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    let name_at = self.pos;
                    let name = self.name();
                    if name.is_empty() {
                        return Err(syntax(name_at, "missing call name"));
                    }
                    let node = graph
                        .build(factory, name)
                        .map_err(|source| ParseError::Call {
                            position: name_at,
                            source,
                        })?;
                    self.attach(&open, node, start, graph)?;
                    open.push(node);
                    continue;
                }
                Some(_) => {
                    let literal = self.literal()?;
                    graph.add_literal(literal)
                }
            };
            if open.is_empty() {
                return Ok(node);
            }
            self.attach(&open, node, start, graph)?;
        }
    }

    fn attach(
        &self,
        open: &[NodeId],
        node: NodeId,
        position: usize,
        graph: &mut MergeGraph,
    ) -> Result<(), ParseError> {
        match open.last() {
            Some(&parent) => graph
                .add_child(parent, node)
                .map_err(|source| ParseError::Call { position, source }),
            None => Ok(()),
        }
    }

    fn literal(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;
        let literal = match self.peek() {
            Some(b'\'') => self.string()?,
            Some(b) if b == b'-' || b.is_ascii_digit() => self.number()?,
            Some(_) if self.text[self.pos..].starts_with("null") => {
                self.pos += "null".len();
                Literal::Null
            }
            Some(b'(') => return Err(syntax(start, "expected a literal")),
            Some(_) => return Err(syntax(start, "unexpected character")),
            None => return Err(syntax(start, "expected a literal")),
        };
        match self.peek() {
            None | Some(b'(' | b')') => Ok(literal),
            Some(b) if b.is_ascii_whitespace() => Ok(literal),
            Some(_) => Err(syntax(self.pos, "unexpected character after literal")),
        }
    }

    fn string(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;
        let mut out = String::new();
        let mut chars = self.text[start + 1..].char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                '\'' => {
                    self.pos = start + 1 + offset + 1;
                    return Ok(Literal::String(out));
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err(syntax(start, "unterminated string"))
    }

    fn number(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let digits = self.digits();
        if digits == 0 {
            return Err(syntax(start, "expected digits"));
        }
        let is_float = self.peek() == Some(b'.');
        if is_float {
            self.pos += 1;
            if self.digits() == 0 {
                return Err(syntax(self.pos, "expected digits after '.'"));
            }
        }
        let text = &self.text[start..self.pos];
        if is_float {
            text.parse()
                .map(Literal::Float)
                .map_err(|err| syntax(start, format!("invalid float {text}: {err}")))
        } else {
            text.parse()
                .map(Literal::Integer)
                .map_err(|err| syntax(start, format!("invalid integer {text}: {err}")))
        }
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }
}
