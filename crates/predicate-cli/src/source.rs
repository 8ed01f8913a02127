//! Expression files: one expression per line, `#` starts a comment line.
//!
//! A line `define name(param, ...) body` defines a template for the lines
//! after it; `body` refers to its parameters as `(ref 'param')`.

use std::fs;
use std::path::{Path, PathBuf};

use predicate_core::{parse_expression, CallFactory, MergeGraph, RootId};
use predicate_std::template::define_template;

use crate::error::CliError;

/// One expression and the line it came from (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub line: usize,
    pub text: String,
}

/// A template definition line.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub line: usize,
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
}

/// The lines of an expression file.
#[derive(Debug, Default, PartialEq)]
pub struct Source {
    pub definitions: Vec<Definition>,
    pub expressions: Vec<Expression>,
}

pub fn read(path: &Path) -> Result<Source, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_owned(),
        source,
    })?;
    split(&text).map_err(|(line, reason)| CliError::Define {
        path: path.to_owned(),
        line,
        reason,
    })
}

fn split(text: &str) -> Result<Source, (usize, String)> {
    let mut source = Source::default();
    for (i, line) in text.lines().enumerate() {
        let line_text = line.trim();
        if line_text.is_empty() || line_text.starts_with('#') {
            continue;
        }
        match line_text.strip_prefix("define ") {
            Some(rest) => {
                let definition = definition(i + 1, rest).ok_or_else(|| {
                    (i + 1, "expected 'define name(param, ...) body'".to_owned())
                })?;
                source.definitions.push(definition);
            }
            None => source.expressions.push(Expression {
                line: i + 1,
                text: line_text.to_owned(),
            }),
        }
    }
    Ok(source)
}

/// Parses `name(param, ...) body`.
fn definition(line: usize, text: &str) -> Option<Definition> {
    let (name, rest) = text.split_once('(')?;
    let (params, body) = rest.split_once(')')?;
    let name = name.trim();
    let body = body.trim();
    if name.is_empty() || body.is_empty() {
        return None;
    }
    let params = params
        .split(',')
        .map(str::trim)
        .filter(|param| !param.is_empty())
        .map(str::to_owned)
        .collect();
    Some(Definition {
        line,
        name: name.to_owned(),
        params,
        body: body.to_owned(),
    })
}

/// Registers every template definition with `factory`.
pub fn define(path: &Path, definitions: &[Definition], factory: &mut CallFactory) -> Result<(), CliError> {
    for definition in definitions {
        let params: Vec<&str> = definition.params.iter().map(String::as_str).collect();
        define_template(factory, &definition.name, &params, &definition.body).map_err(|err| {
            CliError::Define {
                path: path.to_owned(),
                line: definition.line,
                reason: err.to_string(),
            }
        })?;
    }
    Ok(())
}

/// Parses every expression into `graph` as a root, recording `file:line` as
/// its origin.
pub fn merge(
    path: &Path,
    expressions: &[Expression],
    factory: &CallFactory,
    graph: &mut MergeGraph,
) -> Result<Vec<RootId>, CliError> {
    let label = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    let mut roots = Vec::with_capacity(expressions.len());
    for expression in expressions {
        let node = parse_expression(&expression.text, factory, graph).map_err(|source| {
            CliError::Parse {
                path: PathBuf::from(path),
                line: expression.line,
                source,
            }
        })?;
        let root = graph.add_root(node)?;
        graph.add_origin(graph.root(root)?, format!("{label}:{}", expression.line))?;
        roots.push(root);
    }
    tracing::debug!(roots = roots.len(), nodes = graph.len(), "expressions merged");
    Ok(roots)
}
