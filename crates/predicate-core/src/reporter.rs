//! Configuration-time diagnostics.
//!
//! [`Reporter`] is a sink of `(is_error, message, node)` triples collected
//! during validation and transformation. [`NodeReporter`] binds a reporter to
//! one node so call hooks can report without knowing where they sit in the
//! graph. How diagnostics are rendered, and whether an error aborts, is up to
//! the caller; the pipeline aborts on any error.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// One reported problem, with the node it concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Node the diagnostic is attached to, if any.
    pub node: Option<NodeId>,
    /// Canonical text of the node at the time of reporting.
    pub sexpr: Option<String>,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        write!(f, "{label}: {}", self.message)?;
        if let Some(sexpr) = &self.sexpr {
            write!(f, " at {sexpr}")?;
        }
        Ok(())
    }
}

/// Collects diagnostics and counts errors and warnings.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic.
    pub fn report(&mut self, is_error: bool, message: impl Into<String>, node: Option<NodeId>, sexpr: Option<String>) {
        let message = message.into();
        let severity = if is_error {
            self.errors += 1;
            tracing::debug!(node = ?node, "error reported: {}", message);
            Severity::Error
        } else {
            self.warnings += 1;
            tracing::debug!(node = ?node, "warning reported: {}", message);
            Severity::Warning
        };
        self.diagnostics.push(Diagnostic {
            severity,
            message,
            node,
            sexpr,
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.report(true, message, None, None);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.report(false, message, None, None);
    }

    /// A reporter bound to one node.
    pub fn for_node(&mut self, node: NodeId, sexpr: impl Into<String>) -> NodeReporter<'_> {
        NodeReporter {
            reporter: self,
            node: Some(node),
            sexpr: Some(sexpr.into()),
        }
    }

    /// A node reporter with no node attached, for hooks run outside a graph.
    pub fn detached(&mut self) -> NodeReporter<'_> {
        NodeReporter {
            reporter: self,
            node: None,
            sexpr: None,
        }
    }

    pub fn num_errors(&self) -> usize {
        self.errors
    }

    pub fn num_warnings(&self) -> usize {
        self.warnings
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Writes one line per diagnostic.
    pub fn write_report<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(out, "{diagnostic}")?;
        }
        Ok(())
    }
}

/// A [`Reporter`] bound to a single node.
#[derive(Debug)]
pub struct NodeReporter<'r> {
    reporter: &'r mut Reporter,
    node: Option<NodeId>,
    sexpr: Option<String>,
}

impl NodeReporter<'_> {
    pub fn error(&mut self, message: impl Into<String>) {
        self.reporter
            .report(true, message, self.node, self.sexpr.clone());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.reporter
            .report(false, message, self.node, self.sexpr.clone());
    }

    pub fn report(&mut self, is_error: bool, message: impl Into<String>) {
        self.reporter
            .report(is_error, message, self.node, self.sexpr.clone());
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Errors reported so far through the underlying reporter.
    pub fn num_errors(&self) -> usize {
        self.reporter.num_errors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_severity() {
        let mut reporter = Reporter::new();
        reporter.warn("loose");
        reporter.error("broken");
        {
            let mut node = reporter.for_node(NodeId(3), "(f)");
            node.error("bad child");
        }
        assert_eq!(reporter.num_errors(), 2);
        assert_eq!(reporter.num_warnings(), 1);
        assert!(reporter.has_errors());
        assert_eq!(reporter.diagnostics()[2].node, Some(NodeId(3)));
    }

    #[test]
    fn report_lines_include_node_text() {
        let mut reporter = Reporter::new();
        reporter.for_node(NodeId(0), "(not 1 2)").error("expected 1 child");
        reporter.warn("unused");
        let mut out = String::new();
        reporter.write_report(&mut out).unwrap();
        assert_eq!(
            out,
            "ERROR: expected 1 child at (not 1 2)\nWARNING: unused\n"
        );
    }

    #[test]
    fn diagnostics_serialize_with_lowercase_severity() {
        let mut reporter = Reporter::new();
        reporter.for_node(NodeId(1), "(x)").warn("w");
        let json = serde_json::to_value(reporter.diagnostics()).unwrap();
        insta::assert_json_snapshot!(json, @r###"
        [
          {
            "message": "w",
            "node": 1,
            "severity": "warning",
            "sexpr": "(x)"
          }
        ]
        "###);
    }
}
