//! Templates: calls defined by an expression over named parameters.
//!
//! [`define_template`] registers a call whose body refers to its parameters
//! with `(ref 'param')`. Transformation replaces each use of the template
//! with a fresh copy of the body, every `ref` swapped for the matching
//! argument. A `ref` or template left after transformation is an error.

use std::sync::Arc;

use predicate_core::validate;
use predicate_core::{
    parse_expression, Call, CallFactory, CoreError, EvalContext, EvalError, Environment,
    GraphEvalState, MergeGraph, NodeId, NodeRef, NodeReporter, NodeView,
};

pub fn load(factory: &mut CallFactory) {
    factory.add_call::<Ref>();
}

/// Legal parameter names: non-empty, ASCII letters, digits and `_`.
fn is_parameter_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Registers `name` as a template with parameters `params` and expression
/// `body`. The body is parsed on every expansion, so it may use calls
/// registered after the template.
pub fn define_template(
    factory: &mut CallFactory,
    name: &str,
    params: &[&str],
    body: &str,
) -> Result<(), CoreError> {
    for (i, param) in params.iter().enumerate() {
        if !is_parameter_name(param) {
            return Err(CoreError::InvalidArgument {
                reason: format!("template {name}: parameter '{param}' is not legal"),
            });
        }
        if params[..i].contains(param) {
            return Err(CoreError::InvalidArgument {
                reason: format!("template {name}: parameter '{param}' appears twice"),
            });
        }
    }
    let template: Arc<dyn Call> = Arc::new(Template {
        name: name.to_owned(),
        params: params.iter().map(|&p| p.to_owned()).collect(),
        body: body.to_owned(),
    });
    factory.add(name, move || Arc::clone(&template));
    tracing::debug!(template = name, params = params.len(), "template defined");
    Ok(())
}

// ---------------------------------------------------------------------------
// ref
// ---------------------------------------------------------------------------

/// `(ref 'param')`: a placeholder inside a template body.
#[derive(Debug, Default)]
pub struct Ref;

/// The parameter a `ref` node names, if `node` is one.
fn ref_parameter<'g>(node: NodeView<'g>) -> Option<&'g str> {
    if node.name() != Some("ref") {
        return None;
    }
    node.child(0)?.literal()?.as_str()
}

impl Call for Ref {
    fn name(&self) -> &str {
        "ref"
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        if !validate::n_children(node, reporter, 1) || !validate::nth_child_is_string(node, reporter, 0) {
            return;
        }
        if let Some(param) = ref_parameter(node).filter(|p| !is_parameter_name(p)) {
            reporter.error(format!("reference parameter '{param}' is not legal"));
        }
    }

    fn post_transform(&self, _node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        reporter.error("ref outside of a template body");
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        _graph_state: &mut GraphEvalState<'_>,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        Err(EvalError::Untransformed {
            node: node.index(),
            name: self.name().to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Template {
    name: String,
    params: Vec<String>,
    body: String,
}

impl Template {
    /// The argument standing in for `param`.
    fn argument(&self, param: &str, args: &[NodeId]) -> Option<NodeId> {
        let position = self.params.iter().position(|p| p == param)?;
        args.get(position).copied()
    }
}

impl Call for Template {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        validate::n_children(node, reporter, self.params.len());
    }

    fn transform(
        &self,
        me: NodeId,
        graph: &mut MergeGraph,
        factory: &CallFactory,
        _environment: &Environment,
        reporter: &mut NodeReporter<'_>,
    ) -> Result<bool, CoreError> {
        let args = graph.children(me)?;
        if args.len() != self.params.len() {
            reporter.error(format!(
                "template {} takes {} argument(s) but has {}",
                self.name,
                self.params.len(),
                args.len()
            ));
            return Ok(false);
        }
        let body = match parse_expression(&self.body, factory, graph) {
            Ok(body) => body,
            Err(err) => {
                reporter.error(format!("template {} has a malformed body: {err}", self.name));
                return Ok(false);
            }
        };

        // The body may be nothing but a reference.
        let top = ref_parameter(graph.view(body)?).map(str::to_owned);
        let replacement = match top.as_deref() {
            Some(param) => match self.argument(param, &args) {
                Some(arg) => arg,
                None => {
                    reporter.error(format!("template {} has no parameter '{param}'", self.name));
                    return Ok(false);
                }
            },
            None => {
                // Collected up front so substituted arguments are not walked.
                for node in graph.dag().bfs_down([body]) {
                    for child in graph.children(node)? {
                        let Some(param) = ref_parameter(graph.view(child)?).map(str::to_owned) else {
                            continue;
                        };
                        match self.argument(&param, &args) {
                            Some(arg) => graph.replace_child(node, child, arg)?,
                            None => reporter.error(format!(
                                "template {} has no parameter '{param}'",
                                self.name
                            )),
                        }
                    }
                }
                body
            }
        };

        let used = graph.replace(me, replacement)?;
        graph.add_origin(used, format!("template {}", self.name))?;
        tracing::trace!(template = %self.name, node = %used, "template expanded");
        Ok(true)
    }

    fn post_transform(&self, _node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        reporter.error(format!("template {} survived transformation", self.name));
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        _graph_state: &mut GraphEvalState<'_>,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        Err(EvalError::Untransformed {
            node: node.index(),
            name: self.name.clone(),
        })
    }
}
