//! Calls that exist to be rewritten.
//!
//! [`Abelian`] gives commutative calls a canonical child order so that
//! `(or a b)` and `(or b a)` merge. [`AliasCall`] stands in for another
//! call under a second name and replaces itself with it.

use std::sync::Arc;

use crate::call::Call;
use crate::error::CoreError;
use crate::eval::{EvalContext, EvalError, Environment, GraphEvalState};
use crate::factory::CallFactory;
use crate::id::NodeId;
use crate::indexed::NodeRef;
use crate::merge_graph::MergeGraph;
use crate::reporter::NodeReporter;
use crate::sexpr::compare_sexpr;

/// Canonical child ordering for commutative calls.
///
/// Embed one in the call and forward `transform` to it. The transform sorts
/// children by canonical text and, if the order differs, replaces the node
/// with a fresh call of the same name (built through the factory) holding
/// the sorted children.
///
/// The order is recomputed on every transform: a rewrite below a child
/// changes its text without touching this node's child list.
#[derive(Debug, Default, Clone, Copy)]
pub struct Abelian;

impl Abelian {
    pub fn new() -> Self {
        Abelian
    }

    /// Reorders `me`'s children canonically. Returns `true` if it replaced
    /// the node.
    pub fn transform(&self, me: NodeId, graph: &mut MergeGraph, factory: &CallFactory) -> Result<bool, CoreError> {
        let view = graph.view(me)?;
        let name = view.name().ok_or_else(|| CoreError::InvalidArgument {
            reason: format!("node {me} is not a call"),
        })?;
        let children: Vec<(NodeId, &str)> = view
            .children()
            .into_iter()
            .map(|child| (child.id(), child.to_s()))
            .collect();
        let mut sorted = children.clone();
        sorted.sort_by(|a, b| compare_sexpr(a.1, b.1));
        if sorted == children {
            return Ok(false);
        }

        let name = name.to_owned();
        let sorted: Vec<NodeId> = sorted.into_iter().map(|(id, _)| id).collect();
        let replacement = graph.build(factory, &name)?;
        for child in sorted {
            graph.add_child(replacement, child)?;
        }
        graph.replace(me, replacement)?;
        Ok(true)
    }
}

/// A second name for another call.
///
/// Transformation replaces `(alias args...)` with `(target args...)`.
/// Evaluating an alias that survived transformation is a fatal error.
#[derive(Debug, Clone)]
pub struct AliasCall {
    name: String,
    target: String,
}

impl AliasCall {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        AliasCall {
            name: name.into(),
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Call for AliasCall {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(
        &self,
        me: NodeId,
        graph: &mut MergeGraph,
        factory: &CallFactory,
        _environment: &Environment,
        _reporter: &mut NodeReporter<'_>,
    ) -> Result<bool, CoreError> {
        let children = graph.children(me)?;
        let replacement = graph.build(factory, &self.target)?;
        for child in children {
            graph.add_child(replacement, child)?;
        }
        graph.replace(me, replacement)?;
        Ok(true)
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

impl CallFactory {
    /// Registers `name` as an alias of `target`.
    pub fn add_alias(&mut self, name: &str, target: &str) -> &mut Self {
        let call = AliasCall::new(name, target);
        self.add(name, move || Arc::new(call.clone()) as Arc<dyn Call>)
    }
}
