//! The open extension point: call node behaviour.
//!
//! A node is either a [`Literal`] or a call. Literal kinds are closed; call
//! kinds are open, each one an implementation of [`Call`] registered in a
//! [`CallFactory`](crate::factory::CallFactory) under its name.
//!
//! A call instance belongs to exactly one node. The hooks run in pipeline
//! order:
//!
//! 1. `pre_transform` during the first validation pass (bottom-up).
//! 2. `transform` repeatedly until a full sweep changes nothing.
//! 3. `post_transform` during the final validation pass (bottom-up).
//! 4. `pre_eval` once, after indexing.
//! 5. `eval_initialize` once per node per evaluation episode.
//! 6. `eval_calculate` at most once per node per phase, until finished.
//!
//! Hooks 1-3 see the mutable [`MergeGraph`] through a [`NodeView`]; hooks
//! 4-6 see the frozen [`IndexedGraph`](crate::indexed::IndexedGraph) through
//! a [`NodeRef`] and must not rely on interior mutation, since one indexed
//! graph is evaluated from many threads at once.

use std::fmt;
use std::sync::Arc;

use crate::dag::NodeView;
use crate::error::CoreError;
use crate::eval::{EvalContext, EvalError, Environment, GraphEvalState, NodeEvalState};
use crate::factory::CallFactory;
use crate::id::NodeId;
use crate::indexed::NodeRef;
use crate::literal::Literal;
use crate::merge_graph::MergeGraph;
use crate::reporter::NodeReporter;

/// Behaviour of a call node.
pub trait Call: Send + Sync + 'static {
    /// The call's name, as written in canonical text.
    fn name(&self) -> &str;

    /// Validation before transformation. Report problems to `reporter`.
    fn pre_transform(&self, _node: NodeView<'_>, _reporter: &mut NodeReporter<'_>) {}

    /// Rewrites this node or its surroundings through `graph`.
    ///
    /// Returns `true` if anything changed. Only [`MergeGraph`] operations may
    /// be used; `me` may be released by the time this returns.
    fn transform(
        &self,
        _me: NodeId,
        _graph: &mut MergeGraph,
        _factory: &CallFactory,
        _environment: &Environment,
        _reporter: &mut NodeReporter<'_>,
    ) -> Result<bool, CoreError> {
        Ok(false)
    }

    /// Validation after transformation has reached its fixpoint.
    fn post_transform(&self, _node: NodeView<'_>, _reporter: &mut NodeReporter<'_>) {}

    /// Called whenever this node's children are added, removed or replaced.
    fn children_changed(&self) {}

    /// One-time setup after indexing, before any evaluation.
    fn pre_eval(
        &self,
        _node: NodeRef<'_>,
        _environment: &Environment,
        _reporter: &mut NodeReporter<'_>,
    ) {
    }

    /// Per-episode setup, e.g. installing scratch state.
    fn eval_initialize(
        &self,
        _node: NodeRef<'_>,
        _state: &mut NodeEvalState,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        Ok(())
    }

    /// Produces values for `node` in the current phase.
    ///
    /// May evaluate children through `graph_state`, then add values to,
    /// finish, forward or alias its own state.
    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError>;
}

impl fmt::Debug for dyn Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Call({})", self.name())
    }
}

/// What a node is: a literal or a call.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Literal(Literal),
    Call(Arc<dyn Call>),
}

impl NodeKind {
    /// The call name, or `None` for literals.
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeKind::Literal(_) => None,
            NodeKind::Call(call) => Some(call.name()),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, NodeKind::Literal(_))
    }

    pub fn literal(&self) -> Option<&Literal> {
        match self {
            NodeKind::Literal(lit) => Some(lit),
            NodeKind::Call(_) => None,
        }
    }

    pub fn call(&self) -> Option<&Arc<dyn Call>> {
        match self {
            NodeKind::Call(call) => Some(call),
            NodeKind::Literal(_) => None,
        }
    }
}
