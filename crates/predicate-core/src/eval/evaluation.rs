//! Per-transaction evaluation facade.

use serde::{Deserialize, Serialize};

use crate::eval::context::EvalContext;
use crate::eval::error::EvalError;
use crate::eval::state::GraphEvalState;
use crate::id::RootId;
use crate::indexed::IndexedGraph;
use crate::value::Value;

/// Outcome of evaluating one root in one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub values: Vec<Value>,
    pub finished: bool,
}

impl QueryResult {
    /// True if the root produced any value.
    pub fn is_truthy(&self) -> bool {
        !self.values.is_empty()
    }
}

/// One transaction's evaluation of an indexed graph.
///
/// Construction initializes every node; each [`query`](Self::query) then
/// evaluates a root for the context's phase. Create one per transaction;
/// many may run concurrently against the same graph.
#[derive(Debug)]
pub struct Evaluation<'g> {
    state: GraphEvalState<'g>,
}

impl<'g> Evaluation<'g> {
    pub fn new(graph: &'g IndexedGraph, context: &EvalContext) -> Result<Self, EvalError> {
        let mut state = GraphEvalState::new(graph);
        state.initialize_all(context)?;
        Ok(Evaluation { state })
    }

    /// Evaluates root `root` and copies out its current values.
    pub fn query(&mut self, root: RootId, context: &EvalContext) -> Result<QueryResult, EvalError> {
        let index = self
            .state
            .graph()
            .root(root)
            .ok_or(EvalError::RootNotFound { root })?;
        let values = self.state.eval(index, context)?.to_vec();
        Ok(QueryResult {
            values,
            finished: self.state.is_finished(index),
        })
    }

    /// Evaluates every root, in root order.
    pub fn query_all(&mut self, context: &EvalContext) -> Result<Vec<QueryResult>, EvalError> {
        let roots = self.state.graph().num_roots();
        (0..roots)
            .map(|i| self.query(RootId(i as u32), context))
            .collect()
    }

    pub fn state(&self) -> &GraphEvalState<'g> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GraphEvalState<'g> {
        &mut self.state
    }
}
