//! Evaluation error types.
//!
//! Every variant is fatal: it means a node broke the evaluation protocol or
//! the pipeline let through a graph it should have rejected. None of them
//! is retried.

use thiserror::Error;

use crate::id::{EvalIndex, RootId};

/// Fatal evaluation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// `add_value` after `finish`.
    #[error("node {node}: cannot add a value to a finished node")]
    AddToFinished { node: EvalIndex },

    /// `finish` called twice.
    #[error("node {node}: already finished")]
    AlreadyFinished { node: EvalIndex },

    /// Local-value or alias operation on a forwarding node.
    #[error("node {node}: cannot {operation} a forwarded node")]
    Forwarded {
        node: EvalIndex,
        operation: &'static str,
    },

    /// Local-value or forward operation on an aliasing node.
    #[error("node {node}: cannot {operation} an aliased node")]
    Aliased {
        node: EvalIndex,
        operation: &'static str,
    },

    /// Forward or alias after the node finished.
    #[error("node {node}: cannot {operation} a finished node")]
    Finished {
        node: EvalIndex,
        operation: &'static str,
    },

    /// Forward or alias after local values were added.
    #[error("node {node}: cannot {operation} a node that has local values")]
    HasLocalValues {
        node: EvalIndex,
        operation: &'static str,
    },

    /// Forwarding would make a node its own target.
    #[error("node {node}: forwarding to {target} would loop")]
    ForwardCycle { node: EvalIndex, target: EvalIndex },

    /// `eval` before `initialize`.
    #[error("node {node}: evaluated before initialization")]
    NotInitialized { node: EvalIndex },

    /// A node that transformation should have removed was evaluated.
    #[error("node {node}: '{name}' should have been transformed away before evaluation")]
    Untransformed { node: EvalIndex, name: String },

    /// A dynamic argument finished with values its call rejects.
    #[error("node {node}: argument {argument} failed validation: {message}")]
    ArgumentValidation {
        node: EvalIndex,
        argument: usize,
        message: String,
    },

    /// A node required a child's final value before the child finished.
    #[error("node {node}: value requested from unfinished node {child}")]
    Unfinished { node: EvalIndex, child: EvalIndex },

    /// Scratch state was missing or of another type.
    #[error("node {node}: scratch state missing or of an unexpected type")]
    StateType { node: EvalIndex },

    /// A transaction field the node depends on does not exist.
    #[error("node {node}: transaction field '{name}' not found")]
    MissingField { node: EvalIndex, name: String },

    /// A host collaborator (operator, environment) failed.
    #[error("node {node}: {message}")]
    Host { node: EvalIndex, message: String },

    /// An index does not name a node of the indexed graph.
    #[error("node index {node} out of range")]
    IndexOutOfRange { node: EvalIndex },

    /// A root index does not exist in the indexed graph.
    #[error("root {root} not found")]
    RootNotFound { root: RootId },
}
