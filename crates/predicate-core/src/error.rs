//! Core error types for predicate-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! configuration-time failure modes: factory lookups, graph edits and the
//! transformation loop. Evaluation failures live in
//! [`EvalError`](crate::eval::EvalError).

use thiserror::Error;

use crate::eval::EvalError;
use crate::id::{NodeId, RootId};

/// Broad classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A name, node or root was looked up and does not exist.
    NotFound,
    /// The caller supplied an argument that cannot be honoured.
    InvalidArgument,
    /// An internal invariant broke; treat as fatal.
    Internal,
}

/// Core errors produced by the predicate-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No generator is registered under this call name.
    #[error("unknown call: '{name}'")]
    UnknownCall { name: String },

    /// A generator produced a call whose name differs from its registration.
    #[error("call generator for '{requested}' produced a call named '{produced}'")]
    CallNameMismatch { requested: String, produced: String },

    /// A node id does not refer to a node in the graph.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// A root index is out of range.
    #[error("root not found: RootId({id})", id = id.0)]
    RootNotFound { id: RootId },

    /// A node was expected to be live in the merge graph.
    #[error("node is not in the live set: NodeId({id})", id = id.0)]
    NotLive { id: NodeId },

    /// Generic argument rejection.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Adding an edge would make a node reachable from itself.
    #[error("cycle detected: NodeId({child}) is an ancestor of NodeId({parent})", child = child.0, parent = parent.0)]
    CycleDetected { parent: NodeId, child: NodeId },

    /// A merge graph invariant was violated.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },

    /// The transformation loop hit its iteration cap.
    #[error("transformation did not converge after {iterations} sweeps")]
    TransformDidNotConverge { iterations: usize },

    /// Evaluation failed while folding a constant subtree.
    #[error("evaluation failed during transformation: {0}")]
    Eval(#[from] EvalError),
}

impl CoreError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::UnknownCall { .. }
            | CoreError::NodeNotFound { .. }
            | CoreError::RootNotFound { .. }
            | CoreError::NotLive { .. } => ErrorKind::NotFound,
            CoreError::CallNameMismatch { .. }
            | CoreError::InvalidArgument { .. }
            | CoreError::CycleDetected { .. } => ErrorKind::InvalidArgument,
            CoreError::GraphInconsistency { .. }
            | CoreError::TransformDidNotConverge { .. }
            | CoreError::Eval(_) => ErrorKind::Internal,
        }
    }
}
