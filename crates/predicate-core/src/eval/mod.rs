//! Phased, per-transaction evaluation.
//!
//! - [`context`]: host inputs ([`EvalContext`], [`Environment`], [`Phase`]).
//! - [`state`]: [`NodeEvalState`] and [`GraphEvalState`], the evaluation
//!   state machine.
//! - [`evaluation`]: [`Evaluation`], a per-transaction facade querying roots.
//! - [`error`]: [`EvalError`].

pub mod context;
pub mod error;
pub mod evaluation;
pub mod state;

pub use context::{EvalContext, Environment, Field, Operator, Phase};
pub use error::EvalError;
pub use evaluation::{Evaluation, QueryResult};
pub use state::{GraphEvalState, NodeEvalState, Values};
