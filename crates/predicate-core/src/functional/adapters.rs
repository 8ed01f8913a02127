//! Ready-made delegate shapes.
//!
//! Each adapter wraps a small trait implementation:
//!
//! | Adapter       | Trait       | Behaviour                                           |
//! |---------------|-------------|-----------------------------------------------------|
//! | [`Simple`]    | [`SimpleFn`]  | one value once every dynamic argument finished    |
//! | [`Primary`]   | [`PrimaryFn`] | callback per value of the last argument           |
//! | [`Map`]       | [`MapFn`]     | one output per primary value                      |
//! | [`Filter`]    | [`FilterFn`]  | primary values passing a test                     |
//! | [`Selector`]  | [`SelectFn`]  | first primary value passing a test, then finish   |
//! | [`Constant`]  | none          | a fixed literal, no arguments                     |
//!
//! The primary argument is always the last one; the dynamic arguments
//! before it are secondary and must finish before any primary value is
//! processed.

use std::any::Any;

use super::{Delegate, Invocation, Prepared};
use crate::eval::{Environment, EvalError, NodeEvalState};
use crate::literal::Literal;
use crate::reporter::NodeReporter;
use crate::value::Value;

/// Argument values handed to adapter callbacks.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    pub(crate) statics: &'a [Literal],
    pub(crate) dynamic: &'a [Vec<Value>],
    pub(crate) prepared: Option<&'a Prepared>,
}

impl<'a> Args<'a> {
    pub fn statics(&self) -> &'a [Literal] {
        self.statics
    }

    pub fn static_arg(&self, n: usize) -> Option<&'a Literal> {
        self.statics.get(n)
    }

    /// Final values of finished dynamic (or secondary) argument `n`.
    pub fn dynamic(&self, n: usize) -> &'a [Value] {
        self.dynamic.get(n).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn dynamics(&self) -> &'a [Vec<Value>] {
        self.dynamic
    }

    pub fn prepared<T: Any>(&self) -> Option<&'a T> {
        self.prepared?.downcast_ref()
    }
}

// ---------------------------------------------------------------------------
// Simple
// ---------------------------------------------------------------------------

/// A function of the final values of every dynamic argument.
pub trait SimpleFn: Send + Sync + 'static {
    const STATIC_ARGS: usize = 0;
    const DYNAMIC_ARGS: usize;

    fn validate_argument(&self, _n: usize, _values: &[Value], _reporter: &mut NodeReporter<'_>) {}

    /// The single result value, or `None` for a falsy result.
    fn eval_simple(&self, args: &Args<'_>) -> Option<Value>;
}

/// Waits for every dynamic argument to finish, then finishes with one value.
#[derive(Debug, Clone, Default)]
pub struct Simple<F>(pub F);

impl<F: SimpleFn> Delegate for Simple<F> {
    fn num_static_args(&self) -> usize {
        F::STATIC_ARGS
    }

    fn num_dynamic_args(&self) -> usize {
        F::DYNAMIC_ARGS
    }

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        self.0.validate_argument(n, values, reporter);
    }

    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError> {
        let Some(dynamic) = invocation.finished_dynamic(0..F::DYNAMIC_ARGS) else {
            return Ok(());
        };
        let prepared = invocation.prepared().cloned();
        let args = Args {
            statics: invocation.statics(),
            dynamic: &dynamic,
            prepared: prepared.as_ref(),
        };
        let value = self.0.eval_simple(&args);
        invocation.my_state().finish_with(value)
    }
}

// ---------------------------------------------------------------------------
// Primary
// ---------------------------------------------------------------------------

/// A callback run for each value of the primary argument.
pub trait PrimaryFn: Send + Sync + 'static {
    const STATIC_ARGS: usize = 0;
    /// Dynamic arguments before the primary one.
    const SECONDARY_ARGS: usize = 0;

    fn validate_argument(&self, _n: usize, _values: &[Value], _reporter: &mut NodeReporter<'_>) {}

    /// Handles one primary value. May add values to or finish `state`;
    /// once finished, no further primary values are passed.
    fn eval_each(
        &self,
        state: &mut NodeEvalState,
        args: &Args<'_>,
        subvalue: &Value,
    ) -> Result<(), EvalError>;
}

/// Runs a [`PrimaryFn`] over the primary argument's values as they arrive.
#[derive(Debug, Clone, Default)]
pub struct Primary<F>(pub F);

impl<F: PrimaryFn> Delegate for Primary<F> {
    fn num_static_args(&self) -> usize {
        F::STATIC_ARGS
    }

    fn num_dynamic_args(&self) -> usize {
        F::SECONDARY_ARGS + 1
    }

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        self.0.validate_argument(n, values, reporter);
    }

    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError> {
        invocation.each_primary(F::SECONDARY_ARGS, |state, args, value| {
            self.0.eval_each(state, args, value)
        })
    }
}

// ---------------------------------------------------------------------------
// Map, Filter, Selector
// ---------------------------------------------------------------------------

/// Transforms each primary value.
pub trait MapFn: Send + Sync + 'static {
    const STATIC_ARGS: usize = 0;
    const SECONDARY_ARGS: usize = 0;

    fn validate_argument(&self, _n: usize, _values: &[Value], _reporter: &mut NodeReporter<'_>) {}

    /// Output for `subvalue`; `None` produces nothing.
    fn map(&self, args: &Args<'_>, subvalue: &Value) -> Option<Value>;
}

/// Produces one output per primary value, in order.
#[derive(Debug, Clone, Default)]
pub struct Map<F>(pub F);

impl<F: MapFn> Delegate for Map<F> {
    fn num_static_args(&self) -> usize {
        F::STATIC_ARGS
    }

    fn num_dynamic_args(&self) -> usize {
        F::SECONDARY_ARGS + 1
    }

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        self.0.validate_argument(n, values, reporter);
    }

    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError> {
        invocation.each_primary(F::SECONDARY_ARGS, |state, args, value| {
            match self.0.map(args, value) {
                Some(output) => state.add_value(output),
                None => Ok(()),
            }
        })
    }
}

/// Decides membership of each primary value.
pub trait FilterFn: Send + Sync + 'static {
    const STATIC_ARGS: usize = 0;
    const SECONDARY_ARGS: usize = 0;

    fn validate_argument(&self, _n: usize, _values: &[Value], _reporter: &mut NodeReporter<'_>) {}

    /// Builds what [`filter`](FilterFn::filter) needs from the static
    /// arguments, read back through [`Args::prepared`]. Returns `false`,
    /// after reporting an error, if the node cannot be evaluated.
    fn prepare(&self, _static_args: &[Literal], _prepared: &mut Option<Prepared>, _reporter: &mut NodeReporter<'_>) -> bool {
        true
    }

    fn filter(&self, args: &Args<'_>, subvalue: &Value) -> bool;
}

/// Passes through the primary values accepted by a [`FilterFn`].
#[derive(Debug, Clone, Default)]
pub struct Filter<F>(pub F);

impl<F: FilterFn> Delegate for Filter<F> {
    fn num_static_args(&self) -> usize {
        F::STATIC_ARGS
    }

    fn num_dynamic_args(&self) -> usize {
        F::SECONDARY_ARGS + 1
    }

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        self.0.validate_argument(n, values, reporter);
    }

    fn prepare(
        &self,
        static_args: &[Literal],
        _environment: &Environment,
        prepared: &mut Option<Prepared>,
        reporter: &mut NodeReporter<'_>,
    ) -> bool {
        self.0.prepare(static_args, prepared, reporter)
    }

    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError> {
        invocation.each_primary(F::SECONDARY_ARGS, |state, args, value| {
            if self.0.filter(args, value) {
                state.add_value(value.clone())?;
            }
            Ok(())
        })
    }
}

/// Picks a primary value.
pub trait SelectFn: Send + Sync + 'static {
    const STATIC_ARGS: usize = 0;
    const SECONDARY_ARGS: usize = 0;

    fn validate_argument(&self, _n: usize, _values: &[Value], _reporter: &mut NodeReporter<'_>) {}

    fn select(&self, args: &Args<'_>, subvalue: &Value) -> bool;
}

/// Finishes with the first primary value a [`SelectFn`] accepts, or with
/// nothing once the primary argument finishes without one.
#[derive(Debug, Clone, Default)]
pub struct Selector<F>(pub F);

impl<F: SelectFn> Delegate for Selector<F> {
    fn num_static_args(&self) -> usize {
        F::STATIC_ARGS
    }

    fn num_dynamic_args(&self) -> usize {
        F::SECONDARY_ARGS + 1
    }

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        self.0.validate_argument(n, values, reporter);
    }

    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError> {
        invocation.each_primary(F::SECONDARY_ARGS, |state, args, value| {
            if self.0.select(args, value) {
                state.finish_with(Some(value.clone()))?;
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Constant
// ---------------------------------------------------------------------------

/// A call with no arguments evaluating to a fixed literal. Folds to that
/// literal during transformation.
#[derive(Debug, Clone)]
pub struct Constant(pub Literal);

impl Delegate for Constant {
    fn num_dynamic_args(&self) -> usize {
        0
    }

    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError> {
        invocation.my_state().finish_with(self.0.value())
    }
}
