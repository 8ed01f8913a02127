//! Functional calls: built-ins written as value functions.
//!
//! A [`Delegate`] declares a number of static arguments (which must be
//! literals once transformation is done) followed by dynamic arguments
//! (evaluated normally). [`FunctionalCall`] wraps a delegate and supplies
//! the rest of the [`Call`] protocol:
//!
//! - arity checks and validation of literal arguments at configuration time;
//! - validation of each dynamic argument the first time it finishes at
//!   runtime, failing evaluation with [`EvalError::ArgumentValidation`];
//! - constant folding: a node whose children are all literals is evaluated
//!   once during transformation and, if it finishes with a value that has a
//!   literal form, replaced by that literal;
//! - bookkeeping of which dynamic arguments are still unfinished.
//!
//! The adapters in [`adapters`] cover the common shapes (simple, primary,
//! map, filter, selector, constant); implement [`Delegate`] directly for
//! anything else.

pub mod adapters;

use std::any::Any;
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, PoisonError, RwLock};

use crate::call::Call;
use crate::dag::NodeView;
use crate::error::CoreError;
use crate::eval::{EvalContext, EvalError, Environment, GraphEvalState, NodeEvalState, Values};
use crate::factory::CallFactory;
use crate::id::{EvalIndex, NodeId};
use crate::indexed::{IndexedGraph, NodeRef};
use crate::literal::Literal;
use crate::merge_graph::MergeGraph;
use crate::reporter::{NodeReporter, Reporter};
use crate::validate;
use crate::value::Value;

pub use adapters::{
    Args, Constant, Filter, FilterFn, Map, MapFn, Primary, PrimaryFn, SelectFn, Selector, Simple,
    SimpleFn,
};

/// State produced by [`Delegate::prepare`] and handed to evaluation.
pub type Prepared = Arc<dyn Any + Send + Sync>;

/// The value function behind a functional call.
pub trait Delegate: Send + Sync + 'static {
    fn num_static_args(&self) -> usize {
        0
    }

    fn num_dynamic_args(&self) -> usize;

    /// Checks the values of argument `n` (counting static arguments first).
    /// Runs at configuration time for literal arguments and at runtime when
    /// a dynamic argument finishes.
    fn validate_argument(&self, _n: usize, _values: &[Value], _reporter: &mut NodeReporter<'_>) {}

    /// Prepares for evaluation given the static arguments. Store anything
    /// evaluation needs in `prepared`. Returns `false`, after reporting an
    /// error, if the node cannot be evaluated.
    fn prepare(
        &self,
        _static_args: &[Literal],
        _environment: &Environment,
        _prepared: &mut Option<Prepared>,
        _reporter: &mut NodeReporter<'_>,
    ) -> bool {
        true
    }

    /// Rewrites the node when it could not be constant folded.
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

    /// Per-episode scratch state for [`Invocation::substate_mut`].
    fn eval_initialize(&self, _node: NodeRef<'_>) -> Option<Box<dyn Any + Send>> {
        None
    }

    /// Produces values. Called once per phase until the node finishes;
    /// every dynamic argument has been evaluated for this phase already.
    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError>;
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// What a delegate sees during [`Delegate::eval`].
pub struct Invocation<'a, 'g> {
    node: NodeRef<'g>,
    graph_state: &'a mut GraphEvalState<'g>,
    context: &'a EvalContext,
    statics: &'a [Literal],
    num_static: usize,
    prepared: Option<Prepared>,
    substate: &'a mut Option<Box<dyn Any + Send>>,
    primary_consumed: &'a mut usize,
}

impl<'a, 'g> Invocation<'a, 'g> {
    pub fn node(&self) -> NodeRef<'g> {
        self.node
    }

    /// Index of the node being evaluated.
    pub fn index(&self) -> EvalIndex {
        self.node.index()
    }

    pub fn context(&self) -> &'a EvalContext {
        self.context
    }

    /// Literal values of the static arguments.
    pub fn statics(&self) -> &'a [Literal] {
        self.statics
    }

    pub fn prepared(&self) -> Option<&Prepared> {
        self.prepared.as_ref()
    }

    /// Prepared state of type `T`.
    pub fn prepared_as<T: Any>(&self) -> Option<&T> {
        self.prepared.as_deref()?.downcast_ref()
    }

    pub fn num_dynamic(&self) -> usize {
        self.node.num_children().saturating_sub(self.num_static)
    }

    /// Index of dynamic argument `n`.
    pub fn dynamic(&self, n: usize) -> Option<EvalIndex> {
        self.node.child(self.num_static + n)
    }

    pub fn graph_state(&self) -> &GraphEvalState<'g> {
        self.graph_state
    }

    pub fn graph_state_mut(&mut self) -> &mut GraphEvalState<'g> {
        self.graph_state
    }

    /// This node's own evaluation state.
    pub fn my_state(&mut self) -> &mut NodeEvalState {
        self.graph_state.node_state_mut(self.node.index())
    }

    pub fn values(&self, index: EvalIndex) -> Values<'_> {
        self.graph_state.values(index)
    }

    pub fn is_finished(&self, index: EvalIndex) -> bool {
        self.graph_state.is_finished(index)
    }

    /// Evaluates another node in the current phase.
    pub fn eval(&mut self, index: EvalIndex) -> Result<Values<'_>, EvalError> {
        self.graph_state.eval(index, self.context)
    }

    /// Makes this node forward to `target`.
    pub fn forward(&mut self, target: EvalIndex) -> Result<(), EvalError> {
        self.graph_state.forward(self.node.index(), target)
    }

    /// Values of the dynamic arguments in `range`, or `None` if any of
    /// them is unfinished.
    pub fn finished_dynamic(&self, range: Range<usize>) -> Option<Vec<Vec<Value>>> {
        range
            .map(|n| {
                let index = self.dynamic(n)?;
                self.is_finished(index).then(|| self.values(index).to_vec())
            })
            .collect()
    }

    /// Scratch state of type `T`, installed with `T::default()` if absent.
    pub fn substate_mut<T: Any + Send + Default>(&mut self) -> Result<&mut T, EvalError> {
        let node = self.index();
        self.substate
            .get_or_insert_with(|| Box::new(T::default()))
            .downcast_mut()
            .ok_or(EvalError::StateType { node })
    }

    /// Feeds each new value of the primary (last) dynamic argument to
    /// `each`, once all `secondary` arguments before it have finished.
    ///
    /// Finishes this node when the primary argument has finished and every
    /// one of its values was consumed, unless `each` finished it earlier.
    pub fn each_primary<F>(&mut self, secondary: usize, mut each: F) -> Result<(), EvalError>
    where
        F: FnMut(&mut NodeEvalState, &Args<'_>, &Value) -> Result<(), EvalError>,
    {
        let Some(dynamic) = self.finished_dynamic(0..secondary) else {
            return Ok(());
        };
        let me = self.index();
        let primary = self
            .dynamic(secondary)
            .ok_or(EvalError::IndexOutOfRange { node: me })?;

        let consumed = *self.primary_consumed;
        let (fresh, primary_finished) = {
            let values = self.graph_state.values(primary);
            let fresh = values.get(consumed..).unwrap_or_default().to_vec();
            (fresh, self.graph_state.is_finished(primary))
        };

        let prepared = self.prepared.clone();
        let args = Args {
            statics: self.statics,
            dynamic: &dynamic,
            prepared: prepared.as_ref(),
        };
        let my_state = self.graph_state.node_state_mut(me);
        let mut used = 0;
        for value in &fresh {
            if my_state.is_finished() {
                break;
            }
            each(my_state, &args, value)?;
            used += 1;
        }
        if primary_finished && used == fresh.len() && !my_state.is_finished() {
            my_state.finish()?;
        }

        *self.primary_consumed = consumed + used;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FunctionalCall
// ---------------------------------------------------------------------------

/// Per-episode state of a functional call.
struct CallState {
    /// Dynamic arguments not yet finished: (argument number, node).
    unfinished: Vec<(usize, EvalIndex)>,
    statics: Vec<Literal>,
    substate: Option<Box<dyn Any + Send>>,
    /// Primary values already fed to [`Invocation::each_primary`].
    primary_consumed: usize,
}

/// A [`Call`] driven by a [`Delegate`].
pub struct FunctionalCall {
    name: String,
    delegate: Box<dyn Delegate>,
    prepared: RwLock<Option<Prepared>>,
}

impl FunctionalCall {
    pub fn new(name: impl Into<String>, delegate: impl Delegate) -> Self {
        FunctionalCall {
            name: name.into(),
            delegate: Box::new(delegate),
            prepared: RwLock::new(None),
        }
    }

    pub fn delegate(&self) -> &dyn Delegate {
        self.delegate.as_ref()
    }

    fn arity(&self) -> usize {
        self.delegate.num_static_args() + self.delegate.num_dynamic_args()
    }

    fn store_prepared(&self, prepared: Option<Prepared>) {
        *self.prepared.write().unwrap_or_else(PoisonError::into_inner) = prepared;
    }

    fn load_prepared(&self) -> Option<Prepared> {
        self.prepared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Evaluates the all-literal subtree at `me` on its own and replaces it
    /// with the resulting literal. Returns `false` if it does not fold.
    fn fold(
        &self,
        me: NodeId,
        graph: &mut MergeGraph,
        environment: &Environment,
        reporter: &mut NodeReporter<'_>,
    ) -> Result<bool, CoreError> {
        let statics: Vec<Literal> = graph
            .view(me)?
            .children()
            .into_iter()
            .take(self.delegate.num_static_args())
            .filter_map(|child| child.literal().cloned())
            .collect();
        let mut prepared = None;
        if !self.delegate.prepare(&statics, environment, &mut prepared, reporter) {
            return Ok(false);
        }
        self.store_prepared(prepared);

        let subtree = IndexedGraph::from_subtree(graph, me)?;
        let values = match Self::eval_subtree(&subtree) {
            Ok(Some(values)) => values,
            Ok(None) => return Ok(false),
            Err(err) => {
                tracing::debug!(node = %me, error = %err, "constant folding skipped");
                reporter.warn(format!("not folded: {err}"));
                return Ok(false);
            }
        };
        let Some(literal) = Literal::from_values(&values) else {
            return Ok(false);
        };

        tracing::trace!(node = %me, literal = %literal.to_s(), "constant folded");
        let replacement = graph.add_literal(literal);
        graph.replace(me, replacement)?;
        Ok(true)
    }

    /// Values of the subtree's root in a phaseless context, or `None` if it
    /// does not finish.
    fn eval_subtree(subtree: &IndexedGraph) -> Result<Option<Vec<Value>>, EvalError> {
        let context = EvalContext::new();
        let mut state = GraphEvalState::new(subtree);
        state.initialize_all(&context)?;
        let root = EvalIndex(0);
        let values = state.eval(root, &context)?.to_vec();
        Ok(state.is_finished(root).then_some(values))
    }

    /// Evaluates unfinished dynamic arguments and validates those that
    /// finished.
    fn eval_args(
        &self,
        node: NodeRef<'_>,
        call_state: &mut CallState,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        let mut still_unfinished = Vec::with_capacity(call_state.unfinished.len());
        for &(argument, index) in &call_state.unfinished {
            if !graph_state.eval_finished(index, context)? {
                still_unfinished.push((argument, index));
                continue;
            }
            let values = graph_state.values(index).to_vec();
            let child = graph_state.graph().node(index);
            let mut reporter = Reporter::new();
            self.delegate.validate_argument(
                argument,
                &values,
                &mut reporter.for_node(child.source(), child.to_s()),
            );
            if reporter.has_errors() {
                let message = reporter
                    .diagnostics()
                    .iter()
                    .map(|d| d.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(EvalError::ArgumentValidation {
                    node: node.index(),
                    argument,
                    message,
                });
            }
        }
        call_state.unfinished = still_unfinished;
        Ok(())
    }
}

impl fmt::Debug for FunctionalCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalCall")
            .field("name", &self.name)
            .field("static_args", &self.delegate.num_static_args())
            .field("dynamic_args", &self.delegate.num_dynamic_args())
            .finish()
    }
}

impl Call for FunctionalCall {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        if !validate::n_children(node, reporter, self.arity()) {
            return;
        }
        for (i, child) in node.children().into_iter().enumerate() {
            if let Some(literal) = child.literal() {
                self.delegate
                    .validate_argument(i, &literal.values(), reporter);
            }
        }
    }

    fn transform(
        &self,
        me: NodeId,
        graph: &mut MergeGraph,
        factory: &CallFactory,
        environment: &Environment,
        reporter: &mut NodeReporter<'_>,
    ) -> Result<bool, CoreError> {
        let all_literal = graph
            .view(me)?
            .children()
            .iter()
            .all(NodeView::is_literal);
        if all_literal && self.fold(me, graph, environment, reporter)? {
            return Ok(true);
        }
        self.delegate
            .transform(me, graph, factory, environment, reporter)
    }

    fn post_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        let num_static = self.delegate.num_static_args();
        for (i, child) in node.children().into_iter().enumerate() {
            if i < num_static && !validate::nth_child_is_literal(node, reporter, i) {
                continue;
            }
            if let Some(literal) = child.literal() {
                self.delegate
                    .validate_argument(i, &literal.values(), reporter);
            }
        }
    }

    fn pre_eval(&self, node: NodeRef<'_>, environment: &Environment, reporter: &mut NodeReporter<'_>) {
        let statics: Vec<Literal> = (0..self.delegate.num_static_args())
            .filter_map(|n| node.child_ref(n)?.literal().cloned())
            .collect();
        let mut prepared = None;
        if self
            .delegate
            .prepare(&statics, environment, &mut prepared, reporter)
        {
            self.store_prepared(prepared);
        }
    }

    fn eval_initialize(
        &self,
        node: NodeRef<'_>,
        state: &mut NodeEvalState,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        let num_static = self.delegate.num_static_args();
        let mut unfinished = Vec::new();
        let mut statics = Vec::with_capacity(num_static);
        for (argument, &index) in node.children().iter().enumerate() {
            let child = node.graph().node(index);
            match child.literal() {
                Some(literal) if argument < num_static => statics.push(literal.clone()),
                Some(_) => {}
                None => unfinished.push((argument, index)),
            }
        }
        state.set_state(CallState {
            unfinished,
            statics,
            substate: self.delegate.eval_initialize(node),
            primary_consumed: 0,
        });
        Ok(())
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        let me = node.index();
        let mut call_state: CallState = graph_state.node_state_mut(me).take_state()?;
        let result = self
            .eval_args(node, &mut call_state, graph_state, context)
            .and_then(|()| {
                let mut invocation = Invocation {
                    node: graph_state.graph().node(me),
                    graph_state: &mut *graph_state,
                    context,
                    statics: &call_state.statics,
                    num_static: self.delegate.num_static_args(),
                    prepared: self.load_prepared(),
                    substate: &mut call_state.substate,
                    primary_consumed: &mut call_state.primary_consumed,
                };
                self.delegate.eval(&mut invocation)
            });
        graph_state.node_state_mut(me).set_state(call_state);
        result
    }
}

impl CallFactory {
    /// Registers a functional call: `make` builds a fresh delegate for each
    /// node.
    pub fn add_functional<D, G>(&mut self, name: &str, make: G) -> &mut Self
    where
        D: Delegate,
        G: Fn() -> D + Send + Sync + 'static,
    {
        let owned = name.to_owned();
        self.add(name, move || {
            Arc::new(FunctionalCall::new(owned.clone(), make())) as Arc<dyn Call>
        })
    }
}
