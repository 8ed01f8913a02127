//! Per-transaction evaluation state.
//!
//! [`GraphEvalState`] is a flat array of [`NodeEvalState`], one per indexed
//! node, created per transaction and dropped when the transaction ends. It
//! is the only mutable state touched during evaluation; the indexed graph
//! itself stays immutable and can be shared across threads.
//!
//! ## Value production
//!
//! A node produces values in exactly one of three ways:
//!
//! - **Local**: it owns a growing list (`add_value`, then `finish`).
//! - **Forward**: it substitutes another node's state for its own. Reads
//!   follow the forward chain and the node is never calculated again.
//! - **Alias**: it exposes a host-owned, append-only [`ValueList`]. The node
//!   still finishes itself once the list will grow no further; values
//!   appended to the list after that point are not observed.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::RwLockReadGuard;

use crate::call::NodeKind;
use crate::eval::context::{EvalContext, Phase};
use crate::eval::error::EvalError;
use crate::id::EvalIndex;
use crate::indexed::IndexedGraph;
use crate::value::{Value, ValueList};

/// How a node's values are produced.
#[derive(Debug, Default)]
enum ValueSource {
    #[default]
    Unset,
    Local(Vec<Value>),
    Forward(EvalIndex),
    Alias {
        list: ValueList,
        /// Length at finish; later growth is not observed.
        frozen: Option<usize>,
    },
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Borrowed view of a node's current values.
pub enum Values<'a> {
    Empty,
    Local(&'a [Value]),
    Alias {
        guard: RwLockReadGuard<'a, Vec<Value>>,
        len: Option<usize>,
    },
}

impl Deref for Values<'_> {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        match self {
            Values::Empty => &[],
            Values::Local(values) => values,
            Values::Alias { guard, len } => {
                let n = len.map_or(guard.len(), |len| len.min(guard.len()));
                &guard[..n]
            }
        }
    }
}

impl fmt::Debug for Values<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// NodeEvalState
// ---------------------------------------------------------------------------

/// Evaluation record of one node for one transaction.
#[derive(Default)]
pub struct NodeEvalState {
    index: EvalIndex,
    initialized: bool,
    finished: bool,
    source: ValueSource,
    phase: Option<Phase>,
    state: Option<Box<dyn Any + Send>>,
}

impl NodeEvalState {
    pub fn new(index: EvalIndex) -> Self {
        NodeEvalState {
            index,
            ..Default::default()
        }
    }

    /// Index of the node this state belongs to.
    pub fn index(&self) -> EvalIndex {
        self.index
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Forward target, if this node forwards.
    pub fn forwarded_to(&self) -> Option<EvalIndex> {
        match self.source {
            ValueSource::Forward(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_forwarding(&self) -> bool {
        matches!(self.source, ValueSource::Forward(_))
    }

    pub fn is_aliased(&self) -> bool {
        matches!(self.source, ValueSource::Alias { .. })
    }

    /// Whether local values have been set up (possibly still empty).
    pub fn has_local_values(&self) -> bool {
        matches!(self.source, ValueSource::Local(_))
    }

    /// Phase this node was last calculated in.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Option<Phase>) {
        self.phase = phase;
    }

    /// This node's own values. Empty for a forwarding node; read those
    /// through [`GraphEvalState::values`].
    pub fn values(&self) -> Values<'_> {
        match &self.source {
            ValueSource::Unset | ValueSource::Forward(_) => Values::Empty,
            ValueSource::Local(values) => Values::Local(values),
            ValueSource::Alias { list, frozen } => Values::Alias {
                guard: list.read(),
                len: *frozen,
            },
        }
    }

    /// Switches to local values. No-op if already local.
    pub fn setup_local_values(&mut self) -> Result<(), EvalError> {
        match self.source {
            ValueSource::Unset => {
                self.source = ValueSource::Local(Vec::new());
                Ok(())
            }
            ValueSource::Local(_) => Ok(()),
            ValueSource::Forward(_) => Err(EvalError::Forwarded {
                node: self.index,
                operation: "set up local values on",
            }),
            ValueSource::Alias { .. } => Err(EvalError::Aliased {
                node: self.index,
                operation: "set up local values on",
            }),
        }
    }

    /// Appends a local value.
    pub fn add_value(&mut self, value: Value) -> Result<(), EvalError> {
        if self.finished {
            return Err(EvalError::AddToFinished { node: self.index });
        }
        self.setup_local_values().map_err(|err| match err {
            EvalError::Forwarded { node, .. } => EvalError::Forwarded {
                node,
                operation: "add a value to",
            },
            EvalError::Aliased { node, .. } => EvalError::Aliased {
                node,
                operation: "add a value to",
            },
            other => other,
        })?;
        if let ValueSource::Local(values) = &mut self.source {
            values.push(value);
        }
        Ok(())
    }

    /// Marks the node finished. Its values never change afterwards.
    pub fn finish(&mut self) -> Result<(), EvalError> {
        if self.is_forwarding() {
            return Err(EvalError::Forwarded {
                node: self.index,
                operation: "finish",
            });
        }
        if self.finished {
            return Err(EvalError::AlreadyFinished { node: self.index });
        }
        if let ValueSource::Alias { list, frozen } = &mut self.source {
            *frozen = Some(list.len());
        }
        self.finished = true;
        Ok(())
    }

    /// Finishes truthy: a single empty-string value.
    pub fn finish_true(&mut self) -> Result<(), EvalError> {
        self.add_value(Value::String(String::new()))?;
        self.finish()
    }

    /// Finishes falsy: no values. Fails if values were already added.
    pub fn finish_false(&mut self) -> Result<(), EvalError> {
        if !self.values().is_empty() {
            return Err(EvalError::HasLocalValues {
                node: self.index,
                operation: "finish falsy",
            });
        }
        self.finish()
    }

    /// Adds `value` if present, then finishes.
    pub fn finish_with(&mut self, value: Option<Value>) -> Result<(), EvalError> {
        if let Some(value) = value {
            self.add_value(value)?;
        }
        self.finish()
    }

    /// Starts forwarding to `target`. Use [`GraphEvalState::forward`], which
    /// also rejects forwarding loops.
    pub(crate) fn forward(&mut self, target: EvalIndex) -> Result<(), EvalError> {
        const OPERATION: &str = "forward";
        if self.finished {
            return Err(EvalError::Finished {
                node: self.index,
                operation: OPERATION,
            });
        }
        match &self.source {
            ValueSource::Forward(_) => Err(EvalError::Forwarded {
                node: self.index,
                operation: OPERATION,
            }),
            ValueSource::Alias { .. } => Err(EvalError::Aliased {
                node: self.index,
                operation: OPERATION,
            }),
            ValueSource::Local(values) if !values.is_empty() => Err(EvalError::HasLocalValues {
                node: self.index,
                operation: OPERATION,
            }),
            ValueSource::Unset | ValueSource::Local(_) => {
                self.source = ValueSource::Forward(target);
                Ok(())
            }
        }
    }

    /// Adopts `list` as this node's values.
    pub fn alias(&mut self, list: ValueList) -> Result<(), EvalError> {
        const OPERATION: &str = "alias";
        if self.finished {
            return Err(EvalError::Finished {
                node: self.index,
                operation: OPERATION,
            });
        }
        match &self.source {
            ValueSource::Forward(_) => Err(EvalError::Forwarded {
                node: self.index,
                operation: OPERATION,
            }),
            ValueSource::Alias { .. } => Err(EvalError::Aliased {
                node: self.index,
                operation: OPERATION,
            }),
            ValueSource::Local(values) if !values.is_empty() => Err(EvalError::HasLocalValues {
                node: self.index,
                operation: OPERATION,
            }),
            ValueSource::Unset | ValueSource::Local(_) => {
                self.source = ValueSource::Alias { list, frozen: None };
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Scratch state
    // -----------------------------------------------------------------------

    /// Installs node-specific scratch state, replacing any previous one.
    pub fn set_state<T: Any + Send>(&mut self, state: T) {
        self.state = Some(Box::new(state));
    }

    pub fn state<T: Any + Send>(&self) -> Option<&T> {
        self.state.as_ref()?.downcast_ref()
    }

    pub fn state_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.state.as_mut()?.downcast_mut()
    }

    /// Scratch state of type `T`, or [`EvalError::StateType`].
    pub fn expect_state_mut<T: Any + Send>(&mut self) -> Result<&mut T, EvalError> {
        let node = self.index;
        self.state_mut().ok_or(EvalError::StateType { node })
    }

    /// Removes and returns the scratch state.
    pub fn take_state<T: Any + Send>(&mut self) -> Result<T, EvalError> {
        let node = self.index;
        match self.state.take().map(|boxed| boxed.downcast::<T>()) {
            Some(Ok(state)) => Ok(*state),
            Some(Err(boxed)) => {
                self.state = Some(boxed);
                Err(EvalError::StateType { node })
            }
            None => Err(EvalError::StateType { node }),
        }
    }
}

impl fmt::Debug for NodeEvalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeEvalState")
            .field("index", &self.index)
            .field("finished", &self.finished)
            .field("source", &self.source)
            .field("phase", &self.phase)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// GraphEvalState
// ---------------------------------------------------------------------------

/// Evaluation state of every node of an indexed graph for one transaction.
pub struct GraphEvalState<'g> {
    graph: &'g IndexedGraph,
    states: Vec<NodeEvalState>,
}

impl<'g> GraphEvalState<'g> {
    pub fn new(graph: &'g IndexedGraph) -> Self {
        let states = (0..graph.len())
            .map(|i| NodeEvalState::new(EvalIndex(i as u32)))
            .collect();
        GraphEvalState { graph, states }
    }

    pub fn graph(&self) -> &'g IndexedGraph {
        self.graph
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn check(&self, index: EvalIndex) -> Result<(), EvalError> {
        if index.index() < self.states.len() {
            Ok(())
        } else {
            Err(EvalError::IndexOutOfRange { node: index })
        }
    }

    /// State of `index` itself, without following forwarding.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a node of this graph.
    pub fn node_state(&self, index: EvalIndex) -> &NodeEvalState {
        &self.states[index.index()]
    }

    /// Mutable state of `index` itself, without following forwarding.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a node of this graph.
    pub fn node_state_mut(&mut self, index: EvalIndex) -> &mut NodeEvalState {
        &mut self.states[index.index()]
    }

    /// Where reads of `index` land after following forwarding.
    pub fn final_index(&self, index: EvalIndex) -> EvalIndex {
        let mut current = index;
        for _ in 0..self.states.len() {
            match self.states.get(current.index()).and_then(NodeEvalState::forwarded_to) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// State reads of `index` are served from.
    pub fn final_state(&self, index: EvalIndex) -> &NodeEvalState {
        &self.states[self.final_index(index).index()]
    }

    pub fn is_finished(&self, index: EvalIndex) -> bool {
        self.final_state(index).is_finished()
    }

    /// Current values of `index`, following forwarding.
    pub fn values(&self, index: EvalIndex) -> Values<'_> {
        self.final_state(index).values()
    }

    /// Phase `index` was last calculated in, following forwarding.
    pub fn phase(&self, index: EvalIndex) -> Option<Phase> {
        self.final_state(index).phase()
    }

    /// Makes `from` forward to `to`.
    pub fn forward(&mut self, from: EvalIndex, to: EvalIndex) -> Result<(), EvalError> {
        self.check(from)?;
        self.check(to)?;
        if self.final_index(to) == from {
            return Err(EvalError::ForwardCycle {
                node: from,
                target: to,
            });
        }
        self.states[from.index()].forward(to)
    }

    /// Runs `f` with mutable access to the state of `index` and shared
    /// access to everything else. `f` must not read `index` through the
    /// shared handle; it sees a blank state there.
    pub fn split_state<R>(
        &mut self,
        index: EvalIndex,
        f: impl FnOnce(&mut NodeEvalState, &Self) -> R,
    ) -> R {
        let mut state = std::mem::take(&mut self.states[index.index()]);
        let result = f(&mut state, self);
        self.states[index.index()] = state;
        result
    }

    // -----------------------------------------------------------------------
    // Initialization and evaluation
    // -----------------------------------------------------------------------

    /// Prepares `index` for this transaction. Literals finish immediately;
    /// calls run `eval_initialize`. Repeated calls are no-ops.
    pub fn initialize(&mut self, index: EvalIndex, context: &EvalContext) -> Result<(), EvalError> {
        self.check(index)?;
        let node = self.graph.node(index);
        let state = &mut self.states[index.index()];
        if state.initialized {
            return Ok(());
        }
        state.initialized = true;
        match node.kind() {
            NodeKind::Literal(literal) => {
                state.setup_local_values()?;
                for value in literal.values() {
                    state.add_value(value)?;
                }
                state.finish()
            }
            NodeKind::Call(call) => call.eval_initialize(node, state, context),
        }
    }

    /// Initializes every node.
    pub fn initialize_all(&mut self, context: &EvalContext) -> Result<(), EvalError> {
        for i in 0..self.states.len() {
            self.initialize(EvalIndex(i as u32), context)?;
        }
        Ok(())
    }

    /// Evaluates `index` for the context's phase and returns its values.
    ///
    /// A finished node, or one already calculated in this phase, is not
    /// recalculated. A phaseless context always recalculates unfinished
    /// nodes.
    pub fn eval(&mut self, index: EvalIndex, context: &EvalContext) -> Result<Values<'_>, EvalError> {
        self.calculate(index, context)?;
        Ok(self.values(index))
    }

    /// Like [`eval`](Self::eval) but only reports whether `index` finished.
    pub fn eval_finished(&mut self, index: EvalIndex, context: &EvalContext) -> Result<bool, EvalError> {
        self.calculate(index, context)?;
        Ok(self.is_finished(index))
    }

    fn calculate(&mut self, index: EvalIndex, context: &EvalContext) -> Result<(), EvalError> {
        self.check(index)?;
        let graph = self.graph;
        loop {
            let target = self.final_index(index);
            let state = &mut self.states[target.index()];
            if !state.initialized {
                return Err(EvalError::NotInitialized { node: target });
            }
            let same_phase = context.phase().is_some() && state.phase == context.phase();
            if state.finished || same_phase {
                return Ok(());
            }
            state.phase = context.phase();

            let node = graph.node(target);
            if let NodeKind::Call(call) = node.kind() {
                call.eval_calculate(node, self, context)?;
            }
            // A node that started forwarding hands off to its new target.
            if self.final_index(index) == target {
                return Ok(());
            }
        }
    }

    /// Discards all state, starting a new evaluation episode. Nodes must be
    /// initialized again.
    pub fn reset(&mut self) {
        for (i, state) in self.states.iter_mut().enumerate() {
            *state = NodeEvalState::new(EvalIndex(i as u32));
        }
    }
}

impl fmt::Debug for GraphEvalState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphEvalState")
            .field("states", &self.states)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> NodeEvalState {
        NodeEvalState::new(EvalIndex(0))
    }

    #[test]
    fn local_values_then_finish() {
        let mut s = state();
        s.add_value(Value::Number(1)).unwrap();
        s.add_value(Value::Number(2)).unwrap();
        assert!(!s.is_finished());
        s.finish().unwrap();
        assert_eq!(&*s.values(), &[Value::Number(1), Value::Number(2)]);
        assert!(matches!(
            s.add_value(Value::Number(3)),
            Err(EvalError::AddToFinished { .. })
        ));
        assert!(matches!(s.finish(), Err(EvalError::AlreadyFinished { .. })));
    }

    #[test]
    fn finish_shortcuts() {
        let mut t = state();
        t.finish_true().unwrap();
        assert_eq!(&*t.values(), &[Value::String(String::new())]);

        let mut f = state();
        f.finish_false().unwrap();
        assert!(f.values().is_empty());
        assert!(f.is_finished());

        let mut g = state();
        g.add_value(Value::Number(1)).unwrap();
        assert!(g.finish_false().is_err());
    }

    #[test]
    fn forwarding_rules() {
        let mut s = state();
        s.forward(EvalIndex(1)).unwrap();
        assert_eq!(s.forwarded_to(), Some(EvalIndex(1)));
        assert!(matches!(s.forward(EvalIndex(2)), Err(EvalError::Forwarded { .. })));
        assert!(matches!(
            s.add_value(Value::Number(1)),
            Err(EvalError::Forwarded { .. })
        ));
        assert!(matches!(s.finish(), Err(EvalError::Forwarded { .. })));
        assert!(matches!(
            s.alias(ValueList::new()),
            Err(EvalError::Forwarded { .. })
        ));

        let mut local = state();
        local.add_value(Value::Number(1)).unwrap();
        assert!(matches!(
            local.forward(EvalIndex(1)),
            Err(EvalError::HasLocalValues { .. })
        ));

        let mut done = state();
        done.finish().unwrap();
        assert!(matches!(
            done.forward(EvalIndex(1)),
            Err(EvalError::Finished { .. })
        ));
    }

    #[test]
    fn aliasing_rules() {
        let list = ValueList::new();
        let mut s = state();
        s.alias(list.clone()).unwrap();
        assert!(s.is_aliased());
        list.push(Value::Number(1));
        assert_eq!(s.values().len(), 1);
        assert!(matches!(
            s.add_value(Value::Number(2)),
            Err(EvalError::Aliased { .. })
        ));
        assert!(matches!(s.alias(list.clone()), Err(EvalError::Aliased { .. })));
        assert!(matches!(
            s.forward(EvalIndex(3)),
            Err(EvalError::Aliased { .. })
        ));

        let mut local = state();
        local.add_value(Value::Number(1)).unwrap();
        assert!(matches!(
            local.alias(ValueList::new()),
            Err(EvalError::HasLocalValues { .. })
        ));
    }

    #[test]
    fn aliased_values_freeze_at_finish() {
        let list = ValueList::new();
        let mut s = state();
        s.alias(list.clone()).unwrap();
        list.push(Value::Number(1));
        s.finish().unwrap();
        list.push(Value::Number(2));
        assert_eq!(&*s.values(), &[Value::Number(1)]);
    }

    #[test]
    fn unfinished_alias_stays_unfinished() {
        let list = ValueList::new();
        let mut s = state();
        s.alias(list.clone()).unwrap();
        for i in 0..10 {
            list.push(Value::Number(i));
            assert!(!s.is_finished());
        }
        assert_eq!(s.values().len(), 10);
    }

    #[test]
    fn scratch_state_round_trip() {
        let mut s = state();
        s.set_state(5_usize);
        *s.state_mut::<usize>().unwrap() += 1;
        assert_eq!(s.state::<usize>(), Some(&6));
        assert!(s.state::<String>().is_none());
        assert!(matches!(
            s.take_state::<String>(),
            Err(EvalError::StateType { .. })
        ));
        assert_eq!(s.take_state::<usize>().unwrap(), 6);
        assert!(s.take_state::<usize>().is_err());
    }
}
