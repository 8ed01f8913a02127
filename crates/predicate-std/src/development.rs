//! Calls for writing and debugging expressions.

use predicate_core::validate;
use predicate_core::{
    Call, CallFactory, EvalContext, EvalError, GraphEvalState, NodeEvalState, NodeRef,
    NodeReporter, NodeView, Value,
};

pub fn load(factory: &mut CallFactory) {
    factory
        .add_call::<Identity>()
        .add_call::<P>()
        .add_call::<Sequence>();
}

/// `(identity x)`: evaluates to `x`. Never folded away.
#[derive(Debug, Default)]
pub struct Identity;

impl Call for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        validate::n_children(node, reporter, 1);
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        let child = node
            .child(0)
            .ok_or(EvalError::IndexOutOfRange { node: node.index() })?;
        graph_state.forward(node.index(), child)
    }
}

/// `(p a ... x)`: logs the values of every child each time it is
/// calculated and takes on the values of the last one.
#[derive(Debug, Default)]
pub struct P;

impl Call for P {
    fn name(&self) -> &str {
        "p"
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        validate::n_or_more_children(node, reporter, 1);
    }

    fn eval_initialize(
        &self,
        _node: NodeRef<'_>,
        state: &mut NodeEvalState,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        state.setup_local_values()?;
        state.set_state(0_usize);
        Ok(())
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        let me = node.index();
        let mut rendered = Vec::with_capacity(node.num_children());
        for &child in node.children() {
            let values = graph_state.eval(child, context)?;
            rendered.push(render(&values));
        }
        tracing::info!(
            node = %node.to_s(),
            phase = ?context.phase(),
            values = %rendered.join("; "),
            "p"
        );

        let last = *node
            .children()
            .last()
            .ok_or(EvalError::IndexOutOfRange { node: me })?;
        let consumed: usize = graph_state.node_state_mut(me).take_state()?;
        let fresh = graph_state
            .values(last)
            .get(consumed..)
            .unwrap_or_default()
            .to_vec();
        let finished = graph_state.is_finished(last);
        let state = graph_state.node_state_mut(me);
        state.set_state(consumed + fresh.len());
        for value in fresh {
            state.add_value(value)?;
        }
        if finished {
            state.finish()?;
        }
        Ok(())
    }
}

fn render(values: &[Value]) -> String {
    let items: Vec<String> = values.iter().map(Value::to_string).collect();
    format!("[{}]", items.join(" "))
}

// ---------------------------------------------------------------------------
// sequence
// ---------------------------------------------------------------------------

/// `(sequence start [end [step]])`: `start`, `start + step`, ... one value
/// per calculation, finishing once past `end`.
///
/// Without `end`, or when `step` points away from `end`, the sequence never
/// finishes. A zero step never finishes either.
#[derive(Debug, Default)]
pub struct Sequence;

#[derive(Debug)]
struct SequenceState {
    current: i64,
    end: i64,
    step: i64,
    infinite: bool,
}

impl SequenceState {
    fn new(node: NodeRef<'_>) -> Result<Self, EvalError> {
        let argument = |n: usize| node.child_ref(n).and_then(|c| c.literal()?.as_integer());
        let start = argument(0).ok_or(EvalError::IndexOutOfRange { node: node.index() })?;
        let (end, step) = match (argument(1), argument(2)) {
            (Some(end), step) => (end, step.unwrap_or(1)),
            (None, _) => (start.saturating_sub(1), 1),
        };
        let infinite = (step > 0 && start > end) || (step < 0 && end > start);
        Ok(SequenceState {
            current: start,
            end,
            step,
            infinite,
        })
    }

    fn is_done(&self) -> bool {
        !self.infinite
            && ((self.step > 0 && self.current > self.end) || (self.step < 0 && self.current < self.end))
    }
}

impl Call for Sequence {
    fn name(&self) -> &str {
        "sequence"
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        let mut ok = validate::n_or_more_children(node, reporter, 1);
        ok = validate::n_or_fewer_children(node, reporter, 3) && ok;
        if !ok {
            return;
        }
        for n in 0..node.num_children() {
            validate::nth_child_is_integer(node, reporter, n);
        }
    }

    fn eval_initialize(
        &self,
        node: NodeRef<'_>,
        state: &mut NodeEvalState,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        state.setup_local_values()?;
        state.set_state(SequenceState::new(node)?);
        Ok(())
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        let state = graph_state.node_state_mut(node.index());
        let mut sequence: SequenceState = state.take_state()?;
        state.add_value(Value::Number(sequence.current))?;
        let next = sequence.current.checked_add(sequence.step);
        if let Some(next) = next {
            sequence.current = next;
        }
        // Stepping past the integer range ends the sequence.
        if next.is_none() || sequence.is_done() {
            state.finish()?;
        }
        state.set_state(sequence);
        Ok(())
    }
}
