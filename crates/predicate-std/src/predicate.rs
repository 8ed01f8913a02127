//! Calls about other nodes: literalness, completion, list-ness, length.

use predicate_core::functional::{Args, Delegate, Invocation, Primary, PrimaryFn};
use predicate_core::validate;
use predicate_core::{
    Call, CallFactory, CoreError, EvalContext, EvalError, EvalIndex, Environment, GraphEvalState,
    Literal, MergeGraph, NodeEvalState, NodeId, NodeRef, NodeReporter, NodeView, Value,
};

use crate::helpers::{
    classify_children, fold_concatenation, literal_for, rebuild, replace_with_literal, true_value,
};

pub fn load(factory: &mut CallFactory) {
    factory
        .add_call::<IsLiteral>()
        .add_call::<IsFinished>()
        .add_functional("isList", || Primary(IsList))
        .add_functional("isLonger", || IsLonger)
        .add_call::<FinishAll>()
        .add_call::<FinishAny>();
}

/// `(isLiteral x)`: decided entirely during transformation.
#[derive(Debug, Default)]
pub struct IsLiteral;

impl Call for IsLiteral {
    fn name(&self) -> &str {
        "isLiteral"
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        validate::n_children(node, reporter, 1);
    }

    fn transform(
        &self,
        me: NodeId,
        graph: &mut MergeGraph,
        _factory: &CallFactory,
        _environment: &Environment,
        _reporter: &mut NodeReporter<'_>,
    ) -> Result<bool, CoreError> {
        let is_literal = matches!(classify_children(graph, me)?.as_slice(), [(_, Some(_))]);
        replace_with_literal(graph, me, literal_for(is_literal))
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        _graph_state: &mut GraphEvalState<'_>,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        Err(EvalError::Untransformed {
            node: node.index(),
            name: self.name().to_owned(),
        })
    }
}

/// `(isFinished x)`: true once `x` finishes; never false.
#[derive(Debug, Default)]
pub struct IsFinished;

impl Call for IsFinished {
    fn name(&self) -> &str {
        "isFinished"
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        validate::n_children(node, reporter, 1);
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        let child = node
            .child(0)
            .ok_or(EvalError::IndexOutOfRange { node: node.index() })?;
        if graph_state.eval_finished(child, context)? {
            graph_state.node_state_mut(node.index()).finish_true()?;
        }
        Ok(())
    }
}

/// `(isList x)`: decided by the first value of `x`; false if `x` finishes
/// without values.
#[derive(Debug, Default)]
pub struct IsList;

impl PrimaryFn for IsList {
    fn eval_each(&self, state: &mut NodeEvalState, _args: &Args<'_>, subvalue: &Value) -> Result<(), EvalError> {
        state.finish_with(subvalue.is_list().then(true_value))
    }
}

/// `(isLonger n x)`: true as soon as `x` has more than `n` values; false
/// if `x` finishes with `n` or fewer.
#[derive(Debug, Default)]
pub struct IsLonger;

impl Delegate for IsLonger {
    fn num_dynamic_args(&self) -> usize {
        2
    }

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        if n != 0 || !validate::value_is_singular(values, reporter) {
            return;
        }
        let Some(value) = values.first() else {
            reporter.error("isLonger needs a length");
            return;
        };
        if validate::value_is_number(value, reporter) && value.as_number().is_some_and(|n| n < 0) {
            reporter.error(format!("length must not be negative, got {value}"));
        }
    }

    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError> {
        let mut seen = *invocation.substate_mut::<i64>()?;
        invocation.each_primary(1, |state, args, _value| {
            seen += 1;
            let limit = args.dynamic(0).first().and_then(Value::as_number);
            if limit.is_some_and(|limit| seen > limit) {
                state.finish_with(Some(true_value()))?;
            }
            Ok(())
        })?;
        *invocation.substate_mut::<i64>()? = seen;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// finishAll, finishAny
// ---------------------------------------------------------------------------

/// `(finishAll a b ...)`: collects each child's values as that child
/// finishes; finishes once every child has.
#[derive(Debug, Default)]
pub struct FinishAll;

/// Children of a `finishAll` not yet finished.
struct Pending(Vec<EvalIndex>);

impl Call for FinishAll {
    fn name(&self) -> &str {
        "finishAll"
    }

    fn transform(
        &self,
        me: NodeId,
        graph: &mut MergeGraph,
        _factory: &CallFactory,
        _environment: &Environment,
        _reporter: &mut NodeReporter<'_>,
    ) -> Result<bool, CoreError> {
        fold_concatenation(graph, me)
    }

    fn eval_initialize(
        &self,
        node: NodeRef<'_>,
        state: &mut NodeEvalState,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        state.setup_local_values()?;
        state.set_state(Pending(node.children().to_vec()));
        Ok(())
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        let me = node.index();
        let Pending(pending) = graph_state.node_state_mut(me).take_state()?;
        let mut still_pending = Vec::with_capacity(pending.len());
        for child in pending {
            if !graph_state.eval_finished(child, context)? {
                still_pending.push(child);
                continue;
            }
            let values = graph_state.values(child).to_vec();
            let state = graph_state.node_state_mut(me);
            for value in values {
                state.add_value(value)?;
            }
        }
        let state = graph_state.node_state_mut(me);
        if still_pending.is_empty() {
            state.finish()?;
        }
        state.set_state(Pending(still_pending));
        Ok(())
    }
}

/// `(finishAny a b ...)`: takes the values of the first child, in argument
/// order, that has finished.
#[derive(Debug, Default)]
pub struct FinishAny;

impl Call for FinishAny {
    fn name(&self) -> &str {
        "finishAny"
    }

    fn transform(
        &self,
        me: NodeId,
        graph: &mut MergeGraph,
        factory: &CallFactory,
        _environment: &Environment,
        _reporter: &mut NodeReporter<'_>,
    ) -> Result<bool, CoreError> {
        let children = classify_children(graph, me)?;
        if children.is_empty() {
            return replace_with_literal(graph, me, Literal::Null);
        }
        // A literal has always finished, so nothing after it is reachable.
        match children.iter().position(|(_, literal)| literal.is_some()) {
            Some(0) => {
                graph.replace(me, children[0].0)?;
                Ok(true)
            }
            Some(last) if last + 1 < children.len() => {
                let kept: Vec<NodeId> = children[..=last].iter().map(|&(id, _)| id).collect();
                rebuild(graph, factory, me, self.name(), &kept)
            }
            _ => Ok(false),
        }
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        for &child in node.children() {
            if graph_state.eval_finished(child, context)? {
                let values = graph_state.values(child).to_vec();
                let state = graph_state.node_state_mut(node.index());
                for value in values {
                    state.add_value(value)?;
                }
                return state.finish();
            }
        }
        Ok(())
    }
}
