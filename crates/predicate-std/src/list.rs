//! Building and slicing value sequences.
//!
//! A node's values already form a sequence, so `cat` concatenates child
//! sequences and `list` turns each child into a single item. `first`,
//! `rest` and `nth` slice the sequence of their last argument; `flatten`
//! spreads list values back into the sequence.
//!
//! `setName`, `pushName` and `focus` build and take apart named values.

use predicate_core::functional::{
    Args, Delegate, Invocation, Map, MapFn, Primary, PrimaryFn, SelectFn, Selector,
};
use predicate_core::validate;
use predicate_core::{
    Call, CallFactory, CoreError, EvalContext, EvalError, Environment, GraphEvalState,
    Literal, MergeGraph, NodeEvalState, NodeId, NodeRef, NodeReporter, Value,
};

use crate::helpers::{classify_children, fold_concatenation, rebuild, replace_with_literal};

pub fn load(factory: &mut CallFactory) {
    factory
        .add_call::<List>()
        .add_call::<Cat>()
        .add_functional("first", || Selector(First))
        .add_functional("rest", || Rest)
        .add_functional("nth", || Nth)
        .add_functional("flatten", || Primary(Flatten))
        .add_functional("setName", || Map(SetName))
        .add_functional("pushName", || Map(PushName))
        .add_functional("focus", || Primary(Focus));
}

/// Next child to wait for.
#[derive(Debug, Default)]
struct Cursor(usize);

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

/// `(list a b ...)`: one value per child, in argument order. A child with
/// exactly one value contributes that value; any other child contributes
/// a list of its values.
#[derive(Debug, Default)]
pub struct List;

impl Call for List {
    fn name(&self) -> &str {
        "list"
    }

    fn transform(
        &self,
        me: NodeId,
        graph: &mut MergeGraph,
        _factory: &CallFactory,
        _environment: &Environment,
        _reporter: &mut NodeReporter<'_>,
    ) -> Result<bool, CoreError> {
        if graph.view(me)?.num_children() == 0 {
            return replace_with_literal(graph, me, Literal::Null);
        }
        Ok(false)
    }

    fn eval_initialize(
        &self,
        _node: NodeRef<'_>,
        state: &mut NodeEvalState,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        state.setup_local_values()?;
        state.set_state(Cursor::default());
        Ok(())
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        let me = node.index();
        let Cursor(mut next) = graph_state.node_state_mut(me).take_state()?;
        // Later children are still evaluated so shared subexpressions warm up.
        let mut blocked = false;
        for (n, &child) in node.children().iter().enumerate().skip(next) {
            let finished = graph_state.eval_finished(child, context)?;
            if blocked || !finished {
                blocked = true;
                continue;
            }
            let item = match &*graph_state.values(child) {
                [single] => single.clone(),
                values => Value::List(values.to_vec()),
            };
            graph_state.node_state_mut(me).add_value(item)?;
            next = n + 1;
        }
        let state = graph_state.node_state_mut(me);
        if next == node.num_children() {
            state.finish()?;
        }
        state.set_state(Cursor(next));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// cat
// ---------------------------------------------------------------------------

/// `(cat a b ...)`: the values of each child in turn. Values of the child
/// being waited on stream through as they appear.
#[derive(Debug, Default)]
pub struct Cat;

#[derive(Debug, Default)]
struct CatState {
    child: usize,
    consumed: usize,
}

impl Call for Cat {
    fn name(&self) -> &str {
        "cat"
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
        let kept: Vec<NodeId> = children
            .iter()
            .filter(|(_, literal)| !matches!(literal, Some(Literal::Null)))
            .map(|&(id, _)| id)
            .collect();
        match kept.as_slice() {
            [] => replace_with_literal(graph, me, Literal::Null),
            [only] => {
                graph.replace(me, *only)?;
                Ok(true)
            }
            _ if kept.len() < children.len() => rebuild(graph, factory, me, self.name(), &kept),
            _ => fold_concatenation(graph, me),
        }
    }

    fn eval_initialize(
        &self,
        _node: NodeRef<'_>,
        state: &mut NodeEvalState,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        state.setup_local_values()?;
        state.set_state(CatState::default());
        Ok(())
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        let me = node.index();
        let mut cat: CatState = graph_state.node_state_mut(me).take_state()?;
        while let Some(child) = node.child(cat.child) {
            let fresh = graph_state
                .eval(child, context)?
                .get(cat.consumed..)
                .unwrap_or_default()
                .to_vec();
            let finished = graph_state.is_finished(child);
            cat.consumed += fresh.len();
            let state = graph_state.node_state_mut(me);
            for value in fresh {
                state.add_value(value)?;
            }
            if !finished {
                break;
            }
            cat.child += 1;
            cat.consumed = 0;
        }
        let state = graph_state.node_state_mut(me);
        if cat.child == node.num_children() {
            state.finish()?;
        }
        state.set_state(cat);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// first, rest, nth
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct First;

impl SelectFn for First {
    fn select(&self, _args: &Args<'_>, _subvalue: &Value) -> bool {
        true
    }
}

/// `(rest x)`: every value of `x` but the first.
#[derive(Debug, Default)]
pub struct Rest;

impl Delegate for Rest {
    fn num_dynamic_args(&self) -> usize {
        1
    }

    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError> {
        let mut seen = *invocation.substate_mut::<usize>()?;
        invocation.each_primary(0, |state, _args, value| {
            seen += 1;
            if seen > 1 {
                state.add_value(value.clone())?;
            }
            Ok(())
        })?;
        *invocation.substate_mut::<usize>()? = seen;
        Ok(())
    }
}

/// `(nth n x)`: the `n`th value of `x`, counting from 1.
#[derive(Debug, Default)]
pub struct Nth;

impl Delegate for Nth {
    fn num_dynamic_args(&self) -> usize {
        2
    }

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        if n != 0 || !validate::value_is_singular(values, reporter) {
            return;
        }
        let Some(value) = values.first() else {
            reporter.error("nth needs an index");
            return;
        };
        if validate::value_is_number(value, reporter) && value.as_number().is_some_and(|n| n < 1) {
            reporter.error(format!("nth counts from 1, got {value}"));
        }
    }

    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError> {
        let mut seen = *invocation.substate_mut::<i64>()?;
        invocation.each_primary(1, |state, args, value| {
            seen += 1;
            if args.dynamic(0).first().and_then(Value::as_number) == Some(seen) {
                state.finish_with(Some(value.clone()))?;
            }
            Ok(())
        })?;
        *invocation.substate_mut::<i64>()? = seen;
        Ok(())
    }
}

/// `(flatten x)`: each list value of `x` replaced by its items.
#[derive(Debug, Default)]
pub struct Flatten;

impl PrimaryFn for Flatten {
    fn eval_each(&self, state: &mut NodeEvalState, _args: &Args<'_>, subvalue: &Value) -> Result<(), EvalError> {
        for item in subvalue.subvalues() {
            state.add_value(item.clone())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// setName, pushName, focus
// ---------------------------------------------------------------------------

fn validate_name(n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
    if n != 0 || !validate::value_is_singular(values, reporter) {
        return;
    }
    match values.first() {
        Some(value) => {
            validate::value_is_string(value, reporter);
        }
        None => reporter.error("expected a name"),
    }
}

/// `(setName 'name' x)`: each value of `x` renamed.
#[derive(Debug, Default)]
pub struct SetName;

impl MapFn for SetName {
    const SECONDARY_ARGS: usize = 1;

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        validate_name(n, values, reporter);
    }

    fn map(&self, args: &Args<'_>, subvalue: &Value) -> Option<Value> {
        let name = args.dynamic(0).first().and_then(Value::as_str).unwrap_or_default();
        Some(Value::named(name, subvalue.clone()))
    }
}

/// `(pushName x)`: the items of each list value of `x` take the list's
/// name. Items of an unnamed list lose theirs.
#[derive(Debug, Default)]
pub struct PushName;

impl MapFn for PushName {
    fn map(&self, _args: &Args<'_>, subvalue: &Value) -> Option<Value> {
        let Some(items) = subvalue.as_list() else {
            return Some(subvalue.clone());
        };
        let name = subvalue.name().unwrap_or_default();
        let items = items
            .iter()
            .map(|item| Value::named(name, item.clone()))
            .collect();
        Some(Value::named(name, Value::List(items)))
    }
}

/// `(focus 'name' x)`: for each list value of `x`, its first item called
/// `name`, renamed to the list's name. Other values contribute nothing.
#[derive(Debug, Default)]
pub struct Focus;

impl PrimaryFn for Focus {
    const SECONDARY_ARGS: usize = 1;

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        validate_name(n, values, reporter);
    }

    fn eval_each(&self, state: &mut NodeEvalState, args: &Args<'_>, subvalue: &Value) -> Result<(), EvalError> {
        let Some(wanted) = args.dynamic(0).first().and_then(Value::as_str) else {
            return Ok(());
        };
        let Some(items) = subvalue.as_list() else {
            return Ok(());
        };
        match items.iter().find(|item| item.name() == Some(wanted)) {
            Some(item) => state.add_value(Value::named(subvalue.name().unwrap_or_default(), item.clone())),
            None => Ok(()),
        }
    }
}
