//! Calls that reach into the host: transaction fields, host operators and
//! the phase clock.
//!
//! Phases are written as non-negative integer literals. In a phaseless
//! context every phase counts as reached.

use std::sync::Arc;

use predicate_core::functional::{Delegate, Invocation, Prepared};
use predicate_core::validate;
use predicate_core::{
    Call, CallFactory, EvalContext, EvalError, Environment, GraphEvalState, Literal,
    NodeEvalState, NodeRef, NodeReporter, NodeView, Operator, Phase, Value,
};

pub fn load(factory: &mut CallFactory) {
    factory
        .add_call::<Var>()
        .add_functional("operator", || OperatorCall)
        .add_call::<WaitPhase>()
        .add_call::<FinishPhase>();
}

/// Checks that child `n` is a literal phase number.
fn nth_child_is_phase(node: NodeView<'_>, reporter: &mut NodeReporter<'_>, n: usize) -> bool {
    if !validate::nth_child_is_integer(node, reporter, n) {
        return false;
    }
    let value = node.child(n).and_then(|c| c.literal()?.as_integer());
    match value {
        Some(phase) if u32::try_from(phase).is_ok() => true,
        _ => {
            reporter.error(format!("child {} is not a valid phase", n + 1));
            false
        }
    }
}

fn phase_argument(node: NodeRef<'_>, n: usize) -> Option<Phase> {
    let phase = node.child_ref(n)?.literal()?.as_integer()?;
    u32::try_from(phase).ok().map(Phase)
}

fn reached(context: &EvalContext, phase: Phase) -> bool {
    context.phase().map_or(true, |current| current >= phase)
}

// ---------------------------------------------------------------------------
// var
// ---------------------------------------------------------------------------

/// `(var 'name')` or `(var 'name' initial final)`: the values of a
/// transaction field.
///
/// The node aliases the field's value list, so values the host appends in
/// later phases show up without copying. It finishes when the host marks
/// the field complete or, with phases given, once `final` is reached;
/// before `initial` it does nothing. A missing field leaves the node
/// waiting, except in a phaseless context where it is fatal.
#[derive(Debug, Default)]
pub struct Var;

impl Call for Var {
    fn name(&self) -> &str {
        "var"
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        match node.num_children() {
            1 => {
                validate::nth_child_is_string(node, reporter, 0);
            }
            3 => {
                validate::nth_child_is_string(node, reporter, 0);
                nth_child_is_phase(node, reporter, 1);
                nth_child_is_phase(node, reporter, 2);
            }
            n => reporter.error(format!("var must have 1 or 3 children but has {n}")),
        }
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        let me = node.index();
        let name = node
            .child_ref(0)
            .and_then(|c| c.literal()?.as_str())
            .ok_or(EvalError::IndexOutOfRange { node: me })?;
        if phase_argument(node, 1).is_some_and(|initial| !reached(context, initial)) {
            return Ok(());
        }
        let time_to_finish = phase_argument(node, 2).is_some_and(|last| reached(context, last));

        let field = context.field(name);
        let state = graph_state.node_state_mut(me);
        if !state.is_aliased() {
            match field {
                Some(field) => state.alias(field.values().clone())?,
                None if time_to_finish => return state.finish(),
                None if context.phase().is_none() => {
                    return Err(EvalError::MissingField {
                        node: me,
                        name: name.to_owned(),
                    })
                }
                None => return Ok(()),
            }
        }
        if time_to_finish || field.is_some_and(|f| f.is_complete()) {
            state.finish()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// operator
// ---------------------------------------------------------------------------

/// `(operator 'name' 'argument' input)`: runs the named host operator on
/// each value of `input`, producing the operator's output for every match.
#[derive(Debug, Default)]
pub struct OperatorCall;

#[derive(Clone)]
struct PreparedOperator {
    operator: Arc<dyn Operator>,
    argument: String,
}

impl Delegate for OperatorCall {
    fn num_static_args(&self) -> usize {
        2
    }

    fn num_dynamic_args(&self) -> usize {
        1
    }

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        if n >= 2 || !validate::value_is_singular(values, reporter) {
            return;
        }
        match values.first() {
            Some(value) => {
                validate::value_is_string(value, reporter);
            }
            None => reporter.error("operator name and argument must be strings"),
        }
    }

    fn prepare(
        &self,
        static_args: &[Literal],
        environment: &Environment,
        prepared: &mut Option<Prepared>,
        reporter: &mut NodeReporter<'_>,
    ) -> bool {
        let (Some(name), Some(argument)) = (
            static_args.first().and_then(Literal::as_str),
            static_args.get(1).and_then(Literal::as_str),
        ) else {
            reporter.error("operator name and argument must be strings");
            return false;
        };
        let Some(operator) = environment.operator(name) else {
            reporter.error(format!(
                "no operator '{name}' in environment '{}'",
                environment.name()
            ));
            return false;
        };
        if let Err(message) = operator.prepare(argument) {
            reporter.error(format!("operator '{name}' rejected argument: {message}"));
            return false;
        }
        *prepared = Some(Arc::new(PreparedOperator {
            operator,
            argument: argument.to_owned(),
        }));
        true
    }

    fn eval(&self, invocation: &mut Invocation<'_, '_>) -> Result<(), EvalError> {
        let node = invocation.index();
        let Some(prepared) = invocation.prepared_as::<PreparedOperator>().cloned() else {
            return Err(EvalError::Host {
                node,
                message: "operator used before pre-evaluation".to_owned(),
            });
        };
        invocation.each_primary(0, |state, _args, value| {
            match prepared.operator.execute(&prepared.argument, value) {
                Ok(Some(output)) => state.add_value(output),
                Ok(None) => Ok(()),
                Err(message) => Err(EvalError::Host { node, message }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// waitPhase, finishPhase
// ---------------------------------------------------------------------------

/// `(waitPhase phase expr)`: nothing before `phase`; from then on, `expr`.
#[derive(Debug, Default)]
pub struct WaitPhase;

impl Call for WaitPhase {
    fn name(&self) -> &str {
        "waitPhase"
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        if validate::n_children(node, reporter, 2) {
            nth_child_is_phase(node, reporter, 0);
        }
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        let me = node.index();
        let (Some(phase), Some(child)) = (phase_argument(node, 0), node.child(1)) else {
            return Err(EvalError::IndexOutOfRange { node: me });
        };
        if reached(context, phase) {
            graph_state.forward(me, child)?;
        }
        Ok(())
    }
}

/// `(finishPhase phase expr)`: the values of `expr`, finishing early once
/// `phase` is reached.
#[derive(Debug, Default)]
pub struct FinishPhase;

impl Call for FinishPhase {
    fn name(&self) -> &str {
        "finishPhase"
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        if validate::n_children(node, reporter, 2) {
            nth_child_is_phase(node, reporter, 0);
        }
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
        let (Some(phase), Some(child)) = (phase_argument(node, 0), node.child(1)) else {
            return Err(EvalError::IndexOutOfRange { node: me });
        };
        let consumed: usize = graph_state.node_state_mut(me).take_state()?;
        let fresh = graph_state
            .eval(child, context)?
            .get(consumed..)
            .unwrap_or_default()
            .to_vec();
        let child_finished = graph_state.is_finished(child);
        let state = graph_state.node_state_mut(me);
        state.set_state(consumed + fresh.len());
        for value in fresh {
            state.add_value(value)?;
        }
        if child_finished || reached(context, phase) {
            state.finish()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn phase(p: u32) -> EvalContext {
        EvalContext::with_phase(Phase(p))
    }

    #[test]
    fn var_aliases_a_growing_field() {
        let mut first = phase(1);
        first.push_field("args", s("a"));
        let mut second = first.clone();
        second.set_phase(Some(Phase(2)));
        second.push_field("args", s("b"));
        let mut third = second.clone();
        third.set_phase(Some(Phase(3)));
        third.complete_field("args");

        // Contexts share the field's storage, so every phase sees "b".
        let results = eval_with(
            "(var 'args')",
            &Environment::new("test"),
            &[first, second, third],
        );
        assert_eq!(results[0], unfinished(vec![s("a"), s("b")]));
        assert_eq!(results[2], finished(vec![s("a"), s("b")]));
    }

    #[test]
    fn var_waits_for_a_missing_field() {
        let mut later = phase(2);
        later.push_field("x", n(1));
        later.complete_field("x");
        let results = eval_with("(var 'x')", &Environment::new("test"), &[phase(1), later]);
        assert_eq!(results[0], unfinished(vec![]));
        assert_eq!(results[1], finished(vec![n(1)]));
    }

    #[test]
    fn var_phases() {
        let mut context = phase(1);
        context.push_field("x", n(1));
        let mut contexts = vec![context];
        for p in 2..=3 {
            let mut next = contexts[0].clone();
            next.set_phase(Some(Phase(p)));
            contexts.push(next);
        }
        let results = eval_with("(var 'x' 2 3)", &Environment::new("test"), &contexts);
        assert_eq!(results[0], unfinished(vec![]));
        assert_eq!(results[1], unfinished(vec![n(1)]));
        assert_eq!(results[2], finished(vec![n(1)]));

        let results = eval_with("(var 'missing' 1 2)", &Environment::new("test"), &[phase(1), phase(2)]);
        assert_eq!(results[1], finished(vec![]));
    }

    #[test]
    fn var_validation() {
        assert!(pipeline_errors("(var 'x')").is_empty());
        assert_eq!(pipeline_errors("(var 1)").len(), 1);
        assert_eq!(pipeline_errors("(var 'x' 1)").len(), 1);
        assert_eq!(pipeline_errors("(var 'x' 1 -2)").len(), 1);
        assert_eq!(pipeline_errors("(var 'x' 'a' 2)").len(), 1);
    }

    #[test]
    fn phaseless_missing_field_is_fatal() {
        let factory = crate::standard_factory();
        let mut graph = predicate_core::MergeGraph::new();
        let node = predicate_core::parse_expression("(var 'nope')", &factory, &mut graph).unwrap();
        let root = graph.add_root(node).unwrap();
        let indexed = predicate_core::IndexedGraph::new(&graph).unwrap();
        let context = EvalContext::new();
        let mut evaluation = predicate_core::Evaluation::new(&indexed, &context).unwrap();
        let err = evaluation.query(root, &context).unwrap_err();
        assert!(matches!(err, EvalError::MissingField { ref name, .. } if name == "nope"));
    }

    fn environment() -> Environment {
        let mut env = Environment::new("test");
        env.register_operator("contains", |argument: &str, input: &Value| {
            match input {
                Value::String(text) => Ok(text.contains(argument).then(|| input.clone())),
                other => Err(format!("contains needs a string, got {other}")),
            }
        });
        env
    }

    #[test]
    fn operator_maps_matches() {
        let mut context = phase(1);
        for word in ["foobar", "baz", "food"] {
            context.push_field("words", s(word));
        }
        context.complete_field("words");
        let results = eval_with(
            "(operator 'contains' 'foo' (var 'words'))",
            &environment(),
            &[context],
        );
        assert_eq!(results[0], finished(vec![s("foobar"), s("food")]));
    }

    #[test]
    fn operator_folds_with_literal_input() {
        let env = environment();
        let results = eval_with("(operator 'contains' 'a' 'abc')", &env, &[phase(1)]);
        assert_eq!(results[0], finished(vec![s("abc")]));
    }

    #[test]
    fn operator_errors_are_fatal() {
        let factory = crate::standard_factory();
        let env = environment();
        let mut graph = predicate_core::MergeGraph::new();
        let node =
            predicate_core::parse_expression("(operator 'contains' 'a' (var 'n'))", &factory, &mut graph)
                .unwrap();
        let root = graph.add_root(node).unwrap();
        let indexed = predicate_core::IndexedGraph::new(&graph).unwrap();
        let mut reporter = predicate_core::Reporter::new();
        indexed.pre_eval(&env, &mut reporter);
        assert!(!reporter.has_errors());

        let mut context = phase(1);
        context.push_field("n", n(3));
        let mut evaluation = predicate_core::Evaluation::new(&indexed, &context).unwrap();
        let err = evaluation.query(root, &context).unwrap_err();
        assert!(matches!(err, EvalError::Host { .. }));
    }

    #[test]
    fn unknown_operator_is_reported() {
        let errors = pipeline_errors("(operator 'missing' 'a' 'b')");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("no operator 'missing'"), "{errors:?}");
    }

    #[test]
    fn wait_phase_forwards_once_reached() {
        let results = eval_phases("(waitPhase 2 (sequence 1 3))", 3);
        assert_eq!(results[0], unfinished(vec![]));
        // The sequence starts in the phase it is first reached.
        assert_eq!(results[1], unfinished(vec![n(1)]));
        assert_eq!(results[2], unfinished(vec![n(1), n(2)]));
    }

    #[test]
    fn finish_phase_cuts_a_sequence_short() {
        let results = eval_phases("(finishPhase 2 (sequence 1))", 3);
        assert_eq!(results[0], unfinished(vec![n(1)]));
        assert_eq!(results[1], finished(vec![n(1), n(2)]));
        assert_eq!(results[2], finished(vec![n(1), n(2)]));

        let early = eval_phases("(finishPhase 5 (sequence 1 1))", 1);
        assert_eq!(early[0], finished(vec![n(1)]));
    }

    #[test]
    fn phase_arguments_are_validated() {
        assert_eq!(pipeline_errors("(waitPhase 'a' 1)").len(), 1);
        assert_eq!(pipeline_errors("(finishPhase -1 1)").len(), 1);
        assert_eq!(pipeline_errors("(waitPhase 1)").len(), 1);
    }
}
