//! Boolean calls.
//!
//! Truth follows the evaluation convention: a finished node with values is
//! true, a finished node without values is false. `true` produces a single
//! empty string.
//!
//! `and` and `or` evaluate every child on every call, keeping shared
//! children warm, and order their children canonically. `andSC` and `orSC`
//! stop at the first child that has not yet decided and keep their written
//! order.

use predicate_core::functional::Constant;
use predicate_core::validate;
use predicate_core::{
    Abelian, Call, CallFactory, CoreError, EvalContext, EvalError, Environment, GraphEvalState,
    Literal, MergeGraph, NodeId, NodeRef, NodeReporter, NodeView,
};

use crate::helpers::{classify_children, literal_for, rebuild, replace_with_literal, true_literal};

pub fn load(factory: &mut CallFactory) {
    factory
        .add_functional("true", || Constant(true_literal()))
        .add_functional("false", || Constant(Literal::Null))
        .add_call::<And>()
        .add_call::<Or>()
        .add_call::<AndSC>()
        .add_call::<OrSC>()
        .add_call::<Not>()
        .add_call::<If>();
}

// ---------------------------------------------------------------------------
// Junctions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Junction {
    And,
    Or,
}

impl Junction {
    /// Whether a child of this truth decides the whole junction.
    fn decided_by(self, truthy: bool) -> bool {
        match self {
            Junction::And => !truthy,
            Junction::Or => truthy,
        }
    }

    /// Result once decided by a child.
    fn decided(self) -> bool {
        self == Junction::Or
    }

    /// Result when no child decides.
    fn undecided(self) -> bool {
        self == Junction::And
    }
}

/// Drops literal children that cannot decide `me` and replaces `me`
/// outright when a literal child decides it or at most one child remains.
fn eliminate_literals(
    me: NodeId,
    graph: &mut MergeGraph,
    factory: &CallFactory,
    name: &str,
    junction: Junction,
) -> Result<bool, CoreError> {
    let children = classify_children(graph, me)?;
    let mut dynamic = Vec::with_capacity(children.len());
    for (child, literal) in &children {
        match literal {
            Some(literal) if junction.decided_by(!literal.is_null()) => {
                return replace_with_literal(graph, me, literal_for(junction.decided()));
            }
            Some(_) => {}
            None => dynamic.push(*child),
        }
    }
    match dynamic.as_slice() {
        [] => replace_with_literal(graph, me, literal_for(junction.undecided())),
        [only] => {
            graph.replace(me, *only)?;
            Ok(true)
        }
        _ if dynamic.len() != children.len() => rebuild(graph, factory, me, name, &dynamic),
        _ => Ok(false),
    }
}

fn eval_junction(
    junction: Junction,
    short_circuit: bool,
    node: NodeRef<'_>,
    graph_state: &mut GraphEvalState<'_>,
    context: &EvalContext,
) -> Result<(), EvalError> {
    let me = node.index();
    let mut all_finished = true;
    for &child in node.children() {
        let truthy = !graph_state.eval(child, context)?.is_empty();
        let finished = graph_state.is_finished(child);
        // Truth is only final for a finished child, except that any value
        // at all already makes a child true.
        if (truthy || finished) && junction.decided_by(truthy) {
            let state = graph_state.node_state_mut(me);
            return if junction.decided() {
                state.finish_true()
            } else {
                state.finish_false()
            };
        }
        if !finished {
            all_finished = false;
            if short_circuit {
                return Ok(());
            }
        }
    }
    if !all_finished {
        return Ok(());
    }
    let state = graph_state.node_state_mut(me);
    if junction.undecided() {
        state.finish_true()
    } else {
        state.finish_false()
    }
}

macro_rules! junction_call {
    ($ty:ident, $name:literal, $junction:expr, abelian) => {
        #[derive(Debug, Default)]
        pub struct $ty {
            order: Abelian,
        }

        impl Call for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
                validate::n_or_more_children(node, reporter, 2);
            }

            fn transform(
                &self,
                me: NodeId,
                graph: &mut MergeGraph,
                factory: &CallFactory,
                _environment: &Environment,
                _reporter: &mut NodeReporter<'_>,
            ) -> Result<bool, CoreError> {
                if eliminate_literals(me, graph, factory, $name, $junction)? {
                    return Ok(true);
                }
                self.order.transform(me, graph, factory)
            }

            fn eval_calculate(
                &self,
                node: NodeRef<'_>,
                graph_state: &mut GraphEvalState<'_>,
                context: &EvalContext,
            ) -> Result<(), EvalError> {
                eval_junction($junction, false, node, graph_state, context)
            }
        }
    };
    ($ty:ident, $name:literal, $junction:expr, short_circuit) => {
        #[derive(Debug, Default)]
        pub struct $ty;

        impl Call for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
                validate::n_or_more_children(node, reporter, 2);
            }

            fn transform(
                &self,
                me: NodeId,
                graph: &mut MergeGraph,
                factory: &CallFactory,
                _environment: &Environment,
                _reporter: &mut NodeReporter<'_>,
            ) -> Result<bool, CoreError> {
                eliminate_literals(me, graph, factory, $name, $junction)
            }

            fn eval_calculate(
                &self,
                node: NodeRef<'_>,
                graph_state: &mut GraphEvalState<'_>,
                context: &EvalContext,
            ) -> Result<(), EvalError> {
                eval_junction($junction, true, node, graph_state, context)
            }
        }
    };
}

junction_call!(And, "and", Junction::And, abelian);
junction_call!(Or, "or", Junction::Or, abelian);
junction_call!(AndSC, "andSC", Junction::And, short_circuit);
junction_call!(OrSC, "orSC", Junction::Or, short_circuit);

// ---------------------------------------------------------------------------
// not, if
// ---------------------------------------------------------------------------

/// `(not x)`: true once `x` finishes false, false as soon as `x` has a value.
#[derive(Debug, Default)]
pub struct Not;

impl Call for Not {
    fn name(&self) -> &str {
        "not"
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
        match classify_children(graph, me)?.as_slice() {
            [(_, Some(literal))] => {
                let negated = literal_for(literal.is_null());
                replace_with_literal(graph, me, negated)
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
        let Some(child) = node.child(0) else {
            return Err(EvalError::IndexOutOfRange { node: node.index() });
        };
        let truthy = !graph_state.eval(child, context)?.is_empty();
        let finished = graph_state.is_finished(child);
        let state = graph_state.node_state_mut(node.index());
        if truthy {
            state.finish_false()
        } else if finished {
            state.finish_true()
        } else {
            Ok(())
        }
    }
}

/// `(if pred then else)`: forwards to `then` or `else` once `pred` decides.
#[derive(Debug, Default)]
pub struct If;

impl Call for If {
    fn name(&self) -> &str {
        "if"
    }

    fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
        validate::n_children(node, reporter, 3);
    }

    fn transform(
        &self,
        me: NodeId,
        graph: &mut MergeGraph,
        _factory: &CallFactory,
        _environment: &Environment,
        _reporter: &mut NodeReporter<'_>,
    ) -> Result<bool, CoreError> {
        match classify_children(graph, me)?.as_slice() {
            [(_, Some(pred)), (then, _), (otherwise, _)] => {
                let chosen = if pred.is_null() { *otherwise } else { *then };
                graph.replace(me, chosen)?;
                Ok(true)
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
        let (Some(pred), Some(then), Some(otherwise)) = (node.child(0), node.child(1), node.child(2))
        else {
            return Err(EvalError::IndexOutOfRange { node: node.index() });
        };
        let truthy = !graph_state.eval(pred, context)?.is_empty();
        if truthy {
            graph_state.forward(node.index(), then)
        } else if graph_state.is_finished(pred) {
            graph_state.forward(node.index(), otherwise)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use predicate_core::{parse_expression, MergeGraph, Pipeline, Reporter};

    #[test]
    fn constants_fold() {
        assert_eq!(transformed("(true)"), "''");
        assert_eq!(transformed("(false)"), "null");
    }

    #[test]
    fn and_of_constants_folds() {
        assert_eq!(transformed("(and (true) (true))"), "''");
        assert_eq!(transformed("(and (true) (false))"), "null");
        assert_eq!(transformed("(or (false) (false))"), "null");
        assert_eq!(transformed("(or (false) 'x')"), "''");
    }

    #[test]
    fn literal_children_are_eliminated() {
        assert_eq!(transformed("(and (sequence 1) 'x')"), "(sequence 1)");
        assert_eq!(
            transformed("(or (sequence 2) null (sequence 1))"),
            "(or (sequence 1) (sequence 2))"
        );
        assert_eq!(transformed("(andSC (sequence 1) null)"), "null");
        assert_eq!(
            transformed("(orSC (sequence 2) null (sequence 1))"),
            "(orSC (sequence 2) (sequence 1))"
        );
    }

    #[test]
    fn argument_order_does_not_matter_for_or() {
        let factory = crate::standard_factory();
        let env = Environment::new("test");
        let mut graph = MergeGraph::new();
        for text in ["(or (sequence 1 3) (var 'a'))", "(or (var 'a') (sequence 1 3))"] {
            let node = parse_expression(text, &factory, &mut graph).unwrap();
            graph.add_root(node).unwrap();
        }
        let mut reporter = Reporter::new();
        Pipeline::new(&factory, &env)
            .run(&mut graph, &mut reporter)
            .unwrap();
        assert_eq!(graph.roots()[0], graph.roots()[1]);
    }

    #[test]
    fn arity_is_checked() {
        assert_eq!(
            pipeline_errors("(and 'a')"),
            vec!["expected at least 2 children but have 1".to_owned()]
        );
        assert_eq!(
            pipeline_errors("(not 1 2)"),
            vec!["expected 1 child but have 2".to_owned()]
        );
    }

    #[test]
    fn or_waits_for_a_decision() {
        let results = eval_phases("(or (not (sequence 1 2)) (sequence 5 6))", 2);
        assert_eq!(results[0], finished(vec![truthy()]));
    }

    #[test]
    fn and_finishes_false_on_a_false_child() {
        let results = eval_phases("(and (sequence 1 2) (not (sequence 1 1)))", 2);
        assert_eq!(results[0], finished(vec![]));
    }

    #[test]
    fn and_finishes_true_when_everything_finished_true() {
        let results = eval_phases("(and (sequence 1 2) (sequence 4 4))", 2);
        assert_eq!(results[0], unfinished(vec![]));
        assert_eq!(results[1], finished(vec![truthy()]));
    }

    #[test]
    fn short_circuit_leaves_later_children_alone() {
        let results = eval_phases("(andSC (sequence 1 2) (sequence 7 8))", 3);
        assert_eq!(results[0], unfinished(vec![]));
        // The second child only starts in phase 2.
        assert_eq!(results[1], unfinished(vec![]));
        assert_eq!(results[2], finished(vec![truthy()]));
    }

    #[test]
    fn not_and_if() {
        assert_eq!(transformed("(not null)"), "''");
        assert_eq!(transformed("(not 3)"), "null");
        assert_eq!(transformed("(if 'y' (sequence 1) (sequence 2))"), "(sequence 1)");
        assert_eq!(transformed("(if null (sequence 1) (sequence 2))"), "(sequence 2)");

        assert_eq!(eval("(not (sequence 1 1))"), finished(vec![]));
        assert_eq!(
            eval("(if (sequence 1 1) (sequence 10 11) 'no')"),
            unfinished(vec![n(10)])
        );
        let results = eval_phases("(if (not (sequence 1 1)) 'yes' (sequence 3 4))", 2);
        assert_eq!(results[0], unfinished(vec![n(3)]));
        assert_eq!(results[1], finished(vec![n(3), n(4)]));
    }
}
