//! Integration tests: parse, merge, run the pipeline, index and evaluate.

use std::sync::Arc;

use predicate_core::functional::{Args, Simple, SimpleFn};
use predicate_core::{
    parse_expression, Call, CallFactory, EvalContext, EvalError, Environment, Evaluation,
    GraphEvalState, IndexedGraph, MergeGraph, NodeRef, Phase, Pipeline, PipelineError,
    QueryResult, Reporter, RootId, Stage, Value,
};

/// Adds 1, 2, 3 in successive calculations, finishing with the third.
struct Count;

impl Call for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        let state = graph_state.node_state_mut(node.index());
        let next = state.values().len() as i64 + 1;
        state.add_value(Value::Number(next))?;
        if next == 3 {
            state.finish()?;
        }
        Ok(())
    }
}

/// `(field 'name')`: aliases a transaction field; empty if it is missing.
struct FieldCall;

impl Call for FieldCall {
    fn name(&self) -> &str {
        "field"
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        context: &EvalContext,
    ) -> Result<(), EvalError> {
        let name = node
            .child_ref(0)
            .and_then(|child| child.literal()?.as_str())
            .unwrap_or_default();
        let state = graph_state.node_state_mut(node.index());
        match context.field(name) {
            Some(field) => {
                if !state.is_aliased() {
                    state.alias(field.values().clone())?;
                }
                if field.is_complete() {
                    state.finish()?;
                }
                Ok(())
            }
            None => state.finish(),
        }
    }
}

/// Sum of the first values of two arguments.
struct Sum;

impl SimpleFn for Sum {
    const DYNAMIC_ARGS: usize = 2;

    fn eval_simple(&self, args: &Args<'_>) -> Option<Value> {
        let a = args.dynamic(0).first()?.as_number()?;
        let b = args.dynamic(1).first()?.as_number()?;
        Some(Value::Number(a + b))
    }
}

fn factory() -> CallFactory {
    let mut factory = CallFactory::new();
    factory
        .add("count", || Arc::new(Count) as Arc<dyn Call>)
        .add("field", || Arc::new(FieldCall) as Arc<dyn Call>)
        .add_functional("sum", || Simple(Sum))
        .add_alias("plus", "sum");
    factory
}

/// Parses every expression as a root and runs the pipeline.
fn configure(texts: &[&str]) -> MergeGraph {
    let factory = factory();
    let mut graph = MergeGraph::new();
    for (i, text) in texts.iter().enumerate() {
        let node = parse_expression(text, &factory, &mut graph).unwrap();
        let root = graph.add_root(node).unwrap();
        graph
            .add_origin(graph.root(root).unwrap(), format!("rule {i}"))
            .unwrap();
    }
    let mut reporter = Reporter::new();
    Pipeline::new(&factory, &Environment::new("test"))
        .run(&mut graph, &mut reporter)
        .unwrap();
    graph
}

fn root_texts(graph: &MergeGraph) -> Vec<String> {
    graph
        .roots()
        .iter()
        .map(|&root| graph.to_s(root).unwrap().to_owned())
        .collect()
}

#[test]
fn merged_roots_share_subexpressions() {
    let graph = configure(&["(sum (count) 1)", "(sum 1 (count))", "(sum (count) 1)"]);
    assert_eq!(
        root_texts(&graph),
        vec!["(sum (count) 1)", "(sum 1 (count))", "(sum (count) 1)"]
    );
    assert_eq!(graph.roots()[0], graph.roots()[2]);

    let shared = graph.find("(count)").unwrap();
    assert_eq!(graph.origins(graph.roots()[0]), vec!["rule 0", "rule 2"]);
    let indexed = IndexedGraph::new(&graph).unwrap();
    // (count), 1 and the two distinct sums.
    assert_eq!(indexed.len(), 4);
    assert_eq!(indexed.num_roots(), 3);
    assert!(graph.is_live(shared));
}

#[test]
fn evaluation_follows_phases() {
    let graph = configure(&["(sum (count) 1)", "(count)"]);
    let indexed = IndexedGraph::new(&graph).unwrap();
    let mut reporter = Reporter::new();
    indexed.pre_eval(&Environment::new("test"), &mut reporter);
    assert!(!reporter.has_errors());

    let first = EvalContext::with_phase(Phase(1));
    let mut evaluation = Evaluation::new(&indexed, &first).unwrap();
    let results: Vec<Vec<QueryResult>> = (1..=3)
        .map(|p| {
            evaluation
                .query_all(&EvalContext::with_phase(Phase(p)))
                .unwrap()
        })
        .collect();

    assert!(!results[0][0].finished);
    assert!(results[0][0].values.is_empty());
    assert_eq!(results[1][1].values, vec![Value::Number(1), Value::Number(2)]);
    // The shared (count) advanced once per phase for both roots.
    assert_eq!(results[2][0].values, vec![Value::Number(2)]);
    assert!(results[2][0].finished);
    assert!(results[2][1].finished);
}

#[test]
fn repeated_queries_in_a_phase_do_not_recalculate() {
    let graph = configure(&["(count)"]);
    let indexed = IndexedGraph::new(&graph).unwrap();
    let phase = EvalContext::with_phase(Phase(1));
    let mut evaluation = Evaluation::new(&indexed, &phase).unwrap();
    let once = evaluation.query(RootId(0), &phase).unwrap();
    let twice = evaluation.query(RootId(0), &phase).unwrap();
    assert_eq!(once, twice);
    assert_eq!(twice.values, vec![Value::Number(1)]);

    // Phaseless queries recalculate every time.
    let phaseless = EvalContext::new();
    let result = evaluation.query(RootId(0), &phaseless).unwrap();
    assert_eq!(result.values.len(), 2);
}

#[test]
fn folding_and_aliases_retarget_roots() {
    let factory = factory();
    let mut graph = MergeGraph::new();
    let folded = parse_expression("(sum 1 2)", &factory, &mut graph).unwrap();
    graph.add_root(folded).unwrap();
    let aliased = parse_expression("(plus (count) 4)", &factory, &mut graph).unwrap();
    let alias_root = graph.add_root(aliased).unwrap();

    let mut reporter = Reporter::new();
    let summary = Pipeline::new(&factory, &Environment::new("test"))
        .run(&mut graph, &mut reporter)
        .unwrap();
    assert!(summary.sweeps >= 2);

    assert_eq!(root_texts(&graph), vec!["3", "(sum (count) 4)"]);
    let replacement = graph.find_transform(folded).unwrap().unwrap();
    assert_eq!(graph.to_s(replacement).unwrap(), "3");
    assert_eq!(graph.to_s(graph.root(alias_root).unwrap()).unwrap(), "(sum (count) 4)");

    let mut report = String::new();
    assert!(graph.write_validation_report(&mut report).unwrap(), "{report}");
}

#[test]
fn diagnostics_stop_the_pipeline() {
    let factory = factory();
    let mut graph = MergeGraph::new();
    let node = parse_expression("(sum 1)", &factory, &mut graph).unwrap();
    graph.add_root(node).unwrap();

    let mut reporter = Reporter::new();
    let err = Pipeline::new(&factory, &Environment::new("test"))
        .run(&mut graph, &mut reporter)
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Diagnostics {
            stage: Stage::PreValidate,
            errors: 1
        }
    ));
    assert_eq!(
        reporter.diagnostics()[0].message,
        "expected 2 children but have 1"
    );
}

#[test]
fn parse_errors_carry_a_position() {
    let factory = factory();
    let mut graph = MergeGraph::new();
    let err = parse_expression("(sum 1 (count)", &factory, &mut graph).unwrap_err();
    assert!(err.position() > 0);
    assert!(parse_expression("(nope)", &factory, &mut graph).is_err());
}

#[test]
fn concurrent_transactions_are_isolated() {
    let graph = configure(&["(sum (field 'a') (field 'b'))"]);
    let indexed = IndexedGraph::new(&graph).unwrap();

    let results: Vec<(i64, QueryResult)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8_i64)
            .map(|i| {
                let indexed = &indexed;
                scope.spawn(move || {
                    let mut context = EvalContext::with_phase(Phase(1));
                    context.push_field("a", Value::Number(i));
                    context.push_field("b", Value::Number(10 * i));
                    context.complete_field("a");
                    context.complete_field("b");
                    let mut evaluation = Evaluation::new(indexed, &context).unwrap();
                    (i, evaluation.query(RootId(0), &context).unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, result) in results {
        assert!(result.finished);
        assert_eq!(result.values, vec![Value::Number(11 * i)]);
    }
}

#[test]
fn fields_grow_across_phases() {
    let graph = configure(&["(field 'args')"]);
    let indexed = IndexedGraph::new(&graph).unwrap();

    let mut context = EvalContext::with_phase(Phase(1));
    context.push_field("args", Value::from("x"));
    let mut evaluation = Evaluation::new(&indexed, &context).unwrap();
    let first = evaluation.query(RootId(0), &context).unwrap();
    assert_eq!(first.values, vec![Value::from("x")]);
    assert!(!first.finished);

    context.set_phase(Some(Phase(2)));
    context.push_field("args", Value::from("y"));
    context.complete_field("args");
    let second = evaluation.query(RootId(0), &context).unwrap();
    assert_eq!(second.values, vec![Value::from("x"), Value::from("y")]);
    assert!(second.finished);
}
