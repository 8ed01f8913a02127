//! Fixtures for unit tests: run expressions through the whole pipeline.

use predicate_core::{
    parse_expression, EvalContext, Environment, Evaluation, IndexedGraph, MergeGraph, Phase,
    Pipeline, QueryResult, Reporter, RootId, Value,
};

use crate::standard_factory;

/// Parses `text`, runs the pipeline and returns the transformed root text.
pub(crate) fn transformed(text: &str) -> String {
    let (graph, _) = configure(text, &Environment::new("test"));
    graph.to_s(graph.roots()[0]).unwrap().to_owned()
}

/// Diagnostics the pipeline reports for `text`, or none if it succeeds.
pub(crate) fn pipeline_errors(text: &str) -> Vec<String> {
    let factory = standard_factory();
    let env = Environment::new("test");
    let mut graph = MergeGraph::new();
    let node = parse_expression(text, &factory, &mut graph).unwrap();
    graph.add_root(node).unwrap();
    let mut reporter = Reporter::new();
    match Pipeline::new(&factory, &env).run(&mut graph, &mut reporter) {
        Ok(_) => Vec::new(),
        Err(_) => reporter
            .diagnostics()
            .iter()
            .map(|d| d.message.clone())
            .collect(),
    }
}

fn configure(text: &str, env: &Environment) -> (MergeGraph, Reporter) {
    let factory = standard_factory();
    let mut graph = MergeGraph::new();
    let node = parse_expression(text, &factory, &mut graph).unwrap();
    graph.add_root(node).unwrap();
    let mut reporter = Reporter::new();
    Pipeline::new(&factory, env)
        .run(&mut graph, &mut reporter)
        .unwrap();
    (graph, reporter)
}

/// Runs `text` through the pipeline, then evaluates it once per context.
pub(crate) fn eval_with(text: &str, env: &Environment, contexts: &[EvalContext]) -> Vec<QueryResult> {
    let (graph, mut reporter) = configure(text, env);
    evaluate(&graph, env, &mut reporter, contexts)
}

/// Evaluates `text` without transforming it first.
pub(crate) fn eval_untransformed(text: &str, contexts: &[EvalContext]) -> Vec<QueryResult> {
    let factory = standard_factory();
    let env = Environment::new("test");
    let mut graph = MergeGraph::new();
    let node = parse_expression(text, &factory, &mut graph).unwrap();
    graph.add_root(node).unwrap();
    evaluate(&graph, &env, &mut Reporter::new(), contexts)
}

fn evaluate(
    graph: &MergeGraph,
    env: &Environment,
    reporter: &mut Reporter,
    contexts: &[EvalContext],
) -> Vec<QueryResult> {
    let indexed = IndexedGraph::new(graph).unwrap();
    indexed.pre_eval(env, reporter);
    assert!(!reporter.has_errors(), "{:?}", reporter.diagnostics());
    let mut evaluation = Evaluation::new(&indexed, &contexts[0]).unwrap();
    contexts
        .iter()
        .map(|ctx| evaluation.query(RootId(0), ctx).unwrap())
        .collect()
}

/// Evaluates `text` in a single phase with no fields.
pub(crate) fn eval(text: &str) -> QueryResult {
    eval_with(text, &Environment::new("test"), &[EvalContext::with_phase(Phase(1))]).remove(0)
}

/// Evaluates `text` in phases `1..=n` with no fields.
pub(crate) fn eval_phases(text: &str, n: u32) -> Vec<QueryResult> {
    let contexts: Vec<EvalContext> = (1..=n).map(|p| EvalContext::with_phase(Phase(p))).collect();
    eval_with(text, &Environment::new("test"), &contexts)
}

pub(crate) fn finished(values: Vec<Value>) -> QueryResult {
    QueryResult {
        values,
        finished: true,
    }
}

pub(crate) fn unfinished(values: Vec<Value>) -> QueryResult {
    QueryResult {
        values,
        finished: false,
    }
}

pub(crate) fn n(value: i64) -> Value {
    Value::Number(value)
}

pub(crate) fn s(value: &str) -> Value {
    Value::from(value)
}

pub(crate) fn truthy() -> Value {
    Value::String(String::new())
}
