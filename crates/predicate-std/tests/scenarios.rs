//! End-to-end scenarios over the standard library.

use std::sync::Arc;

use predicate_core::{
    parse_expression, CallFactory, EvalContext, Environment, Evaluation, IndexedGraph, MergeGraph,
    Phase, Pipeline, QueryResult, Reporter, RootId, Value,
};
use predicate_std::standard_factory;
use predicate_std::template::define_template;
use proptest::prelude::*;

fn build(texts: &[&str], env: &Environment) -> MergeGraph {
    build_with(&standard_factory(), texts, env)
}

fn build_with(factory: &CallFactory, texts: &[&str], env: &Environment) -> MergeGraph {
    let mut graph = MergeGraph::new();
    for text in texts {
        let node = parse_expression(text, factory, &mut graph).unwrap();
        graph.add_root(node).unwrap();
    }
    let mut reporter = Reporter::new();
    Pipeline::new(factory, env)
        .run(&mut graph, &mut reporter)
        .unwrap();
    graph
}

fn evaluate(graph: &MergeGraph, env: &Environment, contexts: &[EvalContext]) -> Vec<QueryResult> {
    let indexed = IndexedGraph::new(graph).unwrap();
    let mut reporter = Reporter::new();
    indexed.pre_eval(env, &mut reporter);
    assert!(!reporter.has_errors(), "{:?}", reporter.diagnostics());
    let mut evaluation = Evaluation::new(&indexed, &contexts[0]).unwrap();
    contexts
        .iter()
        .map(|context| evaluation.query(RootId(0), context).unwrap())
        .collect()
}

fn root_text(graph: &MergeGraph, root: usize) -> String {
    graph.to_s(graph.roots()[root]).unwrap().to_owned()
}

fn phases(n: u32) -> Vec<EvalContext> {
    (1..=n).map(|p| EvalContext::with_phase(Phase(p))).collect()
}

#[test]
fn boolean_constants_fold() {
    let env = Environment::new("test");
    let graph = build(&["(and (true) (true))", "(and (true) (false))"], &env);
    assert_eq!(root_text(&graph, 0), "''");
    assert_eq!(root_text(&graph, 1), "null");
}

#[test]
fn or_is_order_independent() {
    let env = Environment::new("test");
    let graph = build(
        &[
            "(or (sequence 1 3) (var 'x'))",
            "(or (var 'x') (sequence 1 3))",
        ],
        &env,
    );
    assert_eq!(graph.roots()[0], graph.roots()[1]);
    assert_eq!(root_text(&graph, 0), root_text(&graph, 1));
}

#[test]
fn the_same_text_merges_to_one_node() {
    let env = Environment::new("test");
    let graph = build(&["(add 1 (var 'n'))", "(add 1 (var 'n'))"], &env);
    assert_eq!(graph.roots().len(), 2);
    assert_eq!(graph.roots()[0], graph.roots()[1]);
}

#[test]
fn finished_values_never_change() {
    let env = Environment::new("test");
    let graph = build(&["(cat (sequence 1 2) (sequence 3 3))"], &env);
    let results = evaluate(&graph, &env, &phases(6));
    let done = results.iter().position(|r| r.finished).unwrap();
    // The second sequence finishes in the same calculation cat reaches it.
    assert_eq!(done, 1);
    for result in &results[done..] {
        assert_eq!(result, &results[done]);
    }
    for pair in results.windows(2) {
        assert!(pair[1].values.starts_with(&pair[0].values));
    }
}

#[test]
fn an_incomplete_field_never_finishes() {
    let env = Environment::new("test");
    let graph = build(&["(var 'x')"], &env);
    let mut contexts = phases(5);
    for context in &mut contexts {
        context.push_field("x", Value::Number(1));
    }
    for result in evaluate(&graph, &env, &contexts) {
        assert!(!result.finished);
    }
}

#[test]
fn rules_over_a_transaction() {
    let mut env = Environment::new("mail");
    env.register_operator("suffix", |suffix: &str, value: &Value| {
        Ok::<_, String>(
            value
                .as_str()
                .filter(|s| s.ends_with(suffix))
                .map(Value::from),
        )
    });
    let graph = build(
        &[
            "(and (operator 'suffix' '.org' (var 'to' 1 2)) (gt 3 (var 'size' 1 1)))",
        ],
        &env,
    );

    let mut first = EvalContext::with_phase(Phase(1));
    first.push_field("to", Value::from("a@example.com"));
    first.push_field("size", Value::Number(10));
    first.complete_field("size");
    let mut second = first.clone();
    second.set_phase(Some(Phase(2)));
    second.push_field("to", Value::from("b@example.org"));

    let results = evaluate(&graph, &env, &[first, second]);
    assert!(!results[0].finished);
    assert!(results[1].finished);
    assert_eq!(results[1].values, vec![Value::String(String::new())]);
}

#[test]
fn transactions_share_one_graph() {
    let env = Environment::new("test");
    let graph = build(&["(max (list (var 'a') (mult 2 (var 'b'))))"], &env);
    let indexed = Arc::new(IndexedGraph::new(&graph).unwrap());

    let handles: Vec<_> = (1..=4_i64)
        .map(|i| {
            let indexed = Arc::clone(&indexed);
            std::thread::spawn(move || {
                let mut context = EvalContext::with_phase(Phase(1));
                context.push_field("a", Value::Number(i * 3));
                context.push_field("b", Value::Number(i));
                context.complete_field("a");
                context.complete_field("b");
                let mut evaluation = Evaluation::new(&indexed, &context).unwrap();
                (i, evaluation.query(RootId(0), &context).unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.join().unwrap();
        assert!(result.finished);
        assert_eq!(result.values, vec![Value::Number(i * 3)]);
    }
}

// ---------------------------------------------------------------------------
// Constant folding
// ---------------------------------------------------------------------------

#[test]
fn template_uses_merge_with_the_written_out_rule() {
    let env = Environment::new("test");
    let mut factory = standard_factory();
    define_template(
        &mut factory,
        "oversized",
        &["field", "limit"],
        "(and (isFinished (var (ref 'field'))) (gt (ref 'limit') (var (ref 'field'))))",
    )
    .unwrap();
    let graph = build_with(
        &factory,
        &[
            "(oversized 'size' 100)",
            "(and (gt 100 (var 'size')) (isFinished (var 'size')))",
            "(oversized 'size' 100)",
        ],
        &env,
    );
    assert_eq!(graph.roots()[0], graph.roots()[1]);
    assert_eq!(graph.roots()[0], graph.roots()[2]);
    assert!(graph.origins(graph.roots()[0]).contains(&"template oversized"));

    let mut context = EvalContext::with_phase(Phase(1));
    context.push_field("size", Value::Number(250));
    context.complete_field("size");
    let results = evaluate(&graph, &env, &[context]);
    assert!(results[0].finished);
    assert_eq!(results[0].values, vec![Value::String(String::new())]);
}

#[test]
fn named_values_select_headers() {
    let env = Environment::new("test");
    let graph = build(
        &["(cat (namedi 'content-type' (var 'headers')) (focus 'charset' (var 'params')))"],
        &env,
    );
    let mut context = EvalContext::with_phase(Phase(1));
    context.push_field("headers", Value::named("Host", Value::from("example.org")));
    context.push_field("headers", Value::named("Content-Type", Value::from("text/html")));
    context.push_field(
        "params",
        Value::named(
            "ct",
            Value::List(vec![
                Value::named("charset", Value::from("utf-8")),
                Value::named("q", Value::Float(0.5)),
            ]),
        ),
    );
    context.complete_field("headers");
    context.complete_field("params");

    let results = evaluate(&graph, &env, &[context]);
    let shown: Vec<String> = results[0].values.iter().map(Value::to_string).collect();
    assert_eq!(shown, ["Content-Type:'text/html'", "ct:'utf-8'"]);
    assert!(results[0].finished);
}

fn leaf() -> impl Strategy<Value = String> {
    prop_oneof![
        (-20_i64..20).prop_map(|n| n.to_string()),
        prop::sample::select(vec!["'a'", "'b'"]).prop_map(str::to_owned),
    ]
}

fn integer() -> impl Strategy<Value = String> {
    (-20_i64..20).prop_map(|n| n.to_string())
}

fn expression() -> impl Strategy<Value = String> {
    leaf().prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (integer(), inner.clone()).prop_map(|(n, x)| format!("(add {n} {x})")),
            (integer(), inner.clone()).prop_map(|(n, x)| format!("(mult {n} {x})")),
            inner.clone().prop_map(|x| format!("(neg {x})")),
            inner.clone().prop_map(|x| format!("(max {x})")),
            inner.clone().prop_map(|x| format!("(first {x})")),
            (leaf(), inner.clone()).prop_map(|(v, x)| format!("(eq {v} {x})")),
            (integer(), inner.clone()).prop_map(|(v, x)| format!("(lt {v} {x})")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("(list {a} {b})")),
            (inner.clone(), inner).prop_map(|(a, b)| format!("(cat {a} {b})")),
        ]
    })
}

fn untransformed(text: &str, env: &Environment) -> QueryResult {
    let factory = standard_factory();
    let mut graph = MergeGraph::new();
    let node = parse_expression(text, &factory, &mut graph).unwrap();
    graph.add_root(node).unwrap();
    evaluate(&graph, env, &phases(1)).remove(0)
}

proptest! {
    #[test]
    fn folding_preserves_values(text in expression()) {
        let env = Environment::new("test");
        let direct = untransformed(&text, &env);
        let graph = build(&[text.as_str()], &env);
        let folded = evaluate(&graph, &env, &phases(1)).remove(0);
        prop_assert!(direct.finished);
        prop_assert_eq!(&direct, &folded);
    }
}
