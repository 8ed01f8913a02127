//! The configuration-time pipeline: validate, transform to a fixpoint,
//! validate again.
//!
//! ```text
//! pre-validate   pre_transform on every live node, bottom-up
//! transform      sweep every live node's transform until a sweep changes nothing
//! post-validate  post_transform on every live node, bottom-up
//! ```
//!
//! Any error reported in a stage aborts the pipeline at the end of that
//! stage (for the transform stage, at the end of the sweep that reported
//! it). A transform loop that has not converged after
//! [`PipelineConfig::max_transform_iterations`] sweeps is a fatal
//! [`CoreError::TransformDidNotConverge`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::call::NodeKind;
use crate::error::CoreError;
use crate::eval::Environment;
use crate::factory::CallFactory;
use crate::merge_graph::MergeGraph;
use crate::reporter::Reporter;

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cap on transform sweeps. Default: 1000.
    pub max_transform_iterations: usize,
    /// Log the merge graph's debug report before and after transformation.
    pub debug_report: bool,
    /// Run the merge graph's self-validation after transformation.
    pub validate_structure: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_transform_iterations: 1000,
            debug_report: false,
            validate_structure: true,
        }
    }
}

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreValidate,
    Transform,
    PostValidate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::PreValidate => "pre-validation",
            Stage::Transform => "transformation",
            Stage::PostValidate => "post-validation",
        })
    }
}

/// Why the pipeline stopped.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage reported errors; see the reporter for details.
    #[error("{stage} reported {errors} error(s)")]
    Diagnostics { stage: Stage, errors: usize },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// What a successful run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Transform sweeps run, including the final one that changed nothing.
    pub sweeps: usize,
    /// Live nodes once done.
    pub nodes: usize,
}

/// Runs `pre_transform` (or `post_transform`) on every live node, children
/// before parents.
pub fn validate_graph(graph: &MergeGraph, stage: Stage, reporter: &mut Reporter) -> Result<(), CoreError> {
    for id in graph.dag().post_order(graph.roots().iter().copied()) {
        let view = graph.view(id)?;
        let NodeKind::Call(call) = view.kind() else {
            continue;
        };
        let mut node_reporter = reporter.for_node(id, view.to_s());
        match stage {
            Stage::PreValidate => call.pre_transform(view, &mut node_reporter),
            Stage::PostValidate => call.post_transform(view, &mut node_reporter),
            Stage::Transform => {}
        }
    }
    Ok(())
}

/// One transform sweep over the live nodes, children before parents.
/// Returns `true` if any transform changed the graph.
pub fn transform_graph(
    graph: &mut MergeGraph,
    factory: &CallFactory,
    environment: &Environment,
    reporter: &mut Reporter,
) -> Result<bool, CoreError> {
    let mut changed = false;
    let order = graph.dag().post_order(graph.roots().iter().copied());
    for id in order {
        // An earlier transform in this sweep may have released it.
        if !graph.is_live(id) {
            continue;
        }
        let (call, text) = {
            let view = graph.view(id)?;
            match view.kind() {
                NodeKind::Call(call) => (call.clone(), view.to_s().to_owned()),
                NodeKind::Literal(_) => continue,
            }
        };
        let mut node_reporter = reporter.for_node(id, text);
        if call.transform(id, graph, factory, environment, &mut node_reporter)? {
            changed = true;
        }
    }
    Ok(changed)
}

/// Validation and transformation with fixed collaborators.
#[derive(Debug)]
pub struct Pipeline<'a> {
    factory: &'a CallFactory,
    environment: &'a Environment,
    config: PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(factory: &'a CallFactory, environment: &'a Environment) -> Self {
        Pipeline {
            factory,
            environment,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs all three stages on `graph`.
    pub fn run(&self, graph: &mut MergeGraph, reporter: &mut Reporter) -> Result<PipelineSummary, PipelineError> {
        tracing::debug!(nodes = graph.len(), roots = graph.roots().len(), "pipeline started");

        validate_graph(graph, Stage::PreValidate, reporter)?;
        check(Stage::PreValidate, reporter)?;

        self.log_debug_report(graph, "before transformation");
        let sweeps = self.transform(graph, reporter)?;
        self.log_debug_report(graph, "after transformation");

        if self.config.validate_structure {
            let mut report = String::new();
            let consistent = graph
                .write_validation_report(&mut report)
                .map_err(|err| CoreError::GraphInconsistency {
                    reason: err.to_string(),
                })?;
            if !consistent {
                return Err(CoreError::GraphInconsistency { reason: report }.into());
            }
        }

        validate_graph(graph, Stage::PostValidate, reporter)?;
        check(Stage::PostValidate, reporter)?;

        let summary = PipelineSummary {
            sweeps,
            nodes: graph.len(),
        };
        tracing::info!(
            sweeps = summary.sweeps,
            nodes = summary.nodes,
            warnings = reporter.num_warnings(),
            "pipeline finished"
        );
        Ok(summary)
    }

    fn transform(&self, graph: &mut MergeGraph, reporter: &mut Reporter) -> Result<usize, PipelineError> {
        let limit = self.config.max_transform_iterations;
        for sweep in 1..=limit {
            let errors_before = reporter.num_errors();
            let changed = transform_graph(graph, self.factory, self.environment, reporter)?;
            tracing::debug!(sweep, changed, nodes = graph.len(), "transform sweep");
            if reporter.num_errors() > errors_before {
                return Err(PipelineError::Diagnostics {
                    stage: Stage::Transform,
                    errors: reporter.num_errors() - errors_before,
                });
            }
            if !changed {
                return Ok(sweep);
            }
        }
        tracing::warn!(limit, "transformation did not converge");
        Err(CoreError::TransformDidNotConverge { iterations: limit }.into())
    }

    fn log_debug_report(&self, graph: &MergeGraph, when: &str) {
        if !self.config.debug_report {
            return;
        }
        let mut report = String::new();
        if graph.write_debug_report(&mut report).is_ok() {
            tracing::debug!(when, "merge graph:\n{report}");
        }
    }
}

fn check(stage: Stage, reporter: &Reporter) -> Result<(), PipelineError> {
    match reporter.num_errors() {
        0 => Ok(()),
        errors => {
            tracing::debug!(%stage, errors, "stage failed");
            Err(PipelineError::Diagnostics { stage, errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::Call;
    use crate::dag::NodeView;
    use crate::eval::{EvalContext, EvalError, GraphEvalState};
    use crate::id::NodeId;
    use crate::indexed::NodeRef;
    use crate::literal::Literal;
    use crate::parse::parse_expression;
    use crate::reporter::NodeReporter;
    use std::sync::Arc;

    /// `(unwrap x)` rewrites itself to `x`.
    #[derive(Default)]
    struct Unwrap;

    impl Call for Unwrap {
        fn name(&self) -> &str {
            "unwrap"
        }

        fn pre_transform(&self, node: NodeView<'_>, reporter: &mut NodeReporter<'_>) {
            crate::validate::n_children(node, reporter, 1);
        }

        fn transform(
            &self,
            me: NodeId,
            graph: &mut MergeGraph,
            _factory: &CallFactory,
            _environment: &Environment,
            _reporter: &mut NodeReporter<'_>,
        ) -> Result<bool, CoreError> {
            let child = graph.children(me)?[0];
            graph.replace(me, child)?;
            Ok(true)
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

    /// Wraps itself in another `spin` forever.
    struct Spin;

    impl Call for Spin {
        fn name(&self) -> &str {
            "spin"
        }

        fn transform(
            &self,
            me: NodeId,
            graph: &mut MergeGraph,
            _factory: &CallFactory,
            _environment: &Environment,
            _reporter: &mut NodeReporter<'_>,
        ) -> Result<bool, CoreError> {
            let depth = graph.children(me)?.len() as i64;
            let literal = graph.add_literal(Literal::Integer(depth));
            graph.add_child(me, literal)?;
            Ok(true)
        }

        fn eval_calculate(
            &self,
            node: NodeRef<'_>,
            graph_state: &mut GraphEvalState<'_>,
            _context: &EvalContext,
        ) -> Result<(), EvalError> {
            graph_state.node_state_mut(node.index()).finish()
        }
    }

    /// Always complains during transformation.
    struct Grumpy;

    impl Call for Grumpy {
        fn name(&self) -> &str {
            "grumpy"
        }

        fn transform(
            &self,
            _me: NodeId,
            _graph: &mut MergeGraph,
            _factory: &CallFactory,
            _environment: &Environment,
            reporter: &mut NodeReporter<'_>,
        ) -> Result<bool, CoreError> {
            reporter.error("not today");
            Ok(false)
        }

        fn eval_calculate(
            &self,
            node: NodeRef<'_>,
            graph_state: &mut GraphEvalState<'_>,
            _context: &EvalContext,
        ) -> Result<(), EvalError> {
            graph_state.node_state_mut(node.index()).finish()
        }
    }

    fn factory() -> CallFactory {
        let mut factory = crate::test_support::opaque_factory(&["f", "g"]);
        factory.add_call::<Unwrap>();
        factory.add("spin", || Arc::new(Spin) as Arc<dyn Call>);
        factory.add("grumpy", || Arc::new(Grumpy) as Arc<dyn Call>);
        factory
    }

    fn graph_of(texts: &[&str]) -> MergeGraph {
        let factory = factory();
        let mut graph = MergeGraph::new();
        for text in texts {
            let node = parse_expression(text, &factory, &mut graph).unwrap();
            graph.add_root(node).unwrap();
        }
        graph
    }

    #[test]
    fn transforms_run_to_a_fixpoint() {
        let factory = factory();
        let env = Environment::new("test");
        let mut graph = graph_of(&["(f (unwrap (unwrap (g 1))))", "(f (g 1))"]);
        let mut reporter = Reporter::new();

        let summary = Pipeline::new(&factory, &env)
            .run(&mut graph, &mut reporter)
            .unwrap();

        assert_eq!(summary.sweeps, 2);
        assert_eq!(graph.roots()[0], graph.roots()[1]);
        assert_eq!(graph.to_s(graph.roots()[0]).unwrap(), "(f (g 1))");
        assert_eq!(summary.nodes, 3);
    }

    #[test]
    fn pre_validation_errors_stop_before_transformation() {
        let factory = factory();
        let env = Environment::new("test");
        let mut graph = graph_of(&["(f (unwrap 1 2))"]);
        let mut reporter = Reporter::new();

        let err = Pipeline::new(&factory, &env)
            .run(&mut graph, &mut reporter)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Diagnostics {
                stage: Stage::PreValidate,
                errors: 1
            }
        ));
        // Nothing was transformed.
        assert_eq!(graph.to_s(graph.roots()[0]).unwrap(), "(f (unwrap 1 2))");
    }

    #[test]
    fn transform_errors_finish_the_sweep_then_abort() {
        let factory = factory();
        let env = Environment::new("test");
        let mut graph = graph_of(&["(f (grumpy) (unwrap 1))"]);
        let mut reporter = Reporter::new();

        let err = Pipeline::new(&factory, &env)
            .run(&mut graph, &mut reporter)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Diagnostics {
                stage: Stage::Transform,
                ..
            }
        ));
        // The sibling transform still ran in that sweep.
        assert_eq!(graph.to_s(graph.roots()[0]).unwrap(), "(f (grumpy) 1)");
    }

    #[test]
    fn runaway_transforms_hit_the_cap() {
        let factory = factory();
        let env = Environment::new("test");
        let mut graph = graph_of(&["(spin)"]);
        let mut reporter = Reporter::new();
        let config = PipelineConfig {
            max_transform_iterations: 5,
            ..PipelineConfig::default()
        };

        let err = Pipeline::new(&factory, &env)
            .with_config(config)
            .run(&mut graph, &mut reporter)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Core(CoreError::TransformDidNotConverge { iterations: 5 })
        ));
    }

    #[test]
    fn config_fills_in_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"debug_report": true}"#).unwrap();
        assert_eq!(config.max_transform_iterations, 1000);
        assert!(config.debug_report);
        assert!(config.validate_structure);
    }
}
