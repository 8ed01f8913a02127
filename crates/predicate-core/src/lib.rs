pub mod id;
pub mod error;
pub mod value;
pub mod literal;
pub mod sexpr;
pub mod reporter;
pub mod call;
pub mod dag;
pub mod factory;
pub mod merge_graph;
pub mod validate;
pub mod parse;
pub mod meta;
pub mod pipeline;
pub mod indexed;
pub mod eval;
pub mod functional;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use id::{NodeId, RootId, EvalIndex};
pub use error::{CoreError, ErrorKind};
pub use value::{Value, ValueList};
pub use literal::Literal;
pub use reporter::{Diagnostic, NodeReporter, Reporter, Severity};
pub use call::{Call, NodeKind};
pub use dag::NodeView;
pub use factory::CallFactory;
pub use merge_graph::MergeGraph;
pub use parse::{parse_call, parse_expression, parse_literal, ParseError};
pub use meta::{Abelian, AliasCall};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineSummary, Stage};
pub use indexed::{IndexedGraph, NodeRef};
pub use eval::{
    EvalContext, EvalError, Environment, Evaluation, Field, GraphEvalState, NodeEvalState,
    Operator, Phase, QueryResult, Values,
};
pub use functional::{Delegate, FunctionalCall, Invocation, Prepared};
