//! Predicate expression CLI.
//!
//! Provides the `pred` binary. `check` merges the expressions of a file
//! (one per line, after any `define` template lines), runs the validation
//! and transformation pipeline and prints the transformed roots; `eval`
//! additionally evaluates every root phase by phase against a JSON
//! transaction document.
//!
//! Exit codes: 0 success, 1 configuration diagnostics, 2 parse error,
//! 3 unreadable input, 4 fatal error.

mod config;
mod error;
mod operators;
mod report;
mod source;
mod transaction;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use predicate_core::{
    CallFactory, Environment, Evaluation, IndexedGraph, MergeGraph, Pipeline, PipelineConfig,
    PipelineError, PipelineSummary, Reporter, RootId,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;
use crate::report::{CheckReport, EvalReport, PhaseReport, RootResult};
use crate::transaction::Transaction;

/// Predicate expression checker and evaluator.
#[derive(Parser)]
#[command(name = "pred", about = "Predicate expression checker and evaluator")]
struct Cli {
    /// Pipeline configuration file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Validate and transform the expressions of a file.
    Check {
        /// Expression file, one expression per line.
        file: PathBuf,
    },

    /// Check, then evaluate every root against a transaction.
    Eval {
        /// Expression file, one expression per line.
        file: PathBuf,

        /// Transaction document (JSON). Without one, roots are evaluated
        /// once with no fields.
        #[arg(short, long)]
        context: Option<PathBuf>,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match run(&cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {err}");
            err.exit_code()
        }
    };
    process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = config::load(cli.config.as_deref())?;
    let mut factory = predicate_std::standard_factory();
    let environment = operators::environment();

    match &cli.command {
        Commands::Check { file } => {
            let (graph, reporter, summary) =
                configure(file, &mut factory, &environment, &config, cli.json)?;
            let report = CheckReport::new(&graph, &reporter, Some(summary))?;
            emit(cli.json, &report, |out| report.write_text(out))
        }
        Commands::Eval { file, context } => {
            let transaction = match context {
                Some(path) => Transaction::read(path)?,
                None => Transaction::default(),
            };
            let (graph, _, _) = configure(file, &mut factory, &environment, &config, cli.json)?;
            let report = evaluate(&graph, &environment, &transaction)?;
            emit(cli.json, &report, |out| report.write_text(out))
        }
    }
}

/// Reads, defines templates, merges and runs the pipeline. Diagnostics are
/// printed before a failed pipeline is reported as an error.
fn configure(
    file: &Path,
    factory: &mut CallFactory,
    environment: &Environment,
    config: &PipelineConfig,
    json: bool,
) -> Result<(MergeGraph, Reporter, PipelineSummary), CliError> {
    let source = source::read(file)?;
    source::define(file, &source.definitions, factory)?;
    let factory = &*factory;
    let mut graph = MergeGraph::new();
    source::merge(file, &source.expressions, factory, &mut graph)?;

    let mut reporter = Reporter::new();
    let outcome = Pipeline::new(factory, environment)
        .with_config(config.clone())
        .run(&mut graph, &mut reporter);
    match outcome {
        Ok(summary) => Ok((graph, reporter, summary)),
        Err(PipelineError::Diagnostics { stage, errors }) => {
            let report = CheckReport {
                roots: Vec::new(),
                diagnostics: reporter.into_diagnostics(),
                summary: None,
            };
            emit(json, &report, |out| report.write_text(out))?;
            Err(CliError::Diagnostics { stage, errors })
        }
        Err(PipelineError::Core(err)) => Err(err.into()),
    }
}

fn evaluate(
    graph: &MergeGraph,
    environment: &Environment,
    transaction: &Transaction,
) -> Result<EvalReport, CliError> {
    let indexed = IndexedGraph::new(graph)?;
    let mut reporter = Reporter::new();
    indexed.pre_eval(environment, &mut reporter);
    if reporter.has_errors() {
        for diagnostic in reporter.diagnostics() {
            eprintln!("{diagnostic}");
        }
        return Err(CliError::Prepare {
            errors: reporter.num_errors(),
        });
    }

    let contexts = transaction.contexts();
    let mut report = EvalReport::default();
    let Some(first) = contexts.first() else {
        return Ok(report);
    };
    let mut evaluation = Evaluation::new(&indexed, first)?;
    for context in &contexts {
        let results = evaluation
            .query_all(context)?
            .into_iter()
            .enumerate()
            .map(|(index, result)| RootResult {
                root: RootId(index as u32),
                result,
            })
            .collect();
        report.phases.push(PhaseReport {
            phase: context.phase(),
            results,
        });
    }
    Ok(report)
}

/// Prints `value` as pretty JSON, or as text through `text`.
fn emit<T, F>(json: bool, value: &T, text: F) -> Result<(), CliError>
where
    T: Serialize,
    F: FnOnce(&mut String) -> std::fmt::Result,
{
    if json {
        let rendered = serde_json::to_string_pretty(value).map_err(CliError::Report)?;
        println!("{rendered}");
    } else {
        let mut out = String::new();
        if text(&mut out).is_ok() {
            print!("{out}");
        }
    }
    Ok(())
}
