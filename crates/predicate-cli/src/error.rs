//! CLI error type and exit codes.

use std::io;
use std::path::PathBuf;

use predicate_core::{CoreError, EvalError, ParseError, Stage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid {what} '{path}': {source}")]
    Document {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: ParseError,
    },

    #[error("{path}:{line}: {reason}")]
    Define {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{errors} error(s) during {stage}")]
    Diagnostics { stage: Stage, errors: usize },

    #[error("{errors} error(s) preparing for evaluation")]
    Prepare { errors: usize },

    #[error("{variable} must be a positive integer, got '{value}'")]
    Override { variable: &'static str, value: String },

    #[error("failed to serialize report: {0}")]
    Report(#[source] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl CliError {
    /// 1 for diagnostics, 2 for parse errors, 3 for unreadable input and 4
    /// for fatal errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Diagnostics { .. } | CliError::Prepare { .. } => 1,
            CliError::Parse { .. } | CliError::Define { .. } => 2,
            CliError::Io { .. } | CliError::Document { .. } | CliError::Override { .. } => 3,
            CliError::Report(_) | CliError::Core(_) | CliError::Eval(_) => 4,
        }
    }
}
