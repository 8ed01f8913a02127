//! Pipeline configuration: an optional JSON file plus environment overrides.

use std::fs;
use std::path::Path;

use predicate_core::PipelineConfig;

use crate::error::CliError;

pub const MAX_ITERATIONS_VAR: &str = "PREDICATE_MAX_ITERATIONS";

/// Reads `path` if given, then applies overrides from the process
/// environment.
pub fn load(path: Option<&Path>) -> Result<PipelineConfig, CliError> {
    let config = match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|source| CliError::Io {
                path: path.to_owned(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|source| CliError::Document {
                what: "config",
                path: path.to_owned(),
                source,
            })?
        }
        None => PipelineConfig::default(),
    };
    apply_overrides(config, std::env::var(MAX_ITERATIONS_VAR).ok())
}

fn apply_overrides(
    mut config: PipelineConfig,
    max_iterations: Option<String>,
) -> Result<PipelineConfig, CliError> {
    if let Some(raw) = max_iterations {
        config.max_transform_iterations = raw
            .trim()
            .parse()
            .ok()
            .filter(|&n: &usize| n > 0)
            .ok_or(CliError::Override {
                variable: MAX_ITERATIONS_VAR,
                value: raw,
            })?;
    }
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"debug_report": true}"#).unwrap();
        assert!(config.debug_report);
        assert_eq!(config.max_transform_iterations, 1000);
        assert!(config.validate_structure);
    }

    #[test]
    fn iteration_override() {
        let config = apply_overrides(PipelineConfig::default(), Some("25".into())).unwrap();
        assert_eq!(config.max_transform_iterations, 25);
        let config = apply_overrides(PipelineConfig::default(), None).unwrap();
        assert_eq!(config.max_transform_iterations, 1000);
    }

    #[test]
    fn bad_override_is_rejected() {
        let err = apply_overrides(PipelineConfig::default(), Some("0".into())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "PREDICATE_MAX_ITERATIONS must be a positive integer, got '0'"
        );
        assert!(apply_overrides(PipelineConfig::default(), Some("many".into())).is_err());
    }
}
