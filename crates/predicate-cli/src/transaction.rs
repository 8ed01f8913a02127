//! Transaction documents for `pred eval`.
//!
//! ```json
//! {
//!   "phases": [
//!     { "fields": { "to": ["a@example.com"], "size": [10] }, "complete": ["size"] },
//!     { "fields": { "to": ["b@example.org"] }, "complete": ["to"] }
//!   ]
//! }
//! ```
//!
//! Entry `i` describes phase `i + 1`: values appended to each field and the
//! fields that receive no more values. Fields carry over between phases.
//! A JSON object value becomes a list of named values, one per key.
//! A document with no phases evaluates once, phaselessly.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use predicate_core::{EvalContext, Phase, Value};
use serde::Deserialize;

use crate::error::CliError;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    #[serde(default)]
    pub phases: Vec<PhaseInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseInput {
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    pub complete: Vec<String>,
}

impl Transaction {
    pub fn read(path: &Path) -> Result<Self, CliError> {
        let text = fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CliError::Document {
            what: "context",
            path: path.to_owned(),
            source,
        })
    }

    /// The context for each phase in order. Contexts share field storage,
    /// so a field aliased in one phase sees values added in later ones.
    pub fn contexts(&self) -> Vec<EvalContext> {
        if self.phases.is_empty() {
            return vec![EvalContext::new()];
        }
        let mut context = EvalContext::new();
        let mut contexts = Vec::with_capacity(self.phases.len());
        for (phase, input) in (1..).zip(&self.phases) {
            context.set_phase(Some(Phase(phase)));
            for (name, values) in &input.fields {
                context.add_field(name.as_str());
                for value in values {
                    context.push_field(name.as_str(), value.clone());
                }
            }
            for name in &input.complete {
                context.complete_field(name.as_str());
            }
            contexts.push(context.clone());
        }
        contexts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_accumulate_across_phases() {
        let transaction: Transaction = serde_json::from_str(
            r#"{"phases": [
                {"fields": {"to": ["a"], "size": [10, 2.5]}, "complete": ["size"]},
                {"fields": {"to": [["x", 1]]}}
            ]}"#,
        )
        .unwrap();
        let contexts = transaction.contexts();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].phase(), Some(Phase(1)));

        let size = contexts[0].field("size").unwrap();
        assert!(size.is_complete());
        assert_eq!(
            size.values().snapshot(),
            vec![Value::Number(10), Value::Float(2.5)]
        );
        assert!(!contexts[0].field("to").unwrap().is_complete());

        let to = contexts[1].field("to").unwrap();
        assert_eq!(
            to.values().snapshot(),
            vec![
                Value::from("a"),
                Value::List(vec![Value::from("x"), Value::Number(1)])
            ]
        );
    }

    #[test]
    fn objects_become_named_values() {
        let transaction: Transaction = serde_json::from_str(
            r#"{"phases": [{"fields": {"headers": [{"Host": "example.org", "Port": 80}]}}]}"#,
        )
        .unwrap();
        let contexts = transaction.contexts();
        let headers = contexts[0].field("headers").unwrap().values().snapshot();
        assert_eq!(
            headers,
            vec![Value::List(vec![
                Value::named("Host", Value::from("example.org")),
                Value::named("Port", Value::Number(80)),
            ])]
        );
    }

    #[test]
    fn no_phases_means_phaseless() {
        let contexts = Transaction::default().contexts();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].phase(), None);
    }

    #[test]
    fn values_must_be_representable() {
        let result: Result<Transaction, _> =
            serde_json::from_str(r#"{"phases": [{"fields": {"flag": [true]}}]}"#);
        assert!(result.is_err());
        let result: Result<Transaction, _> = serde_json::from_str(r#"{"phase": []}"#);
        assert!(result.is_err());
    }
}
