//! Host-facing evaluation inputs.
//!
//! [`EvalContext`] is the per-transaction input: the current phase and the
//! transaction's fields. [`Environment`] is the per-engine handle available
//! during configuration and pre-evaluation, carrying host operators.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueList};

/// An evaluation pass within a transaction. Phases are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Phase(pub u32);

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase {}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EvalContext
// ---------------------------------------------------------------------------

/// A named transaction field: append-only values plus a flag telling
/// whether more values may still arrive.
#[derive(Debug, Clone, Default)]
pub struct Field {
    values: ValueList,
    complete: bool,
}

impl Field {
    pub fn values(&self) -> &ValueList {
        &self.values
    }

    /// True once no further values will be appended.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Per-transaction evaluation input.
///
/// A context with no phase is phaseless: every `eval` recalculates
/// unfinished nodes. Constant folding evaluates with a phaseless, empty
/// context.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    phase: Option<Phase>,
    fields: HashMap<String, Field>,
}

impl EvalContext {
    /// A phaseless context with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase(phase: Phase) -> Self {
        EvalContext {
            phase: Some(phase),
            fields: HashMap::new(),
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Option<Phase>) {
        self.phase = phase;
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Declares a field with no values yet.
    pub fn add_field(&mut self, name: impl Into<String>) -> &Field {
        self.fields.entry(name.into()).or_default()
    }

    /// Appends a value to a field, declaring it if needed.
    pub fn push_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.entry(name.into()).or_default().values.push(value);
    }

    /// Marks a field complete, declaring it if needed.
    pub fn complete_field(&mut self, name: impl Into<String>) {
        self.fields.entry(name.into()).or_default().complete = true;
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// A host operator: tests an input against an argument and, on a match,
/// yields an output value.
pub trait Operator: Send + Sync {
    /// Checks an argument ahead of evaluation.
    fn prepare(&self, _argument: &str) -> Result<(), String> {
        Ok(())
    }

    /// Returns `Ok(Some(output))` on a match and `Ok(None)` otherwise.
    fn execute(&self, argument: &str, input: &Value) -> Result<Option<Value>, String>;
}

impl<F> Operator for F
where
    F: Fn(&str, &Value) -> Result<Option<Value>, String> + Send + Sync,
{
    fn execute(&self, argument: &str, input: &Value) -> Result<Option<Value>, String> {
        self(argument, input)
    }
}

/// Per-engine handle shared by every node during configuration and
/// pre-evaluation.
#[derive(Clone, Default)]
pub struct Environment {
    name: String,
    operators: HashMap<String, Arc<dyn Operator>>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Environment {
            name: name.into(),
            operators: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers an operator; a later registration replaces an earlier one.
    pub fn register_operator(
        &mut self,
        name: impl Into<String>,
        operator: impl Operator + 'static,
    ) -> &mut Self {
        self.operators.insert(name.into(), Arc::new(operator));
        self
    }

    pub fn operator(&self, name: &str) -> Option<Arc<dyn Operator>> {
        self.operators.get(name).cloned()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.operators.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("operators", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_grow_and_complete() {
        let mut ctx = EvalContext::with_phase(Phase(1));
        ctx.push_field("args", Value::from("a"));
        let handle = ctx.field("args").unwrap().values().clone();
        ctx.push_field("args", Value::from("b"));
        assert_eq!(handle.len(), 2);
        assert!(!ctx.field("args").unwrap().is_complete());
        ctx.complete_field("args");
        assert!(ctx.field("args").unwrap().is_complete());
        assert!(ctx.field("other").is_none());
    }

    #[test]
    fn phases_are_ordered() {
        assert!(Phase(1) < Phase(2));
        assert_eq!(EvalContext::new().phase(), None);
    }

    #[test]
    fn closures_are_operators() {
        let mut env = Environment::new("test");
        env.register_operator(
            "contains",
            |arg: &str, input: &Value| -> Result<Option<Value>, String> {
                Ok(input.as_str().filter(|s| s.contains(arg)).map(Value::from))
            },
        );
        let op = env.operator("contains").unwrap();
        assert_eq!(
            op.execute("b", &Value::from("abc")).unwrap(),
            Some(Value::from("abc"))
        );
        assert_eq!(op.execute("z", &Value::from("abc")).unwrap(), None);
        assert!(env.operator("missing").is_none());
    }
}
