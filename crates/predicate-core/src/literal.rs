//! Literal node payloads.
//!
//! A literal has no children and its values never depend on the evaluation
//! context. `Null` evaluates to no values (falsy); every other variant
//! evaluates to exactly one value (truthy).

use serde::{Deserialize, Serialize};

use crate::value::{format_float, quote_string, Value};

/// The closed set of literal kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
}

impl Literal {
    /// Canonical text: `null`, `'quoted'`, `5`, `1.5`.
    pub fn to_s(&self) -> String {
        match self {
            Literal::Null => "null".to_owned(),
            Literal::String(s) => quote_string(s),
            Literal::Integer(n) => n.to_string(),
            Literal::Float(f) => format_float(*f),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// The single value of a non-null literal.
    pub fn value(&self) -> Option<Value> {
        match self {
            Literal::Null => None,
            Literal::String(s) => Some(Value::String(s.clone())),
            Literal::Integer(n) => Some(Value::Number(*n)),
            Literal::Float(f) => Some(Value::Float(*f)),
        }
    }

    /// The value sequence the literal evaluates to.
    pub fn values(&self) -> Vec<Value> {
        self.value().into_iter().collect()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Literal::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Literal::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Literal equivalent of a scalar value. Lists and named values have no
    /// literal form.
    pub fn from_value(value: &Value) -> Option<Literal> {
        match value {
            Value::Number(n) => Some(Literal::Integer(*n)),
            Value::Float(f) => Some(Literal::Float(*f)),
            Value::String(s) => Some(Literal::String(s.clone())),
            Value::List(_) | Value::Named(..) => None,
        }
    }

    /// Literal equivalent of a finished value sequence: no values is `Null`,
    /// one scalar is that scalar, anything else has no literal form.
    pub fn from_values(values: &[Value]) -> Option<Literal> {
        match values {
            [] => Some(Literal::Null),
            [single] => Literal::from_value(single),
            _ => None,
        }
    }
}
