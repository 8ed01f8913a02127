//! Runtime value representation.
//!
//! [`Value`] is what nodes produce during evaluation. There is no null
//! variant: "null" is the absence of values, so a finished node with an empty
//! value sequence is falsy and any value at all makes it truthy.
//!
//! Any value may carry a name (`Value::Named`), the way a header carries its
//! header name. Accessors look through names; only the name-aware calls
//! (`setName`, `named`, `focus` and friends) care about them.
//!
//! [`ValueList`] is a shared, append-only list. The host uses it for
//! transaction fields that grow across phases; nodes adopt it via aliasing
//! without copying.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A value produced or consumed during evaluation.
///
/// Deserializes from plain JSON: integers become `Number`, other numbers
/// `Float`, strings `String`, arrays `List` and objects a `List` of values
/// named by their keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// A value with a name. Build with [`Value::named`] so names never nest.
    Named(String, Box<Value>),
}

impl Value {
    /// `value` carrying `name`, replacing any name it had. An empty name
    /// removes the name.
    pub fn named(name: impl Into<String>, value: Value) -> Value {
        let name = name.into();
        let value = value.into_unnamed();
        if name.is_empty() {
            value
        } else {
            Value::Named(name, Box::new(value))
        }
    }

    /// The name of a named value.
    pub fn name(&self) -> Option<&str> {
        match self {
            Value::Named(name, _) => Some(name),
            _ => None,
        }
    }

    /// The value without its name.
    pub fn unnamed(&self) -> &Value {
        match self {
            Value::Named(_, value) => value.unnamed(),
            other => other,
        }
    }

    pub fn into_unnamed(self) -> Value {
        match self {
            Value::Named(_, value) => value.into_unnamed(),
            other => other,
        }
    }

    /// Returns a human-readable description of the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Named(_, value) => value.type_name(),
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self.unnamed() {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.unnamed() {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.unnamed() {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self.unnamed() {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric view of a number or float, for arithmetic across both.
    pub fn as_f64(&self) -> Option<f64> {
        match self.unnamed() {
            Value::Number(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.unnamed(), Value::Number(_) | Value::Float(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self.unnamed(), Value::List(_))
    }

    /// The subvalues of this value: the items of a list, or the value itself.
    pub fn subvalues(&self) -> &[Value] {
        match self.unnamed() {
            Value::List(items) => items,
            _ => std::slice::from_ref(self),
        }
    }
}

/// Formats a float so that it always reads back as a float: a decimal point
/// is appended when the shortest representation has none.
pub fn format_float(f: f64) -> String {
    let text = f.to_string();
    if f.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

/// Quotes a string the way literals are written: `'` and `\` are escaped.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::String(s) => f.write_str(&quote_string(s)),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Named(name, value) => write!(f, "{name}:{value}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Number(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Named(name, value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(name, value)?;
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number, string, array or object")
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Value, E> {
        Ok(Value::Number(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Value, E> {
        i64::try_from(n)
            .map(Value::Number)
            .or_else(|_| Ok(Value::Float(n as f64)))
    }

    fn visit_f64<E: de::Error>(self, f: f64) -> Result<Value, E> {
        Ok(Value::Float(f))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::String(s.to_owned()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or_default());
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(map.size_hint().unwrap_or_default());
        while let Some((name, value)) = map.next_entry::<String, Value>()? {
            items.push(Value::named(name, value));
        }
        Ok(Value::List(items))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

// ---------------------------------------------------------------------------
// ValueList
// ---------------------------------------------------------------------------

/// Shared, append-only list of values.
///
/// Clones share storage. Values are never removed or modified once pushed,
/// so a prefix observed by one reader stays valid forever.
#[derive(Debug, Clone, Default)]
pub struct ValueList {
    inner: Arc<RwLock<Vec<Value>>>,
}

impl ValueList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        ValueList {
            inner: Arc::new(RwLock::new(values)),
        }
    }

    /// Appends a value.
    pub fn push(&self, value: Value) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copies the current contents.
    pub fn snapshot(&self) -> Vec<Value> {
        self.read().clone()
    }

    /// Read access to the current contents.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// True if both handles share storage.
    pub fn ptr_eq(&self, other: &ValueList) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
