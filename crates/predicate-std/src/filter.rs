//! Filters: pass through the subvalues of the last argument that satisfy a
//! test against the first.
//!
//! `named`, `namedi` (also `sub`) and `namedRx` test the name of each
//! subvalue rather than the value itself.

use std::cmp::Ordering;
use std::sync::Arc;

use predicate_core::functional::{Args, Filter, FilterFn};
use predicate_core::validate;
use predicate_core::{CallFactory, Literal, NodeReporter, Prepared, Value};
use regex::Regex;

pub fn load(factory: &mut CallFactory) {
    factory
        .add_functional("eq", || Filter(Equal { negate: false }))
        .add_functional("ne", || Filter(Equal { negate: true }))
        .add_functional("lt", || Filter(Compare(Comparison::Lt)))
        .add_functional("le", || Filter(Compare(Comparison::Le)))
        .add_functional("gt", || Filter(Compare(Comparison::Gt)))
        .add_functional("ge", || Filter(Compare(Comparison::Ge)))
        .add_functional("longer", || Filter(Longer))
        .add_functional("typed", || Filter(Typed))
        .add_functional("named", || Filter(Named { caseless: false }))
        .add_functional("namedi", || Filter(Named { caseless: true }))
        .add_alias("sub", "namedi")
        .add_functional("namedRx", || Filter(NamedRx));
}

/// Same type and same value, names aside. Lists are never equal to
/// anything.
fn value_equal(a: &Value, b: &Value) -> bool {
    match (a.unnamed(), b.unnamed()) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

/// Orders two numeric values: exactly for two integers, as floats otherwise.
fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a.unnamed(), b.unnamed()) {
        (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// `(eq v x)` and `(ne v x)`.
#[derive(Debug, Default)]
pub struct Equal {
    negate: bool,
}

impl FilterFn for Equal {
    const SECONDARY_ARGS: usize = 1;

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        if n == 0 {
            validate::value_is_singular(values, reporter);
        }
    }

    fn filter(&self, args: &Args<'_>, subvalue: &Value) -> bool {
        let equal = args
            .dynamic(0)
            .first()
            .is_some_and(|expected| value_equal(expected, subvalue));
        equal != self.negate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Lt => ordering.is_lt(),
            Comparison::Le => ordering.is_le(),
            Comparison::Gt => ordering.is_gt(),
            Comparison::Ge => ordering.is_ge(),
        }
    }
}

/// `(lt v x)` etc: subvalues of `x` that compare against `v` as named.
/// Non-numeric subvalues never pass.
#[derive(Debug)]
pub struct Compare(pub Comparison);

impl FilterFn for Compare {
    const SECONDARY_ARGS: usize = 1;

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        if n != 0 || !validate::value_is_singular(values, reporter) {
            return;
        }
        match values.first() {
            Some(value) => {
                validate::value_is_numeric(value, reporter);
            }
            None => reporter.error("comparison needs a value to compare against"),
        }
    }

    fn filter(&self, args: &Args<'_>, subvalue: &Value) -> bool {
        args.dynamic(0)
            .first()
            .and_then(|bound| numeric_cmp(subvalue, bound))
            .is_some_and(|ordering| self.0.accepts(ordering))
    }
}

/// `(longer n x)`: list subvalues of `x` with more than `n` items.
#[derive(Debug, Default)]
pub struct Longer;

impl FilterFn for Longer {
    const SECONDARY_ARGS: usize = 1;

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        if n != 0 || !validate::value_is_singular(values, reporter) {
            return;
        }
        if let Some(value) = values.first() {
            validate::value_is_number(value, reporter);
        }
    }

    fn filter(&self, args: &Args<'_>, subvalue: &Value) -> bool {
        let Some(length) = args.dynamic(0).first().and_then(Value::as_number) else {
            return false;
        };
        subvalue
            .as_list()
            .is_some_and(|items| i64::try_from(items.len()).map_or(true, |len| len > length))
    }
}

// ---------------------------------------------------------------------------
// typed
// ---------------------------------------------------------------------------

const TYPE_NAMES: [&str; 4] = ["number", "float", "string", "list"];

/// `(typed 'type' x)`: subvalues of `x` of the given type, one of `number`,
/// `float`, `string` or `list`.
#[derive(Debug, Default)]
pub struct Typed;

impl FilterFn for Typed {
    const STATIC_ARGS: usize = 1;

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        if n != 0 || !validate::value_is_singular(values, reporter) {
            return;
        }
        let Some(value) = values.first() else {
            reporter.error("typed needs a type name");
            return;
        };
        if validate::value_is_string(value, reporter)
            && !value.as_str().is_some_and(|name| TYPE_NAMES.contains(&name))
        {
            reporter.error(format!(
                "invalid type {value}, expected one of {}",
                TYPE_NAMES.join(", ")
            ));
        }
    }

    fn filter(&self, args: &Args<'_>, subvalue: &Value) -> bool {
        args.static_arg(0)
            .and_then(Literal::as_str)
            .is_some_and(|name| subvalue.type_name() == name)
    }
}

// ---------------------------------------------------------------------------
// named, namedi, namedRx
// ---------------------------------------------------------------------------

/// `(named 'name' x)`: subvalues of `x` with the given name. `namedi`
/// compares ASCII case-insensitively.
#[derive(Debug, Default)]
pub struct Named {
    caseless: bool,
}

impl FilterFn for Named {
    const SECONDARY_ARGS: usize = 1;

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        if n != 0 || !validate::value_is_singular(values, reporter) {
            return;
        }
        match values.first() {
            Some(value) => {
                validate::value_is_string(value, reporter);
            }
            None => reporter.error("named needs a name"),
        }
    }

    fn filter(&self, args: &Args<'_>, subvalue: &Value) -> bool {
        let (Some(expected), Some(name)) = (args.dynamic(0).first().and_then(Value::as_str), subvalue.name()) else {
            return false;
        };
        if self.caseless {
            name.eq_ignore_ascii_case(expected)
        } else {
            name == expected
        }
    }
}

/// `(namedRx 'regex' x)`: subvalues of `x` whose name matches the regular
/// expression anywhere. Unnamed subvalues never match.
#[derive(Debug, Default)]
pub struct NamedRx;

impl FilterFn for NamedRx {
    const STATIC_ARGS: usize = 1;

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        if n != 0 || !validate::value_is_singular(values, reporter) {
            return;
        }
        let Some(value) = values.first() else {
            reporter.error("namedRx needs a regular expression");
            return;
        };
        if !validate::value_is_string(value, reporter) {
            return;
        }
        if let Some(Err(err)) = value.as_str().map(Regex::new) {
            reporter.error(format!("invalid regular expression {value}: {err}"));
        }
    }

    fn prepare(&self, static_args: &[Literal], prepared: &mut Option<Prepared>, reporter: &mut NodeReporter<'_>) -> bool {
        let Some(pattern) = static_args.first().and_then(Literal::as_str) else {
            reporter.error("namedRx needs a regular expression");
            return false;
        };
        match Regex::new(pattern) {
            Ok(regex) => {
                *prepared = Some(Arc::new(regex));
                true
            }
            Err(err) => {
                reporter.error(format!("invalid regular expression '{pattern}': {err}"));
                false
            }
        }
    }

    fn filter(&self, args: &Args<'_>, subvalue: &Value) -> bool {
        match (args.prepared::<Regex>(), subvalue.name()) {
            (Some(regex), Some(name)) => regex.is_match(name),
            _ => false,
        }
    }
}
