//! Arithmetic over numbers and floats.
//!
//! Integer arithmetic is checked; a result that would overflow becomes a
//! float. Values that are not numeric pass through the maps untouched.

use predicate_core::functional::{Args, Map, MapFn, Simple, SimpleFn};
use predicate_core::validate;
use predicate_core::{CallFactory, NodeReporter, Value};

pub fn load(factory: &mut CallFactory) {
    factory
        .add_functional("add", || Map(Add))
        .add_functional("mult", || Map(Mult))
        .add_functional("neg", || Map(Neg))
        .add_functional("recip", || Map(Recip))
        .add_functional("max", || Simple(Max))
        .add_functional("min", || Simple(Min));
}

/// The left-hand operand must be a single numeric value.
fn validate_operand(n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
    if n != 0 || !validate::value_is_singular(values, reporter) {
        return;
    }
    if let Some(value) = values.first() {
        validate::value_is_numeric(value, reporter);
    }
}

fn arithmetic(
    lhs: &Value,
    rhs: &Value,
    integer: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Option<Value> {
    match (lhs.unnamed(), rhs.unnamed()) {
        (Value::Number(a), Value::Number(b)) => Some(
            integer(*a, *b)
                .map(Value::Number)
                .unwrap_or_else(|| Value::Float(float(*a as f64, *b as f64))),
        ),
        _ => Some(Value::Float(float(lhs.as_f64()?, rhs.as_f64()?))),
    }
}

/// `(add n x)`: adds `n` to each value of `x`.
#[derive(Debug, Default)]
pub struct Add;

impl MapFn for Add {
    const SECONDARY_ARGS: usize = 1;

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        validate_operand(n, values, reporter);
    }

    fn map(&self, args: &Args<'_>, subvalue: &Value) -> Option<Value> {
        let Some(lhs) = args.dynamic(0).first() else {
            return Some(subvalue.clone());
        };
        arithmetic(lhs, subvalue, i64::checked_add, |a, b| a + b).or_else(|| Some(subvalue.clone()))
    }
}

/// `(mult n x)`: multiplies each value of `x` by `n`.
#[derive(Debug, Default)]
pub struct Mult;

impl MapFn for Mult {
    const SECONDARY_ARGS: usize = 1;

    fn validate_argument(&self, n: usize, values: &[Value], reporter: &mut NodeReporter<'_>) {
        validate_operand(n, values, reporter);
    }

    fn map(&self, args: &Args<'_>, subvalue: &Value) -> Option<Value> {
        let Some(lhs) = args.dynamic(0).first() else {
            return Some(subvalue.clone());
        };
        arithmetic(lhs, subvalue, i64::checked_mul, |a, b| a * b).or_else(|| Some(subvalue.clone()))
    }
}

#[derive(Debug, Default)]
pub struct Neg;

impl MapFn for Neg {
    fn map(&self, _args: &Args<'_>, subvalue: &Value) -> Option<Value> {
        Some(match subvalue.unnamed() {
            Value::Number(n) => n
                .checked_neg()
                .map(Value::Number)
                .unwrap_or_else(|| Value::Float(-(*n as f64))),
            Value::Float(f) => Value::Float(-f),
            _ => subvalue.clone(),
        })
    }
}

/// `(recip x)`: always a float; zero has no reciprocal and produces nothing.
#[derive(Debug, Default)]
pub struct Recip;

impl MapFn for Recip {
    fn map(&self, _args: &Args<'_>, subvalue: &Value) -> Option<Value> {
        match subvalue.as_f64() {
            Some(f) if f == 0.0 => None,
            Some(f) => Some(Value::Float(1.0 / f)),
            None => Some(subvalue.clone()),
        }
    }
}

/// The numeric value among `values` (list items included) that `better`
/// prefers over every other.
fn extreme(values: &[Value], better: fn(f64, f64) -> bool) -> Option<Value> {
    let mut best: Option<&Value> = None;
    for value in values.iter().flat_map(Value::subvalues) {
        let Some(candidate) = value.as_f64() else {
            continue;
        };
        if best
            .and_then(Value::as_f64)
            .map_or(true, |current| better(candidate, current))
        {
            best = Some(value);
        }
    }
    best.cloned()
}

#[derive(Debug, Default)]
pub struct Max;

impl SimpleFn for Max {
    const DYNAMIC_ARGS: usize = 1;

    fn eval_simple(&self, args: &Args<'_>) -> Option<Value> {
        extreme(args.dynamic(0), |a, b| a > b)
    }
}

#[derive(Debug, Default)]
pub struct Min;

impl SimpleFn for Min {
    const DYNAMIC_ARGS: usize = 1;

    fn eval_simple(&self, args: &Args<'_>) -> Option<Value> {
        extreme(args.dynamic(0), |a, b| a < b)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::*;
    use predicate_core::Value;

    #[test]
    fn literal_arithmetic_folds() {
        assert_eq!(transformed("(add 2 3)"), "5");
        assert_eq!(transformed("(add 2 1.5)"), "3.5");
        assert_eq!(transformed("(mult -2 3)"), "-6");
        assert_eq!(transformed("(neg 4)"), "-4");
        assert_eq!(transformed("(neg 'a')"), "'a'");
        assert_eq!(transformed("(recip 4)"), "0.25");
        assert_eq!(transformed("(recip 0)"), "null");
        assert_eq!(transformed("(add 1 'a')"), "'a'");
    }

    #[test]
    fn overflow_becomes_float() {
        assert_eq!(
            eval("(add 9223372036854775807 (sequence 1 1))"),
            finished(vec![Value::Float(9223372036854775808.0)])
        );
    }

    #[test]
    fn maps_follow_a_growing_primary() {
        let results = eval_phases("(mult 10 (sequence 1 2))", 2);
        assert_eq!(results[0], unfinished(vec![n(10)]));
        assert_eq!(results[1], finished(vec![n(10), n(20)]));
    }

    #[test]
    fn operand_must_be_numeric() {
        let errors = pipeline_errors("(add 'x' (sequence 1))");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("numeric"), "{errors:?}");
    }

    #[test]
    fn max_and_min_look_inside_lists() {
        assert_eq!(
            eval("(max (list 3 'a' 7.5 (sequence 1 1)))"),
            finished(vec![Value::Float(7.5)])
        );
        assert_eq!(
            eval("(min (list 3 'a' 7.5 (sequence -4 -4)))"),
            finished(vec![n(-4)])
        );
        assert_eq!(eval("(max (list 'a' 'b'))"), finished(vec![]));
    }
}
