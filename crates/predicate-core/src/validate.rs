//! Reusable validation checks for call hooks.
//!
//! Node checks take a [`NodeView`] and report problems as errors through a
//! [`NodeReporter`]; value checks serve delegates validating argument
//! values. Every check returns `true` if it passed.

use crate::dag::NodeView;
use crate::literal::Literal;
use crate::reporter::NodeReporter;
use crate::value::Value;

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "ren"
    }
}

/// Exactly `n` children.
pub fn n_children(node: NodeView<'_>, reporter: &mut NodeReporter<'_>, n: usize) -> bool {
    let actual = node.num_children();
    if actual != n {
        reporter.error(format!(
            "expected {n} child{} but have {actual}",
            plural(n)
        ));
        return false;
    }
    true
}

/// At least `n` children.
pub fn n_or_more_children(node: NodeView<'_>, reporter: &mut NodeReporter<'_>, n: usize) -> bool {
    let actual = node.num_children();
    if actual < n {
        reporter.error(format!(
            "expected at least {n} child{} but have {actual}",
            plural(n)
        ));
        return false;
    }
    true
}

/// At most `n` children.
pub fn n_or_fewer_children(node: NodeView<'_>, reporter: &mut NodeReporter<'_>, n: usize) -> bool {
    let actual = node.num_children();
    if actual > n {
        reporter.error(format!(
            "expected at most {n} child{} but have {actual}",
            plural(n)
        ));
        return false;
    }
    true
}

fn nth_literal<'g>(
    node: NodeView<'g>,
    reporter: &mut NodeReporter<'_>,
    n: usize,
) -> Option<&'g Literal> {
    let Some(child) = node.child(n) else {
        reporter.error(format!("child {n} is missing"));
        return None;
    };
    match child.literal() {
        Some(literal) => Some(literal),
        None => {
            reporter.error(format!(
                "child {n} must be a literal, got {}",
                child.to_s()
            ));
            None
        }
    }
}

/// Child `n` exists and is a literal.
pub fn nth_child_is_literal(node: NodeView<'_>, reporter: &mut NodeReporter<'_>, n: usize) -> bool {
    nth_literal(node, reporter, n).is_some()
}

fn nth_child_literal_matches(
    node: NodeView<'_>,
    reporter: &mut NodeReporter<'_>,
    n: usize,
    expected: &str,
    matches: impl Fn(&Literal) -> bool,
) -> bool {
    match nth_literal(node, reporter, n) {
        Some(literal) if matches(literal) => true,
        Some(literal) => {
            reporter.error(format!(
                "child {n} must be {expected}, got {}",
                literal.to_s()
            ));
            false
        }
        None => false,
    }
}

/// Child `n` is a string literal.
pub fn nth_child_is_string(node: NodeView<'_>, reporter: &mut NodeReporter<'_>, n: usize) -> bool {
    nth_child_literal_matches(node, reporter, n, "a string literal", |l| {
        matches!(l, Literal::String(_))
    })
}

/// Child `n` is an integer literal.
pub fn nth_child_is_integer(node: NodeView<'_>, reporter: &mut NodeReporter<'_>, n: usize) -> bool {
    nth_child_literal_matches(node, reporter, n, "an integer literal", |l| {
        matches!(l, Literal::Integer(_))
    })
}

/// Child `n` is a float literal.
pub fn nth_child_is_float(node: NodeView<'_>, reporter: &mut NodeReporter<'_>, n: usize) -> bool {
    nth_child_literal_matches(node, reporter, n, "a float literal", |l| {
        matches!(l, Literal::Float(_))
    })
}

/// Child `n` is `null`.
pub fn nth_child_is_null(node: NodeView<'_>, reporter: &mut NodeReporter<'_>, n: usize) -> bool {
    nth_child_literal_matches(node, reporter, n, "null", Literal::is_null)
}

/// No child is a `null` literal.
pub fn no_child_is_null(node: NodeView<'_>, reporter: &mut NodeReporter<'_>) -> bool {
    let mut ok = true;
    for (i, child) in node.children().into_iter().enumerate() {
        if child.literal().is_some_and(Literal::is_null) {
            reporter.error(format!("child {i} must not be null"));
            ok = false;
        }
    }
    ok
}

// ---------------------------------------------------------------------------
// Value checks
// ---------------------------------------------------------------------------

/// At most one value.
pub fn value_is_singular(values: &[Value], reporter: &mut NodeReporter<'_>) -> bool {
    if values.len() > 1 {
        reporter.error(format!("expected at most one value, got {}", values.len()));
        return false;
    }
    true
}

fn value_is(
    value: &Value,
    reporter: &mut NodeReporter<'_>,
    expected: &str,
    matches: impl Fn(&Value) -> bool,
) -> bool {
    if !matches(value) {
        reporter.error(format!(
            "expected a {expected} value, got {} {value}",
            value.type_name()
        ));
        return false;
    }
    true
}

pub fn value_is_string(value: &Value, reporter: &mut NodeReporter<'_>) -> bool {
    value_is(value, reporter, "string", |v| matches!(v.unnamed(), Value::String(_)))
}

pub fn value_is_number(value: &Value, reporter: &mut NodeReporter<'_>) -> bool {
    value_is(value, reporter, "number", |v| matches!(v.unnamed(), Value::Number(_)))
}

pub fn value_is_float(value: &Value, reporter: &mut NodeReporter<'_>) -> bool {
    value_is(value, reporter, "float", |v| matches!(v.unnamed(), Value::Float(_)))
}

/// A number or a float.
pub fn value_is_numeric(value: &Value, reporter: &mut NodeReporter<'_>) -> bool {
    value_is(value, reporter, "numeric", Value::is_numeric)
}

pub fn value_is_list(value: &Value, reporter: &mut NodeReporter<'_>) -> bool {
    value_is(value, reporter, "list", Value::is_list)
}
