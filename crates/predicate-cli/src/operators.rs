//! String operators available to the `operator` call from the command line.

use predicate_core::{Environment, Operator, Value};

pub fn environment() -> Environment {
    let mut environment = Environment::new("pred");
    environment
        .register_operator("contains", string_test(|text, argument| text.contains(argument)))
        .register_operator("startsWith", string_test(|text, argument| text.starts_with(argument)))
        .register_operator("endsWith", string_test(|text, argument| text.ends_with(argument)));
    environment
}

/// Passes string inputs that satisfy `test`; any other input is an error.
fn string_test(test: fn(&str, &str) -> bool) -> impl Operator + 'static {
    move |argument: &str, input: &Value| match input.as_str() {
        Some(text) => Ok(test(text, argument).then(|| input.clone())),
        None => Err(format!(
            "expected a string input, got {} {input}",
            input.type_name()
        )),
    }
}
