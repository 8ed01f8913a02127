//! The standard call library.
//!
//! Every call here is a client of `predicate-core`: functional delegates
//! where the call is a pure function of its arguments, plain [`Call`]
//! implementations where it needs forwarding, aliasing, phases or custom
//! transformations.
//!
//! Templates, calls defined by an expression, are registered per host with
//! [`template::define_template`].
//!
//! [`Call`]: predicate_core::Call

pub mod boolean;
pub mod development;
pub mod filter;
pub mod host;
pub mod list;
pub mod math;
pub mod predicate;
pub mod template;

mod helpers;

#[cfg(test)]
mod testing;

use predicate_core::CallFactory;

/// Registers every standard call.
pub fn load_standard(factory: &mut CallFactory) -> &mut CallFactory {
    boolean::load(factory);
    predicate::load(factory);
    math::load(factory);
    filter::load(factory);
    list::load(factory);
    development::load(factory);
    host::load(factory);
    template::load(factory);
    factory
}

/// A factory holding only the standard calls.
pub fn standard_factory() -> CallFactory {
    let mut factory = CallFactory::new();
    load_standard(&mut factory);
    factory
}
