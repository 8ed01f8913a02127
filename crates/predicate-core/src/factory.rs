//! Name-keyed registry of call constructors.
//!
//! Registration happens during setup only; once configuration starts the
//! factory is shared immutably, so building never races with registering.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::call::Call;
use crate::error::CoreError;

/// Constructor of fresh call instances.
pub type CallGenerator = Arc<dyn Fn() -> Arc<dyn Call> + Send + Sync>;

/// Registry mapping call names to generators.
#[derive(Clone, Default)]
pub struct CallFactory {
    generators: HashMap<String, CallGenerator>,
}

impl CallFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `generator` under `name`. A later registration for the
    /// same name replaces the earlier one.
    pub fn add<G>(&mut self, name: impl Into<String>, generator: G) -> &mut Self
    where
        G: Fn() -> Arc<dyn Call> + Send + Sync + 'static,
    {
        let name = name.into();
        if self
            .generators
            .insert(name.clone(), Arc::new(generator))
            .is_some()
        {
            tracing::debug!(name = %name, "call generator replaced");
        }
        self
    }

    /// Registers `T` under the name a default-constructed `T` reports.
    pub fn add_call<T>(&mut self) -> &mut Self
    where
        T: Call + Default,
    {
        let name = T::default().name().to_owned();
        self.add(name, || Arc::new(T::default()) as Arc<dyn Call>)
    }

    /// Builds a fresh call registered under `name`.
    ///
    /// Fails with [`CoreError::UnknownCall`] if nothing is registered and with
    /// [`CoreError::CallNameMismatch`] if the generator produced a call that
    /// reports a different name.
    pub fn build(&self, name: &str) -> Result<Arc<dyn Call>, CoreError> {
        let generator = self
            .generators
            .get(name)
            .ok_or_else(|| CoreError::UnknownCall {
                name: name.to_owned(),
            })?;
        let call = generator();
        if call.name() != name {
            return Err(CoreError::CallNameMismatch {
                requested: name.to_owned(),
                produced: call.name().to_owned(),
            });
        }
        Ok(call)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.generators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl fmt::Debug for CallFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFactory")
            .field("names", &self.names())
            .finish()
    }
}
