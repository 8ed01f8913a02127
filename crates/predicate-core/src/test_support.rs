//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::call::Call;
use crate::eval::{EvalContext, EvalError, GraphEvalState};
use crate::factory::CallFactory;
use crate::indexed::NodeRef;

/// A call with no behaviour beyond its name; finishes empty when evaluated.
pub(crate) struct Opaque(pub String);

impl Call for Opaque {
    fn name(&self) -> &str {
        &self.0
    }

    fn eval_calculate(
        &self,
        node: NodeRef<'_>,
        graph_state: &mut GraphEvalState<'_>,
        _context: &EvalContext,
    ) -> Result<(), EvalError> {
        graph_state.node_state_mut(node.index()).finish()
    }
}

/// A factory knowing `Opaque` calls under each of `names`.
pub(crate) fn opaque_factory(names: &[&str]) -> CallFactory {
    let mut factory = CallFactory::new();
    for &name in names {
        let owned = name.to_owned();
        factory.add(name, move || Arc::new(Opaque(owned.clone())) as Arc<dyn Call>);
    }
    factory
}
