//! Graph edits shared by the standard transforms.

use predicate_core::{CallFactory, CoreError, Literal, MergeGraph, NodeId, Value};

/// The canonical truthy literal: an empty string.
pub(crate) fn true_literal() -> Literal {
    Literal::String(String::new())
}

/// The canonical truthy value.
pub(crate) fn true_value() -> Value {
    Value::String(String::new())
}

pub(crate) fn literal_for(truthy: bool) -> Literal {
    if truthy {
        true_literal()
    } else {
        Literal::Null
    }
}

/// Replaces `me` with a new literal node.
pub(crate) fn replace_with_literal(
    graph: &mut MergeGraph,
    me: NodeId,
    literal: Literal,
) -> Result<bool, CoreError> {
    let replacement = graph.add_literal(literal);
    graph.replace(me, replacement)?;
    Ok(true)
}

/// Replaces `me` with a fresh `name` call over `children`.
pub(crate) fn rebuild(
    graph: &mut MergeGraph,
    factory: &CallFactory,
    me: NodeId,
    name: &str,
    children: &[NodeId],
) -> Result<bool, CoreError> {
    let replacement = graph.build(factory, name)?;
    for &child in children {
        graph.add_child(replacement, child)?;
    }
    graph.replace(me, replacement)?;
    Ok(true)
}

/// Children of `me` paired with their literal, if any.
pub(crate) fn classify_children(
    graph: &MergeGraph,
    me: NodeId,
) -> Result<Vec<(NodeId, Option<Literal>)>, CoreError> {
    Ok(graph
        .view(me)?
        .children()
        .into_iter()
        .map(|child| (child.id(), child.literal().cloned()))
        .collect())
}

/// If every child is a literal, replaces `me` with the literal form of the
/// concatenated child values, when there is one.
pub(crate) fn fold_concatenation(graph: &mut MergeGraph, me: NodeId) -> Result<bool, CoreError> {
    let mut values = Vec::new();
    for (_, literal) in classify_children(graph, me)? {
        match literal {
            Some(literal) => values.extend(literal.value()),
            None => return Ok(false),
        }
    }
    match Literal::from_values(&values) {
        Some(literal) => replace_with_literal(graph, me, literal),
        None => Ok(false),
    }
}
