//! The frozen, indexed graph evaluated at runtime.
//!
//! Built from a [`MergeGraph`] once transformation has converged: live
//! nodes get dense [`EvalIndex`]es in breadth-first order from the roots
//! (root 0 first), and each node keeps its kind, children and canonical
//! text. The result is immutable and `Send + Sync`, so one graph serves
//! every transaction on every thread; all mutable evaluation state lives in
//! per-transaction [`GraphEvalState`](crate::eval::GraphEvalState)s.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::call::NodeKind;
use crate::dag::Dag;
use crate::error::CoreError;
use crate::eval::Environment;
use crate::id::{EvalIndex, NodeId, RootId};
use crate::literal::Literal;
use crate::merge_graph::MergeGraph;
use crate::reporter::Reporter;

#[derive(Debug)]
struct IndexedNode {
    kind: NodeKind,
    children: SmallVec<[EvalIndex; 4]>,
    sexpr: String,
    source: NodeId,
}

/// Immutable, densely indexed node graph.
#[derive(Debug)]
pub struct IndexedGraph {
    nodes: Vec<IndexedNode>,
    roots: Vec<EvalIndex>,
}

impl IndexedGraph {
    /// Indexes every live node of `graph`.
    pub fn new(graph: &MergeGraph) -> Result<Self, CoreError> {
        let indexed = Self::build(graph.dag(), graph.roots())?;
        tracing::debug!(
            nodes = indexed.len(),
            roots = indexed.roots.len(),
            "graph indexed"
        );
        Ok(indexed)
    }

    /// Indexes only the subtree at `root`, which becomes index 0 and root 0.
    pub fn from_subtree(graph: &MergeGraph, root: NodeId) -> Result<Self, CoreError> {
        Self::build(graph.dag(), &[root])
    }

    fn build(dag: &Dag, roots: &[NodeId]) -> Result<Self, CoreError> {
        let order = dag.bfs_down(roots.iter().copied());
        let positions: HashMap<NodeId, EvalIndex> = order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, EvalIndex(i as u32)))
            .collect();
        let lookup = |id: NodeId| {
            positions
                .get(&id)
                .copied()
                .ok_or(CoreError::NodeNotFound { id })
        };

        let mut nodes = Vec::with_capacity(order.len());
        for &id in &order {
            let children = dag
                .children(id)
                .into_iter()
                .map(lookup)
                .collect::<Result<_, _>>()?;
            nodes.push(IndexedNode {
                kind: dag.kind(id)?.clone(),
                children,
                sexpr: dag.to_s(id)?.to_owned(),
                source: id,
            });
        }
        let roots = roots
            .iter()
            .map(|&id| lookup(id))
            .collect::<Result<_, _>>()?;
        Ok(IndexedGraph { nodes, roots })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn node(&self, index: EvalIndex) -> NodeRef<'_> {
        NodeRef {
            graph: self,
            index,
            node: &self.nodes[index.index()],
        }
    }

    pub fn get(&self, index: EvalIndex) -> Option<NodeRef<'_>> {
        let node = self.nodes.get(index.index())?;
        Some(NodeRef {
            graph: self,
            index,
            node,
        })
    }

    /// Nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> {
        (0..self.nodes.len()).map(|i| self.node(EvalIndex(i as u32)))
    }

    /// Index of the node root `root` resolves to.
    pub fn root(&self, root: RootId) -> Option<EvalIndex> {
        self.roots.get(root.0 as usize).copied()
    }

    /// Root nodes, indexed by [`RootId`].
    pub fn roots(&self) -> &[EvalIndex] {
        &self.roots
    }

    pub fn num_roots(&self) -> usize {
        self.roots.len()
    }

    /// Runs every call's one-time `pre_eval` hook.
    pub fn pre_eval(&self, environment: &Environment, reporter: &mut Reporter) {
        for node in self.nodes() {
            if let NodeKind::Call(call) = node.kind() {
                call.pre_eval(
                    node,
                    environment,
                    &mut reporter.for_node(node.source(), node.to_s()),
                );
            }
        }
        tracing::debug!(nodes = self.len(), errors = reporter.num_errors(), "pre-evaluation done");
    }
}

/// A node of an [`IndexedGraph`].
#[derive(Clone, Copy)]
pub struct NodeRef<'g> {
    graph: &'g IndexedGraph,
    index: EvalIndex,
    node: &'g IndexedNode,
}

impl<'g> NodeRef<'g> {
    pub fn index(&self) -> EvalIndex {
        self.index
    }

    pub fn graph(&self) -> &'g IndexedGraph {
        self.graph
    }

    pub fn kind(&self) -> &'g NodeKind {
        &self.node.kind
    }

    pub fn name(&self) -> Option<&'g str> {
        self.node.kind.name()
    }

    pub fn is_literal(&self) -> bool {
        self.node.kind.is_literal()
    }

    pub fn literal(&self) -> Option<&'g Literal> {
        self.node.kind.literal()
    }

    pub fn to_s(&self) -> &'g str {
        &self.node.sexpr
    }

    /// Merge graph node this was indexed from.
    pub fn source(&self) -> NodeId {
        self.node.source
    }

    pub fn children(&self) -> &'g [EvalIndex] {
        &self.node.children
    }

    pub fn num_children(&self) -> usize {
        self.node.children.len()
    }

    pub fn child(&self, n: usize) -> Option<EvalIndex> {
        self.node.children.get(n).copied()
    }

    pub fn child_ref(&self, n: usize) -> Option<NodeRef<'g>> {
        self.graph.get(self.child(n)?)
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("index", &self.index)
            .field("sexpr", &self.node.sexpr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_expression;
    use crate::test_support::opaque_factory;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn indexed_graph_is_shareable() {
        assert_send_sync::<IndexedGraph>();
    }

    #[test]
    fn indices_follow_breadth_first_order() {
        let factory = opaque_factory(&["f", "g", "h"]);
        let mut graph = MergeGraph::new();
        let a = parse_expression("(f (g 1) (h 2))", &factory, &mut graph).unwrap();
        graph.add_root(a).unwrap();
        let b = parse_expression("(h 2)", &factory, &mut graph).unwrap();
        graph.add_root(b).unwrap();

        let indexed = IndexedGraph::new(&graph).unwrap();
        let texts: Vec<&str> = indexed.nodes().map(|n| n.to_s()).collect();
        // Every root is queued before any child.
        assert_eq!(texts, vec!["(f (g 1) (h 2))", "(h 2)", "(g 1)", "2", "1"]);
        assert_eq!(indexed.root(RootId(0)), Some(EvalIndex(0)));
        assert_eq!(indexed.root(RootId(1)), Some(EvalIndex(1)));
        assert_eq!(indexed.root(RootId(2)), None);

        let root = indexed.node(EvalIndex(0));
        assert_eq!(root.children(), &[EvalIndex(2), EvalIndex(1)]);
        assert_eq!(root.child_ref(1).unwrap().name(), Some("h"));
        assert!(indexed.node(EvalIndex(3)).is_literal());
    }

    #[test]
    fn subtree_index_starts_at_its_root() {
        let factory = opaque_factory(&["f", "g"]);
        let mut graph = MergeGraph::new();
        let a = parse_expression("(f (g 'x'))", &factory, &mut graph).unwrap();
        graph.add_root(a).unwrap();
        let g = graph.find("(g 'x')").unwrap();

        let sub = IndexedGraph::from_subtree(&graph, g).unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.node(EvalIndex(0)).to_s(), "(g 'x')");
        assert_eq!(sub.roots(), &[EvalIndex(0)]);
    }
}
