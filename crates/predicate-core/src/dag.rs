//! Node arena backing the merge graph.
//!
//! Nodes live in a petgraph `StableGraph` so ids stay valid across removals.
//! Edges point parent -> child and carry the child's position; a node's
//! children are its outgoing edges sorted by position, and its parents are
//! its incoming edges (one per occurrence, so a parent using the same child
//! twice appears twice).
//!
//! Each node caches its canonical text. Editing a node's children clears its
//! cache and every ancestor's cache. Filling a cache always fills every
//! descendant's cache first, so an empty cache implies every ancestor's cache
//! is empty too, and invalidation stops as soon as it meets one.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, OnceLock};

use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use smallvec::SmallVec;

use crate::call::{Call, NodeKind};
use crate::error::CoreError;
use crate::id::NodeId;
use crate::literal::Literal;

/// Ordered children of one node.
pub type Children = SmallVec<[NodeId; 4]>;

/// Edge weight: position of the child in its parent's argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildEdge {
    pub position: u32,
}

#[derive(Debug)]
struct NodeSlot {
    kind: NodeKind,
    sexpr: OnceLock<String>,
}

/// Arena of nodes and ordered child edges.
#[derive(Debug, Default)]
pub struct Dag {
    graph: StableGraph<NodeSlot, ChildEdge>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    pub(crate) fn add_node(&mut self, kind: NodeKind) -> NodeId {
        NodeId::from(self.graph.add_node(NodeSlot {
            kind,
            sexpr: OnceLock::new(),
        }))
    }

    pub(crate) fn add_literal(&mut self, literal: Literal) -> NodeId {
        self.add_node(NodeKind::Literal(literal))
    }

    pub(crate) fn add_call(&mut self, call: Arc<dyn Call>) -> NodeId {
        self.add_node(NodeKind::Call(call))
    }

    /// Removes a node and its edges. Former parents are invalidated.
    pub(crate) fn remove_node(&mut self, id: NodeId) -> Option<NodeKind> {
        let parents = self.parents(id);
        for parent in parents {
            self.invalidate(parent);
        }
        self.graph.remove_node(id.into()).map(|slot| slot.kind)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.contains_node(id.into())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices().map(NodeId::from)
    }

    pub fn kind(&self, id: NodeId) -> Result<&NodeKind, CoreError> {
        Ok(&self.slot(id)?.kind)
    }

    pub fn view(&self, id: NodeId) -> Result<NodeView<'_>, CoreError> {
        let slot = self.slot(id)?;
        Ok(NodeView { dag: self, id, slot })
    }

    fn slot(&self, id: NodeId) -> Result<&NodeSlot, CoreError> {
        self.graph
            .node_weight(id.into())
            .ok_or(CoreError::NodeNotFound { id })
    }

    // -----------------------------------------------------------------------
    // Canonical text
    // -----------------------------------------------------------------------

    /// Canonical text of a node, computed on first use and cached.
    pub fn to_s(&self, id: NodeId) -> Result<&str, CoreError> {
        let slot = self.slot(id)?;
        Ok(slot.sexpr.get_or_init(|| self.render(id, &slot.kind)))
    }

    fn render(&self, id: NodeId, kind: &NodeKind) -> String {
        match kind {
            NodeKind::Literal(lit) => lit.to_s(),
            NodeKind::Call(call) => {
                let mut text = String::from("(");
                text.push_str(call.name());
                for child in self.children(id) {
                    text.push(' ');
                    // Edges only connect existing nodes.
                    text.push_str(self.to_s(child).unwrap_or_default());
                }
                text.push(')');
                text
            }
        }
    }

    /// Clears the cached text of `id` and of every ancestor.
    fn invalidate(&mut self, id: NodeId) {
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            let Some(slot) = self.graph.node_weight_mut(current.into()) else {
                continue;
            };
            if slot.sexpr.take().is_none() && current != id {
                continue;
            }
            queue.extend(self.parents(current));
        }
    }

    /// Whether the cached text of `id` is currently filled.
    #[cfg(test)]
    fn is_cached(&self, id: NodeId) -> bool {
        self.graph
            .node_weight(id.into())
            .is_some_and(|slot| slot.sexpr.get().is_some())
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Children of `id` in argument order.
    pub fn children(&self, id: NodeId) -> Children {
        let mut edges: SmallVec<[(u32, NodeId); 4]> = self
            .graph
            .edges_directed(id.into(), Direction::Outgoing)
            .map(|e| (e.weight().position, NodeId::from(e.target())))
            .collect();
        edges.sort_unstable_by_key(|(position, _)| *position);
        edges.into_iter().map(|(_, child)| child).collect()
    }

    pub fn num_children(&self, id: NodeId) -> usize {
        self.graph
            .edges_directed(id.into(), Direction::Outgoing)
            .count()
    }

    /// Parents of `id`, one entry per edge.
    pub fn parents(&self, id: NodeId) -> Vec<NodeId> {
        self.graph
            .edges_directed(id.into(), Direction::Incoming)
            .map(|e| NodeId::from(e.source()))
            .collect()
    }

    /// Distinct parents of `id`.
    pub fn unique_parents(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.parents(id)
            .into_iter()
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// True if `to` is reachable from `from` (including `from == to`).
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        has_path_connecting(&self.graph, from.into(), to.into(), None)
    }

    fn check_call(&self, parent: NodeId) -> Result<Arc<dyn Call>, CoreError> {
        match self.kind(parent)? {
            NodeKind::Call(call) => Ok(Arc::clone(call)),
            NodeKind::Literal(_) => Err(CoreError::InvalidArgument {
                reason: format!("literal node {parent} cannot have children"),
            }),
        }
    }

    /// Appends `child` to the children of `parent`.
    pub(crate) fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), CoreError> {
        let call = self.check_call(parent)?;
        self.slot(child)?;
        if self.reaches(child, parent) {
            return Err(CoreError::CycleDetected { parent, child });
        }
        let position = self.num_children(parent) as u32;
        self.graph
            .add_edge(parent.into(), child.into(), ChildEdge { position });
        self.invalidate(parent);
        call.children_changed();
        Ok(())
    }

    /// Removes the first occurrence of `child` from the children of `parent`.
    pub(crate) fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), CoreError> {
        let call = self.check_call(parent)?;
        let found = self
            .graph
            .edges_directed(parent.into(), Direction::Outgoing)
            .filter(|e| e.target() == NodeIndex::from(child))
            .min_by_key(|e| e.weight().position)
            .map(|e| (e.id(), e.weight().position));
        let Some((edge, removed)) = found else {
            return Err(CoreError::InvalidArgument {
                reason: format!("node {child} is not a child of node {parent}"),
            });
        };
        self.graph.remove_edge(edge);

        let later: Vec<_> = self
            .graph
            .edges_directed(parent.into(), Direction::Outgoing)
            .filter(|e| e.weight().position > removed)
            .map(|e| e.id())
            .collect();
        for edge in later {
            if let Some(weight) = self.graph.edge_weight_mut(edge) {
                weight.position -= 1;
            }
        }
        self.invalidate(parent);
        call.children_changed();
        Ok(())
    }

    /// Replaces every occurrence of `old` among the children of `parent`
    /// with `new`, keeping positions.
    pub(crate) fn replace_child(
        &mut self,
        parent: NodeId,
        old: NodeId,
        new: NodeId,
    ) -> Result<(), CoreError> {
        let call = self.check_call(parent)?;
        self.slot(new)?;
        let edges: Vec<_> = self
            .graph
            .edges_directed(parent.into(), Direction::Outgoing)
            .filter(|e| e.target() == NodeIndex::from(old))
            .map(|e| (e.id(), *e.weight()))
            .collect();
        if edges.is_empty() {
            return Err(CoreError::InvalidArgument {
                reason: format!("node {old} is not a child of node {parent}"),
            });
        }
        if old == new {
            return Ok(());
        }
        if self.reaches(new, parent) {
            return Err(CoreError::CycleDetected { parent, child: new });
        }
        for (edge, weight) in edges {
            self.graph.remove_edge(edge);
            self.graph.add_edge(parent.into(), new.into(), weight);
        }
        self.invalidate(parent);
        call.children_changed();
        Ok(())
    }

    /// Drops every outgoing edge of `id`, returning the former children.
    pub(crate) fn clear_children(&mut self, id: NodeId) -> Children {
        let children = self.children(id);
        let edges: Vec<_> = self
            .graph
            .edges_directed(id.into(), Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        for edge in edges {
            self.graph.remove_edge(edge);
        }
        if !children.is_empty() {
            self.invalidate(id);
            if let Ok(NodeKind::Call(call)) = self.kind(id) {
                call.children_changed();
            }
        }
        children
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Breadth-first walk down from `roots`, children in argument order.
    /// Each node appears once.
    pub fn bfs_down(&self, roots: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for root in roots {
            if self.contains(root) && seen.insert(root) {
                queue.push_back(root);
            }
        }
        let mut order = Vec::new();
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for child in self.children(id) {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        order
    }

    /// Breadth-first walk up from `start` (excluded) through every ancestor.
    pub fn ancestors(&self, start: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut order = Vec::new();
        while let Some(id) = queue.pop_front() {
            for parent in self.parents(id) {
                if seen.insert(parent) {
                    order.push(parent);
                    queue.push_back(parent);
                }
            }
        }
        order
    }

    /// Post-order walk down from `roots`: every node after all of its
    /// descendants. Each node appears once.
    pub fn post_order(&self, roots: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
        self.post_order_within(roots, |_| true)
    }

    /// Post-order walk that only descends into nodes accepted by `keep`.
    pub fn post_order_within(
        &self,
        roots: impl IntoIterator<Item = NodeId>,
        keep: impl Fn(NodeId) -> bool,
    ) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for root in roots {
            if !self.contains(root) || !keep(root) || !seen.insert(root) {
                continue;
            }
            let mut stack: Vec<(NodeId, Children, usize)> = vec![(root, self.children(root), 0)];
            while let Some((id, children, next)) = stack.last_mut() {
                if let Some(&child) = children.get(*next) {
                    *next += 1;
                    if keep(child) && seen.insert(child) {
                        let grandchildren = self.children(child);
                        stack.push((child, grandchildren, 0));
                    }
                } else {
                    order.push(*id);
                    stack.pop();
                }
            }
        }
        order
    }

    /// True if any node can reach itself.
    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }
}

// ---------------------------------------------------------------------------
// NodeView
// ---------------------------------------------------------------------------

/// Read-only view of one node in a [`Dag`].
#[derive(Clone, Copy)]
pub struct NodeView<'g> {
    dag: &'g Dag,
    id: NodeId,
    slot: &'g NodeSlot,
}

impl<'g> NodeView<'g> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &'g NodeKind {
        &self.slot.kind
    }

    pub fn name(&self) -> Option<&'g str> {
        self.slot.kind.name()
    }

    pub fn is_literal(&self) -> bool {
        self.slot.kind.is_literal()
    }

    pub fn literal(&self) -> Option<&'g Literal> {
        self.slot.kind.literal()
    }

    pub fn to_s(&self) -> &'g str {
        let (dag, id, kind) = (self.dag, self.id, &self.slot.kind);
        self.slot.sexpr.get_or_init(|| dag.render(id, kind))
    }

    pub fn num_children(&self) -> usize {
        self.dag.num_children(self.id)
    }

    /// Children in argument order.
    pub fn children(&self) -> Vec<NodeView<'g>> {
        let dag = self.dag;
        dag.children(self.id)
            .into_iter()
            .filter_map(|id| dag.view(id).ok())
            .collect()
    }

    pub fn child(&self, n: usize) -> Option<NodeView<'g>> {
        let id = *self.dag.children(self.id).get(n)?;
        self.dag.view(id).ok()
    }

    pub fn num_parents(&self) -> usize {
        self.dag.parents(self.id).len()
    }
}

impl std::fmt::Debug for NodeView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeView")
            .field("id", &self.id)
            .field("sexpr", &self.to_s())
            .finish()
    }
}
