//! MergeGraph: the live, deduplicated node set.
//!
//! Every live node is indexed by its canonical text, and no two live nodes
//! share a text. Trees are built detached (via [`MergeGraph::add_call`],
//! [`MergeGraph::add_literal`] and [`MergeGraph::add_child`]) and then merged
//! in with [`MergeGraph::add_root`] or [`MergeGraph::replace`]: any subtree
//! whose text is already known is swapped for the known node.
//!
//! Liveness is determined by the roots. A live node stays live while it is a
//! root or has a live parent; anything else is released. Released node ids
//! stay valid (and are remembered in the transform record) until
//! [`MergeGraph::clear_transform_record`].
//!
//! ## Edits and the text index
//!
//! Changing a live node's children changes its text and the text of every
//! ancestor. Each edit therefore unlearns the edited node and its live
//! ancestors, applies the change, and relearns them bottom-up. If a relearned
//! node now has the same text as another live node, it is merged into that
//! node; this can cascade upward.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::call::{Call, NodeKind};
use crate::dag::{Dag, NodeView};
use crate::error::CoreError;
use crate::factory::CallFactory;
use crate::id::{NodeId, RootId};
use crate::literal::Literal;
use crate::sexpr::SexprKey;

/// The mutable, configuration-time node graph.
#[derive(Debug, Default)]
pub struct MergeGraph {
    dag: Dag,
    by_sexpr: BTreeMap<SexprKey, NodeId>,
    live: HashSet<NodeId>,
    released: HashSet<NodeId>,
    roots: Vec<NodeId>,
    root_indices: HashMap<NodeId, BTreeSet<RootId>>,
    origins: HashMap<NodeId, IndexSet<String>>,
    transform_record: HashMap<NodeId, Option<NodeId>>,
}

impl MergeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying node arena.
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    // -----------------------------------------------------------------------
    // Building detached nodes
    // -----------------------------------------------------------------------

    /// Creates a detached literal node.
    pub fn add_literal(&mut self, literal: Literal) -> NodeId {
        self.dag.add_literal(literal)
    }

    /// Creates a detached call node.
    pub fn add_call(&mut self, call: Arc<dyn Call>) -> NodeId {
        self.dag.add_call(call)
    }

    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        self.dag.add_node(kind)
    }

    /// Builds a call through `factory` and creates a detached node for it.
    pub fn build(&mut self, factory: &CallFactory, name: &str) -> Result<NodeId, CoreError> {
        let call = factory.build(name)?;
        Ok(self.dag.add_call(call))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn view(&self, id: NodeId) -> Result<NodeView<'_>, CoreError> {
        self.dag.view(id)
    }

    pub fn to_s(&self, id: NodeId) -> Result<&str, CoreError> {
        self.dag.to_s(id)
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>, CoreError> {
        self.dag.view(id)?;
        Ok(self.dag.children(id).into_vec())
    }

    /// True if `id` is in the live set.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.live.contains(&id)
    }

    pub fn is_released(&self, id: NodeId) -> bool {
        self.released.contains(&id)
    }

    /// The live node structurally identical to `id`, if any.
    pub fn known(&self, id: NodeId) -> Option<NodeId> {
        if self.live.contains(&id) {
            return Some(id);
        }
        let text = self.dag.to_s(id).ok()?;
        self.find(text)
    }

    /// The live node whose canonical text is `text`.
    pub fn find(&self, text: &str) -> Option<NodeId> {
        self.by_sexpr.get(&SexprKey::new(text)).copied()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Live nodes in breadth-first order from the roots.
    pub fn live_nodes(&self) -> Vec<NodeId> {
        self.dag.bfs_down(self.roots.iter().copied())
    }

    /// The current node of a root index.
    pub fn root(&self, index: RootId) -> Result<NodeId, CoreError> {
        self.roots
            .get(index.0 as usize)
            .copied()
            .ok_or(CoreError::RootNotFound { id: index })
    }

    /// Current root nodes, indexed by [`RootId`].
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Every root index currently resolving to `id`.
    pub fn root_indices(&self, id: NodeId) -> Vec<RootId> {
        self.root_indices
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.root_indices.get(&id).is_some_and(|set| !set.is_empty())
    }

    // -----------------------------------------------------------------------
    // Roots and merging
    // -----------------------------------------------------------------------

    /// Merges the tree rooted at `node` and registers it as a root.
    ///
    /// The returned index is permanent and always resolves to the current
    /// root node, even after later replacements.
    pub fn add_root(&mut self, node: NodeId) -> Result<RootId, CoreError> {
        self.dag.view(node)?;
        if !self.live.contains(&node) && !self.dag.parents(node).is_empty() {
            return Err(CoreError::InvalidArgument {
                reason: format!("root node {node} already has parents"),
            });
        }
        let merged = self.merge_tree(node)?;
        let index = RootId(self.roots.len() as u32);
        self.roots.push(merged);
        self.root_indices.entry(merged).or_default().insert(index);
        tracing::trace!(root = %index, node = %merged, "root added");
        Ok(index)
    }

    /// Replaces the live node `which` with `with` everywhere: in every parent
    /// and every root index. `with` is merged first; the node actually used
    /// is returned. `which` is released unless something still uses it.
    pub fn replace(&mut self, which: NodeId, with: NodeId) -> Result<NodeId, CoreError> {
        if !self.live.contains(&which) {
            return Err(CoreError::NotLive { id: which });
        }
        self.require_attachable(with)?;

        let with = self.merge_tree(with)?;
        if with == which {
            return Ok(which);
        }
        let parents = self.live_parents(which);
        for &parent in &parents {
            if self.dag.reaches(with, parent) {
                self.release(with)?;
                return Err(CoreError::CycleDetected {
                    parent,
                    child: with,
                });
            }
        }

        tracing::trace!(
            which = %which,
            with = %with,
            "replacing {} with {}",
            self.dag.to_s(which)?,
            self.dag.to_s(with)?
        );

        let mut affected = vec![which];
        affected.extend(self.live_ancestors(which));
        self.unlearn_all(&affected)?;
        let mut result = Ok(());
        for &parent in &parents {
            result = self.dag.replace_child(parent, which, with);
            if result.is_err() {
                break;
            }
        }
        self.redirect_bookkeeping(which, with);
        self.relearn(&affected)?;
        result.map(|()| with)
    }

    fn require_attachable(&self, node: NodeId) -> Result<(), CoreError> {
        self.dag.view(node)?;
        if self.released.contains(&node) {
            return Err(CoreError::InvalidArgument {
                reason: format!("node {node} has been released"),
            });
        }
        if !self.live.contains(&node) && !self.dag.parents(node).is_empty() {
            return Err(CoreError::InvalidArgument {
                reason: format!("detached node {node} already has parents"),
            });
        }
        Ok(())
    }

    /// Merges the detached tree at `which` into the live set and returns the
    /// live node representing it.
    fn merge_tree(&mut self, which: NodeId) -> Result<NodeId, CoreError> {
        if self.released.contains(&which) {
            return Err(CoreError::InvalidArgument {
                reason: format!("node {which} has been released"),
            });
        }
        if self.live.contains(&which) {
            return Ok(which);
        }
        let known = self.find(self.dag.to_s(which)?);
        if let Some(known) = known {
            self.release(which)?;
            return Ok(known);
        }

        self.learn(which)?;
        let mut queue = VecDeque::from([which]);
        while let Some(parent) = queue.pop_front() {
            for child in self.dag.children(parent) {
                if self.live.contains(&child) {
                    continue;
                }
                if self.released.contains(&child) {
                    return Err(CoreError::InvalidArgument {
                        reason: format!("node {parent} references released node {child}"),
                    });
                }
                let known = self.find(self.dag.to_s(child)?);
                match known {
                    Some(known) => {
                        self.dag.replace_child(parent, child, known)?;
                        self.release(child)?;
                    }
                    None => {
                        self.learn(child)?;
                        queue.push_back(child);
                    }
                }
            }
        }
        Ok(which)
    }

    fn learn(&mut self, id: NodeId) -> Result<(), CoreError> {
        let key = SexprKey::new(self.dag.to_s(id)?);
        self.by_sexpr.insert(key, id);
        self.live.insert(id);
        Ok(())
    }

    /// Drops `id` from the text index under its current text.
    fn unlearn(&mut self, id: NodeId) -> Result<(), CoreError> {
        let key = SexprKey::new(self.dag.to_s(id)?);
        if self.by_sexpr.get(&key) == Some(&id) {
            self.by_sexpr.remove(&key);
        }
        Ok(())
    }

    fn unlearn_all(&mut self, nodes: &[NodeId]) -> Result<(), CoreError> {
        for &node in nodes {
            self.unlearn(node)?;
        }
        Ok(())
    }

    /// Reindexes `nodes` (a node and its ancestors) after an edit,
    /// descendants first, merging any node whose text now collides.
    fn relearn(&mut self, nodes: &[NodeId]) -> Result<(), CoreError> {
        let set: HashSet<NodeId> = nodes.iter().copied().collect();
        let order = self
            .dag
            .post_order_within(nodes.iter().copied(), |n| set.contains(&n));
        for node in order {
            if self.released.contains(&node) {
                continue;
            }
            if !self.is_kept(node) {
                self.release(node)?;
                continue;
            }
            let key = SexprKey::new(self.dag.to_s(node)?);
            match self.by_sexpr.get(&key).copied() {
                None => {
                    self.by_sexpr.insert(key, node);
                }
                Some(existing) if existing == node => {}
                Some(existing) => {
                    tracing::trace!(node = %node, into = %existing, "merging duplicate after edit");
                    for parent in self.live_parents(node) {
                        self.dag.replace_child(parent, node, existing)?;
                    }
                    self.redirect_bookkeeping(node, existing);
                    self.release(node)?;
                }
            }
        }
        Ok(())
    }

    /// Moves root indices and origins of `from` to `to` and records the
    /// transformation.
    fn redirect_bookkeeping(&mut self, from: NodeId, to: NodeId) {
        if let Some(indices) = self.root_indices.remove(&from) {
            for &index in &indices {
                if let Some(slot) = self.roots.get_mut(index.0 as usize) {
                    *slot = to;
                }
            }
            self.root_indices.entry(to).or_default().extend(indices);
        }
        if let Some(origins) = self.origins.remove(&from) {
            self.origins.entry(to).or_default().extend(origins);
        }
        self.transform_record.insert(from, Some(to));
    }

    /// Whether `node` still has a reason to exist.
    fn is_kept(&self, node: NodeId) -> bool {
        if self.is_root(node) {
            return true;
        }
        let live = self.live.contains(&node);
        self.dag.parents(node).iter().any(|parent| {
            if live {
                self.live.contains(parent)
            } else {
                !self.released.contains(parent)
            }
        })
    }

    /// Releases `start` if nothing keeps it, then any children left orphaned.
    fn release(&mut self, start: NodeId) -> Result<(), CoreError> {
        let mut work = vec![start];
        while let Some(node) = work.pop() {
            if self.released.contains(&node) || !self.dag.contains(node) || self.is_kept(node) {
                continue;
            }
            if self.live.remove(&node) {
                self.unlearn(node)?;
                self.transform_record.entry(node).or_insert(None);
                self.origins.remove(&node);
            }
            self.released.insert(node);
            work.extend(self.dag.clear_children(node));
        }
        Ok(())
    }

    fn live_parents(&self, id: NodeId) -> Vec<NodeId> {
        self.dag
            .unique_parents(id)
            .into_iter()
            .filter(|p| self.live.contains(p))
            .collect()
    }

    fn live_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        let mut order = Vec::new();
        while let Some(current) = queue.pop_front() {
            for parent in self.live_parents(current) {
                if seen.insert(parent) {
                    order.push(parent);
                    queue.push_back(parent);
                }
            }
        }
        order
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    /// Runs `edit` on the arena with `parent` and its ancestors unlearned.
    fn edit_live<F>(&mut self, parent: NodeId, edit: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut Dag) -> Result<(), CoreError>,
    {
        let mut affected = vec![parent];
        affected.extend(self.live_ancestors(parent));
        self.unlearn_all(&affected)?;
        let result = edit(&mut self.dag);
        self.relearn(&affected)?;
        result
    }

    /// Appends `child` to `parent`.
    ///
    /// On a detached parent this is a plain edit. On a live parent `child` is
    /// merged first and the text index is kept current.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), CoreError> {
        if self.released.contains(&parent) {
            return Err(CoreError::NotLive { id: parent });
        }
        if !self.live.contains(&parent) {
            return self.dag.add_child(parent, child);
        }
        self.require_attachable(child)?;
        let child = self.merge_tree(child)?;
        if self.dag.reaches(child, parent) {
            self.release(child)?;
            return Err(CoreError::CycleDetected { parent, child });
        }
        self.edit_live(parent, |dag| dag.add_child(parent, child))
    }

    /// Removes the first occurrence of `child` from `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), CoreError> {
        if self.released.contains(&parent) {
            return Err(CoreError::NotLive { id: parent });
        }
        if !self.live.contains(&parent) {
            return self.dag.remove_child(parent, child);
        }
        self.edit_live(parent, |dag| dag.remove_child(parent, child))?;
        self.release(child)
    }

    /// Replaces every occurrence of `old` among the children of `parent`.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> Result<(), CoreError> {
        if self.released.contains(&parent) {
            return Err(CoreError::NotLive { id: parent });
        }
        if !self.live.contains(&parent) {
            return self.dag.replace_child(parent, old, new);
        }
        self.require_attachable(new)?;
        let new = self.merge_tree(new)?;
        if new != old && self.dag.reaches(new, parent) {
            self.release(new)?;
            return Err(CoreError::CycleDetected { parent, child: new });
        }
        self.edit_live(parent, |dag| dag.replace_child(parent, old, new))?;
        self.release(old)
    }

    // -----------------------------------------------------------------------
    // Provenance and transform record
    // -----------------------------------------------------------------------

    /// Appends a provenance note to `node`. Duplicates are ignored.
    pub fn add_origin(&mut self, node: NodeId, origin: impl Into<String>) -> Result<(), CoreError> {
        self.dag.view(node)?;
        self.origins.entry(node).or_default().insert(origin.into());
        Ok(())
    }

    /// Provenance notes of `node`, in insertion order.
    pub fn origins(&self, node: NodeId) -> Vec<&str> {
        self.origins
            .get(&node)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Follows replacements from `source` to the node that now stands for
    /// it. Returns `None` if it was released without a replacement.
    pub fn find_transform(&self, source: NodeId) -> Result<Option<NodeId>, CoreError> {
        let mut current = source;
        for _ in 0..=self.transform_record.len() {
            match self.transform_record.get(&current) {
                Some(Some(next)) => current = *next,
                Some(None) => return Ok(None),
                None if self.live.contains(&current) => return Ok(Some(current)),
                None => return Err(CoreError::NodeNotFound { id: source }),
            }
        }
        Err(CoreError::GraphInconsistency {
            reason: format!("transform record loops from node {source}"),
        })
    }

    /// Forgets all recorded replacements and frees released nodes. Their ids
    /// may be reused afterwards.
    pub fn clear_transform_record(&mut self) {
        self.transform_record.clear();
        for node in self.released.drain() {
            self.dag.remove_node(node);
        }
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    /// Writes the text index, roots and origins.
    pub fn write_debug_report<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "roots:")?;
        for (index, root) in self.roots.iter().enumerate() {
            let text = self.dag.to_s(*root).unwrap_or("<missing>");
            writeln!(out, "  {index}: [{root}] {text}")?;
        }
        writeln!(out, "nodes:")?;
        for (key, id) in &self.by_sexpr {
            write!(out, "  [{id}] {key}")?;
            let origins = self.origins(*id);
            if !origins.is_empty() {
                write!(out, " <- {}", origins.join(", "))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Checks internal consistency, writing one line per problem found.
    /// Returns `true` if the graph is consistent.
    pub fn write_validation_report<W: fmt::Write>(&self, out: &mut W) -> Result<bool, fmt::Error> {
        let mut ok = true;

        for (key, &id) in &self.by_sexpr {
            if !self.live.contains(&id) {
                ok = false;
                writeln!(out, "indexed node {id} is not live: {key}")?;
                continue;
            }
            match self.dag.to_s(id) {
                Ok(text) if text == key.as_str() => {}
                Ok(text) => {
                    ok = false;
                    writeln!(out, "node {id} indexed as {key} but reads {text}")?;
                }
                Err(_) => {
                    ok = false;
                    writeln!(out, "indexed node {id} does not exist")?;
                }
            }
        }

        let reachable: HashSet<NodeId> = self.live_nodes().into_iter().collect();
        for &id in &self.live {
            if !reachable.contains(&id) {
                ok = false;
                writeln!(out, "live node {id} is unreachable from the roots")?;
            }
            match self.dag.to_s(id) {
                Ok(text) if self.find(text) == Some(id) => {}
                Ok(text) => {
                    ok = false;
                    writeln!(out, "live node {id} is not indexed: {text}")?;
                }
                Err(_) => {
                    ok = false;
                    writeln!(out, "live node {id} does not exist")?;
                }
            }
        }
        for &id in &reachable {
            if !self.live.contains(&id) {
                ok = false;
                writeln!(out, "reachable node {id} is not live")?;
            }
        }

        for (index, &root) in self.roots.iter().enumerate() {
            let index = RootId(index as u32);
            if !self.root_indices.get(&root).is_some_and(|set| set.contains(&index)) {
                ok = false;
                writeln!(out, "root {index} -> {root} missing from root index map")?;
            }
        }
        for (node, indices) in &self.root_indices {
            for index in indices {
                if self.roots.get(index.0 as usize) != Some(node) {
                    ok = false;
                    writeln!(out, "root index map lists {index} for {node}, which is not that root")?;
                }
            }
        }

        if self.dag.is_cyclic() {
            ok = false;
            writeln!(out, "graph contains a cycle")?;
        }
        Ok(ok)
    }
}
