//! Structural edits.
//!
//! Every public operation checks its preconditions before touching any link.
//! The mutation then runs inside [`PhyloTree::apply`], which recounts the
//! attached nodes and leaves afterwards and rolls the arena back if the counts
//! disagree with what the operation promised.

use crate::error::{PhyloError, PhyloResult};

use super::node::{next_arena, sum_lengths, NodeId, PhyloNode};
use super::traverse::Order;
use super::tree::PhyloTree;

/// What happens to the old root when rerooting leaves it with one child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OldRootPolicy {
    /// Splice it out, summing its two incident branch lengths.
    Collapse,
    /// Keep it as a degree-2 node.
    Retain,
}

/// Whether [`PhyloTree::reroot`] accepts a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafRootPolicy {
    /// Fail with `LeafRoot`; leaf counts never change on reroot.
    Reject,
    /// The leaf becomes a root with one child. It then has a child, so the
    /// leaf count drops by one.
    Allow,
}

/// What happens to a parent that a prune leaves with a single child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryPolicy {
    Remove,
    Keep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraftMode {
    /// Append as the last child of the target.
    Child,
    /// Split the target's incoming edge at its midpoint and hang the subtree
    /// off the new internal node.
    SplitEdge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EditConfig {
    pub old_root: OldRootPolicy,
    pub unary: UnaryPolicy,
    pub leaf_root: LeafRootPolicy,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            old_root: OldRootPolicy::Collapse,
            unary: UnaryPolicy::Remove,
            leaf_root: LeafRootPolicy::Reject,
        }
    }
}

impl EditConfig {
    /// Strictly-rooted semantics: nodes are never spliced out implicitly.
    pub fn strict() -> Self {
        Self {
            old_root: OldRootPolicy::Retain,
            unary: UnaryPolicy::Keep,
            leaf_root: LeafRootPolicy::Reject,
        }
    }

    pub fn with_old_root(mut self, policy: OldRootPolicy) -> Self {
        self.old_root = policy;
        self
    }

    pub fn with_unary(mut self, policy: UnaryPolicy) -> Self {
        self.unary = policy;
        self
    }

    pub fn with_leaf_root(mut self, policy: LeafRootPolicy) -> Self {
        self.leaf_root = policy;
        self
    }
}

/// Node and leaf counts an edit promises to leave behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Expected {
    nodes: usize,
    leaves: usize,
}

impl PhyloTree {
    fn expected(&self) -> Expected {
        Expected {
            nodes: self.node_count,
            leaves: self.leaf_count,
        }
    }

    fn apply<T>(
        &mut self,
        op: &'static str,
        mutate: impl FnOnce(&mut Self, &mut Expected) -> T,
    ) -> PhyloResult<T> {
        let backup = (self.nodes.clone(), self.root, self.rooted);
        let mut expected = self.expected();
        let value = mutate(self, &mut expected);

        let (nodes, leaves) = self.recount();
        if nodes != expected.nodes || leaves != expected.leaves {
            (self.nodes, self.root, self.rooted) = backup;
            tracing::debug!(op, nodes, leaves, ?expected, "edit rolled back");
            return Err(PhyloError::InvariantViolated {
                op,
                msg: format!(
                    "expected {} nodes / {} leaves, found {nodes} / {leaves}",
                    expected.nodes, expected.leaves
                ),
            });
        }
        self.node_count = nodes;
        self.leaf_count = leaves;
        tracing::debug!(op, nodes, leaves, "edit applied");
        Ok(value)
    }

    fn subtree_counts(&self, id: NodeId) -> (usize, usize) {
        let mut nodes = 0;
        let mut leaves = 0;
        for n in self.traverse_from(id, Order::PreOrder) {
            nodes += 1;
            if self.node(n).is_leaf() {
                leaves += 1;
            }
        }
        (nodes, leaves)
    }

    fn check_internal(&self, id: NodeId) -> PhyloResult<&PhyloNode> {
        self.ensure_attached(id)?;
        let node = self.node(id);
        if node.is_leaf() {
            return Err(PhyloError::CollapseDegree {
                node: id,
                reason: "it is a leaf",
            });
        }
        Ok(node)
    }

    fn child_position(&self, parent: NodeId, child: NodeId) -> usize {
        self.node(parent)
            .children
            .iter()
            .position(|&c| c == child)
            .unwrap_or_else(|| panic!("{child} is not a child of {parent}"))
    }

    fn unlink(&mut self, child: NodeId) {
        if let Some(parent) = self.node(child).parent {
            let at = self.child_position(parent, child);
            self.node_mut(parent).children.remove(at);
        }
        self.node_mut(child).parent = None;
    }

    /// Removes a node with exactly one child, merging its two edges.
    fn splice_out(&mut self, id: NodeId) {
        let child = self.node(id).children[0];
        let merged = sum_lengths(self.node(id).branch_length, self.node(child).branch_length);
        match self.node(id).parent {
            Some(parent) => {
                let at = self.child_position(parent, id);
                self.node_mut(parent).children[at] = child;
                let c = self.node_mut(child);
                c.parent = Some(parent);
                c.branch_length = merged;
            }
            None => {
                let c = self.node_mut(child);
                c.parent = None;
                c.branch_length = None;
                self.root = child;
            }
        }
        self.free(id);
    }

    /// Inserts a new node on the edge above `target`, halving its length.
    fn split_edge(&mut self, target: NodeId) -> NodeId {
        let parent = self.node(target).parent;
        let length = self.node(target).branch_length;
        let mid = self.alloc(PhyloNode::empty());
        match parent {
            Some(parent) => {
                let at = self.child_position(parent, target);
                self.node_mut(parent).children[at] = mid;
                let half = length.map(|l| l / 2.0);
                let m = self.node_mut(mid);
                m.parent = Some(parent);
                m.branch_length = half;
                self.node_mut(target).branch_length = half;
            }
            None => {
                self.node_mut(target).branch_length = None;
                self.node_mut(mid).branch_length = length;
                self.root = mid;
            }
        }
        self.node_mut(mid).children.push(target);
        self.node_mut(target).parent = Some(mid);
        mid
    }

    /// Reverses every edge on `path` (new root first, old root last). An old
    /// root left with one child is spliced out when `collapse` is set.
    fn reverse_path(&mut self, path: &[NodeId], collapse: bool, expected: &mut Expected) {
        let k = path.len() - 1;
        let edges: Vec<(Option<f64>, Option<f64>)> = path[..k]
            .iter()
            .map(|&n| (self.node(n).branch_length, self.node(n).support))
            .collect();

        for (i, &(length, support)) in edges.iter().enumerate() {
            let (child, parent) = (path[i], path[i + 1]);
            let at = self.child_position(parent, child);
            self.node_mut(parent).children.remove(at);
            self.node_mut(child).children.push(parent);
            let p = self.node_mut(parent);
            p.parent = Some(child);
            p.branch_length = length;
            p.support = support;
        }

        let new_root = self.node_mut(path[0]);
        new_root.parent = None;
        new_root.branch_length = None;
        new_root.support = None;
        self.root = path[0];

        let old_root = path[k];
        match self.node(old_root).children.len() {
            0 => {
                self.unlink(old_root);
                self.free(old_root);
                expected.nodes -= 1;
            }
            1 if collapse => {
                self.splice_out(old_root);
                expected.nodes -= 1;
            }
            _ => {}
        }
    }

    /// Makes `node` the root by reversing the edges on its path to the old root.
    ///
    /// A leaf is rejected unless [`EditConfig::leaf_root`] allows it.
    pub fn reroot(&mut self, node: NodeId) -> PhyloResult<()> {
        self.ensure_attached(node)?;
        if node == self.root {
            return Ok(());
        }
        let was_leaf = self.node(node).is_leaf();
        if was_leaf && self.config.leaf_root == LeafRootPolicy::Reject {
            return Err(PhyloError::LeafRoot { node });
        }
        let path = self.path_to_root(node);
        let collapse = self.config.old_root == OldRootPolicy::Collapse;
        self.apply("reroot", |tree, expected| {
            tree.reverse_path(&path, collapse, expected);
            if was_leaf && !tree.node(node).is_leaf() {
                expected.leaves -= 1;
            }
        })
    }

    /// Places a new binary root at the midpoint of the edge above `node`.
    ///
    /// The old root is spliced out whenever it is left with one child,
    /// whatever [`EditConfig::old_root`] says: the new root already accounts
    /// for the edge it sat on.
    pub fn reroot_above(&mut self, node: NodeId) -> PhyloResult<NodeId> {
        self.ensure_attached(node)?;
        if node == self.root {
            return Err(PhyloError::RootOperation { op: "reroot above" });
        }
        self.apply("reroot_above", |tree, expected| {
            let mid = tree.split_edge(node);
            expected.nodes += 1;
            let path = tree.path_to_root(mid);
            tree.reverse_path(&path, true, expected);
            tree.rooted = true;
            mid
        })
    }

    /// Gives a root with more than two children a binary root above its
    /// first child. Returns whether the tree changed.
    pub fn make_rooted(&mut self) -> PhyloResult<bool> {
        let root = self.node(self.root);
        if root.children.len() <= 2 {
            return Ok(false);
        }
        let first = root.children[0];
        self.reroot_above(first)?;
        Ok(true)
    }

    /// Detaches `node` with its subtree. The returned id stays valid as a
    /// detached subtree that can be grafted back or extracted.
    pub fn prune(&mut self, node: NodeId) -> PhyloResult<NodeId> {
        self.ensure_attached(node)?;
        if node == self.root {
            return Err(PhyloError::RootOperation { op: "prune" });
        }
        let (sub_nodes, sub_leaves) = self.subtree_counts(node);
        self.apply("prune", |tree, expected| {
            expected.nodes -= sub_nodes;
            expected.leaves -= sub_leaves;
            let mut parent = tree.node(node).parent;
            tree.unlink(node);

            // childless ancestors would turn into spurious leaves
            while let Some(p) = parent {
                if !tree.node(p).children.is_empty() {
                    break;
                }
                if p == tree.root {
                    expected.leaves += 1;
                    break;
                }
                parent = tree.node(p).parent;
                tree.unlink(p);
                tree.free(p);
                expected.nodes -= 1;
            }

            if let Some(p) = parent {
                if tree.node(p).children.len() == 1 && tree.config.unary == UnaryPolicy::Remove {
                    tree.splice_out(p);
                    expected.nodes -= 1;
                }
            }
            node
        })
    }

    /// Attaches the detached subtree rooted at `node` to `target`.
    ///
    /// Returns the node the subtree now hangs from: `target` itself, or the
    /// new internal node created by [`GraftMode::SplitEdge`].
    pub fn graft(&mut self, node: NodeId, target: NodeId, mode: GraftMode) -> PhyloResult<NodeId> {
        self.slot(node)?;
        self.slot(target)?;
        if self.node(node).parent.is_some() || node == self.root {
            return Err(PhyloError::NodeAttached { node });
        }
        if target == node || self.ancestors(target).any(|a| a == node) {
            return Err(PhyloError::GraftCycle { node, target });
        }
        self.ensure_attached(target)?;

        let (sub_nodes, sub_leaves) = self.subtree_counts(node);
        self.apply("graft", |tree, expected| {
            expected.nodes += sub_nodes;
            expected.leaves += sub_leaves;
            let anchor = match mode {
                GraftMode::Child => {
                    if tree.node(target).is_leaf() {
                        expected.leaves -= 1;
                    }
                    target
                }
                GraftMode::SplitEdge => {
                    expected.nodes += 1;
                    tree.split_edge(target)
                }
            };
            tree.node_mut(anchor).children.push(node);
            tree.node_mut(node).parent = Some(anchor);
            anchor
        })
    }

    /// Moves the nodes of `other` into this arena and grafts its root under
    /// `target`. Returns the id of the imported root.
    pub fn graft_tree(
        &mut self,
        other: PhyloTree,
        target: NodeId,
        mode: GraftMode,
    ) -> PhyloResult<NodeId> {
        self.ensure_attached(target)?;
        let imported = self.import(&other, other.root());
        self.graft(imported, target, mode)?;
        Ok(imported)
    }

    // Copies the subtree of `other` below `top` into this arena as a detached component.
    fn import(&mut self, other: &PhyloTree, top: NodeId) -> NodeId {
        let mut mapped: Vec<Option<NodeId>> = vec![None; other.nodes.len()];
        for id in other.traverse_from(top, Order::PreOrder) {
            let src = other.node(id);
            let mut copy = PhyloNode::from_data(src.data());
            copy.parent = if id == top {
                None
            } else {
                src.parent.and_then(|p| mapped[p.index()])
            };
            let new_id = self.alloc(copy);
            mapped[id.index()] = Some(new_id);
            if let Some(parent) = self.node(new_id).parent {
                self.node_mut(parent).children.push(new_id);
            }
        }
        mapped[top.index()].unwrap_or_else(|| panic!("subtree top {top} was not copied"))
    }

    /// Copies the subtree below `node` (attached or detached) into a new tree.
    pub fn extract_subtree(&self, node: NodeId) -> PhyloResult<PhyloTree> {
        self.slot(node)?;
        let arena = next_arena();
        let mut out = PhyloTree {
            arena,
            nodes: Vec::new(),
            root: NodeId::new(arena, 0),
            rooted: false,
            config: self.config,
            node_count: 0,
            leaf_count: 0,
        };
        out.root = out.import(self, node);
        out.rooted = out.node(out.root).children.len() == 2;
        let (nodes, leaves) = out.recount();
        out.node_count = nodes;
        out.leaf_count = leaves;
        Ok(out)
    }

    /// Frees a detached subtree.
    pub fn discard(&mut self, node: NodeId) -> PhyloResult<()> {
        self.slot(node)?;
        if self.node(node).parent.is_some() || self.contains(node) {
            return Err(PhyloError::NodeAttached { node });
        }
        let doomed: Vec<NodeId> = self.traverse_from(node, Order::PostOrder).collect();
        for id in doomed {
            self.free(id);
        }
        Ok(())
    }

    /// Removes an internal node of degree at most two, joining its neighbours.
    pub fn collapse(&mut self, node: NodeId) -> PhyloResult<()> {
        let n = self.check_internal(node)?;
        if n.degree() > 2 {
            return Err(PhyloError::CollapseDegree {
                node,
                reason: "degree is above 2",
            });
        }
        if n.parent.is_some() || n.children.len() == 1 {
            return self.apply("collapse", |tree, expected| {
                tree.splice_out(node);
                expected.nodes -= 1;
            });
        }

        // degree-2 root: the first internal child takes over
        let children = n.children.clone();
        let Some(&heir) = children.iter().find(|&&c| !self.node(c).is_leaf()) else {
            return Err(PhyloError::CollapseDegree {
                node,
                reason: "both children are leaves",
            });
        };
        let other = children[usize::from(children[0] == heir)];
        self.apply("collapse", |tree, expected| {
            let merged = sum_lengths(
                tree.node(heir).branch_length,
                tree.node(other).branch_length,
            );
            let h = tree.node_mut(heir);
            h.parent = None;
            h.branch_length = None;
            h.children.push(other);
            let o = tree.node_mut(other);
            o.parent = Some(heir);
            o.branch_length = merged;
            tree.root = heir;
            tree.rooted = false;
            tree.free(node);
            expected.nodes -= 1;
        })
    }

    /// Contracts the edge above an internal node; its children move up to the
    /// parent in place of it.
    pub fn collapse_edge(&mut self, node: NodeId) -> PhyloResult<()> {
        self.check_internal(node)?;
        if node == self.root {
            return Err(PhyloError::RootOperation {
                op: "collapse the edge above",
            });
        }
        self.apply("collapse_edge", |tree, expected| {
            tree.contract(node);
            expected.nodes -= 1;
        })
    }

    fn contract(&mut self, node: NodeId) {
        let Some(parent) = self.node(node).parent else {
            return;
        };
        let at = self.child_position(parent, node);
        let children = std::mem::take(&mut self.node_mut(node).children);
        for &c in &children {
            self.node_mut(c).parent = Some(parent);
        }
        self.node_mut(parent).children.splice(at..=at, children);
        self.free(node);
    }

    /// Contracts every internal edge whose support is below `min_support`.
    /// Edges without a support value are kept. Returns the number contracted.
    pub fn collapse_weak_edges(&mut self, min_support: f64) -> PhyloResult<usize> {
        let weak: Vec<NodeId> = self
            .postorder()
            .filter(|&n| {
                let node = self.node(n);
                n != self.root
                    && !node.is_leaf()
                    && node.support.is_some_and(|s| s < min_support)
            })
            .collect();
        if weak.is_empty() {
            return Ok(0);
        }
        self.apply("collapse_weak_edges", |tree, expected| {
            for &n in &weak {
                tree.contract(n);
                expected.nodes -= 1;
            }
            weak.len()
        })
    }

    /// Resolves every polytomy into a cascade of binary nodes joined by
    /// zero-length edges. Returns whether anything changed.
    pub fn make_binary(&mut self) -> PhyloResult<bool> {
        let wide: Vec<NodeId> = self
            .postorder()
            .filter(|&n| self.node(n).children.len() > 2)
            .collect();
        if wide.is_empty() {
            return Ok(false);
        }
        self.apply("make_binary", |tree, expected| {
            for n in wide {
                while tree.node(n).children.len() > 2 {
                    let pair: Vec<NodeId> = tree.node_mut(n).children.drain(..2).collect();
                    let mut joined = PhyloNode::empty();
                    joined.branch_length = Some(0.0);
                    joined.parent = Some(n);
                    joined.children = pair.clone();
                    let id = tree.alloc(joined);
                    for c in pair {
                        tree.node_mut(c).parent = Some(id);
                    }
                    tree.node_mut(n).children.insert(0, id);
                    expected.nodes += 1;
                }
            }
            true
        })
    }
}
