use std::ops::Index;

use rand::{Rng, RngExt};

use crate::error::{PhyloError, PhyloResult};

use super::edit::EditConfig;
use super::node::{next_arena, Annotations, NodeData, NodeId, PhyloNode};
use super::traverse::Order;

/// Arena-backed phylogenetic tree.
///
/// Nodes live in slots addressed by [`NodeId`]. Slots of removed nodes stay
/// empty so that outstanding ids never alias a different node, and ids issued
/// by another tree are rejected. The arena may
/// also hold detached subtrees (see [`PhyloTree::prune`] and
/// [`PhyloTree::add_node`]); those do not count towards `num_nodes` or
/// `num_leaves` until they are grafted.
#[derive(Debug, Clone)]
pub struct PhyloTree {
    pub(crate) arena: u64,
    pub(crate) nodes: Vec<Option<PhyloNode>>,
    pub(crate) root: NodeId,
    pub(crate) rooted: bool,
    pub(crate) config: EditConfig,
    pub(crate) node_count: usize,
    pub(crate) leaf_count: usize,
}

impl Default for PhyloTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PhyloTree {
    /// A tree made of a single unlabeled root.
    pub fn new() -> Self {
        let arena = next_arena();
        Self {
            arena,
            nodes: vec![Some(PhyloNode::empty())],
            root: NodeId::new(arena, 0),
            rooted: false,
            config: EditConfig::default(),
            node_count: 1,
            leaf_count: 1,
        }
    }

    /// Random rooted binary tree over `labels`: two random subtrees are
    /// joined under a new node until one remains. Branch lengths are left
    /// unspecified and labels are not checked for duplicates. An empty label
    /// list gives [`PhyloTree::new`].
    pub fn random<S, R>(labels: &[S], rng: &mut R) -> Self
    where
        S: AsRef<str>,
        R: Rng + ?Sized,
    {
        if labels.is_empty() {
            return Self::new();
        }
        let arena = next_arena();
        let mut nodes: Vec<PhyloNode> = labels
            .iter()
            .map(|label| PhyloNode::from_data(NodeData::leaf(label.as_ref(), None)))
            .collect();
        let mut pool: Vec<usize> = (0..nodes.len()).collect();
        while pool.len() > 1 {
            let a = pool.swap_remove(rng.random_range(0..pool.len()));
            let b = pool.swap_remove(rng.random_range(0..pool.len()));
            let joined = nodes.len();
            let mut node = PhyloNode::empty();
            node.children = vec![NodeId::new(arena, a), NodeId::new(arena, b)];
            nodes.push(node);
            nodes[a].parent = Some(NodeId::new(arena, joined));
            nodes[b].parent = Some(NodeId::new(arena, joined));
            pool.push(joined);
        }
        let root = NodeId::new(arena, pool[0]);
        let tree = Self::from_arena(arena, nodes, root, labels.len() > 1);
        tracing::trace!(leaves = tree.num_leaves(), "built random tree");
        tree
    }

    /// Wraps nodes whose links were all issued under `arena`.
    pub(crate) fn from_arena(
        arena: u64,
        nodes: Vec<PhyloNode>,
        root: NodeId,
        rooted: bool,
    ) -> Self {
        let mut tree = Self {
            arena,
            nodes: nodes.into_iter().map(Some).collect(),
            root,
            rooted,
            config: EditConfig::default(),
            node_count: 0,
            leaf_count: 0,
        };
        let (nodes, leaves) = tree.recount();
        tree.node_count = nodes;
        tree.leaf_count = leaves;
        tree
    }

    pub fn with_edit_config(mut self, config: EditConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_edit_config(&mut self, config: EditConfig) {
        self.config = config;
    }

    pub fn edit_config(&self) -> EditConfig {
        self.config
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    pub fn set_rooted(&mut self, rooted: bool) {
        self.rooted = rooted;
    }

    /// Node behind `id`. Panics on an id that was never issued or whose node
    /// was removed; use [`PhyloTree::get`] for a checked lookup.
    pub fn node(&self, id: NodeId) -> &PhyloNode {
        self.get(id)
            .unwrap_or_else(|| panic!("stale or foreign node id {id}"))
    }

    pub fn get(&self, id: NodeId) -> Option<&PhyloNode> {
        if id.arena() != self.arena {
            return None;
        }
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn slot(&self, id: NodeId) -> PhyloResult<&PhyloNode> {
        self.get(id).ok_or(PhyloError::ForeignNode { node: id })
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut PhyloNode {
        self.nodes
            .get_mut(id.index())
            .filter(|_| id.arena() == self.arena)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("stale or foreign node id {id}"))
    }

    pub fn num_nodes(&self) -> usize {
        self.node_count
    }

    pub fn num_leaves(&self) -> usize {
        self.leaf_count
    }

    /// True when `id` is live and reachable from the root.
    pub fn contains(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            let Some(node) = self.get(cur) else {
                return false;
            };
            match node.parent {
                Some(parent) => cur = parent,
                None => return cur == self.root,
            }
        }
    }

    pub(crate) fn ensure_attached(&self, id: NodeId) -> PhyloResult<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(PhyloError::ForeignNode { node: id })
        }
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.node(id).is_leaf()
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.node(id).degree()
    }

    /// Number of edges between `id` and the top of its component.
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    pub fn descendant_leaf_count(&self, id: NodeId) -> usize {
        self.traverse_from(id, Order::PreOrder)
            .filter(|&n| self.node(n).is_leaf())
            .count()
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, move |&n| self.node(n).parent)
    }

    /// `id` followed by all of its ancestors, ending at the root.
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        path.extend(self.ancestors(id));
        path
    }

    /// Most recent common ancestor of two attached nodes.
    pub fn mrca(&self, a: NodeId, b: NodeId) -> PhyloResult<NodeId> {
        self.ensure_attached(a)?;
        self.ensure_attached(b)?;
        let path_a = self.path_to_root(a);
        let path_b = self.path_to_root(b);
        let shared = path_a
            .iter()
            .rev()
            .zip(path_b.iter().rev())
            .take_while(|(x, y)| x == y)
            .count();
        Ok(path_a[path_a.len() - shared])
    }

    /// Sum of branch lengths from `id` up to the root; unspecified lengths count as zero.
    pub fn distance_to_root(&self, id: NodeId) -> f64 {
        self.path_to_root(id)
            .iter()
            .filter(|&&n| n != self.root)
            .filter_map(|&n| self.node(n).branch_length)
            .sum()
    }

    /// Largest number of edges from the root to a leaf.
    pub fn height(&self) -> usize {
        let mut depth = vec![0usize; self.nodes.len()];
        let mut best = 0;
        for id in self.preorder() {
            if let Some(parent) = self.node(id).parent {
                depth[id.index()] = depth[parent.index()] + 1;
            }
            best = best.max(depth[id.index()]);
        }
        best
    }

    pub fn total_branch_length(&self) -> f64 {
        self.preorder()
            .filter(|&n| n != self.root)
            .filter_map(|n| self.node(n).branch_length)
            .sum()
    }

    /// Leaves in pre-order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .filter(|&n| self.node(n).is_leaf())
            .collect()
    }

    pub fn leaf_labels(&self) -> Vec<String> {
        self.leaves()
            .into_iter()
            .filter_map(|n| self.node(n).label().map(str::to_string))
            .collect()
    }

    pub fn find_leaf(&self, label: &str) -> Option<NodeId> {
        self.preorder()
            .find(|&n| self.node(n).is_leaf() && self.node(n).label() == Some(label))
    }

    pub fn set_label(&mut self, id: NodeId, label: Option<&str>) -> PhyloResult<()> {
        self.slot(id)?;
        self.node_mut(id).label = label.map(Into::into);
        Ok(())
    }

    /// Lengths are not validated here; negative values are the caller's call.
    pub fn set_branch_length(&mut self, id: NodeId, length: Option<f64>) -> PhyloResult<()> {
        self.slot(id)?;
        self.node_mut(id).branch_length = length;
        Ok(())
    }

    pub fn set_support(&mut self, id: NodeId, support: Option<f64>) -> PhyloResult<()> {
        self.slot(id)?;
        self.node_mut(id).support = support;
        Ok(())
    }

    pub fn annotations_mut(&mut self, id: NodeId) -> PhyloResult<&mut Annotations> {
        self.slot(id)?;
        Ok(&mut self.node_mut(id).annotations)
    }

    /// Allocates a detached node. It joins the tree once grafted.
    pub fn add_node(&mut self, data: NodeData) -> NodeId {
        self.alloc(PhyloNode::from_data(data))
    }

    /// Creates a node and attaches it as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, data: NodeData) -> PhyloResult<NodeId> {
        self.ensure_attached(parent)?;
        let child = self.add_node(data);
        self.graft(child, parent, super::edit::GraftMode::Child)?;
        Ok(child)
    }

    pub(crate) fn alloc(&mut self, node: PhyloNode) -> NodeId {
        self.nodes.push(Some(node));
        NodeId::new(self.arena, self.nodes.len() - 1)
    }

    pub(crate) fn free(&mut self, id: NodeId) {
        if id.arena() == self.arena {
            self.nodes[id.index()] = None;
        }
    }

    /// Counts nodes and leaves reachable from the root. Stops one past the
    /// arena size so a corrupted link cannot loop forever.
    pub(crate) fn recount(&self) -> (usize, usize) {
        let mut nodes = 0;
        let mut leaves = 0;
        for id in self.preorder().take(self.nodes.len() + 1) {
            nodes += 1;
            if self.node(id).is_leaf() {
                leaves += 1;
            }
        }
        (nodes, leaves)
    }

    /// Walks the attached nodes and checks parent/child links and counts.
    pub fn validate(&self) -> PhyloResult<()> {
        let invalid = |msg: String| PhyloError::InvariantViolated {
            op: "validate",
            msg,
        };
        if self.node(self.root).parent.is_some() {
            return Err(invalid(format!("root {} has a parent", self.root)));
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        let mut nodes = 0;
        let mut leaves = 0;
        while let Some(id) = stack.pop() {
            let node = self.slot(id)?;
            if std::mem::replace(&mut seen[id.index()], true) {
                return Err(invalid(format!("node {id} reached twice")));
            }
            nodes += 1;
            if node.is_leaf() {
                leaves += 1;
            }
            for &child in &node.children {
                if self.slot(child)?.parent != Some(id) {
                    return Err(invalid(format!("child {child} does not point back to {id}")));
                }
                stack.push(child);
            }
        }
        if (nodes, leaves) != (self.node_count, self.leaf_count) {
            return Err(invalid(format!(
                "counted {nodes} nodes / {leaves} leaves, cached {} / {}",
                self.node_count, self.leaf_count
            )));
        }
        Ok(())
    }
}

impl Index<NodeId> for PhyloTree {
    type Output = PhyloNode;

    fn index(&self, id: NodeId) -> &Self::Output {
        self.node(id)
    }
}
