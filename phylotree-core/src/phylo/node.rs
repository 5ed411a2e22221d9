use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use vector_map::VecMap;

/// Key/value metadata attached to a node, kept in insertion order.
pub type Annotations = VecMap<String, String>;

/// Stable handle of a node inside one [`PhyloTree`](super::PhyloTree) arena.
///
/// Handles carry the identity of the arena that issued them; a tree rejects
/// handles issued by another tree even when the slot index is in range.
/// Clones of a tree share the arena identity of the original.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    arena: u64,
    index: usize,
}

impl NodeId {
    pub(crate) fn new(arena: u64, index: usize) -> Self {
        Self { arena, index }
    }

    pub fn index(self) -> usize {
        self.index
    }

    pub(crate) fn arena(self) -> u64 {
        self.arena
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Draws a fresh arena identity.
pub(crate) fn next_arena() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Payload of a node that is not yet linked into a tree.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub label: Option<Box<str>>,
    pub branch_length: Option<f64>,
    pub support: Option<f64>,
    pub annotations: Annotations,
}

impl Default for NodeData {
    fn default() -> Self {
        Self {
            label: None,
            branch_length: None,
            support: None,
            annotations: Annotations::new(),
        }
    }
}

impl NodeData {
    pub fn leaf(label: &str, branch_length: Option<f64>) -> Self {
        Self {
            label: Some(label.into()),
            branch_length,
            ..Self::default()
        }
    }

    pub fn internal(branch_length: Option<f64>) -> Self {
        Self {
            branch_length,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhyloNode {
    pub(crate) label: Option<Box<str>>,
    pub(crate) branch_length: Option<f64>,
    pub(crate) support: Option<f64>,
    pub(crate) annotations: Annotations,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl PhyloNode {
    pub(crate) fn from_data(data: NodeData) -> Self {
        Self {
            label: data.label,
            branch_length: data.branch_length,
            support: data.support,
            annotations: data.annotations,
            parent: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::from_data(NodeData::default())
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Length of the edge to the parent; `None` when unspecified.
    pub fn branch_length(&self) -> Option<f64> {
        self.branch_length
    }

    pub fn support(&self) -> Option<f64> {
        self.support
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of incident edges, counting the edge to the parent.
    pub fn degree(&self) -> usize {
        self.children.len() + usize::from(self.parent.is_some())
    }

    pub(crate) fn data(&self) -> NodeData {
        NodeData {
            label: self.label.clone(),
            branch_length: self.branch_length,
            support: self.support,
            annotations: self.annotations.clone(),
        }
    }
}

/// Adds two optional edge lengths; unspecified only if both are.
pub(crate) fn sum_lengths(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    }
}
