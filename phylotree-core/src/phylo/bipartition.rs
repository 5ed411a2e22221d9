//! Leaf bipartitions (splits) induced by internal edges.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use bit_set::BitSet;

use crate::error::{PhyloError, PhyloResult};

use super::node::NodeId;
use super::tree::PhyloTree;

/// Dense label -> index map shared by every tree of one comparison.
#[derive(Clone, Debug, Default)]
pub struct LabelIndex {
    labels: Vec<Box<str>>,
    lookup: HashMap<Box<str>, usize>,
}

impl LabelIndex {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for label in labels {
            index.insert(label.as_ref());
        }
        index
    }

    pub fn from_tree(tree: &PhyloTree) -> PhyloResult<Self> {
        Self::from_trees([tree])
    }

    /// Union of the leaf labels of `trees`, numbered in first-seen order.
    pub fn from_trees<'a, I>(trees: I) -> PhyloResult<Self>
    where
        I: IntoIterator<Item = &'a PhyloTree>,
    {
        let mut index = Self::default();
        for tree in trees {
            for leaf in tree.leaves() {
                let label = tree
                    .node(leaf)
                    .label()
                    .ok_or(PhyloError::UnlabeledLeaf { node: leaf })?;
                index.insert(label);
            }
        }
        Ok(index)
    }

    fn insert(&mut self, label: &str) {
        if !self.lookup.contains_key(label) {
            self.lookup.insert(label.into(), self.labels.len());
            self.labels.push(label.into());
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[Box<str>] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(|l| &**l)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.lookup.get(label).copied()
    }

    pub(crate) fn names(&self, bits: &BitSet) -> Vec<String> {
        bits.iter()
            .filter_map(|i| self.label(i).map(str::to_string))
            .collect()
    }
}

/// One side of a split, stored canonically as the side that does not hold
/// the lowest-numbered leaf of the compared leaf set.
#[derive(Clone, Debug)]
pub struct Bipartition {
    bits: BitSet,
}

impl Bipartition {
    /// Canonicalizes `side` against the full leaf set `universe`.
    pub fn new(side: BitSet, universe: &BitSet) -> Self {
        let flip = universe.iter().next().is_some_and(|first| side.contains(first));
        if flip {
            let mut other = universe.clone();
            other.difference_with(&side);
            Self { bits: other }
        } else {
            Self { bits: side }
        }
    }

    pub fn bits(&self) -> &BitSet {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn contains(&self, leaf: usize) -> bool {
        self.bits.contains(leaf)
    }

    pub fn labels<'a>(&self, index: &'a LabelIndex) -> Vec<&'a str> {
        self.bits.iter().filter_map(|i| index.label(i)).collect()
    }
}

// Compare by members only; two bitsets may differ in capacity.
impl PartialEq for Bipartition {
    fn eq(&self, other: &Self) -> bool {
        self.bits.iter().eq(other.bits.iter())
    }
}

impl Eq for Bipartition {}

impl PartialOrd for Bipartition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bipartition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bits.iter().cmp(other.bits.iter())
    }
}

impl Hash for Bipartition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for i in self.bits.iter() {
            i.hash(state);
        }
    }
}

pub(crate) fn leaf_index(tree: &PhyloTree, leaf: NodeId, index: &LabelIndex) -> PhyloResult<usize> {
    let label = tree
        .node(leaf)
        .label()
        .ok_or(PhyloError::UnlabeledLeaf { node: leaf })?;
    index
        .index_of(label)
        .ok_or_else(|| PhyloError::UnknownLabel {
            label: label.to_string(),
        })
}

/// Indices of all attached leaves. Repeated labels share one bit.
pub fn leaf_set(tree: &PhyloTree, index: &LabelIndex) -> PhyloResult<BitSet> {
    let mut bits = BitSet::with_capacity(index.len());
    for leaf in tree.leaves() {
        bits.insert(leaf_index(tree, leaf, index)?);
    }
    Ok(bits)
}

/// Calls `f` with the leaves below every non-root internal node, restricted
/// to `universe`. One post-order pass; child sets are released once merged.
pub(crate) fn for_each_clade<F>(
    tree: &PhyloTree,
    index: &LabelIndex,
    universe: &BitSet,
    mut f: F,
) -> PhyloResult<()>
where
    F: FnMut(NodeId, &BitSet),
{
    let mut sets: Vec<Option<BitSet>> = vec![None; tree.nodes.len()];
    for id in tree.postorder() {
        let node = tree.node(id);
        let mut set = BitSet::with_capacity(index.len());
        if node.is_leaf() {
            let i = leaf_index(tree, id, index)?;
            if universe.contains(i) {
                set.insert(i);
            }
        } else {
            for &child in node.children() {
                if let Some(below) = sets[child.index()].take() {
                    set.union_with(&below);
                }
            }
            if id != tree.root() {
                f(id, &set);
            }
        }
        sets[id.index()] = Some(set);
    }
    Ok(())
}

/// Non-trivial splits of `tree` over the leaves in `universe`.
pub(crate) fn splits_within(
    tree: &PhyloTree,
    index: &LabelIndex,
    universe: &BitSet,
) -> PhyloResult<BTreeSet<Bipartition>> {
    let total = universe.len();
    let mut splits = BTreeSet::new();
    for_each_clade(tree, index, universe, |_, set| {
        if is_informative(set.len(), total) {
            splits.insert(Bipartition::new(set.clone(), universe));
        }
    })?;
    Ok(splits)
}

pub(crate) fn is_informative(side: usize, total: usize) -> bool {
    side >= 2 && total - side >= 2
}

/// Non-trivial bipartitions of `tree` over its own leaf set. Both edges at a
/// bifurcating root induce the same split and are reported once.
pub fn bipartitions(tree: &PhyloTree, index: &LabelIndex) -> PhyloResult<BTreeSet<Bipartition>> {
    let universe = leaf_set(tree, index)?;
    splits_within(tree, index, &universe)
}
