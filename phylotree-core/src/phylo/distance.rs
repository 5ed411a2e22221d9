use std::collections::{BTreeMap, BTreeSet};

use bit_set::BitSet;

use crate::error::{PhyloError, PhyloResult};

use super::bipartition::{
    for_each_clade, is_informative, leaf_set, splits_within, Bipartition, LabelIndex,
};
use super::tree::PhyloTree;

/// Which leaves two trees are compared over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafSetMode {
    /// Leaf sets must match exactly.
    Strict,
    /// Compare over the leaves the trees have in common.
    Common,
}

/// Symmetric matrix of pairwise Robinson-Foulds distances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfMatrix {
    data: Vec<usize>,
    n: usize,
}

impl RfMatrix {
    pub fn new(n: usize, data: Vec<usize>) -> Self {
        assert_eq!(
            data.len(),
            n * n,
            "rf matrix data length mismatch: expected {}, got {}",
            n * n,
            data.len()
        );
        Self { data, n }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn data(&self) -> &[usize] {
        &self.data
    }

    pub fn get(&self, i: usize, j: usize) -> usize {
        self.data[i * self.n + j]
    }

    pub fn row(&self, i: usize) -> &[usize] {
        &self.data[i * self.n..(i + 1) * self.n]
    }
}

struct TreeSplits {
    leaves: BitSet,
    splits: BTreeSet<Bipartition>,
}

fn same_members(a: &BitSet, b: &BitSet) -> bool {
    a.iter().eq(b.iter())
}

/// `rf / (2 * (n - 3))`, or 0 when a tree on `n` leaves has no internal edges.
pub fn normalize_rf(rf: usize, n: usize) -> f64 {
    if n <= 3 {
        0.0
    } else {
        rf as f64 / (2 * (n - 3)) as f64
    }
}

/// Tree comparisons against one immutable [`LabelIndex`].
///
/// Build the session once from every tree that will take part; bitsets from
/// different sessions are not comparable.
#[derive(Debug, Clone)]
pub struct CompareSession {
    index: LabelIndex,
    mode: LeafSetMode,
}

impl CompareSession {
    pub fn new<'a, I>(trees: I) -> PhyloResult<Self>
    where
        I: IntoIterator<Item = &'a PhyloTree>,
    {
        let index = LabelIndex::from_trees(trees)?;
        tracing::debug!(labels = index.len(), "comparison session built");
        Ok(Self::with_index(index))
    }

    pub fn with_index(index: LabelIndex) -> Self {
        Self {
            index,
            mode: LeafSetMode::Strict,
        }
    }

    /// Compare over common leaves instead of rejecting differing leaf sets.
    pub fn restricted(mut self) -> Self {
        self.mode = LeafSetMode::Common;
        self
    }

    pub fn mode(&self) -> LeafSetMode {
        self.mode
    }

    pub fn index(&self) -> &LabelIndex {
        &self.index
    }

    pub fn splits(&self, tree: &PhyloTree) -> PhyloResult<BTreeSet<Bipartition>> {
        super::bipartition::bipartitions(tree, &self.index)
    }

    fn mismatch(&self, first: &BitSet, second: &BitSet) -> PhyloError {
        let mut only_first = first.clone();
        only_first.difference_with(second);
        let mut only_second = second.clone();
        only_second.difference_with(first);
        PhyloError::LeafSetMismatch {
            only_first: self.index.names(&only_first),
            only_second: self.index.names(&only_second),
        }
    }

    fn shared_leaves(&self, a: &BitSet, b: &BitSet) -> PhyloResult<BitSet> {
        match self.mode {
            LeafSetMode::Strict if !same_members(a, b) => Err(self.mismatch(a, b)),
            LeafSetMode::Strict => Ok(a.clone()),
            LeafSetMode::Common => {
                let mut shared = a.clone();
                shared.intersect_with(b);
                Ok(shared)
            }
        }
    }

    /// Leaves every tree is compared over; strict mode checks all against the first.
    fn common_universe<'a, I>(&self, trees: I) -> PhyloResult<BitSet>
    where
        I: IntoIterator<Item = &'a PhyloTree>,
    {
        let mut universe: Option<BitSet> = None;
        for tree in trees {
            let leaves = leaf_set(tree, &self.index)?;
            universe = Some(match universe {
                None => leaves,
                Some(u) => self.shared_leaves(&u, &leaves)?,
            });
        }
        Ok(universe.unwrap_or_default())
    }

    fn rf_and_size(&self, a: &PhyloTree, b: &PhyloTree) -> PhyloResult<(usize, usize)> {
        let leaves_a = leaf_set(a, &self.index)?;
        let leaves_b = leaf_set(b, &self.index)?;
        let universe = self.shared_leaves(&leaves_a, &leaves_b)?;
        let splits_a = splits_within(a, &self.index, &universe)?;
        let splits_b = splits_within(b, &self.index, &universe)?;
        let rf = splits_a.symmetric_difference(&splits_b).count();
        Ok((rf, universe.len()))
    }

    /// Number of splits found in exactly one of the two trees.
    pub fn robinson_foulds(&self, a: &PhyloTree, b: &PhyloTree) -> PhyloResult<usize> {
        self.rf_and_size(a, b).map(|(rf, _)| rf)
    }

    pub fn normalized_robinson_foulds(&self, a: &PhyloTree, b: &PhyloTree) -> PhyloResult<f64> {
        let (rf, n) = self.rf_and_size(a, b)?;
        Ok(normalize_rf(rf, n))
    }

    fn prepare(&self, tree: &PhyloTree) -> PhyloResult<TreeSplits> {
        let leaves = leaf_set(tree, &self.index)?;
        let splits = splits_within(tree, &self.index, &leaves)?;
        Ok(TreeSplits { leaves, splits })
    }

    fn compare_prepared(
        &self,
        (a, pa): (&PhyloTree, &TreeSplits),
        (b, pb): (&PhyloTree, &TreeSplits),
    ) -> PhyloResult<usize> {
        if same_members(&pa.leaves, &pb.leaves) {
            return Ok(pa.splits.symmetric_difference(&pb.splits).count());
        }
        let universe = self.shared_leaves(&pa.leaves, &pb.leaves)?;
        let splits_a = splits_within(a, &self.index, &universe)?;
        let splits_b = splits_within(b, &self.index, &universe)?;
        Ok(splits_a.symmetric_difference(&splits_b).count())
    }

    /// All-against-all distances. Split sets are computed once per tree.
    pub fn pairwise_robinson_foulds(&self, trees: &[PhyloTree]) -> PhyloResult<RfMatrix> {
        let n = trees.len();
        let prepared: PhyloResult<Vec<TreeSplits>> = par_try_map!(trees, |t| self.prepare(t));
        let prepared = prepared?;

        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();

        let results: PhyloResult<Vec<(usize, usize, usize)>> = par_try_map!(&pairs, |&(i, j)| {
            self.compare_prepared((&trees[i], &prepared[i]), (&trees[j], &prepared[j]))
                .map(|d| (i, j, d))
        });

        let mut data = vec![0usize; n * n];
        for (i, j, d) in results? {
            data[i * n + j] = d;
            data[j * n + i] = d;
        }
        tracing::debug!(trees = n, pairs = pairs.len(), "pairwise robinson-foulds done");
        Ok(RfMatrix::new(n, data))
    }

    fn count_splits(
        &self,
        trees: &[PhyloTree],
        universe: &BitSet,
    ) -> PhyloResult<BTreeMap<Bipartition, usize>> {
        let per_tree: PhyloResult<Vec<BTreeSet<Bipartition>>> =
            par_try_map!(trees, |t| splits_within(t, &self.index, universe));
        let mut counts = BTreeMap::new();
        for splits in per_tree? {
            for split in splits {
                *counts.entry(split).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// How many of `trees` contain each split.
    pub fn split_frequencies(&self, trees: &[PhyloTree]) -> PhyloResult<BTreeMap<Bipartition, usize>> {
        let universe = self.common_universe(trees)?;
        self.count_splits(trees, &universe)
    }

    /// Sets the support of every internal edge of `reference` to the
    /// percentage of `replicates` containing its split. Edges with a trivial
    /// split keep their value. Returns the number of edges annotated.
    pub fn annotate_support(
        &self,
        reference: &mut PhyloTree,
        replicates: &[PhyloTree],
    ) -> PhyloResult<usize> {
        if replicates.is_empty() {
            return Ok(0);
        }
        let universe = self.common_universe(std::iter::once(&*reference).chain(replicates))?;
        let counts = self.count_splits(replicates, &universe)?;
        let total = universe.len();
        let scale = 100.0 / replicates.len() as f64;

        let mut values = Vec::new();
        for_each_clade(reference, &self.index, &universe, |id, set| {
            if is_informative(set.len(), total) {
                let split = Bipartition::new(set.clone(), &universe);
                let seen = counts.get(&split).copied().unwrap_or(0);
                values.push((id, seen as f64 * scale));
            }
        })?;
        for &(id, support) in &values {
            reference.set_support(id, Some(support))?;
        }
        tracing::debug!(
            edges = values.len(),
            replicates = replicates.len(),
            "support annotated"
        );
        Ok(values.len())
    }
}

/// Robinson-Foulds distance of two trees with identical leaf sets.
pub fn robinson_foulds(a: &PhyloTree, b: &PhyloTree) -> PhyloResult<usize> {
    CompareSession::new([a, b])?.robinson_foulds(a, b)
}

pub fn normalized_robinson_foulds(a: &PhyloTree, b: &PhyloTree) -> PhyloResult<f64> {
    CompareSession::new([a, b])?.normalized_robinson_foulds(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::phylo::newick::parse;

    const T1: &str = "(((A,B),C),D,E);";
    // B and C swapped across the ((A,B),C) edge
    const NNI: &str = "(((A,C),B),D,E);";

    fn trees(texts: &[&str]) -> Vec<PhyloTree> {
        texts.iter().map(|t| parse(t).unwrap()).collect()
    }

    #[test]
    fn identical_trees_are_zero() {
        let t = parse(T1).unwrap();
        assert_eq!(robinson_foulds(&t, &t).unwrap(), 0);
        let reordered = parse("(E,D,(C,(B,A)));").unwrap();
        assert_eq!(robinson_foulds(&t, &reordered).unwrap(), 0);
    }

    #[test]
    fn single_nni_is_two() {
        let ts = trees(&[T1, NNI]);
        assert_eq!(robinson_foulds(&ts[0], &ts[1]).unwrap(), 2);
        assert_eq!(robinson_foulds(&ts[1], &ts[0]).unwrap(), 2);
        let norm = normalized_robinson_foulds(&ts[0], &ts[1]).unwrap();
        assert!((norm - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rooted_and_unrooted_forms_agree() {
        let rooted = parse("((A,B),(C,(D,E)));").unwrap();
        let unrooted = parse("(A,B,(C,(D,E)));").unwrap();
        assert_eq!(robinson_foulds(&rooted, &unrooted).unwrap(), 0);
    }

    #[test]
    fn leaf_set_mismatch_names_both_sides() {
        let ts = trees(&["((A,B),(C,D));", "((A,B),(C,E));"]);
        let err = robinson_foulds(&ts[0], &ts[1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Semantic);
        match err {
            PhyloError::LeafSetMismatch {
                only_first,
                only_second,
            } => {
                assert_eq!(only_first, ["D"]);
                assert_eq!(only_second, ["E"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn restricted_compares_common_leaves() {
        let ts = trees(&["((A,B),(C,(D,X)));", "((A,C),(B,(D,Y)));"]);
        let session = CompareSession::new(&ts).unwrap();
        assert!(session.robinson_foulds(&ts[0], &ts[1]).is_err());
        let session = session.restricted();
        assert_eq!(session.mode(), LeafSetMode::Common);
        assert_eq!(session.robinson_foulds(&ts[0], &ts[1]).unwrap(), 2);
        let norm = session.normalized_robinson_foulds(&ts[0], &ts[1]).unwrap();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn small_trees_normalize_to_zero() {
        let ts = trees(&["(A,B,C);", "(C,B,A);"]);
        assert_eq!(normalized_robinson_foulds(&ts[0], &ts[1]).unwrap(), 0.0);
        assert_eq!(normalize_rf(4, 3), 0.0);
    }

    #[test]
    fn pairwise_matrix() {
        let ts = trees(&[T1, NNI, T1]);
        let session = CompareSession::new(&ts).unwrap();
        let m = session.pairwise_robinson_foulds(&ts).unwrap();
        assert_eq!(m.n(), 3);
        assert_eq!(m.row(0), [0, 2, 0]);
        assert_eq!(m.row(1), [2, 0, 2]);
        assert_eq!(m.get(2, 1), 2);
        assert!(session.pairwise_robinson_foulds(&[]).unwrap().data().is_empty());
    }

    #[test]
    fn pairwise_rejects_mismatch_in_strict_mode() {
        let ts = trees(&["((A,B),(C,D));", "((A,B),(C,E));"]);
        let session = CompareSession::new(&ts).unwrap();
        assert!(session.pairwise_robinson_foulds(&ts).is_err());
        let m = session.restricted().pairwise_robinson_foulds(&ts).unwrap();
        assert_eq!(m.get(0, 1), 0);
    }

    #[test]
    fn split_frequencies_count_replicates() {
        let ts = trees(&[T1, NNI, T1]);
        let session = CompareSession::new(&ts).unwrap();
        let freqs = session.split_frequencies(&ts).unwrap();
        let named: BTreeMap<String, usize> = freqs
            .iter()
            .map(|(split, &count)| (split.labels(session.index()).join(","), count))
            .collect();
        assert_eq!(named.len(), 3);
        assert_eq!(named["D,E"], 3);
        assert_eq!(named["C,D,E"], 2);
        assert_eq!(named["B,D,E"], 1);
    }

    #[test]
    fn annotate_support_from_replicates() {
        let mut reference = parse(T1).unwrap();
        let replicates = trees(&[T1, NNI, T1]);
        let session = CompareSession::new(&replicates).unwrap();
        assert_eq!(session.annotate_support(&mut reference, &replicates).unwrap(), 2);

        let a = reference.find_leaf("A").unwrap();
        let ab = reference.node(a).parent().unwrap();
        let abc = reference.node(ab).parent().unwrap();
        let ab_support = reference.node(ab).support().unwrap();
        assert!((ab_support - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(reference.node(abc).support(), Some(100.0));
        assert_eq!(session.annotate_support(&mut reference, &[]).unwrap(), 0);
    }
}
