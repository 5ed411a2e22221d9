pub mod bipartition;
pub mod distance;
pub mod edit;
pub mod newick;
pub mod node;
pub mod traverse;
pub mod tree;

pub use bipartition::{bipartitions, leaf_set, Bipartition, LabelIndex};
pub use distance::{
    normalize_rf, normalized_robinson_foulds, robinson_foulds, CompareSession, LeafSetMode,
    RfMatrix,
};
pub use edit::{EditConfig, GraftMode, LeafRootPolicy, OldRootPolicy, UnaryPolicy};
pub use newick::{
    parse, parse_many, parse_many_with, parse_with, to_newick, write_newick, DuplicateLabels,
    ParseOptions, WriteOptions,
};
pub use node::{Annotations, NodeData, NodeId, PhyloNode};
pub use traverse::{Order, Traversal};
pub use tree::PhyloTree;
