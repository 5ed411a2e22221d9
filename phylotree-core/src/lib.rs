//! Phylogenetic trees: Newick I/O, traversal, topology editing and
//! bipartition-based comparison.

#[macro_use]
mod par;

pub mod error;
pub mod io;
pub mod phylo;

pub use error::{ErrorKind, PhyloError, PhyloResult};
