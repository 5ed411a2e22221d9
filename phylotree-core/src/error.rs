use std::io;
use thiserror::Error;

use crate::phylo::NodeId;

/// Coarse classification of [`PhyloError`] variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed Newick text.
    Syntax,
    /// Well-formed input that breaks a configured rule.
    Semantic,
    /// An edit that would violate the tree invariants.
    Structural,
    Io,
}

#[derive(Debug, Error)]
pub enum PhyloError {
    #[error("newick syntax error at offset {offset}: {msg}")]
    Syntax { msg: String, offset: usize },

    #[error("invalid branch length '{token}' at offset {offset}")]
    InvalidBranchLength { token: String, offset: usize },

    #[error("negative branch length {value} at offset {offset}")]
    NegativeBranchLength { value: f64, offset: usize },

    #[error("duplicate leaf label '{label}' at offset {offset}")]
    DuplicateLabel { label: String, offset: usize },

    #[error("leaf sets differ (only in first: {only_first:?}, only in second: {only_second:?})")]
    LeafSetMismatch {
        only_first: Vec<String>,
        only_second: Vec<String>,
    },

    #[error("leaf label '{label}' is not in the label index")]
    UnknownLabel { label: String },

    #[error("leaf {node} has no label")]
    UnlabeledLeaf { node: NodeId },

    #[error("node {node} is not part of this tree")]
    ForeignNode { node: NodeId },

    #[error("cannot {op} the root")]
    RootOperation { op: &'static str },

    #[error("cannot root the tree at leaf {node}; use reroot_above or LeafRootPolicy::Allow")]
    LeafRoot { node: NodeId },

    #[error("node {node} is already attached to the tree")]
    NodeAttached { node: NodeId },

    #[error("grafting {node} under {target} would create a cycle")]
    GraftCycle { node: NodeId, target: NodeId },

    #[error("cannot collapse node {node}: {reason}")]
    CollapseDegree { node: NodeId, reason: &'static str },

    #[error("tree invariant violated after {op}: {msg}")]
    InvariantViolated { op: &'static str, msg: String },

    #[error("newick io error: {0}")]
    Io(#[from] io::Error),
}

impl PhyloError {
    pub(crate) fn syntax(msg: impl Into<String>, offset: usize) -> Self {
        PhyloError::Syntax {
            msg: msg.into(),
            offset,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PhyloError::Syntax { .. } | PhyloError::InvalidBranchLength { .. } => {
                ErrorKind::Syntax
            }
            PhyloError::NegativeBranchLength { .. }
            | PhyloError::DuplicateLabel { .. }
            | PhyloError::LeafSetMismatch { .. }
            | PhyloError::UnknownLabel { .. }
            | PhyloError::UnlabeledLeaf { .. } => ErrorKind::Semantic,
            PhyloError::ForeignNode { .. }
            | PhyloError::RootOperation { .. }
            | PhyloError::LeafRoot { .. }
            | PhyloError::NodeAttached { .. }
            | PhyloError::GraftCycle { .. }
            | PhyloError::CollapseDegree { .. }
            | PhyloError::InvariantViolated { .. } => ErrorKind::Structural,
            PhyloError::Io(_) => ErrorKind::Io,
        }
    }

    /// Byte offset into the parsed text, for errors raised by the parser.
    pub fn offset(&self) -> Option<usize> {
        match self {
            PhyloError::Syntax { offset, .. }
            | PhyloError::InvalidBranchLength { offset, .. }
            | PhyloError::NegativeBranchLength { offset, .. }
            | PhyloError::DuplicateLabel { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

pub type PhyloResult<T> = Result<T, PhyloError>;
