use std::fmt::Write as _;

use crate::phylo::node::{NodeId, PhyloNode};
use crate::phylo::tree::PhyloTree;

use super::comment::format_annotations;

/// Writer configuration. The default writes lengths, internal labels and
/// support values with shortest round-trip float formatting.
#[derive(Clone, Debug)]
pub struct WriteOptions {
    pub branch_lengths: bool,
    pub internal_labels: bool,
    /// Write support in the internal-label slot of nodes without a label.
    pub support: bool,
    pub annotations: bool,
    /// Prefix the tree with `[&R]` or `[&U]`.
    pub rooting_prefix: bool,
    /// Fixed number of decimals; `None` writes the shortest exact form.
    pub precision: Option<usize>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            branch_lengths: true,
            internal_labels: true,
            support: true,
            annotations: false,
            rooting_prefix: false,
            precision: None,
        }
    }
}

impl WriteOptions {
    /// Only the topology and leaf labels.
    pub fn topology_only() -> Self {
        Self {
            branch_lengths: false,
            internal_labels: false,
            support: false,
            ..Self::default()
        }
    }

    pub fn with_precision(mut self, digits: usize) -> Self {
        self.precision = Some(digits);
        self
    }

    pub fn with_annotations(mut self) -> Self {
        self.annotations = true;
        self
    }

    pub fn with_rooting_prefix(mut self) -> Self {
        self.rooting_prefix = true;
        self
    }
}

pub fn to_newick(tree: &PhyloTree) -> String {
    write_newick(tree, &WriteOptions::default())
}

pub fn write_newick(tree: &PhyloTree, opts: &WriteOptions) -> String {
    let mut s = String::new();
    if opts.rooting_prefix {
        s.push_str(if tree.is_rooted() { "[&R] " } else { "[&U] " });
    }
    write_subtree(tree, tree.root(), opts, &mut s);
    s.push(';');
    s
}

fn needs_quoting(label: &str) -> bool {
    label.chars().any(|ch| {
        ch.is_whitespace()
            || matches!(ch, ':' | ',' | '(' | ')' | ';' | '[' | ']' | '\'' | '"')
    })
}

fn write_label(out: &mut String, label: &str) {
    // an empty label is written as '' so it reads back as a label
    if label.is_empty() || needs_quoting(label) {
        out.push('\'');
        for ch in label.chars() {
            if ch == '\'' {
                out.push_str("''");
            } else {
                out.push(ch);
            }
        }
        out.push('\'');
    } else {
        out.push_str(label);
    }
}

fn write_number(out: &mut String, value: f64, precision: Option<usize>) {
    // writing into a String cannot fail
    let _ = match precision {
        Some(p) => write!(out, "{value:.p$}"),
        None => write!(out, "{value}"),
    };
}

/// Writes the subtree below `top` with an explicit frame stack of
/// (node, next child) pairs, so depth is not limited by the call stack.
fn write_subtree(tree: &PhyloTree, top: NodeId, opts: &WriteOptions, out: &mut String) {
    let mut frames: Vec<(NodeId, usize)> = vec![(top, 0)];
    while let Some(frame) = frames.last_mut() {
        let (id, next) = *frame;
        let children = tree.node(id).children();
        if let Some(&child) = children.get(next) {
            frame.1 += 1;
            out.push(if next == 0 { '(' } else { ',' });
            frames.push((child, 0));
            continue;
        }
        frames.pop();
        if !children.is_empty() {
            out.push(')');
        }
        write_node_suffix(tree.node(id), opts, out);
    }
}

/// Label or support, annotations and branch length of a finished node.
fn write_node_suffix(node: &PhyloNode, opts: &WriteOptions, out: &mut String) {
    if node.is_leaf() {
        if let Some(label) = node.label() {
            write_label(out, label);
        }
    } else {
        match (node.label(), node.support()) {
            (Some(label), _) if opts.internal_labels => write_label(out, label),
            (_, Some(support)) if opts.support => write_number(out, support, None),
            _ => {}
        }
    }

    if opts.annotations {
        if let Some(comment) = format_annotations(node.annotations()) {
            out.push_str(&comment);
        }
    }
    if let (true, Some(bl)) = (opts.branch_lengths, node.branch_length()) {
        out.push(':');
        write_number(out, bl, opts.precision);
    }
}
