use std::collections::HashSet;

use memchr::{memchr, memchr2};

use crate::error::{PhyloError, PhyloResult};
use crate::phylo::node::{next_arena, NodeId, PhyloNode};
use crate::phylo::tree::PhyloTree;

use super::comment::apply_comment;
use super::{DuplicateLabels, ParseOptions};

/// Bytes that end an unquoted label or a branch length.
fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace()
        || matches!(
            b,
            b',' | b'(' | b')' | b'[' | b']' | b':' | b';' | b'\'' | b'"'
        )
}

/// Parser over one buffer holding one or more statements.
pub(crate) struct NewickParser<'a> {
    text: &'a str,
    src: &'a [u8],
    pos: usize,
    opts: &'a ParseOptions,
    nodes: Vec<PhyloNode>,
    leaf_labels: HashSet<Box<str>>,
}

impl<'a> NewickParser<'a> {
    pub(crate) fn new(text: &'a str, opts: &'a ParseOptions) -> Self {
        Self {
            text,
            src: text.as_bytes(),
            pos: 0,
            opts,
            nodes: Vec::new(),
            leaf_labels: HashSet::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn found(&self) -> String {
        match self.text[self.pos..].chars().next() {
            Some(ch) => format!("'{ch}'"),
            None => "end of input".to_string(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Consumes a bracketed comment (nesting allowed) and returns its body.
    fn read_comment(&mut self) -> PhyloResult<&'a str> {
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            let Some(i) = memchr2(b'[', b']', &self.src[self.pos..]) else {
                return Err(PhyloError::syntax("unclosed comment", start));
            };
            let at = self.pos + i;
            if self.src[at] == b'[' {
                depth += 1;
            } else {
                depth -= 1;
            }
            self.pos = at + 1;
            if depth == 0 {
                let text = self.text;
                return Ok(&text[start + 1..at]);
            }
        }
    }

    /// Skips whitespace and comments; comments go to `owner` when capturing.
    fn skip_trivia(&mut self, owner: Option<usize>) -> PhyloResult<()> {
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'[') {
                return Ok(());
            }
            let body = self.read_comment()?;
            if let (true, Some(owner)) = (self.opts.capture_comments, owner) {
                apply_comment(body, &mut self.nodes[owner].annotations);
            }
        }
    }

    /// True when only whitespace and comments remain.
    pub(crate) fn at_end(&mut self) -> PhyloResult<bool> {
        let saved = self.pos;
        self.skip_trivia(None)?;
        let done = self.pos >= self.src.len();
        self.pos = saved;
        Ok(done)
    }

    /// Parses one statement up to and including its `;`.
    pub(crate) fn parse_statement(&mut self) -> PhyloResult<PhyloTree> {
        self.nodes.clear();
        self.leaf_labels.clear();

        let mut rooted = None;
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'[') {
                break;
            }
            match self.read_comment()?.trim() {
                "&R" | "&r" => rooted = Some(true),
                "&U" | "&u" => rooted = Some(false),
                _ => {}
            }
        }
        if self.pos >= self.src.len() {
            return Err(PhyloError::syntax("expected a tree, found end of input", self.pos));
        }

        let arena = next_arena();
        let root = self.parse_nodes(arena)?;
        self.skip_trivia(Some(root))?;
        match self.peek() {
            Some(b';') => self.pos += 1,
            Some(b')') => return Err(PhyloError::syntax("unmatched ')'", self.pos)),
            None => return Err(PhyloError::syntax("missing ';' at end of tree", self.pos)),
            Some(_) => {
                return Err(PhyloError::syntax(
                    format!("expected ';', found {}", self.found()),
                    self.pos,
                ))
            }
        }

        let rooted = rooted.unwrap_or(self.nodes[root].children.len() == 2);
        let nodes = std::mem::take(&mut self.nodes);
        let tree = PhyloTree::from_arena(arena, nodes, NodeId::new(arena, root), rooted);
        tracing::trace!(
            nodes = tree.num_nodes(),
            leaves = tree.num_leaves(),
            end = self.pos,
            "parsed newick statement"
        );
        Ok(tree)
    }

    /// Parses a single statement and rejects anything but whitespace and
    /// comments after it.
    pub(crate) fn parse_single(&mut self) -> PhyloResult<PhyloTree> {
        let tree = self.parse_statement()?;
        self.skip_trivia(None)?;
        if self.pos < self.src.len() {
            return Err(PhyloError::syntax("trailing content after ';'", self.pos));
        }
        Ok(tree)
    }

    fn push_node(&mut self, arena: u64, parent: Option<usize>) -> usize {
        let id = self.nodes.len();
        let mut node = PhyloNode::empty();
        node.parent = parent.map(|p| NodeId::new(arena, p));
        self.nodes.push(node);
        if let Some(p) = parent {
            self.nodes[p].children.push(NodeId::new(arena, id));
        }
        id
    }

    /// Parses the subtree at the cursor and returns the index of its top node.
    ///
    /// Open parentheses are kept on an explicit stack so nesting depth is
    /// bounded by memory, not by the call stack. A comment goes to the node
    /// whose token precedes it: the open parent after `(`, the finished
    /// sibling after `,`.
    fn parse_nodes(&mut self, arena: u64) -> PhyloResult<usize> {
        let root = self.push_node(arena, None);
        // (internal node, offset of its '(')
        let mut open: Vec<(usize, usize)> = Vec::new();
        let mut current = root;

        'descend: loop {
            // `current` is fresh; its leading trivia went to the previous token
            while self.peek() == Some(b'(') {
                open.push((current, self.pos));
                self.pos += 1;
                self.skip_trivia(Some(current))?;
                current = self.push_node(arena, Some(current));
            }
            self.finish_node(current)?;

            while let Some(&(parent, open_at)) = open.last() {
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                        self.skip_trivia(Some(current))?;
                        current = self.push_node(arena, Some(parent));
                        continue 'descend;
                    }
                    Some(b')') => {
                        self.pos += 1;
                        open.pop();
                        current = parent;
                        self.skip_trivia(Some(current))?;
                        self.finish_node(current)?;
                    }
                    Some(b';') | None => {
                        return Err(PhyloError::syntax(
                            format!(
                                "missing ')' to close '(' at offset {open_at}, found {}",
                                self.found()
                            ),
                            self.pos,
                        ))
                    }
                    Some(_) => {
                        return Err(PhyloError::syntax(
                            format!("expected ',' or ')', found {}", self.found()),
                            self.pos,
                        ))
                    }
                }
            }
            return Ok(root);
        }
    }

    /// Reads the optional label and `:length` of a node whose children, if
    /// any, are complete. Leaves the cursor past any trailing trivia.
    fn finish_node(&mut self, id: usize) -> PhyloResult<()> {
        let label_at = self.pos;
        let label = match self.peek() {
            Some(q @ (b'\'' | b'"')) => Some(self.quoted_label(q)?),
            Some(b) if !is_delimiter(b) => Some(self.unquoted_label()?.to_string()),
            _ => None,
        };
        if let Some(label) = label {
            self.assign_label(id, label, label_at)?;
        }

        self.skip_trivia(Some(id))?;
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_trivia(Some(id))?;
            let length = self.branch_length()?;
            self.nodes[id].branch_length = Some(length);
            self.skip_trivia(Some(id))?;
        }
        Ok(())
    }

    fn assign_label(&mut self, id: usize, label: String, offset: usize) -> PhyloResult<()> {
        if !self.nodes[id].children.is_empty() {
            if self.opts.internal_support {
                if let Ok(support) = label.parse::<f64>() {
                    self.nodes[id].support = Some(support);
                    return Ok(());
                }
            }
        } else if self.opts.duplicate_labels == DuplicateLabels::Reject
            && !self.leaf_labels.insert(label.as_str().into())
        {
            return Err(PhyloError::DuplicateLabel { label, offset });
        }
        self.nodes[id].label = Some(label.into_boxed_str());
        Ok(())
    }

    fn unquoted_label(&mut self) -> PhyloResult<&'a str> {
        let start = self.pos;
        while self.peek().is_some_and(|b| !is_delimiter(b)) {
            self.pos += 1;
        }
        if matches!(self.peek(), Some(b'\'' | b'"')) {
            return Err(PhyloError::syntax(
                "quote inside an unquoted label; quote the whole label",
                self.pos,
            ));
        }
        let text = self.text;
        Ok(&text[start..self.pos])
    }

    fn quoted_label(&mut self, quote: u8) -> PhyloResult<String> {
        let start = self.pos;
        self.pos += 1;
        let mut label = String::new();
        loop {
            let Some(i) = memchr(quote, &self.src[self.pos..]) else {
                return Err(PhyloError::syntax("unclosed quoted label", start));
            };
            label.push_str(&self.text[self.pos..self.pos + i]);
            self.pos += i + 1;
            // a doubled quote stands for one literal quote
            if self.peek() == Some(quote) {
                label.push(quote as char);
                self.pos += 1;
            } else {
                return Ok(label);
            }
        }
    }

    fn branch_length(&mut self) -> PhyloResult<f64> {
        let start = self.pos;
        while self.peek().is_some_and(|b| !is_delimiter(b)) {
            self.pos += 1;
        }
        let token = &self.text[start..self.pos];
        let value = match token.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                return Err(PhyloError::InvalidBranchLength {
                    token: token.to_string(),
                    offset: start,
                })
            }
        };
        if value < 0.0 && !self.opts.allow_negative_lengths {
            return Err(PhyloError::NegativeBranchLength {
                value,
                offset: start,
            });
        }
        Ok(value)
    }
}
