//! Lazy tree traversals.
//!
//! Every traversal visits children in stored order, so walking an unmodified
//! tree twice yields the same sequence.

use std::collections::VecDeque;

use super::node::{NodeId, PhyloNode};
use super::tree::PhyloTree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    /// Parent before children.
    PreOrder,
    /// Children before parent.
    PostOrder,
    /// Breadth-first, level by level.
    LevelOrder,
}

type SkipFn<'t> = Box<dyn Fn(NodeId, &PhyloNode) -> bool + 't>;

enum Frontier {
    Stack(Vec<NodeId>),
    // (node, index of the next child to descend into)
    Frames(Vec<(NodeId, usize)>),
    Queue(VecDeque<NodeId>),
}

/// Iterator over the node ids of a subtree.
///
/// A skip predicate, when set, stops the traversal from descending below the
/// nodes it matches; the matching node itself is still yielded.
pub struct Traversal<'t> {
    tree: &'t PhyloTree,
    start: NodeId,
    order: Order,
    skip: Option<SkipFn<'t>>,
    frontier: Frontier,
}

impl<'t> Traversal<'t> {
    pub(crate) fn new(tree: &'t PhyloTree, start: NodeId, order: Order) -> Self {
        Self {
            tree,
            start,
            order,
            skip: None,
            frontier: Self::seed(start, order),
        }
    }

    fn seed(start: NodeId, order: Order) -> Frontier {
        match order {
            Order::PreOrder => Frontier::Stack(vec![start]),
            Order::PostOrder => Frontier::Frames(vec![(start, 0)]),
            Order::LevelOrder => Frontier::Queue(VecDeque::from([start])),
        }
    }

    pub fn skip_subtrees<F>(mut self, predicate: F) -> Self
    where
        F: Fn(NodeId, &PhyloNode) -> bool + 't,
    {
        self.skip = Some(Box::new(predicate));
        self
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// Rewinds to the first node; the skip predicate is kept.
    pub fn restart(&mut self) {
        self.frontier = Self::seed(self.start, self.order);
    }
}

fn children_of<'t>(tree: &'t PhyloTree, skip: &Option<SkipFn<'t>>, id: NodeId) -> &'t [NodeId] {
    let node = tree.node(id);
    match skip {
        Some(skip) if skip(id, node) => &[],
        _ => node.children(),
    }
}

impl Iterator for Traversal<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let tree = self.tree;
        let skip = &self.skip;
        match &mut self.frontier {
            Frontier::Stack(stack) => {
                let id = stack.pop()?;
                stack.extend(children_of(tree, skip, id).iter().rev());
                Some(id)
            }
            Frontier::Queue(queue) => {
                let id = queue.pop_front()?;
                queue.extend(children_of(tree, skip, id).iter().copied());
                Some(id)
            }
            Frontier::Frames(frames) => loop {
                let (id, next_child) = frames.last_mut()?;
                let id = *id;
                match children_of(tree, skip, id).get(*next_child) {
                    Some(&child) => {
                        *next_child += 1;
                        frames.push((child, 0));
                    }
                    None => {
                        frames.pop();
                        return Some(id);
                    }
                }
            },
        }
    }
}

impl PhyloTree {
    pub fn traverse(&self, order: Order) -> Traversal<'_> {
        Traversal::new(self, self.root, order)
    }

    /// Traversal of the subtree rooted at `start`.
    pub fn traverse_from(&self, start: NodeId, order: Order) -> Traversal<'_> {
        Traversal::new(self, start, order)
    }

    pub fn preorder(&self) -> Traversal<'_> {
        self.traverse(Order::PreOrder)
    }

    pub fn postorder(&self) -> Traversal<'_> {
        self.traverse(Order::PostOrder)
    }

    pub fn levelorder(&self) -> Traversal<'_> {
        self.traverse(Order::LevelOrder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phylo::newick::parse;

    fn labels(tree: &PhyloTree, ids: impl Iterator<Item = NodeId>) -> Vec<String> {
        ids.map(|n| tree.node(n).label().unwrap_or("-").to_string())
            .collect()
    }

    #[test]
    fn orders() {
        let tree = parse("((A,B)x,(C,D)y)r;").unwrap();
        assert_eq!(labels(&tree, tree.preorder()), ["r", "x", "A", "B", "y", "C", "D"]);
        assert_eq!(labels(&tree, tree.postorder()), ["A", "B", "x", "C", "D", "y", "r"]);
        assert_eq!(labels(&tree, tree.levelorder()), ["r", "x", "y", "A", "B", "C", "D"]);
    }

    #[test]
    fn skip_predicate_prunes_descendants() {
        let tree = parse("((A,B)x,(C,D)y)r;").unwrap();
        let walk = tree
            .postorder()
            .skip_subtrees(|_, node| node.label() == Some("x"));
        assert_eq!(labels(&tree, walk), ["x", "C", "D", "y", "r"]);
    }

    #[test]
    fn restart_replays_sequence() {
        let tree = parse("((A,B),C);").unwrap();
        let mut walk = tree.levelorder();
        let first: Vec<NodeId> = walk.by_ref().collect();
        walk.restart();
        let second: Vec<NodeId> = walk.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn subtree_traversal() {
        let tree = parse("((A,B)x,C)r;").unwrap();
        let x = tree.node(tree.root()).children()[0];
        assert_eq!(labels(&tree, tree.traverse_from(x, Order::PreOrder)), ["x", "A", "B"]);
    }
}
