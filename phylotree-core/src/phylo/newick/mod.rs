//! Newick text to [`PhyloTree`] and back.

pub mod comment;
mod parser;
mod writer;

pub use writer::{to_newick, write_newick, WriteOptions};

use crate::error::PhyloResult;

use super::tree::PhyloTree;
use parser::NewickParser;

/// What the parser does when two leaves carry the same label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateLabels {
    Reject,
    Allow,
}

/// Parser configuration.
///
/// The default rejects duplicate leaf labels and negative lengths, skips
/// comments, and keeps internal labels as labels.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    pub duplicate_labels: DuplicateLabels,
    /// Store bracketed comments as annotations of the node they follow.
    pub capture_comments: bool,
    /// Read numeric internal labels as support values.
    pub internal_support: bool,
    pub allow_negative_lengths: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            duplicate_labels: DuplicateLabels::Reject,
            capture_comments: false,
            internal_support: false,
            allow_negative_lengths: false,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts duplicate leaf labels and negative branch lengths.
    pub fn lenient() -> Self {
        Self {
            duplicate_labels: DuplicateLabels::Allow,
            allow_negative_lengths: true,
            ..Self::default()
        }
    }

    pub fn with_duplicate_labels(mut self, policy: DuplicateLabels) -> Self {
        self.duplicate_labels = policy;
        self
    }

    pub fn with_comments(mut self) -> Self {
        self.capture_comments = true;
        self
    }

    pub fn with_internal_support(mut self) -> Self {
        self.internal_support = true;
        self
    }

    pub fn with_negative_lengths(mut self) -> Self {
        self.allow_negative_lengths = true;
        self
    }
}

/// Parses exactly one `;`-terminated tree with default options.
pub fn parse(text: &str) -> PhyloResult<PhyloTree> {
    parse_with(text, &ParseOptions::default())
}

pub fn parse_with(text: &str, opts: &ParseOptions) -> PhyloResult<PhyloTree> {
    NewickParser::new(text, opts).parse_single()
}

/// Parses a sequence of `;`-terminated trees.
pub fn parse_many(text: &str) -> PhyloResult<Vec<PhyloTree>> {
    parse_many_with(text, &ParseOptions::default())
}

pub fn parse_many_with(text: &str, opts: &ParseOptions) -> PhyloResult<Vec<PhyloTree>> {
    let mut parser = NewickParser::new(text, opts);
    let mut trees = Vec::new();
    while !parser.at_end()? {
        trees.push(parser.parse_statement()?);
    }
    Ok(trees)
}

/// True when `text` holds nothing but whitespace and well-formed comments.
pub(crate) fn is_blank(text: &str) -> bool {
    let opts = ParseOptions::default();
    matches!(NewickParser::new(text, &opts).at_end(), Ok(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PhyloError};
    use std::fmt::Write as _;

    /// `((((X0,X1),X2),X3)...,Xn);`, nested `n` levels deep.
    fn caterpillar(n: usize) -> String {
        let mut s = "(".repeat(n);
        s.push_str("X0,X1)");
        for i in 2..=n {
            write!(s, ",X{i})").unwrap();
        }
        s.push(';');
        s
    }

    #[test]
    fn parses_example_tree() {
        let tree = parse("(A:1,(B:2,C:3):4);").unwrap();
        let root = tree.node(tree.root());
        assert_eq!(root.children().len(), 2);

        let a = tree.node(root.children()[0]);
        assert_eq!(a.label(), Some("A"));
        assert_eq!(a.branch_length(), Some(1.0));
        assert!(a.is_leaf());

        let inner = tree.node(root.children()[1]);
        assert_eq!(inner.branch_length(), Some(4.0));
        let names: Vec<_> = inner
            .children()
            .iter()
            .map(|&c| (tree.node(c).label(), tree.node(c).branch_length()))
            .collect();
        assert_eq!(names, [(Some("B"), Some(2.0)), (Some("C"), Some(3.0))]);
        assert_eq!(tree.num_leaves(), 3);
        assert_eq!(tree.num_nodes(), 5);
        assert!(tree.is_rooted());
    }

    #[test]
    fn missing_close_paren() {
        let err = parse("(A,(B,C);").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(err.offset(), Some(8));
        assert!(err.to_string().contains("missing ')'"), "{err}");
    }

    #[test]
    fn unmatched_close_paren() {
        let err = parse("(A,B));").unwrap_err();
        assert!(err.to_string().contains("unmatched ')'"));
        assert_eq!(err.offset(), Some(5));
    }

    #[test]
    fn trailing_content() {
        let err = parse("(A,B);(C,D);").unwrap_err();
        assert_eq!(err.offset(), Some(6));
        assert!(err.to_string().contains("trailing content"));
        assert!(parse("(A,B);  \n").is_ok());
    }

    #[test]
    fn missing_semicolon() {
        let err = parse("(A,B)").unwrap_err();
        assert!(err.to_string().contains("missing ';'"));
    }

    #[test]
    fn bad_length_is_an_error_not_zero() {
        match parse("(A:1,B:x2);").unwrap_err() {
            PhyloError::InvalidBranchLength { token, offset } => {
                assert_eq!(token, "x2");
                assert_eq!(offset, 7);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(parse("(A:,B);").is_err());
        assert!(parse("(A:inf,B);").is_err());
    }

    #[test]
    fn negative_lengths_follow_options() {
        let err = parse("(A:-1,B:1);").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Semantic);
        let tree = parse_with("(A:-1,B:1);", &ParseOptions::lenient()).unwrap();
        let a = tree.find_leaf("A").unwrap();
        assert_eq!(tree.node(a).branch_length(), Some(-1.0));
    }

    #[test]
    fn unspecified_length_differs_from_zero() {
        let tree = parse("(A,B:0);").unwrap();
        assert_eq!(tree.node(tree.find_leaf("A").unwrap()).branch_length(), None);
        assert_eq!(tree.node(tree.find_leaf("B").unwrap()).branch_length(), Some(0.0));
    }

    #[test]
    fn duplicate_leaf_labels() {
        let err = parse("(A,(B,A));").unwrap_err();
        assert!(matches!(err, PhyloError::DuplicateLabel { ref label, offset: 6 } if label == "A"));
        let opts = ParseOptions::new().with_duplicate_labels(DuplicateLabels::Allow);
        assert_eq!(parse_with("(A,(B,A));", &opts).unwrap().num_leaves(), 3);
        // internal labels may repeat leaf labels
        assert!(parse("(A,(B,C)A);").is_ok());
    }

    #[test]
    fn quoted_labels() {
        let tree = parse("('Homo sapiens':1,'it''s':2,\"a,b\");").unwrap();
        assert_eq!(tree.leaf_labels(), ["Homo sapiens", "it's", "a,b"]);
        let err = parse("('open,B);").unwrap_err();
        assert!(err.to_string().contains("unclosed quoted label"));
        assert_eq!(err.offset(), Some(1));
    }

    #[test]
    fn comments_skipped_or_captured() {
        let text = "(A[&rate=0.5]:1[&len=x],B:2)[root note];";
        let tree = parse(text).unwrap();
        let a = tree.find_leaf("A").unwrap();
        assert!(tree.node(a).annotations().is_empty());

        let tree = parse_with(text, &ParseOptions::new().with_comments()).unwrap();
        let a = tree.find_leaf("A").unwrap();
        assert_eq!(tree.node(a).annotation("rate"), Some("0.5"));
        assert_eq!(tree.node(a).annotation("len"), Some("x"));
        assert_eq!(tree.node(tree.root()).annotation("comment"), Some("root note"));
    }

    #[test]
    fn nested_and_unclosed_comments() {
        assert!(parse("(A[outer [inner] tail],B);").is_ok());
        let err = parse("(A[never closed,B);").unwrap_err();
        assert_eq!(err.offset(), Some(2));
    }

    #[test]
    fn rooting_prefix() {
        assert!(!parse("[&U](A,B);").unwrap().is_rooted());
        assert!(parse("[&R](A,B,C);").unwrap().is_rooted());
        assert!(!parse("(A,B,C);").unwrap().is_rooted());
    }

    #[test]
    fn internal_support_values() {
        let opts = ParseOptions::new().with_internal_support();
        let tree = parse_with("((A,B)95:0.1,(C,D)x);", &opts).unwrap();
        let root = tree.node(tree.root());
        let ab = tree.node(root.children()[0]);
        assert_eq!(ab.support(), Some(95.0));
        assert_eq!(ab.label(), None);
        assert_eq!(tree.node(root.children()[1]).label(), Some("x"));
    }

    #[test]
    fn unlabeled_and_whitespace() {
        let tree = parse(" ( , ( , ) ) ;").unwrap();
        assert_eq!(tree.num_leaves(), 3);
        assert_eq!(tree.num_nodes(), 5);
        let tree = parse("(A\n:\t1 ,\n B : 2);").unwrap();
        assert_eq!(tree.total_branch_length(), 3.0);
    }

    #[test]
    fn single_leaf_tree() {
        let tree = parse("A;").unwrap();
        assert_eq!(tree.num_nodes(), 1);
        assert_eq!(tree.leaf_labels(), ["A"]);
    }

    #[test]
    fn empty_input() {
        assert_eq!(parse("   ").unwrap_err().kind(), ErrorKind::Syntax);
    }

    #[test]
    fn deep_caterpillar_parses_and_writes() {
        let n = 100_000;
        let text = caterpillar(n);
        let tree = parse(&text).unwrap();
        assert_eq!(tree.num_leaves(), n + 1);
        assert_eq!(tree.num_nodes(), 2 * n + 1);
        assert_eq!(tree.height(), n);
        assert_eq!(to_newick(&tree), text);
        tree.validate().unwrap();
    }

    #[test]
    fn deep_unclosed_nesting_is_a_syntax_error() {
        let text = format!("{}A;", "(".repeat(50_000));
        let err = parse(&text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().contains("missing ')'"), "{err}");
    }

    #[test]
    fn quote_inside_unquoted_label() {
        let err = parse("(O'Brien,B);").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(err.offset(), Some(2));
        assert!(parse("(A:1'x,B);").is_err());
        assert!(parse("(\"O\"Brien,B);").is_err());

        let tree = parse("(\"O'Brien\",'C''D',B);").unwrap();
        assert_eq!(tree.leaf_labels(), ["O'Brien", "C'D", "B"]);
    }

    #[test]
    fn comment_after_last_tree() {
        let tree = parse("(A,B); [note]").unwrap();
        assert_eq!(tree.num_leaves(), 2);
        assert_eq!(parse_many("(A,B); [note]").unwrap().len(), 1);
        assert!(parse("(A,B); [note] x").is_err());
    }

    #[test]
    fn comment_goes_to_preceding_token() {
        let opts = ParseOptions::new().with_comments();
        let tree = parse_with("([c]A,B);", &opts).unwrap();
        let a = tree.find_leaf("A").unwrap();
        assert!(tree.node(a).annotations().is_empty());
        assert_eq!(tree.node(tree.root()).annotation("comment"), Some("c"));

        let tree = parse_with("(A,[d]B);", &opts).unwrap();
        let a = tree.find_leaf("A").unwrap();
        let b = tree.find_leaf("B").unwrap();
        assert_eq!(tree.node(a).annotation("comment"), Some("d"));
        assert!(tree.node(b).annotations().is_empty());
    }

    #[test]
    fn many_statements() {
        let trees = parse_many("((A,B),C);\n((A,C),B); [end]\n").unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[1].leaf_labels(), ["A", "C", "B"]);
        assert!(parse_many("").unwrap().is_empty());
        let err = parse_many("(A,B);\n(C,D").unwrap_err();
        assert!(err.offset().unwrap() > 7);
    }
}
