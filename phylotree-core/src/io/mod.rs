pub mod newick;

pub use newick::{
    newick_records_from_reader, read_newick_from_bytes, read_newick_from_path,
    read_newick_from_reader, read_newick_report_from_reader, write_newick_to_path,
    write_newick_to_writer, NewickRecords,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnError {
    Raise,
    Skip,
}

/// A statement dropped under [`OnError::Skip`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Zero-based position of the statement in the input.
    pub statement: usize,
    /// Line on which the statement ended.
    pub line: usize,
    pub message: Box<str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadReport<T> {
    pub data: T,
    pub skipped: Vec<SkippedRecord>,
}
