use super::{OnError, ReadReport, SkippedRecord};
use crate::error::{ErrorKind, PhyloResult};
use crate::phylo::newick::{
    is_blank, parse_many_with, parse_with, write_newick, ParseOptions, WriteOptions,
};
use crate::phylo::PhyloTree;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Cursor, Write};
use std::path::Path;

/// Tracks quotes and comments so a `;` is only seen at the top level.
#[derive(Default)]
struct StatementScanner {
    quote: Option<u8>,
    comment_depth: usize,
}

impl StatementScanner {
    /// Offset of the first terminating `;` in `bytes`; state carries over between calls.
    fn find_end(&mut self, bytes: &[u8]) -> Option<usize> {
        for (i, &b) in bytes.iter().enumerate() {
            match (self.quote, b) {
                (Some(q), _) if b == q => self.quote = None,
                (Some(_), _) => {}
                (None, b'[') => self.comment_depth += 1,
                (None, b']') if self.comment_depth > 0 => self.comment_depth -= 1,
                (None, _) if self.comment_depth > 0 => {}
                (None, b'\'' | b'"') => self.quote = Some(b),
                (None, b';') => return Some(i),
                _ => {}
            }
        }
        None
    }
}

/// One statement cut from the input.
enum Statement {
    /// Text up to and including a top-level `;`.
    Terminated(String),
    /// Whatever followed the last `;` at end of input.
    Tail(String),
}

/// Lazily yields one tree per `;`-terminated statement. Statements may span
/// lines and several may share one line. A malformed statement yields its
/// error and reading continues with the next one. Error offsets are relative
/// to the start of the failing statement.
pub struct NewickRecords<R> {
    reader: R,
    opts: ParseOptions,
    line_no: usize,
    buf_line: String,
    pending: String,
    scanned: usize,
    scanner: StatementScanner,
    queued: std::vec::IntoIter<PhyloTree>,
    done: bool,
}

impl<R: BufRead> NewickRecords<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ParseOptions::default())
    }

    pub fn with_options(reader: R, opts: ParseOptions) -> Self {
        Self {
            reader,
            opts,
            line_no: 0,
            buf_line: String::new(),
            pending: String::new(),
            scanned: 0,
            scanner: StatementScanner::default(),
            queued: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// Counts the remaining statements without parsing them. Consumes the reader.
    pub fn count_trees(&mut self) -> PhyloResult<usize> {
        let mut count = self.queued.len();
        self.queued = Vec::new().into_iter();
        while self.skip_statement()? {
            count += 1;
        }
        Ok(count)
    }

    /// Drops the next statement without parsing it. Returns false at end of input.
    pub fn skip_next(&mut self) -> PhyloResult<bool> {
        if self.queued.next().is_some() {
            return Ok(true);
        }
        self.skip_statement()
    }

    fn skip_statement(&mut self) -> PhyloResult<bool> {
        match self.next_statement() {
            Some(Ok(Statement::Terminated(_))) => Ok(true),
            Some(Ok(Statement::Tail(rest))) => Ok(!is_blank(&rest)),
            Some(Err(err)) => Err(err),
            None => Ok(false),
        }
    }

    fn take_statement(&mut self) -> Option<String> {
        let end = self.scanned + self.scanner.find_end(&self.pending.as_bytes()[self.scanned..])?;
        let statement: String = self.pending.drain(..=end).collect();
        self.scanned = 0;
        self.scanner = StatementScanner::default();
        Some(statement)
    }

    fn next_statement(&mut self) -> Option<PhyloResult<Statement>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(statement) = self.take_statement() {
                return Some(Ok(Statement::Terminated(statement)));
            }
            self.scanned = self.pending.len();

            self.buf_line.clear();
            match self.reader.read_line(&mut self.buf_line) {
                Ok(0) => {
                    self.done = true;
                    let rest = std::mem::take(&mut self.pending);
                    return Some(Ok(Statement::Tail(rest)));
                }
                Ok(_) => {
                    self.line_no += 1;
                    self.pending.push_str(&self.buf_line);
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for NewickRecords<R> {
    type Item = PhyloResult<PhyloTree>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(tree) = self.queued.next() {
            return Some(Ok(tree));
        }
        match self.next_statement()? {
            Ok(Statement::Terminated(text)) => {
                let parsed = parse_with(&text, &self.opts);
                if let Err(err) = &parsed {
                    tracing::debug!(line = self.line_no, %err, "newick statement rejected");
                }
                Some(parsed)
            }
            // only whitespace and comments may follow the last tree; every
            // tree the tail does hold is still yielded
            Ok(Statement::Tail(rest)) => match parse_many_with(&rest, &self.opts) {
                Ok(trees) => {
                    self.queued = trees.into_iter();
                    self.queued.next().map(Ok)
                }
                Err(err) => {
                    tracing::debug!(line = self.line_no, %err, "newick tail rejected");
                    Some(Err(err))
                }
            },
            Err(err) => Some(Err(err)),
        }
    }
}

pub fn newick_records_from_reader<R: BufRead>(reader: R) -> NewickRecords<R> {
    NewickRecords::new(reader)
}

pub fn read_newick_from_reader<R: BufRead>(reader: R) -> PhyloResult<Vec<PhyloTree>> {
    let mut out = Vec::new();
    for tree in newick_records_from_reader(reader) {
        out.push(tree?);
    }
    Ok(out)
}

/// Reads every statement, skipping malformed ones under [`OnError::Skip`].
/// I/O failures are always returned.
pub fn read_newick_report_from_reader<R: BufRead>(
    reader: R,
    opts: ParseOptions,
    on_error: OnError,
) -> PhyloResult<ReadReport<Vec<PhyloTree>>> {
    let mut records = NewickRecords::with_options(reader, opts);
    let mut data = Vec::new();
    let mut skipped = Vec::new();
    let mut statement = 0;
    while let Some(result) = records.next() {
        match result {
            Ok(tree) => data.push(tree),
            Err(err) if on_error == OnError::Skip && err.kind() != ErrorKind::Io => {
                skipped.push(SkippedRecord {
                    statement,
                    line: records.line_no(),
                    message: err.to_string().into(),
                });
            }
            Err(err) => return Err(err),
        }
        statement += 1;
    }
    Ok(ReadReport { data, skipped })
}

pub fn read_newick_from_path(path: impl AsRef<Path>) -> PhyloResult<Vec<PhyloTree>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    read_newick_from_reader(reader)
}

pub fn read_newick_from_bytes(data: &[u8]) -> PhyloResult<Vec<PhyloTree>> {
    let reader = BufReader::new(Cursor::new(data));
    read_newick_from_reader(reader)
}

/// Writes one tree per line.
pub fn write_newick_to_writer<W: Write>(
    mut writer: W,
    trees: &[PhyloTree],
    opts: &WriteOptions,
) -> PhyloResult<()> {
    for tree in trees {
        writeln!(writer, "{}", write_newick(tree, opts))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_newick_to_path(
    path: impl AsRef<Path>,
    trees: &[PhyloTree],
    opts: &WriteOptions,
) -> PhyloResult<()> {
    let file = File::create(path)?;
    write_newick_to_writer(BufWriter::new(file), trees, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PhyloError};
    use crate::phylo::newick::to_newick;

    #[test]
    fn one_tree_per_line() {
        let data = b"((A,B),C);\n((A,C),B);\n";
        let trees = read_newick_from_bytes(data).unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(to_newick(&trees[1]), "((A,C),B);");
    }

    #[test]
    fn statement_spanning_lines() {
        let data = b"((A:1,\n  B:2):3,\n C:4);\n";
        let trees = read_newick_from_bytes(data).unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(to_newick(&trees[0]), "((A:1,B:2):3,C:4);");
    }

    #[test]
    fn several_statements_on_one_line() {
        let trees = read_newick_from_bytes(b"(A,B);(C,D); (E,F);").unwrap();
        let labels: Vec<_> = trees.iter().map(|t| t.leaf_labels()).collect();
        assert_eq!(labels, [["A", "B"], ["C", "D"], ["E", "F"]]);
    }

    #[test]
    fn semicolons_inside_quotes_and_comments() {
        let data = b"('a;b'[x;y],C);\n[&R] (D,E);\n";
        let trees = read_newick_from_bytes(data).unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].leaf_labels(), ["a;b", "C"]);
        assert!(trees[1].is_rooted());
    }

    #[test]
    fn trailing_comment_and_blank_lines() {
        let trees = read_newick_from_bytes(b"(A,B);\n\n[end of file]\n").unwrap();
        assert_eq!(trees.len(), 1);
        assert!(read_newick_from_bytes(b"").unwrap().is_empty());
    }

    #[test]
    fn unterminated_last_tree() {
        let err = read_newick_from_bytes(b"(A,B);\n(C,D)\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn bad_statement_does_not_stop_reader() {
        let data: &[u8] = b"(A,B));\n(C,D);\n";
        let results: Vec<_> = newick_records_from_reader(data).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(PhyloError::Syntax { .. })));
        assert!(results[1].is_ok());
    }

    #[test]
    fn report_skips_bad_statements() {
        let data: &[u8] = b"(A,B);\n(C,\nD:x);\n(E,F);\n";
        let report =
            read_newick_report_from_reader(data, ParseOptions::default(), OnError::Skip).unwrap();
        assert_eq!(report.data.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].statement, 1);
        assert_eq!(report.skipped[0].line, 3);
        assert!(report.skipped[0].message.contains("'x'"));

        let err = read_newick_report_from_reader(data, ParseOptions::default(), OnError::Raise)
            .unwrap_err();
        assert!(matches!(err, PhyloError::InvalidBranchLength { .. }));
    }

    #[test]
    fn lenient_options_apply_per_statement() {
        let reader = NewickRecords::with_options(&b"(A,A);\n"[..], ParseOptions::lenient());
        let trees: Vec<_> = reader.collect::<PhyloResult<_>>().unwrap();
        assert_eq!(trees.len(), 1);
        assert!(read_newick_from_bytes(b"(A,A);\n").is_err());
    }

    #[test]
    fn quote_inside_label_does_not_swallow_later_trees() {
        let data: &[u8] = b"(O'Brien,B);\n(C,D);\n(E,F);\n";
        let results: Vec<_> = newick_records_from_reader(data).collect();
        let text = std::str::from_utf8(data).unwrap();
        assert!(crate::phylo::newick::parse_many(text).is_err());
        assert!(!results.is_empty());
        assert!(results.iter().any(|r| matches!(r, Err(PhyloError::Syntax { .. }))));
        assert!(read_newick_from_bytes(data).is_err());
    }

    #[test]
    fn reader_agrees_with_parse_many() {
        let text = "(A,B);\n('x;y',C)[c;d];\n[&R] (D,\"E\");\n[done]\n";
        let from_reader = read_newick_from_bytes(text.as_bytes()).unwrap();
        let from_text = crate::phylo::newick::parse_many(text).unwrap();
        assert_eq!(from_reader.len(), 3);
        let a: Vec<_> = from_reader.iter().map(to_newick).collect();
        let b: Vec<_> = from_text.iter().map(to_newick).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn tail_statements_are_all_yielded() {
        // an unbalanced quote in a comment-free tail hides later `;` from the scanner
        let mut records = NewickRecords::new(&b"(A,B);\n"[..]);
        records.pending.push_str("(C,D);(E,F);");
        records.scanner.quote = Some(b'"');
        let trees: Vec<_> = records.collect::<PhyloResult<_>>().unwrap();
        let labels: Vec<_> = trees.iter().map(|t| t.leaf_labels()).collect();
        assert_eq!(labels, [["C", "D"], ["E", "F"], ["A", "B"]]);
    }

    #[test]
    fn count_and_skip() {
        let data: &[u8] = b"(A,B);\n(C,\nD:x);\n(E,F); [end]\n";
        assert_eq!(newick_records_from_reader(data).count_trees().unwrap(), 3);

        let mut records = newick_records_from_reader(data);
        assert!(records.skip_next().unwrap());
        assert!(records.skip_next().unwrap());
        let last = records.next().unwrap().unwrap();
        assert_eq!(last.leaf_labels(), ["E", "F"]);
        assert!(!records.skip_next().unwrap());
        assert!(records.next().is_none());
        assert_eq!(records.count_trees().unwrap(), 0);

        assert_eq!(newick_records_from_reader(&b""[..]).count_trees().unwrap(), 0);
        assert_eq!(newick_records_from_reader(&b"(A,B)"[..]).count_trees().unwrap(), 1);
    }

    #[test]
    fn write_one_per_line() {
        let trees = read_newick_from_bytes(b"(A:1,B:2);(C,D);").unwrap();
        let mut out = Vec::new();
        write_newick_to_writer(&mut out, &trees, &WriteOptions::default()).unwrap();
        assert_eq!(out, b"(A:1,B:2);\n(C,D);\n");
    }

    #[test]
    fn path_round_trip() {
        let path = std::env::temp_dir().join(format!("phylotree-io-{}.nwk", std::process::id()));
        let trees = read_newick_from_bytes(b"((A:0.5,B:0.25):1,C:2);").unwrap();
        write_newick_to_path(&path, &trees, &WriteOptions::default()).unwrap();
        let again = read_newick_from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(to_newick(&again[0]), to_newick(&trees[0]));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_newick_from_path("/nonexistent/dir/trees.nwk").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
