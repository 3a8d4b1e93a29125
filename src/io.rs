use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use itertools::Itertools;
use phylotree::tree::Tree;
use tracing::{debug, info};

use crate::bitset::Bitset;
use crate::compare::{Comparison, ComparisonRow};
use crate::diagnostics::Diagnostics;
use crate::error::SplitError;
use crate::split::Split;
use crate::store::{Orientation, SplitStore};
use crate::taxa::{Membership, TaxonUniverse};

/// Extensions of sequence files whose names are used as taxon labels.
const SEQUENCE_EXTENSIONS: [&str; 7] = [".fa", ".fas", ".fastq", ".mfasta", ".fasta", ".fsa", ".fna"];
const ARCHIVE_EXTENSIONS: [&str; 3] = [".gz", ".gzip", ".zip"];

/// One line of a split list: a weight and the labels of one side.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRecord {
    pub line: usize,
    pub weight: f64,
    pub labels: Vec<String>,
}

/// Turn a sequence file name into a taxon label.
///
/// `dir/genome.fasta.gz` → `genome`: an archive extension is removed first,
/// then one sequence extension, then any directory prefix.
pub fn strip_sequence_extension(name: &str) -> String {
    let mut label = name;
    if let Some(stem) = ARCHIVE_EXTENSIONS.iter().find_map(|ext| label.strip_suffix(ext)) {
        label = stem;
    }
    if let Some(stem) = SEQUENCE_EXTENSIONS.iter().find_map(|ext| label.strip_suffix(ext)) {
        label = stem;
    }
    label.rsplit('/').next().unwrap_or(label).to_string()
}

/// Open a file for reading, decompressing it when the path ends with `.gz`.
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    let file = File::open(p)?;
    if p.to_string_lossy().ends_with(".gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Buffered output sink: stdout, a plain file or a gzip-compressed file.
pub enum Output {
    Stdout(BufWriter<io::Stdout>),
    File(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl Output {
    /// Flushes the buffer and, for gzip output, writes the stream trailer.
    pub fn finish(self) -> io::Result<()> {
        match self {
            Output::Stdout(mut w) => w.flush(),
            Output::File(mut w) => w.flush(),
            Output::Gzip(w) => {
                w.into_inner()?.finish()?;
                Ok(())
            }
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout(w) => w.write(buf),
            Output::File(w) => w.write(buf),
            Output::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout(w) => w.flush(),
            Output::File(w) => w.flush(),
            Output::Gzip(w) => w.flush(),
        }
    }
}

/// Open a file for writing.
/// If `path` ends with `.gz`, the output is gzip-compressed.
/// If `path` equals `-`, output goes to stdout (uncompressed).
/// Call [`Output::finish`] when done so that write errors are reported.
pub fn open_writer<P: AsRef<Path>>(path: P) -> io::Result<Output> {
    let p = path.as_ref();
    if p.as_os_str() == "-" {
        return Ok(Output::Stdout(BufWriter::new(io::stdout())));
    }
    let f = File::create(p)?;
    if p.to_string_lossy().ends_with(".gz") {
        Ok(Output::Gzip(BufWriter::new(GzEncoder::new(f, Compression::default()))))
    } else {
        Ok(Output::File(BufWriter::new(f)))
    }
}

/// Read a taxa list: one label per line, first whitespace-separated token.
/// Line order defines the taxon ids.
pub fn read_taxa<P: AsRef<Path>>(path: P) -> Result<TaxonUniverse, SplitError> {
    let reader = open_reader(path)?;
    let mut universe = TaxonUniverse::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(token) = line.split_whitespace().next() {
            universe.register(strip_sequence_extension(token));
        }
    }
    Ok(universe)
}

/// Parse split-list records; `weight_offset` is added to every line's weight.
pub fn parse_split_records<R: BufRead>(
    reader: R,
    weight_offset: f64,
) -> Result<Vec<SplitRecord>, SplitError> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let weight_field = fields.next().unwrap_or_default().trim();
        let weight: f64 = weight_field.parse().map_err(|_| SplitError::MalformedRecord {
            line: idx + 1,
            reason: format!("invalid weight '{weight_field}'"),
        })?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(SplitError::MalformedRecord {
                line: idx + 1,
                reason: format!("weight must be a non-negative number, got {weight}"),
            });
        }
        let weight = weight + weight_offset;
        if !weight.is_finite() || weight < 0.0 {
            return Err(SplitError::MalformedRecord {
                line: idx + 1,
                reason: format!("weight offset {weight_offset} yields {weight}"),
            });
        }
        let labels = fields
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(strip_sequence_extension)
            .collect();
        records.push(SplitRecord {
            line: idx + 1,
            weight,
            labels,
        });
    }
    Ok(records)
}

pub fn read_split_records<P: AsRef<Path>>(
    path: P,
    weight_offset: f64,
) -> Result<Vec<SplitRecord>, SplitError> {
    let records = parse_split_records(open_reader(path.as_ref())?, weight_offset)?;
    debug!("read {} split records from {:?}", records.len(), path.as_ref());
    Ok(records)
}

/// Universe of every label in `records`, ids in order of first appearance.
pub fn universe_from_records(records: &[SplitRecord]) -> TaxonUniverse {
    TaxonUniverse::from_labels(records.iter().flat_map(|r| r.labels.iter().cloned()))
}

/// Insert records into a new store, resolving labels according to `membership`.
pub fn build_store(
    records: &[SplitRecord],
    universe: &TaxonUniverse,
    orientation: Orientation,
    membership: Membership,
    diag: &mut Diagnostics,
) -> Result<SplitStore, SplitError> {
    let mut store = SplitStore::with_orientation(orientation);
    for record in records {
        let mut side = Bitset::zeros(universe.words());
        for label in &record.labels {
            if let Some(id) = universe.resolve(label, membership, diag)? {
                side.set(id);
            }
        }
        store.insert(&side, record.weight, universe, diag);
    }
    Ok(store)
}

/// Write splits as a split list, one `weight<TAB>label...` line each.
pub fn write_splits<P: AsRef<Path>>(
    path: P,
    splits: &[(Split, f64)],
    universe: &TaxonUniverse,
) -> io::Result<()> {
    let mut out = open_writer(path)?;
    for (split, weight) in splits {
        writeln!(out, "{}\t{}", weight, split.labels(universe).join("\t"))?;
    }
    out.finish()
}

/// Write a serialized tree followed by a newline.
pub fn write_tree<P: AsRef<Path>>(path: P, tree: &str) -> io::Result<()> {
    let mut out = open_writer(path)?;
    writeln!(out, "{tree}")?;
    out.finish()
}

/// Write comparison tables, one block per donor.
///
/// With more than one donor each block starts with a `# <name>` line. Without
/// `all_rows` only the summary row is written.
pub fn write_comparisons<P: AsRef<Path>>(
    path: P,
    results: &[(String, Comparison)],
    weighted: bool,
    all_rows: bool,
) -> io::Result<()> {
    let mut out = open_writer(path)?;
    for (name, comparison) in results {
        if results.len() > 1 {
            writeln!(out, "# {name}")?;
        }
        writeln!(out, "{}", ComparisonRow::header(weighted))?;
        if all_rows && !comparison.rows.is_empty() {
            for row in &comparison.rows {
                writeln!(out, "{}", row.render(weighted))?;
            }
        } else {
            writeln!(out, "{}", comparison.summary.render(weighted))?;
        }
    }
    out.finish()
}

/// Strip BEAST annotations from Newick strings.
///
/// BEAST format includes annotations like :[&rate=0.123]2.45 where 2.45 is the actual branch length.
/// This function removes the [&...] annotations while preserving the branch lengths.
fn strip_beast_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut in_annotation = false;
    let mut chars = newick.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '[' && chars.peek() == Some(&'&') {
            in_annotation = true;
        } else if ch == ']' && in_annotation {
            in_annotation = false;
        } else if !in_annotation {
            result.push(ch);
        }
    }

    result
}

/// First `;`-terminated tree of a Newick text.
fn first_newick(content: &str) -> Option<String> {
    let end = content.find(';')?;
    let tree = content[..=end].trim();
    (tree.len() > 1).then(|| strip_beast_annotations(tree))
}

/// Splits of a Newick tree, weighted by branch length.
///
/// Every non-root edge contributes the leaves below it. Without a universe,
/// one is built from the leaf names sorted alphabetically. With a universe,
/// leaves outside of it are handled according to `membership`, so in lenient
/// mode the splits are those of the tree pruned to the universe; edges that
/// become identical after pruning add up their lengths.
pub fn newick_to_store(
    newick: &str,
    universe: Option<TaxonUniverse>,
    membership: Membership,
    diag: &mut Diagnostics,
) -> Result<(TaxonUniverse, SplitStore), SplitError> {
    let text = first_newick(newick)
        .ok_or_else(|| SplitError::Newick("no ';'-terminated tree found".to_string()))?;
    let tree = Tree::from_newick(&text).map_err(|e| SplitError::Newick(e.to_string()))?;

    let universe = match universe {
        Some(u) => u,
        None => {
            let names = leaf_names(&tree)?;
            TaxonUniverse::from_labels(names.into_iter().sorted())
        }
    };

    let root_id = tree.get_root()?;
    let mut edges: Vec<(Bitset, f64)> = Vec::new();
    collect_edges(&tree, root_id, root_id, &universe, membership, diag, &mut edges)?;

    let mut store = SplitStore::new();
    for (side, length) in &edges {
        store.insert(side, *length, &universe, diag);
    }
    info!(
        "extracted {} splits over {} taxa from {} edges",
        store.len(),
        universe.size(),
        edges.len()
    );
    Ok((universe, store))
}

pub fn read_newick_store<P: AsRef<Path>>(
    path: P,
    universe: Option<TaxonUniverse>,
    membership: Membership,
    diag: &mut Diagnostics,
) -> Result<(TaxonUniverse, SplitStore), SplitError> {
    let content = fs::read_to_string(path)?;
    newick_to_store(&content, universe, membership, diag)
}

fn leaf_names(tree: &Tree) -> Result<Vec<String>, SplitError> {
    tree.get_leaves()
        .iter()
        .map(|leaf_id| {
            let node = tree.get(leaf_id)?;
            node.name
                .as_deref()
                .map(strip_sequence_extension)
                .ok_or_else(|| SplitError::Newick(format!("leaf {leaf_id} has no name")))
        })
        .collect()
}

/// Post-order DFS: returns the taxa below `node_id` and records one edge per
/// non-root node.
fn collect_edges(
    tree: &Tree,
    node_id: usize,
    root_id: usize,
    universe: &TaxonUniverse,
    membership: Membership,
    diag: &mut Diagnostics,
    edges: &mut Vec<(Bitset, f64)>,
) -> Result<Bitset, SplitError> {
    let node = tree.get(&node_id)?;
    let mut below = Bitset::zeros(universe.words());

    if node.children.is_empty() {
        let name = node
            .name
            .as_deref()
            .map(strip_sequence_extension)
            .ok_or_else(|| SplitError::Newick(format!("leaf {node_id} has no name")))?;
        if let Some(id) = universe.resolve(&name, membership, diag)? {
            below.set(id);
        }
    } else {
        for &child_id in &node.children {
            let child = collect_edges(tree, child_id, root_id, universe, membership, diag, edges)?;
            below.or_assign(&child);
        }
    }

    if node_id != root_id {
        edges.push((below.clone(), node.parent_edge.unwrap_or(0.0)));
    }
    Ok(below)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::canonicalize;
    use std::io::Read;

    #[test]
    fn test_strip_sequence_extension() {
        assert_eq!(strip_sequence_extension("genome.fasta.gz"), "genome");
        assert_eq!(strip_sequence_extension("dir/sub/genome.fna"), "genome");
        assert_eq!(strip_sequence_extension("plain"), "plain");
        assert_eq!(strip_sequence_extension("archive.zip"), "archive");
        assert_eq!(strip_sequence_extension("strain.v2"), "strain.v2");
    }

    #[test]
    fn test_parse_split_records() {
        let input = "1.5\tA\tB\n\n2\tC.fa\tD\n";
        let records = parse_split_records(input.as_bytes(), 0.5).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].weight, 2.0);
        assert_eq!(records[0].labels, vec!["A", "B"]);
        assert_eq!(records[1].line, 3);
        assert_eq!(records[1].labels, vec!["C", "D"]);
    }

    #[test]
    fn test_malformed_weight_is_fatal() {
        let err = parse_split_records("1.0\tA\tB\nabc\tC\tD\n".as_bytes(), 0.0).unwrap_err();
        assert!(matches!(err, SplitError::MalformedRecord { line: 2, .. }));
        let err = parse_split_records("-1\tA\tB\n".as_bytes(), 0.0).unwrap_err();
        assert!(matches!(err, SplitError::MalformedRecord { line: 1, .. }));
    }

    #[test]
    fn test_weight_offset_cannot_go_negative() {
        let err = parse_split_records("1\tA\tB\n".as_bytes(), -5.0).unwrap_err();
        assert!(matches!(err, SplitError::MalformedRecord { line: 1, .. }));
        let err = parse_split_records("1\tA\tB\n".as_bytes(), f64::NAN).unwrap_err();
        assert!(matches!(err, SplitError::MalformedRecord { line: 1, .. }));
        let records = parse_split_records("6\tA\tB\n".as_bytes(), -5.0).unwrap();
        assert_eq!(records[0].weight, 1.0);
    }

    #[test]
    fn test_gzip_output_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.nwk.gz");
        write_tree(&path, "((A,B),C,D);").unwrap();

        let mut text = String::new();
        flate2::read::GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "((A,B),C,D);\n");
    }

    #[test]
    fn test_build_store_strict_and_lenient() {
        let records = parse_split_records("1\tA\tB\n2\tA\tX\n".as_bytes(), 0.0).unwrap();
        let universe = TaxonUniverse::from_labels(["A", "B", "C", "D", "E"]);
        let mut diag = Diagnostics::new();

        let err = build_store(&records, &universe, Orientation::Canonical, Membership::Strict, &mut diag)
            .unwrap_err();
        assert!(matches!(err, SplitError::UnknownTaxon(ref l) if l == "X"));

        let store = build_store(&records, &universe, Orientation::Canonical, Membership::Lenient, &mut diag)
            .unwrap();
        assert_eq!(diag.discarded_taxa, 1);
        // second record shrinks to the trivial split {A}
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_universe_from_records_in_order_of_appearance() {
        let records = parse_split_records("1\tC\tA\n2\tA\tB\n".as_bytes(), 0.0).unwrap();
        let universe = universe_from_records(&records);
        assert_eq!(universe.labels(), &["C", "A", "B"]);
    }

    #[test]
    fn test_newick_to_store() {
        let mut diag = Diagnostics::new();
        let (universe, store) =
            newick_to_store("((A:1,B:1):2,(C:1,D:1):3,E:1);", None, Membership::Strict, &mut diag).unwrap();
        assert_eq!(universe.labels(), &["A", "B", "C", "D", "E"]);

        let ab = canonicalize(&Bitset::from_ids(universe.words(), [0, 1]), &universe);
        let cd = canonicalize(&Bitset::from_ids(universe.words(), [2, 3]), &universe);
        assert_eq!(store.get(&ab), Some(2.0));
        assert_eq!(store.get(&cd), Some(3.0));
        // 5 leaf edges + 2 internal edges
        assert_eq!(store.len(), 7);
    }

    #[test]
    fn test_newick_rooted_bifurcation_merges_lengths() {
        let mut diag = Diagnostics::new();
        let (universe, store) = newick_to_store(
            "((A:1,B:1)[&rate=0.5]:2,(C:1,D:1):3);",
            None,
            Membership::Strict,
            &mut diag,
        )
        .unwrap();
        let ab = canonicalize(&Bitset::from_ids(universe.words(), [0, 1]), &universe);
        assert_eq!(store.get(&ab), Some(5.0));
        assert_eq!(diag.duplicate_splits, 1);
    }

    #[test]
    fn test_newick_pruned_to_universe() {
        let mut diag = Diagnostics::new();
        let universe = TaxonUniverse::from_labels(["A", "B", "C", "D"]);
        let (universe, store) = newick_to_store(
            "(((A:1,X:1):1,B:1):2,(C:1,D:1):3);",
            Some(universe),
            Membership::Lenient,
            &mut diag,
        )
        .unwrap();
        assert_eq!(diag.discarded_taxa, 1);
        let ab = canonicalize(&Bitset::from_ids(universe.words(), [0, 1]), &universe);
        // (A,X) becomes the leaf edge of A; {A,B} collects 2 + 3
        assert_eq!(store.get(&ab), Some(5.0));
    }
}
