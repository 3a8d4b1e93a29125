//! Python binding layer for split compatibility and comparison.
//!
//! Provides Python functions for building trees from split lists and
//! comparing split lists against a reference.

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use rayon::prelude::*;

use crate::cluster::ClusterTree;
use crate::compare::{compare, ComparisonRow};
use crate::diagnostics::Diagnostics;
use crate::error::SplitError;
use crate::io::{
    build_store, read_newick_store, read_split_records, read_taxa, universe_from_records,
    SplitRecord,
};
use crate::split::Split;
use crate::store::{Orientation, SplitStore};
use crate::taxa::{Membership, TaxonUniverse};

/// One comparison row as seen from Python:
/// (precision, recall, F1, symmetric_distance, RF_distance,
///  precision_w, recall_w, F1_w, distance_w, branch_score).
/// Undefined ratios are `None`.
type PyRow = (
    Option<f64>,
    Option<f64>,
    Option<f64>,
    f64,
    usize,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    f64,
    f64,
);

/// Build a tree from a split list.
///
/// Args:
///     path: Split list file (weight<TAB>label<TAB>label...), optionally gzipped
///     taxa_path: Taxa list defining the universe; all labels of `path` when omitted
///     greedy: Skip incompatible splits by descending weight instead of failing (default: False)
///     lenient: Drop labels missing from the taxa list instead of failing (default: False)
///
/// Returns:
///     A tuple of (tree, splits) where:
///     - tree is the nested bracket notation ending in ';'
///     - splits lists the (weight, labels) pairs placed in the tree
///
/// Raises:
///     ValueError: If the input is malformed or, in strict mode, a split is incompatible
#[pyfunction]
#[pyo3(signature = (path, taxa_path=None, greedy=false, lenient=false))]
fn build_tree(
    path: String,
    taxa_path: Option<String>,
    greedy: bool,
    lenient: bool,
) -> PyResult<(String, Vec<(f64, Vec<String>)>)> {
    let records = read_split_records(&path, 0.0).map_err(to_py_err)?;
    let universe = load_universe(taxa_path.as_deref(), &[records.as_slice()])?;
    let mut diag = Diagnostics::new();
    let store = build_store(&records, &universe, Orientation::Oriented, membership(lenient), &mut diag)
        .map_err(to_py_err)?;

    let (tree, placed) = if greedy {
        let (tree, outcome) = ClusterTree::build_greedy(&store, &universe, &mut diag).map_err(to_py_err)?;
        (tree, outcome.accepted)
    } else {
        let tree = ClusterTree::build_strict(&store, &universe, &mut diag).map_err(to_py_err)?;
        let all = store.iter().map(|(s, w)| (s.clone(), w)).collect();
        (tree, all)
    };

    let newick = tree.serialize(&universe).map_err(to_py_err)?;
    Ok((newick, labeled(&placed, &universe)))
}

/// Compare a donor split list against a reference split list.
///
/// Args:
///     donor_path: Donor split list
///     reference_path: Reference split list
///     taxa_path: Taxa list defining the universe; all labels of both inputs when omitted
///     add_weight: Added to the weight of every split line read (default: 0.0)
///     top: Keep only the k heaviest splits of both inputs (default: all)
///     ignore_trivial: Remove trivial (leaf) splits before comparing (default: False)
///     lenient: Drop labels missing from the taxa list instead of failing (default: False)
///
/// Returns:
///     One row per donor prefix, ranked by descending donor weight; the last row is the summary.
///     Each row is (precision, recall, F1, symmetric_distance, RF_distance,
///     precision_w, recall_w, F1_w, distance_w, branch_score) with `None` for undefined ratios.
///
/// Raises:
///     ValueError: If an input is malformed or, in strict mode, a label is unknown
#[pyfunction]
#[pyo3(signature = (donor_path, reference_path, taxa_path=None, add_weight=0.0, top=None, ignore_trivial=false, lenient=false))]
fn compare_splits(
    donor_path: String,
    reference_path: String,
    taxa_path: Option<String>,
    add_weight: f64,
    top: Option<usize>,
    ignore_trivial: bool,
    lenient: bool,
) -> PyResult<Vec<PyRow>> {
    let donor_records = read_split_records(&donor_path, add_weight).map_err(to_py_err)?;
    let reference_records = read_split_records(&reference_path, add_weight).map_err(to_py_err)?;
    let universe = load_universe(taxa_path.as_deref(), &[reference_records.as_slice(), donor_records.as_slice()])?;
    let filters = Filters { top, ignore_trivial, membership: membership(lenient) };

    let reference = filters.store(&reference_records, &universe)?;
    let donor = filters.store(&donor_records, &universe)?;
    let comparison = compare(&donor, &reference);

    let mut rows: Vec<PyRow> = comparison.rows.iter().map(py_row).collect();
    if rows.is_empty() {
        rows.push(py_row(&comparison.summary));
    }
    Ok(rows)
}

/// Compare several donor split lists against one reference, in parallel.
///
/// Args:
///     donor_paths: List of donor split list files
///     reference_path: Reference split list
///     taxa_path, add_weight, top, ignore_trivial, lenient: as for `compare_splits`
///
/// Returns:
///     A tuple of (donor_names, summaries) with one summary row per donor.
///
/// Raises:
///     ValueError: If no donors are given or any input is malformed
#[pyfunction]
#[pyo3(signature = (donor_paths, reference_path, taxa_path=None, add_weight=0.0, top=None, ignore_trivial=false, lenient=false))]
fn compare_many(
    donor_paths: Vec<String>,
    reference_path: String,
    taxa_path: Option<String>,
    add_weight: f64,
    top: Option<usize>,
    ignore_trivial: bool,
    lenient: bool,
) -> PyResult<(Vec<String>, Vec<PyRow>)> {
    if donor_paths.is_empty() {
        return Err(PyValueError::new_err("No donor split lists given"));
    }

    let reference_records = read_split_records(&reference_path, add_weight).map_err(to_py_err)?;
    let donor_records: Vec<Vec<SplitRecord>> = donor_paths
        .par_iter()
        .map(|p| read_split_records(p, add_weight))
        .collect::<Result<_, _>>()
        .map_err(to_py_err)?;

    let mut all: Vec<&[SplitRecord]> = vec![reference_records.as_slice()];
    all.extend(donor_records.iter().map(Vec::as_slice));
    let universe = load_universe(taxa_path.as_deref(), &all)?;
    let filters = Filters { top, ignore_trivial, membership: membership(lenient) };
    let reference = filters.store(&reference_records, &universe)?;

    let summaries: Vec<PyRow> = donor_records
        .par_iter()
        .map(|records| -> PyResult<PyRow> {
            let donor = filters.store(records, &universe)?;
            Ok(py_row(&compare(&donor, &reference).summary))
        })
        .collect::<PyResult<_>>()?;

    Ok((donor_paths, summaries))
}

/// Convert the first tree of a Newick file into (weight, labels) splits.
///
/// Args:
///     path: Newick file
///     taxa_path: Restrict the splits to the taxa of this list (default: all leaves)
///     lenient: Drop leaves missing from the taxa list instead of failing (default: False)
///
/// Raises:
///     ValueError: If the tree cannot be parsed or, in strict mode, a leaf is unknown
#[pyfunction]
#[pyo3(signature = (path, taxa_path=None, lenient=false))]
fn newick_to_splits(
    path: String,
    taxa_path: Option<String>,
    lenient: bool,
) -> PyResult<Vec<(f64, Vec<String>)>> {
    let universe = taxa_path
        .map(|p| read_taxa(p).map_err(to_py_err))
        .transpose()?;
    let mut diag = Diagnostics::new();
    let (universe, store) =
        read_newick_store(&path, universe, membership(lenient), &mut diag).map_err(to_py_err)?;
    let splits: Vec<(Split, f64)> = store.iter().map(|(s, w)| (s.clone(), w)).collect();
    Ok(labeled(&splits, &universe))
}

/// Pre-filters shared by both inputs of a comparison.
struct Filters {
    top: Option<usize>,
    ignore_trivial: bool,
    membership: Membership,
}

impl Filters {
    fn store(&self, records: &[SplitRecord], universe: &TaxonUniverse) -> PyResult<SplitStore> {
        let mut diag = Diagnostics::new();
        let mut store = build_store(records, universe, Orientation::Canonical, self.membership, &mut diag)
            .map_err(to_py_err)?;
        if self.ignore_trivial {
            store.remove_trivial(universe.size());
        }
        if let Some(k) = self.top {
            store.truncate_top_k(k);
        }
        Ok(store)
    }
}

fn load_universe(taxa_path: Option<&str>, records: &[&[SplitRecord]]) -> PyResult<TaxonUniverse> {
    match taxa_path {
        Some(p) => read_taxa(p).map_err(to_py_err),
        None => {
            let all: Vec<SplitRecord> = records.iter().flat_map(|r| r.iter().cloned()).collect();
            Ok(universe_from_records(&all))
        }
    }
}

fn membership(lenient: bool) -> Membership {
    if lenient { Membership::Lenient } else { Membership::Strict }
}

fn labeled(splits: &[(Split, f64)], universe: &TaxonUniverse) -> Vec<(f64, Vec<String>)> {
    splits
        .iter()
        .map(|(s, w)| (*w, s.labels(universe).into_iter().map(String::from).collect()))
        .collect()
}

fn py_row(row: &ComparisonRow) -> PyRow {
    (
        row.precision(),
        row.recall(),
        row.f1(),
        row.symmetric_distance(),
        row.rf_distance(),
        row.precision_weighted(),
        row.recall_weighted(),
        row.f1_weighted(),
        row.distance_weighted(),
        row.branch_score,
    )
}

fn to_py_err(e: SplitError) -> PyErr {
    match e {
        SplitError::Io(io) => PyIOError::new_err(io.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

/// Python module definition
#[pymodule]
fn split_compat(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(build_tree, m)?)?;
    m.add_function(wrap_pyfunction!(compare_splits, m)?)?;
    m.add_function(wrap_pyfunction!(compare_many, m)?)?;
    m.add_function(wrap_pyfunction!(newick_to_splits, m)?)?;
    Ok(())
}
