//! Compatibility tree builder.
//!
//! # Overview
//! The cluster tree is a laminar family of taxon sets: every internal node
//! owns an ordered list of children whose taxon sets are pairwise disjoint and
//! whose union is exactly the node's own set. The tree starts as `n` leaves
//! under one root and every accepted split merges some siblings into a new
//! internal node.
//!
//! ```text
//! start:            (A, B, C, D, E)
//! insert {A,B}:     ((A,B), C, D, E)
//! insert {D,E}:     ((A,B), C, (D,E))
//! insert {A,B}:     the cluster exists already → duplicate, nothing to do
//! insert {B,C}:     (A,B) is only partially covered while (D,E) is not
//!                   covered at all → incompatible
//! ```
//!
//! # Insertion
//! Descending from the root, each child is classified against the split side:
//! - **equal**: the boundary already exists (duplicate)
//! - **strict superset of the side**: the split lives below that child, recurse
//! - **subset of the side**: fully covered
//! - **partial overlap**: at most one such child may exist
//!
//! Two or more fully covered children and no partial one are merged. A single
//! partially covered child is resolved by retrying once with the complement
//! inside that child.

use crate::bitset::Bitset;
use crate::diagnostics::Diagnostics;
use crate::error::SplitError;
use crate::split::Split;
use crate::store::SplitStore;
use crate::taxa::TaxonUniverse;
use itertools::Itertools;
use tracing::{debug, info, warn};

/// One element of the laminar family.
///
/// A leaf has no children and exactly one taxon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    taxa: Bitset,
    children: Vec<ClusterNode>,
}

impl ClusterNode {
    pub fn leaf(words: usize, taxon: usize) -> Self {
        ClusterNode {
            taxa: Bitset::from_ids(words, [taxon]),
            children: Vec::new(),
        }
    }

    /// Internal node over `children`; its taxon set is their union.
    pub fn internal(words: usize, children: Vec<ClusterNode>) -> Self {
        let mut taxa = Bitset::zeros(words);
        for child in &children {
            taxa.or_assign(&child.taxa);
        }
        ClusterNode { taxa, children }
    }

    pub fn taxa(&self) -> &Bitset {
        &self.taxa
    }

    pub fn children(&self) -> &[ClusterNode] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Outcome of one [`ClusterTree::insert`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// A new cluster was created
    Inserted,
    /// Fewer than two taxa on one side; always satisfied
    Trivial,
    /// The cluster already existed
    Duplicate,
    /// No tree containing the current clusters can display the split
    Incompatible,
}

impl Placement {
    /// True for every outcome that leaves the tree displaying the split.
    pub fn is_compatible(self) -> bool {
        self != Placement::Incompatible
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Attempt {
    Direct,
    Complement,
}

/// Result of [`ClusterTree::build_greedy`].
#[derive(Debug, Clone)]
pub struct GreedyOutcome {
    /// Splits that were compatible, in insertion (weight-descending) order
    pub accepted: Vec<(Split, f64)>,
    /// Splits skipped as incompatible
    pub rejected: usize,
    /// Number of splits of a fully resolved unrooted tree, `2n - 3`
    pub max_resolved: usize,
}

/// The mutable cluster hierarchy for one universe.
#[derive(Debug, Clone)]
pub struct ClusterTree {
    root: ClusterNode,
    universe: Bitset,
    n: usize,
}

impl ClusterTree {
    /// `n` singleton leaves under one root.
    pub fn new(universe: &TaxonUniverse) -> Self {
        let words = universe.words();
        let leaves = (0..universe.size())
            .map(|id| ClusterNode::leaf(words, id))
            .collect();
        ClusterTree {
            root: ClusterNode::internal(words, leaves),
            universe: universe.full_set(),
            n: universe.size(),
        }
    }

    pub fn root(&self) -> &ClusterNode {
        &self.root
    }

    /// Inserts one split.
    ///
    /// Returns `Err` only when the tree itself is found broken; an
    /// incompatible split is reported as [`Placement::Incompatible`] and
    /// leaves the tree unchanged.
    pub fn insert(
        &mut self,
        split: &Split,
        universe: &TaxonUniverse,
        diag: &mut Diagnostics,
    ) -> Result<Placement, SplitError> {
        if split.is_trivial(self.n) {
            diag.trivial_splits += 1;
            return Ok(Placement::Trivial);
        }

        let placement = place(&mut self.root, split.side(), self.n, Attempt::Direct)?;

        if placement == Placement::Duplicate {
            warn!("split observed twice: {{{}}}", split.labels(universe).join(", "));
            diag.duplicate_splits += 1;
        }
        debug_assert!(self.check_laminar().is_ok());
        Ok(placement)
    }

    /// Inserts every split in arrival order; the first incompatible split aborts.
    pub fn build_strict(
        store: &SplitStore,
        universe: &TaxonUniverse,
        diag: &mut Diagnostics,
    ) -> Result<ClusterTree, SplitError> {
        let mut tree = ClusterTree::new(universe);
        for (split, _weight) in store.iter() {
            if tree.insert(split, universe, diag)? == Placement::Incompatible {
                let partial_tree = tree.serialize(universe)?;
                return Err(SplitError::IncompatibleSplit {
                    split: split.labels(universe).join(", "),
                    partial_tree,
                });
            }
        }
        info!("all {} splits are compatible", store.len());
        Ok(tree)
    }

    /// Inserts splits by descending weight, skipping incompatible ones.
    ///
    /// The result is the weight-greedy compatible subset: deterministic, but
    /// not necessarily of maximum total weight.
    pub fn build_greedy(
        store: &SplitStore,
        universe: &TaxonUniverse,
        diag: &mut Diagnostics,
    ) -> Result<(ClusterTree, GreedyOutcome), SplitError> {
        let mut tree = ClusterTree::new(universe);
        let mut accepted = Vec::new();
        let mut rejected = 0;

        for (split, weight) in store.ranked() {
            if tree.insert(split, universe, diag)?.is_compatible() {
                accepted.push((split.clone(), weight));
            } else {
                debug!("rejecting incompatible split {{{}}}", split.labels(universe).join(", "));
                rejected += 1;
            }
        }
        diag.rejected_splits += rejected;

        let outcome = GreedyOutcome {
            accepted,
            rejected,
            max_resolved: (2 * universe.size()).saturating_sub(3),
        };
        info!(
            "{} compatible splits (of {} possible splits in a fully resolved tree)",
            outcome.accepted.len(),
            outcome.max_resolved
        );
        Ok((tree, outcome))
    }

    /// Nested bracket notation terminated by `;`, leaves rendered as labels.
    pub fn serialize(&self, universe: &TaxonUniverse) -> Result<String, SplitError> {
        let mut out = String::new();
        write_node(&self.root, universe, &mut out)?;
        out.push(';');
        Ok(out)
    }

    /// Verifies that every internal node's children are pairwise disjoint
    /// and cover exactly the node's taxa.
    pub fn check_laminar(&self) -> Result<(), SplitError> {
        if self.root.taxa != self.universe {
            return Err(SplitError::InvariantViolation(
                "root does not cover the universe".to_string(),
            ));
        }
        check_node(&self.root)
    }
}

/// Recursive insertion step. `side` is a strict subset of `node.taxa`.
fn place(
    node: &mut ClusterNode,
    side: &Bitset,
    n: usize,
    attempt: Attempt,
) -> Result<Placement, SplitError> {
    if node.is_leaf() {
        return Err(SplitError::InvariantViolation(
            "reached a leaf while placing a non-trivial split".to_string(),
        ));
    }

    let mut covered: Vec<usize> = Vec::new();
    let mut partial: Option<usize> = None;
    let mut below: Option<usize> = None;

    for (idx, child) in node.children.iter().enumerate() {
        if child.taxa == *side {
            return Ok(Placement::Duplicate);
        }
        if side.is_subset(&child.taxa) {
            below = Some(idx);
            break;
        }
        if child.taxa.is_subset(side) {
            covered.push(idx);
        } else if child.taxa.intersects(side) {
            if partial.is_some() {
                return Ok(Placement::Incompatible);
            }
            partial = Some(idx);
        }
    }

    if let Some(idx) = below {
        return place(&mut node.children[idx], side, n, attempt);
    }

    if let Some(idx) = partial {
        if attempt == Attempt::Complement || covered.len() + 1 != node.children.len() {
            return Ok(Placement::Incompatible);
        }
        let complement = side.complement(n);
        if !complement.is_subset(&node.children[idx].taxa) {
            return Ok(Placement::Incompatible);
        }
        return place(&mut node.children[idx], &complement, n, Attempt::Complement);
    }

    match covered.len() {
        len if len == node.children.len() => Ok(Placement::Duplicate),
        len if len >= 2 => {
            merge(node, &covered);
            Ok(Placement::Inserted)
        }
        len => Err(SplitError::InvariantViolation(format!(
            "split {{{}}} covers {len} of {} children and overlaps none",
            side.ones().join(","),
            node.children.len()
        ))),
    }
}

/// Replaces the children at `covered` (ascending) by one internal node placed
/// where the first of them was.
fn merge(node: &mut ClusterNode, covered: &[usize]) {
    let words = node.taxa.0.len();
    let first = covered[0];
    let mut merged = Vec::with_capacity(covered.len());
    let mut kept = Vec::with_capacity(node.children.len() - covered.len() + 1);

    for (idx, child) in node.children.drain(..).enumerate() {
        if covered.binary_search(&idx).is_ok() {
            merged.push(child);
        } else {
            kept.push(child);
        }
    }
    // children before `first` are all kept, so `first` is the splice position
    kept.insert(first, ClusterNode::internal(words, merged));
    node.children = kept;
}

fn write_node(
    node: &ClusterNode,
    universe: &TaxonUniverse,
    out: &mut String,
) -> Result<(), SplitError> {
    match node.children.len() {
        0 => {
            let mut ids = node.taxa.ones();
            match (ids.next(), ids.next()) {
                (Some(id), None) => {
                    let label = universe.label(id).ok_or_else(|| {
                        SplitError::DegenerateStructure(format!("leaf taxon {id} has no label"))
                    })?;
                    out.push_str(label);
                    Ok(())
                }
                (None, _) => Err(SplitError::DegenerateStructure(
                    "leaf without taxon".to_string(),
                )),
                (Some(_), Some(_)) => Err(SplitError::DegenerateStructure(
                    "leaf with more than one taxon".to_string(),
                )),
            }
        }
        1 => Err(SplitError::DegenerateStructure(
            "internal node with a single child".to_string(),
        )),
        _ => {
            out.push('(');
            for (idx, child) in node.children.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_node(child, universe, out)?;
            }
            out.push(')');
            Ok(())
        }
    }
}

fn check_node(node: &ClusterNode) -> Result<(), SplitError> {
    if node.is_leaf() {
        return Ok(());
    }
    let mut union = Bitset::zeros(node.taxa.0.len());
    for child in &node.children {
        if union.intersects(&child.taxa) {
            return Err(SplitError::InvariantViolation(
                "sibling clusters overlap".to_string(),
            ));
        }
        union.or_assign(&child.taxa);
        check_node(child)?;
    }
    if union != node.taxa {
        return Err(SplitError::InvariantViolation(
            "children do not cover their parent".to_string(),
        ));
    }
    Ok(())
}
