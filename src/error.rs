//! Error type shared by all split-processing stages.

use phylotree::tree::TreeError;
use thiserror::Error;

/// Errors raised while reading splits, building the cluster tree or
/// comparing split collections.
///
/// Duplicate splits are not an error: they are merged (store) or ignored
/// (tree insertion) and only reported through [`crate::diagnostics::Diagnostics`].
#[derive(Error, Debug)]
pub enum SplitError {
    /// A line of a split or taxa list could not be parsed
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// A label that is not part of the taxon universe was referenced in strict mode
    #[error("taxon '{0}' is not part of the taxon universe")]
    UnknownTaxon(String),

    /// A split could not be placed into the cluster tree built so far
    #[error("incompatible split {{{split}}}; tree so far: {partial_tree}")]
    IncompatibleSplit { split: String, partial_tree: String },

    /// The serializer found a leaf without exactly one taxon or an internal node with one child
    #[error("degenerate cluster structure: {0}")]
    DegenerateStructure(String),

    /// The builder reached a state its insertion rules exclude
    #[error("cluster tree invariant violated: {0}")]
    InvariantViolation(String),

    /// A Newick string could not be parsed
    #[error("could not parse Newick tree: {0}")]
    Newick(String),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
