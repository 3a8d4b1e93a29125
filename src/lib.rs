//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `bitset`: compact bitset representation for taxon sets.
//! - `taxa`: taxon universe, label ↔ id.
//! - `split`: canonical form of a bipartition.
//! - `store`: weighted split store (canonical key → accumulated weight).
//! - `cluster`: compatibility tree builder (strict and greedy).
//! - `compare`: cumulative agreement metrics between two split stores.
//! - `io`: split lists, taxa lists, Newick input and TSV output.
//! - `diagnostics` / `error`: warning counters and the crate error type.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod cluster;
pub mod compare;
pub mod diagnostics;
pub mod error;
pub mod io;
pub mod split;
pub mod store;
pub mod taxa;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use cluster::{ClusterNode, ClusterTree, GreedyOutcome, Placement};
pub use compare::{compare, Comparison, ComparisonRow, SplitComparator};
pub use diagnostics::Diagnostics;
pub use error::SplitError;
pub use split::{canonicalize, Split};
pub use store::{Insertion, Orientation, SplitStore};
pub use taxa::{Membership, TaxonUniverse};
