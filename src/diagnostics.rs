//! Per-run warning counters.
//!
//! Passed explicitly as `&mut Diagnostics` through readers, the store and the
//! tree builder so that several runs in one process never share counters.

use std::fmt;

/// Accumulates the non-fatal events of one batch invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    /// Splits whose canonical key was already present (store) or whose
    /// cluster already existed (tree insertion).
    pub duplicate_splits: usize,
    /// Labels dropped in lenient mode because they are not in the universe.
    pub discarded_taxa: usize,
    /// Records skipped because they describe "all vs none".
    pub skipped_records: usize,
    /// Splits rejected by the greedy builder as incompatible.
    pub rejected_splits: usize,
    /// Trivial (leaf) splits seen by the tree builder.
    pub trivial_splits: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the counters of another run, e.g. one per donor file.
    pub fn absorb(&mut self, other: &Diagnostics) {
        self.duplicate_splits += other.duplicate_splits;
        self.discarded_taxa += other.discarded_taxa;
        self.skipped_records += other.skipped_records;
        self.rejected_splits += other.rejected_splits;
        self.trivial_splits += other.trivial_splits;
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} duplicate, {} discarded taxa, {} skipped, {} rejected, {} trivial",
            self.duplicate_splits,
            self.discarded_taxa,
            self.skipped_records,
            self.rejected_splits,
            self.trivial_splits
        )
    }
}
