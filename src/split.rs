//! Canonical form of a bipartition.
//!
//! # What is canonicalization?
//! A split {A,B}|{C,D,E} can be written by listing either side, in any order.
//! We always keep one side, chosen deterministically:
//! - the smaller side wins;
//! - on a tie, the side whose sorted label sequence is lexicographically smaller.
//!
//! ```text
//! universe: A B C D E
//! input {C,D,E}  → complement {A,B} is smaller → canonical {A,B}
//! input {B,A}    → already smaller            → canonical {A,B}
//! ```
//!
//! Canonicalization is a pure function of the side and the universe, so every
//! textual encoding of the same bipartition maps to the same key.

use crate::bitset::Bitset;
use crate::taxa::TaxonUniverse;
use itertools::Itertools;
use std::fmt;

/// Delimiter between ids in a split key.
pub const KEY_DELIMITER: &str = "/";

/// A bipartition stored by one of its sides, normally the canonical one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Split {
    side: Bitset,
}

impl Split {
    /// Wraps a side as given, without canonicalizing it.
    ///
    /// Used where the listed orientation matters, e.g. feeding the tree builder.
    pub fn oriented(side: Bitset) -> Self {
        Split { side }
    }

    /// The stored side as a taxon set.
    pub fn side(&self) -> &Bitset {
        &self.side
    }

    /// Sorted ids of the stored side.
    pub fn ids(&self) -> Vec<usize> {
        self.side.ones().collect()
    }

    /// Labels of the stored side, in id order.
    pub fn labels<'a>(&'a self, universe: &'a TaxonUniverse) -> Vec<&'a str> {
        universe.labels_of(&self.side).collect()
    }

    /// Size of the stored side.
    pub fn len(&self) -> usize {
        self.side.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.side.is_empty()
    }

    /// A split is trivial if either side holds fewer than two taxa.
    pub fn is_trivial(&self, n: usize) -> bool {
        let k = self.len();
        k < 2 || n.saturating_sub(k) < 2
    }

    /// String key: sorted ids joined by [`KEY_DELIMITER`].
    pub fn key(&self) -> String {
        self.side.ones().join(KEY_DELIMITER)
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Canonicalize one side of a bipartition.
///
/// # Algorithm
/// `k = |side|`, `m = n - k`:
/// - `k < m`: keep `side`
/// - `k > m`: take the complement
/// - `k == m`: compare both sides' sorted label sequences, keep the smaller
pub fn canonicalize(side: &Bitset, universe: &TaxonUniverse) -> Split {
    let n = universe.size();
    let k = side.count_ones();
    let m = n - k;

    let side = if k < m {
        side.clone()
    } else if k > m {
        side.complement(n)
    } else {
        let complement = side.complement(n);
        if sorted_labels(&complement, universe) < sorted_labels(side, universe) {
            complement
        } else {
            side.clone()
        }
    };

    Split { side }
}

fn sorted_labels<'a>(set: &'a Bitset, universe: &'a TaxonUniverse) -> Vec<&'a str> {
    universe.labels_of(set).sorted_unstable().collect()
}
