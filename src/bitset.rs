//! Compact bitset representation for taxon sets.
//!
//! # Overview
//! Every side of a split and every cluster of the compatibility tree is a
//! subset of the taxon universe. Each bit position corresponds to a taxon id.
//!
//! # Example
//! For a universe [A, B, C, D] mapped to ids [0, 1, 2, 3]:
//! - Split side {A, C} → bitset `0b0101` (bits 0 and 2 set)
//! - Cluster {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)

/// A compact bitset for representing which taxa belong to a set.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large universes.
/// Each u64 word holds 64 taxon ids. Two bitsets are only comparable when they
/// were created with the same number of words, i.e. for the same universe.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Parameters
    /// - `words`: Number of u64 words needed. Calculate as `num_taxa.div_ceil(64)`
    ///
    /// # Example
    /// ```
    /// # use split_compat::bitset::Bitset;
    /// // For a universe with 100 taxa, need 2 words (128 bits)
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Creates a bitset with the first `n` bits set, i.e. the full universe.
    pub fn full(words: usize, n: usize) -> Self {
        let mut bs = Bitset::zeros(words);
        for idx in 0..n {
            bs.set(idx);
        }
        bs
    }

    /// Creates a bitset from a list of ids.
    ///
    /// # Example
    /// ```
    /// # use split_compat::bitset::Bitset;
    /// let bs = Bitset::from_ids(1, [0, 2]);
    /// assert_eq!(bs.0[0], 0b0101);
    /// ```
    pub fn from_ids<I: IntoIterator<Item = usize>>(words: usize, ids: I) -> Self {
        let mut bs = Bitset::zeros(words);
        for idx in ids {
            bs.set(idx);
        }
        bs
    }

    /// Sets the bit at the given index to 1.
    ///
    /// # Example
    /// ```
    /// # use split_compat::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);  // Mark taxon 0 as present
    /// bs.set(5);  // Mark taxon 5 as present
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;     // Equivalent to idx / 64
        let bit = idx & 63;      // Equivalent to idx % 64
        self.0[word] |= 1u64 << bit;
    }

    /// Returns true if the bit at `idx` is set.
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0
            .get(word)
            .is_some_and(|w| (w & (1u64 << bit)) != 0)
    }

    /// Performs bitwise OR with another bitset (union operation).
    ///
    /// Merges two taxon sets: `self` becomes `self ∪ other`
    ///
    /// # Example
    /// ```
    /// # use split_compat::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);   // {0}
    ///
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);  // {1}
    ///
    /// left.or_assign(&right);  // {0} ∪ {1} = {0, 1}
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Complement within a universe of `n` taxa.
    ///
    /// Flips all bits up to `n`, keeping remaining bits as 0.
    ///
    /// # Example
    /// ```
    /// # use split_compat::bitset::Bitset;
    /// let bs = Bitset::from_ids(1, [0, 1]);
    /// assert_eq!(bs.complement(4).0[0], 0b1100);
    /// ```
    pub fn complement(&self, n: usize) -> Bitset {
        let words = self.0.len();
        let full = Bitset::full(words, n);
        Bitset(
            self.0
                .iter()
                .zip(&full.0)
                .map(|(a, f)| !a & f)
                .collect(),
        )
    }

    /// Returns true if every bit of `self` is also set in `other` (`self ⊆ other`).
    #[inline]
    pub fn is_subset(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }

    /// Returns true if the two sets share at least one taxon.
    #[inline]
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Counts the number of set bits (population count).
    ///
    /// Returns how many taxa are in this set.
    ///
    /// # Example
    /// ```
    /// # use split_compat::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(2);
    /// bs.set(5);
    /// assert_eq!(bs.count_ones(), 3);
    /// ```
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterates over the set ids in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some((word_idx << 6) + bit)
            })
        })
    }
}
