//! Weighted split store: canonical split → accumulated weight.
//!
//! Inserting a split that is already present adds its weight to the existing
//! entry, so the final content does not depend on insertion order. Each entry
//! remembers when its key first arrived; that arrival order is the stable
//! tie-break for every weight-descending ranking.
//!
//! A store is either [`Orientation::Canonical`] (both sides of a bipartition
//! share one key, used for comparisons) or [`Orientation::Oriented`] (the side
//! is kept as listed, so `{A,B}` and `{C,D}` over `{A,B,C,D}` stay two
//! entries, used to feed the tree builder).

use crate::bitset::Bitset;
use crate::diagnostics::Diagnostics;
use crate::split::{canonicalize, Split};
use crate::taxa::TaxonUniverse;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Result of [`SplitStore::insert`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Insertion {
    /// A new key was created
    New,
    /// The weight was added to an existing key
    Merged,
    /// The side was empty or the whole universe, which is not a split
    Skipped,
}

/// How the store keys a side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Canonical,
    Oriented,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Entry {
    weight: f64,
    arrival: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SplitStore {
    entries: HashMap<Split, Entry>,
    next_arrival: usize,
    orientation: Orientation,
}

impl SplitStore {
    /// An empty canonical store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orientation(orientation: Orientation) -> Self {
        SplitStore { orientation, ..Self::default() }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Canonicalizes `raw_side` (canonical stores only) and adds `weight` to its entry.
    pub fn insert(
        &mut self,
        raw_side: &Bitset,
        weight: f64,
        universe: &TaxonUniverse,
        diag: &mut Diagnostics,
    ) -> Insertion {
        let k = raw_side.count_ones();
        if k == 0 || k == universe.size() {
            debug!("skipping side of size {k}: not a bipartition of {} taxa", universe.size());
            diag.skipped_records += 1;
            return Insertion::Skipped;
        }
        let split = match self.orientation {
            Orientation::Canonical => canonicalize(raw_side, universe),
            Orientation::Oriented => Split::oriented(raw_side.clone()),
        };
        let outcome = self.insert_split(split.clone(), weight);
        if outcome == Insertion::Merged {
            warn!("split {{{}}} observed twice, weights merged", split.labels(universe).join(", "));
            diag.duplicate_splits += 1;
        }
        outcome
    }

    /// Adds `weight` to a split whose key is already final.
    pub fn insert_split(&mut self, split: Split, weight: f64) -> Insertion {
        match self.entries.get_mut(&split) {
            Some(entry) => {
                entry.weight += weight;
                Insertion::Merged
            }
            None => {
                let arrival = self.next_arrival;
                self.next_arrival += 1;
                self.entries.insert(split, Entry { weight, arrival });
                Insertion::New
            }
        }
    }

    pub fn get(&self, split: &Split) -> Option<f64> {
        self.entries.get(split).map(|e| e.weight)
    }

    pub fn contains(&self, split: &Split) -> bool {
        self.entries.contains_key(split)
    }

    pub fn remove(&mut self, split: &Split) -> Option<f64> {
        self.entries.remove(split).map(|e| e.weight)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&Split, f64)> + '_ {
        let mut all: Vec<(&Split, &Entry)> = self.entries.iter().collect();
        all.sort_by_key(|(_, e)| e.arrival);
        all.into_iter().map(|(s, e)| (s, e.weight))
    }

    /// Entries by descending weight; ties keep arrival order.
    pub fn ranked(&self) -> impl Iterator<Item = (&Split, f64)> + '_ {
        let mut all: Vec<(&Split, &Entry)> = self.entries.iter().collect();
        all.sort_by(|(_, a), (_, b)| {
            b.weight
                .total_cmp(&a.weight)
                .then(a.arrival.cmp(&b.arrival))
        });
        all.into_iter().map(|(s, e)| (s, e.weight))
    }

    /// A store holding only the `k` highest-weight entries.
    ///
    /// A store with at most `k` entries is returned unchanged.
    pub fn top_k(&self, k: usize) -> SplitStore {
        let mut top = self.clone();
        top.truncate_top_k(k);
        top
    }

    /// Drops everything but the `k` highest-weight entries.
    pub fn truncate_top_k(&mut self, k: usize) {
        if self.len() <= k {
            return;
        }
        let dropped: Vec<Split> = self
            .ranked()
            .skip(k)
            .map(|(s, _)| s.clone())
            .collect();
        for split in &dropped {
            self.entries.remove(split);
        }
    }

    /// Drops every trivial (leaf) split; returns how many were removed.
    pub fn remove_trivial(&mut self, n: usize) -> usize {
        let before = self.len();
        self.entries.retain(|split, _| !split.is_trivial(n));
        before - self.len()
    }

    /// Sum of all weights, added up in [`SplitStore::ranked`] order so the
    /// result does not depend on hash order.
    pub fn total_weight(&self) -> f64 {
        self.ranked().map(|(_, w)| w).sum()
    }

    /// Largest weight, 0.0 for an empty store.
    pub fn max_weight(&self) -> f64 {
        self.entries
            .values()
            .map(|e| e.weight)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TaxonUniverse, Diagnostics) {
        (
            TaxonUniverse::from_labels(["A", "B", "C", "D", "E", "F"]),
            Diagnostics::new(),
        )
    }

    fn side(u: &TaxonUniverse, ids: &[usize]) -> Bitset {
        Bitset::from_ids(u.words(), ids.iter().copied())
    }

    #[test]
    fn test_duplicate_sums_weight() {
        let (u, mut diag) = setup();
        let mut store = SplitStore::new();
        assert_eq!(store.insert(&side(&u, &[0, 1]), 2.0, &u, &mut diag), Insertion::New);
        // same bipartition given by the other side
        assert_eq!(store.insert(&side(&u, &[2, 3, 4, 5]), 3.5, &u, &mut diag), Insertion::Merged);
        assert_eq!(store.len(), 1);
        let split = canonicalize(&side(&u, &[0, 1]), &u);
        assert_eq!(store.get(&split), Some(5.5));
        assert_eq!(diag.duplicate_splits, 1);
    }

    #[test]
    fn test_order_independent_content() {
        let (u, mut diag) = setup();
        let records = [(vec![0, 1], 1.0), (vec![2, 3], 2.0), (vec![0, 1], 4.0)];
        let mut forward = SplitStore::new();
        let mut backward = SplitStore::new();
        for (ids, w) in &records {
            forward.insert(&side(&u, ids), *w, &u, &mut diag);
        }
        for (ids, w) in records.iter().rev() {
            backward.insert(&side(&u, ids), *w, &u, &mut diag);
        }
        for (split, w) in forward.iter() {
            assert_eq!(backward.get(split), Some(w));
        }
        assert_eq!(forward.len(), backward.len());
    }

    #[test]
    fn test_oriented_store_keeps_sides_apart() {
        let (u, mut diag) = setup();
        let mut store = SplitStore::with_orientation(Orientation::Oriented);
        store.insert(&side(&u, &[0, 1]), 1.0, &u, &mut diag);
        store.insert(&side(&u, &[2, 3, 4, 5]), 1.0, &u, &mut diag);
        store.insert(&side(&u, &[1, 0]), 1.0, &u, &mut diag);
        assert_eq!(store.len(), 2);
        assert_eq!(diag.duplicate_splits, 1);
        let keys: Vec<String> = store.iter().map(|(s, _)| s.key()).collect();
        assert_eq!(keys, vec!["0/1", "2/3/4/5"]);
    }

    #[test]
    fn test_all_vs_none_is_skipped() {
        let (u, mut diag) = setup();
        let mut store = SplitStore::new();
        assert_eq!(store.insert(&side(&u, &[]), 1.0, &u, &mut diag), Insertion::Skipped);
        assert_eq!(store.insert(&side(&u, &[0, 1, 2, 3, 4, 5]), 1.0, &u, &mut diag), Insertion::Skipped);
        assert!(store.is_empty());
        assert_eq!(diag.skipped_records, 2);
    }

    #[test]
    fn test_top_k() {
        let (u, mut diag) = setup();
        let mut store = SplitStore::new();
        store.insert(&side(&u, &[0, 1]), 1.0, &u, &mut diag);
        store.insert(&side(&u, &[1, 2]), 3.0, &u, &mut diag);
        store.insert(&side(&u, &[2, 3]), 2.0, &u, &mut diag);
        store.insert(&side(&u, &[3, 4]), 3.0, &u, &mut diag);
        store.insert(&side(&u, &[4, 5]), 0.5, &u, &mut diag);

        let all = store.top_k(10);
        assert_eq!(all.len(), 5);
        assert_eq!(all.iter().collect::<Vec<_>>(), store.iter().collect::<Vec<_>>());

        // tie at 3.0: {B,C} arrived before {D,E}
        let top = store.top_k(2);
        let keys: Vec<String> = top.ranked().map(|(s, _)| s.key()).collect();
        assert_eq!(keys, vec!["1/2", "3/4"]);
    }

    #[test]
    fn test_remove_and_trivial() {
        let (u, mut diag) = setup();
        let mut store = SplitStore::new();
        store.insert(&side(&u, &[0]), 1.0, &u, &mut diag);
        store.insert(&side(&u, &[0, 1]), 2.0, &u, &mut diag);
        store.insert(&side(&u, &[0, 1, 2, 3, 4]), 4.0, &u, &mut diag);
        assert_eq!(store.remove_trivial(u.size()), 2);
        assert_eq!(store.max_weight(), 2.0);

        let split = canonicalize(&side(&u, &[0, 1]), &u);
        assert_eq!(store.remove(&split), Some(2.0));
        assert!(store.is_empty());
        assert_eq!(store.max_weight(), 0.0);
    }
}
