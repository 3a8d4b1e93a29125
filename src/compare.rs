//! Split-set comparison between a donor and a reference collection.
//!
//! Donor splits are consumed by descending weight. After each one a
//! [`ComparisonRow`] records cumulative agreement so far, so the rows trace
//! how precision, recall and the distances evolve as less supported splits
//! are admitted. The last row covers the whole donor collection and is the
//! authoritative summary.
//!
//! # Metrics
//! Unweighted, with `numAll` donor splits seen, `numCorr` of them also in the
//! reference and `numAllRef = |reference|`:
//! - precision `numCorr / numAll`, recall `numCorr / numAllRef`, F1
//! - symmetric distance `(numAll-numCorr)/numAll + (numAllRef-numCorr)/numAllRef`
//! - Robinson-Foulds `(numAll-numCorr) + (numAllRef-numCorr)`
//!
//! Weighted, with `wAll` donor weight seen, `wCorr` of it on shared splits,
//! `wCorrRef` the reference weight of those shared splits:
//! - precision `wCorr / wAll`, recall `wCorrRef / totalRefWeight`, F1
//! - distance `(wAll-wCorr)/wAll + (totalRef-wCorrRef)/totalRef`
//! - branch score `Σ |ref/maxRef - donor/maxDonor|`, where the reference
//!   splits the donor never hit are added on the last row
//!
//! Ratios with a zero denominator are `None` (written `NA`); F1 is `None`
//! whenever precision or recall is zero or undefined, which keeps "undefined"
//! apart from "complete disagreement".

use crate::split::Split;
use crate::store::{Orientation, SplitStore};
use itertools::Itertools;
use std::collections::HashSet;

/// Cumulative statistics after the first `rank` donor splits.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub rank: usize,
    pub num_all: usize,
    pub num_corr: usize,
    pub num_all_ref: usize,
    pub w_all: f64,
    pub w_corr: f64,
    pub w_corr_ref: f64,
    pub total_ref_weight: f64,
    pub branch_score: f64,
}

impl ComparisonRow {
    pub fn precision(&self) -> Option<f64> {
        ratio(self.num_corr as f64, self.num_all as f64)
    }

    pub fn recall(&self) -> Option<f64> {
        ratio(self.num_corr as f64, self.num_all_ref as f64)
    }

    pub fn f1(&self) -> Option<f64> {
        harmonic_mean(self.precision(), self.recall())
    }

    pub fn symmetric_distance(&self) -> f64 {
        missing_share((self.num_all - self.num_corr) as f64, self.num_all as f64)
            + missing_share((self.num_all_ref - self.num_corr) as f64, self.num_all_ref as f64)
    }

    pub fn rf_distance(&self) -> usize {
        (self.num_all - self.num_corr) + (self.num_all_ref - self.num_corr)
    }

    pub fn precision_weighted(&self) -> Option<f64> {
        ratio(self.w_corr, self.w_all)
    }

    pub fn recall_weighted(&self) -> Option<f64> {
        ratio(self.w_corr_ref, self.total_ref_weight)
    }

    pub fn f1_weighted(&self) -> Option<f64> {
        harmonic_mean(self.precision_weighted(), self.recall_weighted())
    }

    pub fn distance_weighted(&self) -> f64 {
        missing_share(self.w_all - self.w_corr, self.w_all)
            + missing_share(self.total_ref_weight - self.w_corr_ref, self.total_ref_weight)
    }

    /// Tab-separated column names, prefixed with `#`.
    pub fn header(weighted: bool) -> &'static str {
        if weighted {
            "#precision_w\trecall_w\tF1_w\tdistance_w\tbranch_score"
        } else {
            "#precision\trecall\tF1\tsymmetric_distance\tRF_distance"
        }
    }

    /// The row as tab-separated columns matching [`ComparisonRow::header`].
    pub fn render(&self, weighted: bool) -> String {
        let columns = if weighted {
            [
                fmt_ratio(self.precision_weighted()),
                fmt_ratio(self.recall_weighted()),
                fmt_ratio(self.f1_weighted()),
                self.distance_weighted().to_string(),
                self.branch_score.to_string(),
            ]
        } else {
            [
                fmt_ratio(self.precision()),
                fmt_ratio(self.recall()),
                fmt_ratio(self.f1()),
                self.symmetric_distance().to_string(),
                self.rf_distance().to_string(),
            ]
        };
        columns.iter().join("\t")
    }
}

/// All prefix rows plus the whole-collection summary.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// One row per donor split; the last one equals `summary`
    pub rows: Vec<ComparisonRow>,
    pub summary: ComparisonRow,
}

/// Streaming comparator over one reference collection.
///
/// Feed donor splits with [`SplitComparator::push`] in descending weight
/// order, then call [`SplitComparator::finish`].
#[derive(Debug)]
pub struct SplitComparator<'a> {
    reference: &'a SplitStore,
    unmatched: HashSet<&'a Split>,
    max_ref_weight: f64,
    max_donor_weight: f64,
    row: ComparisonRow,
}

impl<'a> SplitComparator<'a> {
    /// `max_donor_weight` normalizes donor weights for the branch score.
    pub fn new(reference: &'a SplitStore, max_donor_weight: f64) -> Self {
        let unmatched: HashSet<&Split> = reference.iter().map(|(s, _)| s).collect();
        SplitComparator {
            reference,
            max_ref_weight: reference.max_weight(),
            max_donor_weight,
            row: ComparisonRow {
                rank: 0,
                num_all: 0,
                num_corr: 0,
                num_all_ref: unmatched.len(),
                w_all: 0.0,
                w_corr: 0.0,
                w_corr_ref: 0.0,
                total_ref_weight: reference.total_weight(),
                branch_score: 0.0,
            },
            unmatched,
        }
    }

    /// Accounts one donor split and returns the updated prefix row.
    ///
    /// A donor split already pushed is counted again for the donor side but
    /// can match the reference only once.
    pub fn push(&mut self, split: &Split, weight: f64) -> ComparisonRow {
        let row = &mut self.row;
        row.rank += 1;
        row.num_all += 1;
        row.w_all += weight;

        let donor_norm = normalize(weight, self.max_donor_weight);
        let ref_norm = match self.reference.get(split) {
            Some(ref_weight) if self.unmatched.remove(split) => {
                row.num_corr += 1;
                row.w_corr += weight;
                row.w_corr_ref += ref_weight;
                normalize(ref_weight, self.max_ref_weight)
            }
            _ => 0.0,
        };
        row.branch_score += (ref_norm - donor_norm).abs();
        row.clone()
    }

    /// The summary row: adds every unmatched reference split to the branch score.
    pub fn finish(self) -> ComparisonRow {
        let mut row = self.row;
        for (split, ref_weight) in self.reference.ranked() {
            if self.unmatched.contains(split) {
                row.branch_score += normalize(ref_weight, self.max_ref_weight);
            }
        }
        row
    }
}

/// Compares `donor` against `reference`.
///
/// Both stores must share one universe and one [`Orientation`]; keys of a
/// canonical and an oriented store for the same bipartition differ.
pub fn compare(donor: &SplitStore, reference: &SplitStore) -> Comparison {
    debug_assert_eq!(
        donor.orientation(),
        reference.orientation(),
        "donor and reference stores must use the same orientation"
    );
    let mut comparator = SplitComparator::new(reference, donor.max_weight());
    let mut rows: Vec<ComparisonRow> = donor
        .ranked()
        .map(|(split, weight)| comparator.push(split, weight))
        .collect();
    let summary = comparator.finish();
    if let Some(last) = rows.last_mut() {
        *last = summary.clone();
    }
    Comparison { rows, summary }
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 { None } else { Some(num / den) }
}

fn harmonic_mean(p: Option<f64>, r: Option<f64>) -> Option<f64> {
    match (p, r) {
        (Some(p), Some(r)) if p * r > 0.0 => Some(2.0 * p * r / (p + r)),
        _ => None,
    }
}

/// Share of `den` not accounted for; an empty denominator misses nothing.
fn missing_share(missing: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { missing / den }
}

fn normalize(weight: f64, max: f64) -> f64 {
    if max == 0.0 { 0.0 } else { weight / max }
}

fn fmt_ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "NA".to_string(), |v| v.to_string())
}
