//! Taxon universe: bijection between taxon labels and dense ids.
//!
//! Ids are assigned in registration order starting at 0, so a taxa list
//! file defines the id of each taxon by its line position.

use crate::bitset::Bitset;
use crate::diagnostics::Diagnostics;
use crate::error::SplitError;
use std::collections::HashMap;
use tracing::warn;

/// How to treat labels that are not part of the universe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Membership {
    /// Unknown labels abort with [`SplitError::UnknownTaxon`].
    #[default]
    Strict,
    /// Unknown labels are dropped with a warning.
    Lenient,
}

/// The fixed, ordered set of taxa for one run.
#[derive(Debug, Clone, Default)]
pub struct TaxonUniverse {
    labels: Vec<String>,
    ids: HashMap<String, usize>,
}

impl TaxonUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a universe from labels in order; repeated labels keep their first id.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut universe = Self::new();
        for label in labels {
            universe.register(label);
        }
        universe
    }

    /// Registers a label and returns its id. Idempotent.
    pub fn register<S: Into<String>>(&mut self, label: S) -> usize {
        let label = label.into();
        if let Some(&id) = self.ids.get(&label) {
            return id;
        }
        let id = self.labels.len();
        self.ids.insert(label.clone(), id);
        self.labels.push(label);
        id
    }

    pub fn id(&self, label: &str) -> Option<usize> {
        self.ids.get(label).copied()
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    /// Id of a label that must be present.
    pub fn require(&self, label: &str) -> Result<usize, SplitError> {
        self.id(label)
            .ok_or_else(|| SplitError::UnknownTaxon(label.to_string()))
    }

    /// Resolves a label according to `membership`.
    ///
    /// Returns `Ok(None)` when a lenient caller should drop the label.
    pub fn resolve(
        &self,
        label: &str,
        membership: Membership,
        diag: &mut Diagnostics,
    ) -> Result<Option<usize>, SplitError> {
        match (self.id(label), membership) {
            (Some(id), _) => Ok(Some(id)),
            (None, Membership::Strict) => Err(SplitError::UnknownTaxon(label.to_string())),
            (None, Membership::Lenient) => {
                warn!("taxon '{label}' is not in the taxa list and is discarded");
                diag.discarded_taxa += 1;
                Ok(None)
            }
        }
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of u64 words a [`Bitset`] over this universe needs.
    pub fn words(&self) -> usize {
        self.size().div_ceil(64).max(1)
    }

    /// Bitset containing every taxon.
    pub fn full_set(&self) -> Bitset {
        Bitset::full(self.words(), self.size())
    }

    /// Labels of a taxon set, in id order.
    pub fn labels_of<'a>(&'a self, set: &'a Bitset) -> impl Iterator<Item = &'a str> + 'a {
        set.ones().filter_map(move |id| self.label(id))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}
