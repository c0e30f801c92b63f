//! Dedup ledger: fingerprints of records already present in the output table.
//!
//! Loaded once from the output store at startup and grown as rows are written.
//! Entries are never removed during a run.

use std::collections::HashSet;

use super::error::EnrichmentError;
use super::traits::OutputStore;
use super::types::HashPair;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupLedger {
    pairs: HashSet<HashPair>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the ledger from the fingerprints already in the output store.
    pub fn load(store: &dyn OutputStore) -> Result<Self, EnrichmentError> {
        let pairs = store.distinct_hash_pairs()?;
        tracing::info!(entries = pairs.len(), "Dedup ledger loaded");
        Ok(Self { pairs })
    }

    pub fn contains(&self, pair: &HashPair) -> bool {
        self.pairs.contains(pair)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl Extend<HashPair> for DedupLedger {
    fn extend<I: IntoIterator<Item = HashPair>>(&mut self, iter: I) {
        self.pairs.extend(iter);
    }
}

impl FromIterator<HashPair> for DedupLedger {
    fn from_iter<I: IntoIterator<Item = HashPair>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}
