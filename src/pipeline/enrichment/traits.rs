//! Trait definitions for the enrichment job's collaborators.
//!
//! The runner only talks to these seams, so each one can be swapped for a
//! fake in tests:
//! - SourceStore: unprocessed input records
//! - OutputStore: enriched rows and their fingerprints
//! - NerClient: remote tagger
//! - TextNormalizer: text cleanup before tagging
//! - CompletionNotifier: end-of-job signal

use std::collections::HashSet;

use super::error::EnrichmentError;
use super::types::*;

/// Input table holding raw news records.
pub trait SourceStore {
    /// Number of records with `processed_flag = false`.
    fn count_unprocessed(&self) -> Result<u64, EnrichmentError>;

    /// Up to `limit` records with `processed_flag = false`.
    fn fetch_unprocessed(&self, limit: u32) -> Result<Vec<Record>, EnrichmentError>;

    /// Flag the records behind `pairs` as processed.
    /// Returns the pairs that could not be updated.
    fn mark_processed(&self, pairs: &[HashPair]) -> Result<Vec<MarkFailure>, EnrichmentError>;
}

/// Output table holding enriched rows.
pub trait OutputStore {
    /// Every fingerprint already present in the output.
    fn distinct_hash_pairs(&self) -> Result<HashSet<HashPair>, EnrichmentError>;

    /// Insert rows, reporting the ones that were rejected by index.
    /// Rows not reported are durably stored.
    fn insert_rows(&self, rows: &[EnrichedRow]) -> Result<Vec<InsertFailure>, EnrichmentError>;
}

/// Remote named-entity tagger.
pub trait NerClient {
    /// Tag a single text.
    fn predict(&self, text: &str) -> Result<Vec<TaggedToken>, EnrichmentError>;

    /// Tag a batch of texts. One prediction per input, in input order.
    fn predict_batch(&self, texts: &[String]) -> Result<Vec<Vec<TaggedToken>>, EnrichmentError>;
}

/// Cleans raw title/description text before it is sent for tagging.
pub trait TextNormalizer {
    fn normalize(&self, text: &str) -> Result<String, EnrichmentError>;
}

/// Fire-and-forget signal that a job run finished.
pub trait CompletionNotifier {
    fn publish(&self, topic: &str, message: &str) -> Result<(), EnrichmentError>;
}
