//! News NER Enrichment Job
//!
//! Pulls unprocessed news records, tags `title . description` with a remote
//! NER service, and writes enriched rows with per-category entity lists.
//!
//! ## Architecture
//!
//! ```text
//! SourceStore → Assembler (+ DedupLedger) → NerClient → Decoder → OutputStore
//!      ↑                                                              │
//!      └──────────────── mark processed / ledger update ──────────────┘
//! ```
//!
//! Delivery is at-least-once: a row that was inserted but whose source could
//! not be marked is caught by the ledger on the next run.

pub mod error;
pub mod types;
pub mod traits;
pub mod normalize;
pub mod decoder;
pub mod ledger;
pub mod assembler;
pub mod ner_client;
pub mod notifier;
pub mod sqlite_store;
pub mod runner;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::EnrichmentError;
pub use types::*;
pub use traits::*;
pub use normalize::{clean_text, NewsTextNormalizer};
pub use decoder::decode_entities;
pub use ledger::DedupLedger;
pub use assembler::assemble_batch;
pub use ner_client::{HttpNerClient, DEFAULT_NER_TIMEOUT_SECS};
pub use notifier::{notifier_for, HttpTopicNotifier, LogNotifier};
pub use sqlite_store::SqliteNewsStore;
pub use runner::{build_enriched_row, new_run_id, EnrichmentRunner};
