//! Batch assembler: turns a page of records into one NER request.
//!
//! Records already in the ledger are reported back for direct marking.
//! Records that fail to normalize are skipped and left unprocessed, so the
//! next fetch picks them up again.

use super::error::EnrichmentError;
use super::ledger::DedupLedger;
use super::traits::TextNormalizer;
use super::types::{AssembledBatch, Record};

/// Separator between title and description in the tagged text.
const TITLE_DESCRIPTION_SEPARATOR: &str = " . ";

/// Build the NER batch for a page. Reads `records` and `ledger` only.
pub fn assemble_batch(
    records: &[Record],
    ledger: &DedupLedger,
    normalizer: &dyn TextNormalizer,
) -> AssembledBatch {
    let mut batch = AssembledBatch::default();

    for (index, record) in records.iter().enumerate() {
        let pair = record.hash_pair();
        if ledger.contains(&pair) {
            batch.already_enriched.push(pair);
            continue;
        }

        match record_text(record, normalizer) {
            Ok(text) => {
                batch.texts.push(text);
                batch.indices.push(index);
            }
            Err(e) => {
                let err = EnrichmentError::RecordProcessing {
                    pair,
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "Deferring record to a later page");
                batch.deferred += 1;
            }
        }
    }

    batch
}

fn record_text(record: &Record, normalizer: &dyn TextNormalizer) -> Result<String, EnrichmentError> {
    let title = normalizer.normalize(&record.title)?;
    let description = normalizer.normalize(&record.description)?;
    Ok(format!("{title}{TITLE_DESCRIPTION_SEPARATOR}{description}"))
}
