//! Polling control loop for an enrichment run.
//!
//! Each iteration: fetch a page → filter through the ledger → one batched NER
//! call → decode and build rows → insert → mark sources → re-count.
//! Runs sequentially; every external call blocks until it completes.
//!
//! Page-level failures are logged and leave the page's records unprocessed.
//! The loop itself stops only when the backlog is empty, the execution budget
//! is spent, or the unprocessed count stops moving for [`STALL_LIMIT`] rounds.

use std::collections::HashSet;
use std::time::Instant;

use uuid::Uuid;

use super::assembler::assemble_batch;
use super::decoder::decode_entities;
use super::error::EnrichmentError;
use super::ledger::DedupLedger;
use super::traits::*;
use super::types::*;

/// Fields of an enriched row that passthrough data must not overwrite.
const RESERVED_COLUMNS: &[&str] = &[
    "title",
    "description",
    "title_hash",
    "description_hash",
    "date",
    "processed_flag",
    "ner_org_list",
    "ner_geo_list",
    "ner_gpe_list",
    "ner_per_list",
];

/// Orchestrates a full enrichment run over the unprocessed backlog.
pub struct EnrichmentRunner<'a> {
    source: &'a dyn SourceStore,
    output: &'a dyn OutputStore,
    ner: &'a dyn NerClient,
    normalizer: &'a dyn TextNormalizer,
    config: EnrichmentConfig,
}

impl<'a> EnrichmentRunner<'a> {
    pub fn new(
        source: &'a dyn SourceStore,
        output: &'a dyn OutputStore,
        ner: &'a dyn NerClient,
        normalizer: &'a dyn TextNormalizer,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            source,
            output,
            ner,
            normalizer,
            config,
        }
    }

    /// Run until the backlog is drained, the time budget is spent or progress stalls.
    pub fn run(&self, ledger: &mut DedupLedger) -> Result<JobReport, EnrichmentError> {
        self.run_since(Instant::now(), ledger)
    }

    /// Same as [`run`](Self::run), with the time budget measured from `started`.
    pub fn run_since(
        &self,
        started: Instant,
        ledger: &mut DedupLedger,
    ) -> Result<JobReport, EnrichmentError> {
        let mut unprocessed = self.source.count_unprocessed()?;
        let mut report = JobReport::new(new_run_id(), unprocessed);

        tracing::info!(
            run_id = %report.run_id,
            unprocessed,
            ledger_entries = ledger.len(),
            "Enrichment started"
        );

        let mut stalls = 0u32;
        while unprocessed > 0 {
            let elapsed = started.elapsed();
            if elapsed > self.config.execution_timeout {
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    unprocessed,
                    "Execution time limit reached, stopping"
                );
                report.termination = TerminationReason::TimeoutReached;
                break;
            }

            self.process_page(ledger, &mut report);

            let new_unprocessed = match self.source.count_unprocessed() {
                Ok(count) => count,
                Err(e) => {
                    tracing::error!(error = %e, "Could not re-count unprocessed records");
                    unprocessed
                }
            };

            if new_unprocessed == unprocessed {
                stalls += 1;
                tracing::warn!(stalls, unprocessed, "Unprocessed count did not decrease");
            } else {
                stalls = 0;
            }
            unprocessed = new_unprocessed;

            if stalls >= STALL_LIMIT {
                tracing::error!(
                    stalls,
                    unprocessed,
                    "No progress for {STALL_LIMIT} iterations, stopping"
                );
                report.termination = TerminationReason::StallExceeded;
                break;
            }
        }

        report.final_unprocessed = unprocessed;
        report.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            run_id = %report.run_id,
            termination = %report.termination,
            pages = report.pages,
            rows_inserted = report.rows_inserted,
            duplicates_skipped = report.duplicates_skipped,
            remaining = report.final_unprocessed,
            duration_ms = report.duration_ms,
            "Enrichment finished"
        );

        Ok(report)
    }

    /// One FETCH → FILTER → INVOKE → BUILD → WRITE → MARK pass.
    fn process_page(&self, ledger: &mut DedupLedger, report: &mut JobReport) {
        let page = match self.source.fetch_unprocessed(self.config.input_rows_limit) {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch unprocessed records");
                return;
            }
        };
        report.pages += 1;
        report.records_fetched += page.len() as u32;

        let batch = assemble_batch(&page, ledger, self.normalizer);
        report.records_deferred += batch.deferred as u32;

        if !batch.already_enriched.is_empty() {
            tracing::debug!(
                count = batch.already_enriched.len(),
                "Marking already-enriched records without NER"
            );
            report.duplicates_skipped += batch.already_enriched.len() as u32;
            self.mark(&batch.already_enriched, report);
        }

        if batch.is_empty() {
            return;
        }

        let rows = match self.enrich(&page, &batch) {
            Ok(rows) => rows,
            Err(e) => {
                if e.is_ner_backend() {
                    report.ner_failures += 1;
                }
                tracing::error!(
                    error = %e,
                    texts = batch.texts.len(),
                    "NER enrichment failed, page left for retry"
                );
                Vec::new()
            }
        };

        if rows.is_empty() {
            tracing::warn!("No entries to insert");
            return;
        }

        self.write_and_mark(&rows, ledger, report);
    }

    /// INVOKE + DECODE_AND_BUILD for an assembled batch.
    fn enrich(
        &self,
        page: &[Record],
        batch: &AssembledBatch,
    ) -> Result<Vec<EnrichedRow>, EnrichmentError> {
        let predictions = self.ner.predict_batch(&batch.texts)?;

        if predictions.len() != batch.texts.len() {
            tracing::warn!(
                sent = batch.texts.len(),
                received = predictions.len(),
                "Prediction count mismatch, unmatched records stay unprocessed"
            );
        }

        batch
            .indices
            .iter()
            .zip(predictions.iter())
            .map(|(&index, prediction)| {
                let entities = decode_entities(prediction);
                if entities.is_empty() {
                    tracing::debug!(pair = %page[index].hash_pair(), "No tracked entities found");
                }
                build_enriched_row(&page[index], &entities)
            })
            .collect()
    }

    /// WRITE + MARK. Only rows the output store accepted are marked and
    /// added to the ledger.
    fn write_and_mark(&self, rows: &[EnrichedRow], ledger: &mut DedupLedger, report: &mut JobReport) {
        let failures = match self.output.insert_rows(rows) {
            Ok(failures) => failures,
            Err(e) => {
                tracing::error!(error = %e, rows = rows.len(), "Output insert failed");
                report.insert_failures += rows.len() as u32;
                return;
            }
        };

        for failure in &failures {
            tracing::error!(index = failure.index, error = %failure.error, "Output row rejected");
        }

        let failed: HashSet<usize> = failures.iter().map(|f| f.index).collect();
        let inserted: Vec<HashPair> = rows
            .iter()
            .enumerate()
            .filter(|(index, _)| !failed.contains(index))
            .map(|(_, row)| row.hash_pair())
            .collect();

        report.rows_inserted += inserted.len() as u32;
        report.insert_failures += (rows.len() - inserted.len()) as u32;

        tracing::info!(
            written = rows.len(),
            inserted = inserted.len(),
            "Rows written to output table"
        );

        if inserted.is_empty() {
            return;
        }

        self.mark(&inserted, report);
        ledger.extend(inserted);
    }

    fn mark(&self, pairs: &[HashPair], report: &mut JobReport) {
        match self.source.mark_processed(pairs) {
            Ok(failures) => {
                if !failures.is_empty() {
                    tracing::error!(
                        count = failures.len(),
                        "Could not update rows in the input table"
                    );
                }
                for failure in &failures {
                    tracing::error!(pair = %failure.pair, error = %failure.error, "Mark processed failed");
                }
                report.mark_failures += failures.len() as u32;
            }
            Err(e) => {
                tracing::error!(error = %e, count = pairs.len(), "Mark processed failed");
                report.mark_failures += pairs.len() as u32;
            }
        }
    }
}

/// Merge a record with its decoded entities into an output row.
pub fn build_enriched_row(
    record: &Record,
    entities: &EntityLists,
) -> Result<EnrichedRow, EnrichmentError> {
    let mut extra = record.extra.clone();
    extra.retain(|key, _| !RESERVED_COLUMNS.contains(&key.as_str()));

    Ok(EnrichedRow {
        title: record.title.clone(),
        description: record.description.clone(),
        title_hash: record.title_hash,
        description_hash: record.description_hash,
        date: record.date.format(OUTPUT_DATE_FORMAT).to_string(),
        processed_flag: false,
        ner_org_list: serde_json::to_string(entities.get(EntityCategory::Org))?,
        ner_geo_list: serde_json::to_string(entities.get(EntityCategory::Geo))?,
        ner_gpe_list: serde_json::to_string(entities.get(EntityCategory::Gpe))?,
        ner_per_list: serde_json::to_string(entities.get(EntityCategory::Per))?,
        extra,
    })
}

/// Generate a new run ID.
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}
