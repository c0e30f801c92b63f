//! Core types for the NER enrichment job.
//!
//! Lifecycle: Record → Assembled batch → NER prediction → EntityLists →
//! EnrichedRow → output table.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Format of the `date` column in enriched rows.
pub const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Tag emitted for tokens outside any entity.
pub const OUTSIDE_TAG: &str = "O";

/// Consecutive no-progress iterations that stop the job.
pub const STALL_LIMIT: u32 = 3;

/// Message published once the job finishes.
pub const COMPLETION_MESSAGE: &str = "NER enriched";

// ═══════════════════════════════════════════
// Record identity
// ═══════════════════════════════════════════

/// Content fingerprint of a record: (title_hash, description_hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashPair {
    pub title_hash: i64,
    pub description_hash: i64,
}

impl HashPair {
    pub fn new(title_hash: i64, description_hash: i64) -> Self {
        Self {
            title_hash,
            description_hash,
        }
    }
}

impl fmt::Display for HashPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.title_hash, self.description_hash)
    }
}

// ═══════════════════════════════════════════
// Source record
// ═══════════════════════════════════════════

/// A news record from the input table.
///
/// Columns other than the named ones are carried through untouched in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub title: String,
    pub description: String,
    pub title_hash: i64,
    pub description_hash: i64,
    pub date: NaiveDateTime,
    pub processed_flag: bool,
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn hash_pair(&self) -> HashPair {
        HashPair::new(self.title_hash, self.description_hash)
    }
}

// ═══════════════════════════════════════════
// NER service output
// ═══════════════════════════════════════════

/// One token of a NER prediction, as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedToken {
    #[serde(rename = "Token", alias = "token")]
    pub token: String,
    #[serde(rename = "Tag", alias = "tag")]
    pub tag: String,
}

impl TaggedToken {
    pub fn new(token: &str, tag: &str) -> Self {
        Self {
            token: token.to_string(),
            tag: tag.to_string(),
        }
    }
}

/// Entity categories kept in the output. Anything else the tagger emits
/// (`tim`, `art`, `eve`, `nat`, ...) is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    Org,
    Geo,
    Gpe,
    Per,
}

impl EntityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Org => "org",
            Self::Geo => "geo",
            Self::Gpe => "gpe",
            Self::Per => "per",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "org" => Some(Self::Org),
            "geo" => Some(Self::Geo),
            "gpe" => Some(Self::Gpe),
            "per" => Some(Self::Per),
            _ => None,
        }
    }

    pub fn all() -> &'static [EntityCategory] {
        &[Self::Org, Self::Geo, Self::Gpe, Self::Per]
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decoded entity spans, in order of appearance, per tracked category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityLists {
    pub org: Vec<String>,
    pub geo: Vec<String>,
    pub gpe: Vec<String>,
    pub per: Vec<String>,
}

impl EntityLists {
    pub fn get(&self, category: EntityCategory) -> &[String] {
        match category {
            EntityCategory::Org => &self.org,
            EntityCategory::Geo => &self.geo,
            EntityCategory::Gpe => &self.gpe,
            EntityCategory::Per => &self.per,
        }
    }

    pub fn push(&mut self, category: EntityCategory, span: String) {
        match category {
            EntityCategory::Org => self.org.push(span),
            EntityCategory::Geo => self.geo.push(span),
            EntityCategory::Gpe => self.gpe.push(span),
            EntityCategory::Per => self.per.push(span),
        }
    }

    pub fn is_empty(&self) -> bool {
        EntityCategory::all().iter().all(|c| self.get(*c).is_empty())
    }
}

// ═══════════════════════════════════════════
// Enriched output row
// ═══════════════════════════════════════════

/// A record merged with its entity lists, ready for the output table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRow {
    pub title: String,
    pub description: String,
    pub title_hash: i64,
    pub description_hash: i64,
    /// Formatted with [`OUTPUT_DATE_FORMAT`].
    pub date: String,
    /// Always false: the enriched row starts unprocessed for downstream jobs.
    pub processed_flag: bool,
    pub ner_org_list: String,
    pub ner_geo_list: String,
    pub ner_gpe_list: String,
    pub ner_per_list: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EnrichedRow {
    pub fn hash_pair(&self) -> HashPair {
        HashPair::new(self.title_hash, self.description_hash)
    }
}

// ═══════════════════════════════════════════
// Store outcomes
// ═══════════════════════════════════════════

/// A row the output store refused, by position in the submitted slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertFailure {
    pub index: usize,
    pub error: String,
}

/// A source row that could not be flagged as processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkFailure {
    pub pair: HashPair,
    pub error: String,
}

// ═══════════════════════════════════════════
// Batch assembly
// ═══════════════════════════════════════════

/// Output of the batch assembler for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledBatch {
    /// Texts to send to the NER service, in request order.
    pub texts: Vec<String>,
    /// `indices[i]` is the page position of the record behind `texts[i]`.
    pub indices: Vec<usize>,
    /// Records already present in the output table.
    pub already_enriched: Vec<HashPair>,
    /// Records skipped because they could not be prepared.
    pub deferred: usize,
}

impl AssembledBatch {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

// ═══════════════════════════════════════════
// Runner config & report
// ═══════════════════════════════════════════

/// Loop parameters for the enrichment runner.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentConfig {
    /// Page size for each fetch of unprocessed records.
    pub input_rows_limit: u32,
    /// Wall-clock budget, checked before every fetch.
    pub execution_timeout: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            input_rows_limit: 100,
            execution_timeout: Duration::from_secs(540),
        }
    }
}

/// Why the control loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// No unprocessed records remain.
    Completed,
    /// The execution budget ran out; a later invocation picks up the rest.
    TimeoutReached,
    /// The unprocessed count stopped moving for [`STALL_LIMIT`] iterations.
    StallExceeded,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TimeoutReached => "timeout_reached",
            Self::StallExceeded => "stall_exceeded",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary of a full job run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub run_id: String,
    pub pages: u32,
    pub records_fetched: u32,
    pub duplicates_skipped: u32,
    pub records_deferred: u32,
    pub ner_failures: u32,
    pub rows_inserted: u32,
    pub insert_failures: u32,
    pub mark_failures: u32,
    pub initial_unprocessed: u64,
    pub final_unprocessed: u64,
    pub termination: TerminationReason,
    pub duration_ms: u64,
}

impl JobReport {
    pub fn new(run_id: String, initial_unprocessed: u64) -> Self {
        Self {
            run_id,
            pages: 0,
            records_fetched: 0,
            duplicates_skipped: 0,
            records_deferred: 0,
            ner_failures: 0,
            rows_inserted: 0,
            insert_failures: 0,
            mark_failures: 0,
            initial_unprocessed,
            final_unprocessed: initial_unprocessed,
            termination: TerminationReason::Completed,
            duration_ms: 0,
        }
    }
}
