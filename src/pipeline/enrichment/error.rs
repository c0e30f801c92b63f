//! Error types for the NER enrichment job.
//!
//! Page-local failures (NER backend, record preparation, partial inserts) are
//! caught inside the runner and logged. Only setup failures propagate out.

use thiserror::Error;

use super::types::HashPair;
use crate::config::JobConfigError;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// 4xx from the NER service: bad URL, payload or credentials.
    #[error("NER backend access error (status {status}): {body}")]
    NerBackendAccess { status: u16, body: String },

    /// 5xx from the NER service.
    #[error("NER backend internal error (status {status}): {body}")]
    NerBackendInternal { status: u16, body: String },

    #[error("NER service is not reachable at {0}")]
    NerConnection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Text normalization failed: {0}")]
    Normalization(String),

    #[error("Record {pair} could not be prepared: {reason}")]
    RecordProcessing { pair: HashPair, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Completion notification failed: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Config(#[from] JobConfigError),
}

impl EnrichmentError {
    /// True for the two NER backend status failures.
    pub fn is_ner_backend(&self) -> bool {
        matches!(
            self,
            Self::NerBackendAccess { .. } | Self::NerBackendInternal { .. }
        )
    }
}
