use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::EnrichmentError;
use super::traits::NerClient;
use super::types::TaggedToken;

/// Per-request timeout for the NER service. A batch of a few hundred news
/// texts on a CPU-backed tagger can take well over a minute.
pub const DEFAULT_NER_TIMEOUT_SECS: u64 = 300;

/// Blocking HTTP client for the NER service.
pub struct HttpNerClient {
    url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpNerClient {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, EnrichmentError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EnrichmentError::HttpClient(e.to_string()))?;

        Ok(Self {
            url: url.trim().to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, body: &B) -> Result<T, EnrichmentError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    EnrichmentError::NerConnection(self.url.clone())
                } else if e.is_timeout() {
                    EnrichmentError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    EnrichmentError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let parsed: PredictionResponse<T> = response
            .json()
            .map_err(|e| EnrichmentError::ResponseParsing(e.to_string()))?;

        Ok(parsed.prediction)
    }
}

/// Request body for a single text.
#[derive(Serialize)]
struct SingleRequest<'a> {
    text: &'a str,
}

/// Request body for a batch of texts.
#[derive(Serialize)]
struct BatchRequest<'a> {
    batch: &'a [String],
}

/// Response body; `prediction` is one token list, or one per batch entry.
#[derive(Deserialize)]
struct PredictionResponse<T> {
    prediction: T,
}

/// Map a non-success status to the access (4xx) or internal (5xx) error kind.
pub fn status_error(status: u16, body: String) -> EnrichmentError {
    match status {
        500.. => EnrichmentError::NerBackendInternal { status, body },
        400..=499 => EnrichmentError::NerBackendAccess { status, body },
        _ => EnrichmentError::HttpClient(format!("Unexpected status {status}: {body}")),
    }
}

impl NerClient for HttpNerClient {
    fn predict(&self, text: &str) -> Result<Vec<TaggedToken>, EnrichmentError> {
        self.post(&SingleRequest { text })
    }

    fn predict_batch(&self, texts: &[String]) -> Result<Vec<Vec<TaggedToken>>, EnrichmentError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let predictions: Vec<Vec<TaggedToken>> = self.post(&BatchRequest { batch: texts })?;
        tracing::debug!(
            sent = texts.len(),
            received = predictions.len(),
            "NER batch answered"
        );
        Ok(predictions)
    }
}
