//! Completion notifiers, called once after the control loop ends.

use std::time::Duration;

use serde::Serialize;

use super::error::EnrichmentError;
use super::traits::CompletionNotifier;

const NOTIFY_TIMEOUT_SECS: u64 = 30;

/// Posts the completion message to an HTTP(S) endpoint.
pub struct HttpTopicNotifier {
    client: reqwest::blocking::Client,
}

impl HttpTopicNotifier {
    pub fn new() -> Result<Self, EnrichmentError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()
            .map_err(|e| EnrichmentError::Notification(e.to_string()))?;
        Ok(Self { client })
    }
}

#[derive(Serialize)]
struct PublishBody<'a> {
    message: &'a str,
}

impl CompletionNotifier for HttpTopicNotifier {
    fn publish(&self, topic: &str, message: &str) -> Result<(), EnrichmentError> {
        let response = self
            .client
            .post(topic)
            .json(&PublishBody { message })
            .send()
            .map_err(|e| EnrichmentError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Notification(format!(
                "{topic} answered with status {}",
                status.as_u16()
            )));
        }
        tracing::info!(topic, "Completion published");
        Ok(())
    }
}

/// Records the completion signal in the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl CompletionNotifier for LogNotifier {
    fn publish(&self, topic: &str, message: &str) -> Result<(), EnrichmentError> {
        tracing::info!(topic, message, "Completion signal");
        Ok(())
    }
}

/// HTTP(S) topics get a real publish; any other topic name is only logged.
pub fn notifier_for(topic: &str) -> Result<Box<dyn CompletionNotifier>, EnrichmentError> {
    if topic.starts_with("http://") || topic.starts_with("https://") {
        Ok(Box::new(HttpTopicNotifier::new()?))
    } else {
        Ok(Box::new(LogNotifier))
    }
}
