/*!
 * Delivery Sinks
 * Targets the reporter hands its chunks to
 */

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use crate::core::errors::DeliveryError;
use crate::metric::Metric;

/// Delivers a non-empty ordered chunk of metrics
///
/// `Forbidden` is terminal for the reporter; every other error is retried.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, batch: &[Metric]) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Arc<S> {
    async fn deliver(&self, batch: &[Metric]) -> Result<(), DeliveryError> {
        (**self).deliver(batch).await
    }
}

/// POSTs chunks as a JSON array to `{address}/updates/`
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(address: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: updates_url(address),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// `host:port` gets an `http://` scheme; full URLs are kept
fn updates_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        format!("{}/updates/", address)
    } else {
        format!("http://{}/updates/", address)
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn deliver(&self, batch: &[Metric]) -> Result<(), DeliveryError> {
        if batch.is_empty() {
            return Err(DeliveryError::EmptyBatch);
        }
        let body = serde_json::to_vec(batch).map_err(|e| DeliveryError::Encode(e.to_string()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(DeliveryError::Forbidden);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(count = batch.len(), endpoint = %self.endpoint, "batch delivered");
        Ok(())
    }
}
