//! Webhook delivery with exponential-backoff retry.
//!
//! [`WebhookDelivery`] POSTs the JSON message of a [`LifecycleEvent`] to a
//! recipient URL. Failed attempts are retried with backoff (1 s, 2 s, 4 s by
//! default).

use std::time::Duration;

use crate::bus::LifecycleEvent;

const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request failed (network, DNS, timeout, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

pub struct WebhookDelivery {
    client: reqwest::Client,
    retry_delays: Vec<Duration>,
}

impl WebhookDelivery {
    pub fn new() -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            retry_delays: RETRY_DELAYS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        })
    }

    /// Replace the backoff schedule. An empty schedule means one attempt.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Deliver an event to `url`, retrying with backoff.
    ///
    /// Returns `Ok(())` on the first successful attempt.
    pub async fn deliver(&self, url: &str, event: &LifecycleEvent) -> Result<(), WebhookError> {
        let message = event.to_message();

        let mut last_err: Option<WebhookError> = None;
        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(url, &message).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url,
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff.
        match self.try_send(url, &message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(url, error = %e, "Webhook delivery failed after all retries");
                Err(last_err.unwrap_or(e))
            }
        }
    }

    async fn try_send(&self, url: &str, message: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(message).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
