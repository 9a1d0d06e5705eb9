use crate::metrics_defs::{FORWARD_FAILURES, FORWARD_RETRIES};
use hyper::StatusCode;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Per-attempt bound on the webhook request, connection setup included.
pub const FORWARD_TIMEOUT: Duration = Duration::from_millis(5000);

/// One initial attempt plus exactly one retry. No backoff, no jitter.
const MAX_ATTEMPTS: u32 = 2;

/// Failures raised after both attempts are exhausted
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("webhook request failed: {0}")]
    Transport(String),

    #[error("webhook request timed out")]
    Timeout,

    #[error("webhook returned server error {0}")]
    ServerError(u16),
}

/// Posts sanitized payloads to the downstream webhook.
///
/// A response with status in [200,500) is accepted and returned as-is;
/// the caller decides what a 4xx means. A 5xx or transport failure
/// triggers the single retry of the identical request.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    url: Url,
}

impl Forwarder {
    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Sends the payload, retrying once on server-side or transport
    /// failure. Returns the status of the accepted attempt.
    pub async fn send(&self, payload: &Map<String, Value>) -> Result<StatusCode, ForwardError> {
        for attempt in 1..MAX_ATTEMPTS {
            match self.attempt(payload).await {
                Ok(status) if status.as_u16() < 500 => return Ok(status),
                Ok(status) => {
                    tracing::warn!(attempt, status = status.as_u16(), "webhook returned server error, retrying");
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "webhook attempt failed, retrying");
                }
            }
            shared::counter!(FORWARD_RETRIES).increment(1);
        }

        match self.attempt(payload).await {
            Ok(status) if status.as_u16() < 500 => Ok(status),
            Ok(status) => {
                shared::counter!(FORWARD_FAILURES).increment(1);
                Err(ForwardError::ServerError(status.as_u16()))
            }
            Err(err) => {
                shared::counter!(FORWARD_FAILURES).increment(1);
                Err(err)
            }
        }
    }

    async fn attempt(&self, payload: &Map<String, Value>) -> Result<StatusCode, ForwardError> {
        let response = self
            .client
            .post(self.url.clone())
            .timeout(FORWARD_TIMEOUT)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ForwardError::Timeout
                } else {
                    ForwardError::Transport(err.to_string())
                }
            })?;

        Ok(response.status())
    }
}
