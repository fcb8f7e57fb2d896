use crate::error::TransportError;
use parley_protocol::{ChatRequest, ChatResponse};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Client for `POST <api>/chat/`.
///
/// Every request is raced against the caller's cancellation token and a fixed
/// timeout; whichever finishes first decides the outcome.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(TransportError::Network)?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn send_message(
        &self,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, TransportError> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(endpoint = %self.endpoint, "chat request cancelled");
                Err(TransportError::Cancelled)
            }
            result = tokio::time::timeout(self.timeout, self.post(content)) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout { timeout_ms }),
            }
        }
    }

    async fn post(&self, content: &str) -> Result<ChatResponse, TransportError> {
        let body = ChatRequest {
            message: content.to_string(),
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(TransportError::Network)?;

        let status = resp.status();
        debug!(%status, "chat api responded");

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let bytes = resp.bytes().await.map_err(TransportError::Network)?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode {
            reason: e.to_string(),
        })
    }
}
