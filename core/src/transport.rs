use async_trait::async_trait;
use parley_client::{ChatClient, TransportError};
use parley_common::ParleyConfig;
use parley_protocol::ChatResponse;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sends one user message and returns the assistant reply.
///
/// Implementations must stop promptly once `cancel` fires and report
/// [`TransportError::Cancelled`] rather than a generic failure.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, TransportError>;
}

/// Adapter to wrap [`ChatClient`] into [`ChatTransport`]
pub struct HttpTransport {
    inner: ChatClient,
}

impl HttpTransport {
    pub fn new(client: ChatClient) -> Self {
        Self { inner: client }
    }

    pub fn from_config(config: &ParleyConfig) -> Result<Self, TransportError> {
        let client = ChatClient::new(
            config.chat_endpoint(),
            Duration::from_millis(config.request_timeout_ms),
        )?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send_message(
        &self,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, TransportError> {
        self.inner.send_message(content, cancel).await
    }
}

/// Offline transport that echoes the message back.
pub struct EchoTransport;

#[async_trait]
impl ChatTransport for EchoTransport {
    async fn send_message(
        &self,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        Ok(ChatResponse {
            response: format!("Echo: {content}"),
        })
    }
}
