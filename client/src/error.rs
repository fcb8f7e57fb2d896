use thiserror::Error;

/// Failure outcomes of a single chat request
#[derive(Error, Debug)]
pub enum TransportError {
    /// The caller's cancellation token fired before the request finished
    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Non-2xx response
    #[error("chat api http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("failed to decode chat response: {reason}")]
    Decode { reason: String },
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}
