use parley_client::TransportError;
use thiserror::Error;

pub const RATE_LIMITED_MESSAGE: &str =
    "You're sending messages too quickly. Please wait a moment and try again.";
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str =
    "Your message is too large. Please shorten it and try again.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// Input rejected before it reaches the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message is empty")]
    Empty,

    #[error("message is {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },
}

/// Errors a conversation turn can run into
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),
}

/// User-facing categories for transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    PayloadTooLarge,
    TransportFailure,
}

impl FailureKind {
    /// Map a transport error to a failure kind. Cancellation is not a failure.
    pub fn classify(error: &TransportError) -> Option<Self> {
        match error {
            TransportError::Cancelled => None,
            TransportError::Status { status: 429, .. } => Some(FailureKind::RateLimited),
            TransportError::Status { status: 413, .. } => Some(FailureKind::PayloadTooLarge),
            _ => Some(FailureKind::TransportFailure),
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::RateLimited => RATE_LIMITED_MESSAGE,
            FailureKind::PayloadTooLarge => PAYLOAD_TOO_LARGE_MESSAGE,
            FailureKind::TransportFailure => GENERIC_FAILURE_MESSAGE,
        }
    }
}

/// Notice shown when input exceeds `max` characters
pub fn too_long_notice(max: usize) -> String {
    format!("Your message is too long. Please keep it under {max} characters.")
}

/// Error reporting utilities
pub struct ErrorReporter;

impl ErrorReporter {
    /// Format error for user display
    pub fn format_user_error(error: &ChatError) -> Option<String> {
        match error {
            ChatError::Validation(ValidationError::Empty) => None,
            ChatError::Validation(ValidationError::TooLong { max, .. }) => {
                Some(too_long_notice(*max))
            }
            ChatError::Transport(transport) => {
                FailureKind::classify(transport).map(|kind| kind.user_message().to_string())
            }
        }
    }
}
