//! Conversation state and request lifecycle for the parley chat client.

pub mod controller;
pub mod error;
pub mod message_log;
pub mod transport;

pub use controller::{ConversationController, ConversationLimits, ConversationSnapshot};
pub use error::{ChatError, ErrorReporter, FailureKind, ValidationError};
pub use parley_client::TransportError;
pub use parley_protocol::{Message, Role};
pub use transport::{ChatTransport, EchoTransport, HttpTransport};
