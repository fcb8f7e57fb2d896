//! HTTP binding for the chat API.

pub mod client;
pub mod error;

pub use client::ChatClient;
pub use error::TransportError;
