//! Chat client facade.
//!
//! The browser-automation chat client runs out of process (the sidecar). The relay only sees
//! the [`ChatClient`] trait for commands and a stream of [`ClientEvent`]s for lifecycle and
//! inbound messages. [`BridgeClient`] implements both over a WebSocket to the sidecar.

mod bridge;
mod protocol;
mod types;

use async_trait::async_trait;

pub use bridge::{BridgeClient, BRIDGE_CLOSED_REASON};
pub use protocol::{BridgeEvent, BridgeRequest, BridgeResponse};
pub use types::{ChatInfo, ClientEvent, ContactInfo, InboundMessage};

/// Errors from the chat client facade.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("chat client not connected")]
    NotConnected,
    #[error("connecting to sidecar failed: {0}")]
    Connect(String),
    #[error("sidecar connection closed")]
    Closed,
    #[error("{0} timed out")]
    Timeout(String),
    #[error("{0}")]
    Remote(String),
    #[error("invalid sidecar payload: {0}")]
    Payload(String),
    #[error("sidecar json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Commands accepted by the chat client.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Start (or restart) the client session. QR / ready events follow on the event stream.
    async fn initialize(&self) -> Result<(), ClientError>;
    /// Tear the session down.
    async fn destroy(&self) -> Result<(), ClientError>;
    /// Send a text message to a chat address (e.g. `15551234567@c.us`). Returns the client's
    /// description of the sent message.
    async fn send_message(&self, chat_id: &str, body: &str)
        -> Result<serde_json::Value, ClientError>;
    /// Resolve the chat an inbound message belongs to.
    async fn get_chat(&self, message_id: &str) -> Result<ChatInfo, ClientError>;
    /// Resolve the contact that sent an inbound message.
    async fn get_contact(&self, message_id: &str) -> Result<ContactInfo, ClientError>;
}
