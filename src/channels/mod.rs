//! Channel Interface
//!
//! Defines the messaging transport seam: the incoming message shape, the
//! outbound `Transport` trait and the `MessageHandler` callback that
//! transports drive for every received message.

pub mod stdio;

pub use stdio::StdioTransport;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Errors that can occur while handing a reply to the transport
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Channel not connected")]
    NotConnected,

    #[error("Rate limited: retry after {0}s")]
    RateLimited(u64),
}

/// Kind of chat a message arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// One-to-one conversation
    Personal,
    /// Group or channel conversation
    Group,
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatKind::Personal => write!(f, "personal"),
            ChatKind::Group => write!(f, "group"),
        }
    }
}

/// Incoming message from the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Conversation identity used as the frequency-limiting key
    pub scope_id: String,
    /// Personal or group chat
    pub chat_kind: ChatKind,
    /// Message text
    #[serde(default)]
    pub text: String,
    /// When the transport received the message
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
    /// Sent by the account owner (e.g. into their own saved-messages chat)
    #[serde(default)]
    pub from_self: bool,
}

impl IncomingMessage {
    /// Create a new incoming message from a contact
    pub fn new(
        scope_id: impl Into<String>,
        chat_kind: ChatKind,
        text: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scope_id: scope_id.into(),
            chat_kind,
            text: text.into(),
            received_at,
            from_self: false,
        }
    }

    /// Mark the message as written by the account owner
    pub fn from_owner(mut self) -> Self {
        self.from_self = true;
        self
    }
}

/// Outbound side of a messaging channel
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dispatch a reply into the given conversation
    async fn send(&self, scope_id: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Callback the transport invokes for each received message
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message
    async fn handle_message(&self, message: IncomingMessage);
}

/// Type-erased transport for storage
pub type DynTransport = Arc<dyn Transport>;
