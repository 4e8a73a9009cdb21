//! The chat transport as seen from the encryption layer.
//!
//! The transport carries text, so envelopes travel as standard base64.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use shroud_crypto::PeerId;

/// Identifier of a group chat on the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub i64);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a raw message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatTarget {
    Peer(PeerId),
    Group(GroupId),
}

impl std::fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatTarget::Peer(id) => write!(f, "peer:{id}"),
            ChatTarget::Group(id) => write!(f, "group:{id}"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("unknown chat: {0}")]
    UnknownChat(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver already-encrypted text to a peer or group chat.
    async fn send_raw(&self, target: ChatTarget, text: &str) -> Result<(), TransportError>;

    /// Current members of a group chat, possibly including this node.
    async fn participants(&self, group: GroupId) -> Result<Vec<PeerId>, TransportError>;
}

pub fn encode_wire(envelope: &[u8]) -> String {
    STANDARD.encode(envelope)
}

pub fn decode_wire(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text.trim())
}
