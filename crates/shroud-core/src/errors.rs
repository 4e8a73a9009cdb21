//! Error taxonomy for the end-to-end layer.
//!
//! Only [`CoreError::KeyLoad`] is fatal. Every other variant describes the
//! outcome of a single message (or a single peer) and is absorbed by the
//! caller: the message is skipped, dropped or not sent, and the chat
//! session carries on.

use thiserror::Error;

use shroud_crypto::PeerId;

use crate::store::StoreError;

/// Why no session key could be produced for a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The peer has not published a public key.
    NotPublished,
    /// The directory could not be reached and nothing was cached.
    DirectoryUnavailable(String),
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPublished => write!(f, "peer has not published a key"),
            Self::DirectoryUnavailable(cause) => write!(f, "directory unavailable: {cause}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    /// Identity material exists but cannot be read or parsed.
    #[error("identity key material unreadable: {0}")]
    KeyLoad(String),

    /// The peer's published key is not a valid point; skip this peer.
    #[error("key agreement with peer {peer_id} failed: {reason}")]
    Agreement { peer_id: PeerId, reason: String },

    /// Transient directory fault outside of key lookup (e.g. publishing).
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// No session key can be used for this peer right now.
    #[error("no session key for peer {peer_id}: {reason}")]
    Unavailable {
        peer_id: PeerId,
        reason: UnavailableReason,
    },

    /// Malformed or foreign-key envelope; drop the message.
    #[error("could not decrypt message from {peer_id}: {reason}")]
    Decrypt { peer_id: PeerId, reason: String },

    #[error("session store: {0}")]
    Store(#[from] StoreError),

    #[error("transport: {0}")]
    Transport(String),

    #[error("encryption failed: {0}")]
    Crypto(String),
}

impl CoreError {
    /// Whether the error should end the encompassing session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::KeyLoad(_))
    }

    pub(crate) fn decrypt(peer_id: PeerId, reason: impl std::fmt::Display) -> Self {
        CoreError::Decrypt {
            peer_id,
            reason: reason.to_string(),
        }
    }
}
