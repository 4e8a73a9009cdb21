//! Public-key directory client abstraction.
//!
//! The directory maps a peer identifier to the base64 text of the peer's
//! SPKI PEM public key and to the time it was last published. A missing
//! record is `Ok(None)`, never an error.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use thiserror::Error;

use shroud_crypto::identity::PeerPublicKey;
use shroud_crypto::PeerId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Network fault, timeout or unexpected status.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered but the record cannot be used.
    #[error("invalid directory record: {0}")]
    InvalidRecord(String),
}

/// Result of [`Directory::publish_if_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    Unchanged,
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// The peer's currently published key, or `None` if it never published.
    async fn fetch_public_key(&self, peer_id: PeerId) -> Result<Option<PeerPublicKey>, DirectoryError>;

    /// When the peer last published its key.
    async fn fetch_published_at(&self, peer_id: PeerId) -> Result<Option<DateTime<Utc>>, DirectoryError>;

    /// Unconditionally publish `public_key` under `own_id`.
    async fn publish(&self, own_id: PeerId, public_key: &PeerPublicKey) -> Result<(), DirectoryError>;

    /// Key lookup that skips any response cache. Defaults to
    /// [`fetch_public_key`](Directory::fetch_public_key).
    async fn fetch_public_key_uncached(
        &self,
        peer_id: PeerId,
    ) -> Result<Option<PeerPublicKey>, DirectoryError> {
        self.fetch_public_key(peer_id).await
    }

    /// Publish `public_key` unless the directory already holds it.
    ///
    /// A published record that cannot be parsed is overwritten.
    async fn publish_if_changed(
        &self,
        own_id: PeerId,
        public_key: &PeerPublicKey,
    ) -> Result<PublishOutcome, DirectoryError> {
        match self.fetch_public_key_uncached(own_id).await {
            Ok(Some(current)) if current == *public_key => {
                tracing::debug!(own_id = %own_id, "Published key is current");
                return Ok(PublishOutcome::Unchanged);
            }
            Ok(_) => {}
            Err(DirectoryError::InvalidRecord(reason)) => {
                tracing::warn!(own_id = %own_id, %reason, "Replacing unreadable published key");
            }
            Err(e) => return Err(e),
        }

        self.publish(own_id, public_key).await?;
        tracing::info!(own_id = %own_id, "Published public key");
        Ok(PublishOutcome::Published)
    }
}

// ============================================================================
// Wire encoding
// ============================================================================

/// Directory text for a public key: base64 of the SPKI PEM.
pub fn encode_public_key(public_key: &PeerPublicKey) -> Result<String, DirectoryError> {
    let pem = public_key
        .to_pem()
        .map_err(|e| DirectoryError::InvalidRecord(e.to_string()))?;
    Ok(STANDARD.encode(pem.as_bytes()))
}

pub fn decode_public_key(text: &str) -> Result<PeerPublicKey, DirectoryError> {
    let pem_bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| DirectoryError::InvalidRecord(format!("bad base64: {e}")))?;
    let pem = std::str::from_utf8(&pem_bytes)
        .map_err(|_| DirectoryError::InvalidRecord("key is not UTF-8 PEM".into()))?;
    PeerPublicKey::from_pem(pem).map_err(|e| DirectoryError::InvalidRecord(e.to_string()))
}

/// Parse a publish time given as decimal Unix seconds, e.g. `1700000000.25`.
pub fn parse_published_at(text: &str) -> Result<DateTime<Utc>, DirectoryError> {
    let secs: f64 = text
        .trim()
        .parse()
        .map_err(|_| DirectoryError::InvalidRecord(format!("bad timestamp {:?}", text.trim())))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(DirectoryError::InvalidRecord(format!("bad timestamp {secs}")));
    }
    let micros = (secs * 1_000_000.0).round() as i64;
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| DirectoryError::InvalidRecord(format!("timestamp out of range: {secs}")))
}

pub fn format_published_at(at: DateTime<Utc>) -> String {
    format!("{:.6}", at.timestamp_micros() as f64 / 1_000_000.0)
}
