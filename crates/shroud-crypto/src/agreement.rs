//! Key agreement: P-384 ECDH followed by HKDF-SHA256.
//!
//! Derivation is deterministic, so both sides of a conversation arrive at
//! the same 32-byte key and a node can cache it until the peer republishes.

use hkdf::Hkdf;
use p384::ecdh::diffie_hellman;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::identity::{IdentityKeyPair, PeerPublicKey};
use crate::types::{PeerId, SymmetricKey, SYMMETRIC_KEY_LEN};

const BINDING_LABEL: &[u8] = b"shroud-e2e-v1";

/// Error type for key agreement.
#[derive(Debug, thiserror::Error)]
pub enum AgreementError {
    #[error("invalid peer public key: {0}")]
    InvalidPublicKey(String),
    #[error("key derivation failed")]
    Kdf,
}

/// Context bound into the HKDF `info` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KdfBinding {
    /// No salt, empty info. Interoperates with nodes that never bind.
    #[default]
    None,
    /// Bind to both peer identifiers, ordered so that both sides agree.
    PeerIds { local: PeerId, remote: PeerId },
}

impl KdfBinding {
    fn info(&self) -> Vec<u8> {
        match *self {
            KdfBinding::None => Vec::new(),
            KdfBinding::PeerIds { local, remote } => {
                let (lo, hi) = if local <= remote { (local, remote) } else { (remote, local) };
                let mut info = Vec::with_capacity(BINDING_LABEL.len() + 16);
                info.extend_from_slice(BINDING_LABEL);
                info.extend_from_slice(&lo.get().to_be_bytes());
                info.extend_from_slice(&hi.get().to_be_bytes());
                info
            }
        }
    }
}

/// Derive the session key shared with `peer` using the default (unbound) KDF.
pub fn derive(identity: &IdentityKeyPair, peer: &PeerPublicKey) -> Result<SymmetricKey, AgreementError> {
    derive_with_binding(identity, peer, KdfBinding::None)
}

/// Derive the session key shared with `peer`, binding the KDF as requested.
pub fn derive_with_binding(
    identity: &IdentityKeyPair,
    peer: &PeerPublicKey,
    binding: KdfBinding,
) -> Result<SymmetricKey, AgreementError> {
    let shared = diffie_hellman(identity.secret().to_nonzero_scalar(), peer.inner().as_affine());

    let hk = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes().as_slice());
    let mut okm = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
    hk.expand(&binding.info(), &mut okm[..])
        .map_err(|_| AgreementError::Kdf)?;

    Ok(SymmetricKey::from_bytes(*okm))
}

/// Parse a peer's SPKI PEM and derive in one step.
pub fn derive_from_pem(
    identity: &IdentityKeyPair,
    peer_pem: &str,
    binding: KdfBinding,
) -> Result<SymmetricKey, AgreementError> {
    let peer = PeerPublicKey::from_pem(peer_pem)
        .map_err(|e| AgreementError::InvalidPublicKey(e.to_string()))?;
    derive_with_binding(identity, &peer, binding)
}
