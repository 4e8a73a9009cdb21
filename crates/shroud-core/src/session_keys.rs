//! Session Key Store: per-peer symmetric keys, derived on demand.
//!
//! [`SessionKeys::get_or_derive`] serves a cached key while the peer's
//! published key is no newer than the cached derivation, and re-derives
//! from the directory otherwise. A reachable-but-silent directory never
//! blocks a peer that already has a cached key.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};

use shroud_crypto::agreement::{derive_with_binding, KdfBinding};
use shroud_crypto::identity::IdentityKeyPair;
use shroud_crypto::{PeerId, SymmetricKey};

use crate::directory::{Directory, DirectoryError};
use crate::errors::{CoreError, UnavailableReason};
use crate::store::{SessionKeyEntry, SessionStore};

/// How the KDF is bound when deriving new keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KdfMode {
    /// No salt, empty info.
    #[default]
    Unbound,
    /// Bind to both peer identifiers. Both sides must agree on this mode.
    PeerIds,
}

/// Display view of a cached session. Never carries the key itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub peer_id: PeerId,
    pub derived_at: DateTime<Utc>,
    pub key_fingerprint: String,
}

pub struct SessionKeys {
    own_id: PeerId,
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn Directory>,
    kdf_mode: KdfMode,
}

impl SessionKeys {
    pub fn new(own_id: PeerId, store: Arc<dyn SessionStore>, directory: Arc<dyn Directory>) -> Self {
        Self {
            own_id,
            store,
            directory,
            kdf_mode: KdfMode::default(),
        }
    }

    pub fn with_kdf_mode(mut self, kdf_mode: KdfMode) -> Self {
        self.kdf_mode = kdf_mode;
        self
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn kdf_mode(&self) -> KdfMode {
        self.kdf_mode
    }

    fn binding_for(&self, peer_id: PeerId) -> KdfBinding {
        match self.kdf_mode {
            KdfMode::Unbound => KdfBinding::None,
            KdfMode::PeerIds => KdfBinding::PeerIds {
                local: self.own_id,
                remote: peer_id,
            },
        }
    }

    /// Return the session key for `peer_id`, deriving a fresh one if none is
    /// cached or the peer has republished since the cached derivation.
    pub async fn get_or_derive(
        &self,
        identity: &IdentityKeyPair,
        peer_id: PeerId,
    ) -> Result<SymmetricKey, CoreError> {
        let cached = self.store.load(peer_id).await?;

        if let Some(entry) = &cached {
            match self.directory.fetch_published_at(peer_id).await {
                Ok(Some(published_at)) if entry.is_current(published_at) => {
                    return Ok(entry.symmetric_key.clone());
                }
                Ok(Some(published_at)) => {
                    tracing::info!(
                        peer_id = %peer_id,
                        derived_at = %entry.derived_at,
                        published_at = %published_at,
                        "Peer republished its key; re-deriving"
                    );
                }
                Ok(None) => {
                    tracing::debug!(peer_id = %peer_id, "No publish date on record; re-fetching key");
                }
                Err(DirectoryError::Unavailable(reason)) => {
                    tracing::warn!(peer_id = %peer_id, %reason, "Directory unavailable; using cached key");
                    return Ok(entry.symmetric_key.clone());
                }
                Err(DirectoryError::InvalidRecord(reason)) => {
                    tracing::warn!(peer_id = %peer_id, %reason, "Unreadable publish date; re-fetching key");
                }
            }
        }

        // A stale entry means the peer republished; a cached key body may
        // still be the old one.
        let fetched = if cached.is_some() {
            self.directory.fetch_public_key_uncached(peer_id).await
        } else {
            self.directory.fetch_public_key(peer_id).await
        };

        let public_key = match fetched {
            Ok(Some(public_key)) => public_key,
            Ok(None) => {
                tracing::debug!(peer_id = %peer_id, "Peer has not published a key");
                return Err(CoreError::Unavailable {
                    peer_id,
                    reason: UnavailableReason::NotPublished,
                });
            }
            Err(DirectoryError::Unavailable(reason)) => {
                if let Some(entry) = cached {
                    tracing::warn!(peer_id = %peer_id, %reason, "Directory unavailable; using cached key");
                    return Ok(entry.symmetric_key.clone());
                }
                return Err(CoreError::Unavailable {
                    peer_id,
                    reason: UnavailableReason::DirectoryUnavailable(reason),
                });
            }
            Err(DirectoryError::InvalidRecord(reason)) => {
                tracing::warn!(peer_id = %peer_id, %reason, "Peer published an invalid key");
                return Err(CoreError::Agreement { peer_id, reason });
            }
        };

        let symmetric_key = derive_with_binding(identity, &public_key, self.binding_for(peer_id))
            .map_err(|e| CoreError::Agreement {
                peer_id,
                reason: e.to_string(),
            })?;

        // Microsecond precision is what the persistent store keeps.
        let derived_at = Utc::now().trunc_subsecs(6);
        let entry = SessionKeyEntry::new(peer_id, symmetric_key.clone(), derived_at);
        self.store.save(entry).await?;

        tracing::info!(
            peer_id = %peer_id,
            key_fingerprint = %symmetric_key.fingerprint(),
            "Derived new session key"
        );

        Ok(symmetric_key)
    }

    pub async fn list(&self) -> Result<Vec<SessionSummary>, CoreError> {
        let entries = self.store.list().await?;
        Ok(entries
            .into_iter()
            .map(|e| SessionSummary {
                peer_id: e.peer_id,
                derived_at: e.derived_at,
                key_fingerprint: e.symmetric_key.fingerprint(),
            })
            .collect())
    }

    /// Drop the cached key for `peer_id`; the next use re-derives it.
    pub async fn forget(&self, peer_id: PeerId) -> Result<bool, CoreError> {
        let removed = self.store.delete(peer_id).await?;
        if removed {
            tracing::info!(peer_id = %peer_id, "Forgot session key");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::InMemoryDirectory;
    use crate::store::InMemoryStore;
    use chrono::Duration;
    use shroud_crypto::agreement::derive;

    struct Fixture {
        me: IdentityKeyPair,
        peer: IdentityKeyPair,
        store: Arc<InMemoryStore>,
        directory: Arc<InMemoryDirectory>,
        sessions: SessionKeys,
    }

    fn fixture() -> Fixture {
        let me = IdentityKeyPair::generate();
        let peer = IdentityKeyPair::generate();
        let store = InMemoryStore::new_shared();
        let directory = Arc::new(InMemoryDirectory::new());
        let sessions = SessionKeys::new(PeerId(1), store.clone(), directory.clone());
        Fixture {
            me,
            peer,
            store,
            directory,
            sessions,
        }
    }

    #[tokio::test]
    async fn test_derives_on_first_use() {
        let f = fixture();
        f.directory.set_key(PeerId(2), f.peer.public_key()).await;

        let key = f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();
        assert_eq!(key, derive(&f.peer, &f.me.public_key()).unwrap());
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_cached_key_reused_without_key_fetch() {
        let f = fixture();
        f.directory.set_key(PeerId(2), f.peer.public_key()).await;
        let first = f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();
        let fetches = f.directory.key_fetches();

        let second = f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.directory.key_fetches(), fetches);
    }

    #[tokio::test]
    async fn test_unpublished_peer_is_unavailable_and_not_cached() {
        let f = fixture();
        let err = f.sessions.get_or_derive(&f.me, PeerId(9)).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Unavailable {
                reason: UnavailableReason::NotPublished,
                ..
            }
        ));
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_directory_down_without_cache_is_unavailable() {
        let f = fixture();
        f.directory.set_key(PeerId(2), f.peer.public_key()).await;
        f.directory.set_offline(true);

        let err = f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Unavailable {
                reason: UnavailableReason::DirectoryUnavailable(_),
                ..
            }
        ));
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_directory_down_falls_back_to_cache() {
        let f = fixture();
        f.directory.set_key(PeerId(2), f.peer.public_key()).await;
        let cached = f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();

        f.directory.set_offline(true);
        assert_eq!(f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap(), cached);
    }

    #[tokio::test]
    async fn test_missing_publish_date_forces_refetch() {
        let f = fixture();
        f.directory.set_key(PeerId(2), f.peer.public_key()).await;
        f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();
        f.directory.clear_published_at(PeerId(2)).await;
        let fetches = f.directory.key_fetches();

        f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();
        assert_eq!(f.directory.key_fetches(), fetches + 1);
    }

    #[tokio::test]
    async fn test_invalid_published_key_is_agreement_error() {
        let f = fixture();
        f.directory.set_raw_key(PeerId(3), "bm90IGEga2V5").await;

        let err = f.sessions.get_or_derive(&f.me, PeerId(3)).await.unwrap_err();
        assert!(matches!(err, CoreError::Agreement { peer_id: PeerId(3), .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_republish_replaces_entry() {
        let f = fixture();
        f.directory.set_key(PeerId(2), f.peer.public_key()).await;
        let old = f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();
        let old_entry = f.store.load(PeerId(2)).await.unwrap().unwrap();

        let rotated = IdentityKeyPair::generate();
        f.directory
            .set_key_at(PeerId(2), rotated.public_key(), old_entry.derived_at + Duration::seconds(5))
            .await;

        let new = f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();
        assert_ne!(old, new);
        assert_eq!(new, derive(&rotated, &f.me.public_key()).unwrap());
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_peer_id_binding_changes_key() {
        let f = fixture();
        f.directory.set_key(PeerId(2), f.peer.public_key()).await;
        let unbound = f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();

        let bound_sessions = SessionKeys::new(PeerId(1), InMemoryStore::new_shared(), f.directory.clone())
            .with_kdf_mode(KdfMode::PeerIds);
        let bound = bound_sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();
        assert_ne!(unbound, bound);
    }

    #[tokio::test]
    async fn test_list_and_forget() {
        let f = fixture();
        f.directory.set_key(PeerId(2), f.peer.public_key()).await;
        let key = f.sessions.get_or_derive(&f.me, PeerId(2)).await.unwrap();

        let listed = f.sessions.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].peer_id, PeerId(2));
        assert_eq!(listed[0].key_fingerprint, key.fingerprint());

        assert!(f.sessions.forget(PeerId(2)).await.unwrap());
        assert!(f.sessions.list().await.unwrap().is_empty());
        assert!(!f.sessions.forget(PeerId(2)).await.unwrap());
    }
}
