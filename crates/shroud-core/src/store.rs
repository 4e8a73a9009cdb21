//! Storage abstraction for derived session keys.
//!
//! One [`SessionKeyEntry`] per peer, replaced as a whole record on every
//! new derivation (last write wins). Readers never observe a partially
//! updated entry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use shroud_crypto::{PeerId, SymmetricKey};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("data corruption detected: {0}")]
    DataCorruption(String),
}

// ============================================================================
// Data Models
// ============================================================================

/// A symmetric key derived for one peer and the time it was derived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionKeyEntry {
    pub peer_id: PeerId,
    pub symmetric_key: SymmetricKey,
    pub derived_at: DateTime<Utc>,
}

impl SessionKeyEntry {
    pub fn new(peer_id: PeerId, symmetric_key: SymmetricKey, derived_at: DateTime<Utc>) -> Self {
        Self {
            peer_id,
            symmetric_key,
            derived_at,
        }
    }

    /// Still valid unless the peer republished after this key was derived.
    pub fn is_current(&self, published_at: DateTime<Utc>) -> bool {
        published_at <= self.derived_at
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence for session keys.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the entry for `peer_id`, if one exists.
    async fn load(&self, peer_id: PeerId) -> Result<Option<SessionKeyEntry>, StoreError>;

    /// Insert or atomically replace the entry for `entry.peer_id`.
    async fn save(&self, entry: SessionKeyEntry) -> Result<(), StoreError>;

    /// Remove the entry for `peer_id`. Returns whether one existed.
    async fn delete(&self, peer_id: PeerId) -> Result<bool, StoreError>;

    /// All entries, ordered by peer id.
    async fn list(&self) -> Result<Vec<SessionKeyEntry>, StoreError>;
}

// ============================================================================
// In-Memory Store Implementation
// ============================================================================

/// Thread-safe in-memory store.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<PeerId, SessionKeyEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn load(&self, peer_id: PeerId) -> Result<Option<SessionKeyEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&peer_id).cloned())
    }

    async fn save(&self, entry: SessionKeyEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.peer_id, entry);
        Ok(())
    }

    async fn delete(&self, peer_id: PeerId) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(&peer_id).is_some())
    }

    async fn list(&self) -> Result<Vec<SessionKeyEntry>, StoreError> {
        let entries = self.entries.read().await;
        let mut all: Vec<_> = entries.values().cloned().collect();
        all.sort_by_key(|e| e.peer_id);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(peer: u64, key_byte: u8) -> SessionKeyEntry {
        SessionKeyEntry::new(
            PeerId(peer),
            SymmetricKey::from_bytes([key_byte; 32]),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryStore::new();
        store.save(entry(1, 0xAA)).await.unwrap();

        let loaded = store.load(PeerId(1)).await.unwrap().unwrap();
        assert_eq!(loaded.symmetric_key, SymmetricKey::from_bytes([0xAA; 32]));
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let store = InMemoryStore::new();
        assert!(store.load(PeerId(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_whole_entry() {
        let store = InMemoryStore::new();
        let first = entry(5, 0x01);
        store.save(first.clone()).await.unwrap();

        let mut second = entry(5, 0x02);
        second.derived_at = first.derived_at + Duration::seconds(10);
        store.save(second.clone()).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.load(PeerId(5)).await.unwrap().unwrap(), second);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        store.save(entry(3, 0x03)).await.unwrap();

        assert!(store.delete(PeerId(3)).await.unwrap());
        assert!(!store.delete(PeerId(3)).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let store = InMemoryStore::new();
        for id in [30, 10, 20] {
            store.save(entry(id, id as u8)).await.unwrap();
        }
        let ids: Vec<_> = store.list().await.unwrap().iter().map(|e| e.peer_id.get()).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_is_current() {
        let e = entry(1, 1);
        assert!(e.is_current(e.derived_at));
        assert!(e.is_current(e.derived_at - Duration::seconds(1)));
        assert!(!e.is_current(e.derived_at + Duration::milliseconds(1)));
    }
}
