//! Test doubles for the directory service and the chat transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use shroud_crypto::identity::{IdentityKeyPair, PeerPublicKey};
use shroud_crypto::PeerId;

use crate::context::EndToEndContext;
use crate::directory::{decode_public_key, encode_public_key, Directory, DirectoryError};
use crate::session_keys::SessionKeys;
use crate::store::InMemoryStore;
use crate::transport::{ChatTarget, GroupId, Transport, TransportError};

#[derive(Clone)]
struct DirectoryRecord {
    key_text: String,
    published_at: Option<DateTime<Utc>>,
}

/// In-process directory with controllable publish times and outages.
#[derive(Default)]
pub struct InMemoryDirectory {
    records: RwLock<HashMap<PeerId, DirectoryRecord>>,
    offline: AtomicBool,
    key_fetches: AtomicUsize,
    publishes: AtomicUsize,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_key(&self, peer_id: PeerId, key: PeerPublicKey) {
        self.set_key_at(peer_id, key, Utc::now()).await;
    }

    pub async fn set_key_at(&self, peer_id: PeerId, key: PeerPublicKey, published_at: DateTime<Utc>) {
        let key_text = encode_public_key(&key).unwrap_or_default();
        self.set_record(peer_id, key_text, Some(published_at)).await;
    }

    /// Store arbitrary key text, valid or not.
    pub async fn set_raw_key(&self, peer_id: PeerId, key_text: &str) {
        self.set_record(peer_id, key_text.to_string(), Some(Utc::now())).await;
    }

    async fn set_record(&self, peer_id: PeerId, key_text: String, published_at: Option<DateTime<Utc>>) {
        self.records.write().await.insert(
            peer_id,
            DirectoryRecord {
                key_text,
                published_at,
            },
        );
    }

    pub async fn clear_published_at(&self, peer_id: PeerId) {
        if let Some(record) = self.records.write().await.get_mut(&peer_id) {
            record.published_at = None;
        }
    }

    pub async fn remove(&self, peer_id: PeerId) {
        self.records.write().await.remove(&peer_id);
    }

    pub async fn published_text(&self, peer_id: PeerId) -> Option<String> {
        self.records.read().await.get(&peer_id).map(|r| r.key_text.clone())
    }

    /// While offline every call fails with [`DirectoryError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn key_fetches(&self) -> usize {
        self.key_fetches.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), DirectoryError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(DirectoryError::Unavailable("directory offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn fetch_public_key(&self, peer_id: PeerId) -> Result<Option<PeerPublicKey>, DirectoryError> {
        self.check_online()?;
        self.key_fetches.fetch_add(1, Ordering::SeqCst);
        let records = self.records.read().await;
        records
            .get(&peer_id)
            .map(|r| decode_public_key(&r.key_text))
            .transpose()
    }

    async fn fetch_published_at(&self, peer_id: PeerId) -> Result<Option<DateTime<Utc>>, DirectoryError> {
        self.check_online()?;
        let records = self.records.read().await;
        Ok(records.get(&peer_id).and_then(|r| r.published_at))
    }

    async fn publish(&self, own_id: PeerId, public_key: &PeerPublicKey) -> Result<(), DirectoryError> {
        self.check_online()?;
        let key_text = encode_public_key(public_key)?;
        self.set_record(own_id, key_text, Some(Utc::now())).await;
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Transport that records what it was asked to send.
#[derive(Default)]
pub struct RecordingTransport {
    sent: RwLock<Vec<(ChatTarget, String)>>,
    groups: RwLock<HashMap<GroupId, Vec<PeerId>>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_participants(&self, group: GroupId, participants: Vec<PeerId>) {
        self.groups.write().await.insert(group, participants);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<(ChatTarget, String)> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_raw(&self, target: ChatTarget, text: &str) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("transport down".into()));
        }
        self.sent.write().await.push((target, text.to_string()));
        Ok(())
    }

    async fn participants(&self, group: GroupId) -> Result<Vec<PeerId>, TransportError> {
        self.groups
            .read()
            .await
            .get(&group)
            .cloned()
            .ok_or_else(|| TransportError::UnknownChat(group.to_string()))
    }
}

/// A node with a fresh identity, an in-memory session store, and its key
/// already published to `directory`.
pub async fn spawn_node(own_id: u64, directory: Arc<InMemoryDirectory>) -> EndToEndContext {
    let own_id = PeerId(own_id);
    let identity = IdentityKeyPair::generate();
    let public_key = identity.public_key();
    let _ = directory.publish(own_id, &public_key).await;

    let sessions = SessionKeys::new(own_id, InMemoryStore::new_shared(), directory);
    EndToEndContext::new(own_id, identity, sessions)
}
