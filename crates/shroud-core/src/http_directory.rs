#![cfg(feature = "http-directory")]

//! HTTP directory client.
//!
//! Endpoints, relative to the base URL:
//! - `GET /{peer_id}`: base64 SPKI PEM, `404` if never published
//! - `GET /{peer_id}/date`: publish time as decimal Unix seconds
//! - `POST /update/{peer_id}`: form body `pub_key=<base64>`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tokio::sync::RwLock;
use tokio::time::Instant;

use shroud_crypto::identity::PeerPublicKey;
use shroud_crypto::PeerId;

use crate::directory::{decode_public_key, encode_public_key, parse_published_at, Directory, DirectoryError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(100);
pub const DEFAULT_DATE_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct HttpDirectoryConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub key_ttl: Duration,
    pub date_ttl: Duration,
}

impl HttpDirectoryConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            key_ttl: DEFAULT_KEY_TTL,
            date_ttl: DEFAULT_DATE_TTL,
        }
    }
}

// ============================================================================
// Response cache
// ============================================================================

/// Caches response bodies per peer. `None` records a `404`.
pub(crate) struct ResponseCache {
    ttl: Duration,
    entries: RwLock<HashMap<PeerId, (Instant, Option<String>)>>,
}

impl ResponseCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Outer `None` is a miss.
    pub(crate) async fn get(&self, peer_id: PeerId) -> Option<Option<String>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(&peer_id)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, body)| body.clone())
    }

    pub(crate) async fn put(&self, peer_id: PeerId, body: Option<String>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        entries.insert(peer_id, (Instant::now(), body));
    }

    pub(crate) async fn invalidate(&self, peer_id: PeerId) {
        self.entries.write().await.remove(&peer_id);
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct HttpDirectory {
    base_url: String,
    client: reqwest::Client,
    key_cache: ResponseCache,
    date_cache: ResponseCache,
}

impl HttpDirectory {
    pub fn new(config: HttpDirectoryConfig) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            key_cache: ResponseCache::new(config.key_ttl),
            date_cache: ResponseCache::new(config.date_ttl),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn key_url(&self, peer_id: PeerId) -> String {
        format!("{}/{}", self.base_url, peer_id)
    }

    fn date_url(&self, peer_id: PeerId) -> String {
        format!("{}/{}/date", self.base_url, peer_id)
    }

    fn update_url(&self, peer_id: PeerId) -> String {
        format!("{}/update/{}", self.base_url, peer_id)
    }

    /// GET a text body. `Ok(None)` on 404.
    async fn get_text(&self, url: String) -> Result<Option<String>, DirectoryError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => {
                let body = resp
                    .text()
                    .await
                    .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
                Ok(Some(body))
            }
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(DirectoryError::Unavailable(format!(
                "status={} body={:?}",
                other,
                resp.text().await.ok()
            ))),
        }
    }

    async fn get_cached(
        &self,
        cache: &ResponseCache,
        peer_id: PeerId,
        url: String,
    ) -> Result<Option<String>, DirectoryError> {
        if let Some(hit) = cache.get(peer_id).await {
            tracing::trace!(peer_id = %peer_id, "Directory cache hit");
            return Ok(hit);
        }
        let body = self.get_text(url).await?;
        cache.put(peer_id, body.clone()).await;
        Ok(body)
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn fetch_public_key(&self, peer_id: PeerId) -> Result<Option<PeerPublicKey>, DirectoryError> {
        let body = self
            .get_cached(&self.key_cache, peer_id, self.key_url(peer_id))
            .await?;
        body.as_deref().map(decode_public_key).transpose()
    }

    async fn fetch_public_key_uncached(
        &self,
        peer_id: PeerId,
    ) -> Result<Option<PeerPublicKey>, DirectoryError> {
        let body = self.get_text(self.key_url(peer_id)).await?;
        self.key_cache.put(peer_id, body.clone()).await;
        body.as_deref().map(decode_public_key).transpose()
    }

    async fn fetch_published_at(&self, peer_id: PeerId) -> Result<Option<DateTime<Utc>>, DirectoryError> {
        let body = self
            .get_cached(&self.date_cache, peer_id, self.date_url(peer_id))
            .await?;
        body.as_deref().map(parse_published_at).transpose()
    }

    async fn publish(&self, own_id: PeerId, public_key: &PeerPublicKey) -> Result<(), DirectoryError> {
        let text = encode_public_key(public_key)?;
        let resp = self
            .client
            .post(self.update_url(own_id))
            .form(&[("pub_key", text.as_str())])
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DirectoryError::Unavailable(format!(
                "status={} body={:?}",
                resp.status(),
                resp.text().await.ok()
            )));
        }

        self.key_cache.invalidate(own_id).await;
        self.date_cache.invalidate(own_id).await;
        Ok(())
    }
}
