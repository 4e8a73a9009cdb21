//! SQLite-backed session key store.
//!
//! One row per peer in `session_keys`. `INSERT OR REPLACE` swaps the whole
//! row in a single statement, so a reader sees either the old entry or
//! the new one.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

use shroud_crypto::{PeerId, SymmetricKey};

use crate::store::{SessionKeyEntry, SessionStore, StoreError};

// ============================================================================
// Schema Version
// ============================================================================

const SCHEMA_VERSION: i32 = 1;

// ============================================================================
// SQLite Store Implementation
// ============================================================================

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and bring its schema up to date.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::OperationFailed(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::OperationFailed(format!("failed to set pragmas: {e}")))?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::OperationFailed(format!("failed to open in-memory database: {e}"))
        })?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to create schema_version: {e}")))?;

        let current_version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
            .map_err(|e| StoreError::OperationFailed(format!("failed to read schema version: {e}")))?;

        if current_version > SCHEMA_VERSION {
            return Err(StoreError::DataCorruption(format!(
                "database schema v{current_version} is newer than supported v{SCHEMA_VERSION}"
            )));
        }
        if current_version < 1 {
            Self::migrate_v1(conn)?;
        }

        Ok(())
    }

    fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS session_keys (
                peer_id INTEGER PRIMARY KEY,
                symmetric_key BLOB NOT NULL,
                derived_at_micros INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            "#,
        )
        .map_err(|e| StoreError::OperationFailed(format!("migration v1 failed: {e}")))?;

        Ok(())
    }

    // SQLite integers are signed; peer ids round-trip through the same 64 bits.
    fn to_sql_id(peer_id: PeerId) -> i64 {
        peer_id.get() as i64
    }

    fn from_sql_id(raw: i64) -> PeerId {
        PeerId(raw as u64)
    }

    fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, Vec<u8>, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn decode_entry(raw: (i64, Vec<u8>, i64)) -> Result<SessionKeyEntry, StoreError> {
        let (peer, key_bytes, micros) = raw;
        let peer_id = Self::from_sql_id(peer);
        let symmetric_key = SymmetricKey::from_slice(&key_bytes).ok_or_else(|| {
            StoreError::DataCorruption(format!(
                "session key for peer {peer_id} has length {}",
                key_bytes.len()
            ))
        })?;
        let derived_at = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
            StoreError::DataCorruption(format!("derived_at out of range for peer {peer_id}"))
        })?;
        Ok(SessionKeyEntry::new(peer_id, symmetric_key, derived_at))
    }
}

// ============================================================================
// Store Trait Implementation
// ============================================================================

#[async_trait]
impl SessionStore for SqliteStore {
    async fn load(&self, peer_id: PeerId) -> Result<Option<SessionKeyEntry>, StoreError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                "SELECT peer_id, symmetric_key, derived_at_micros FROM session_keys WHERE peer_id = ?1",
                params![Self::to_sql_id(peer_id)],
                Self::entry_from_row,
            )
            .optional()
            .map_err(|e| StoreError::OperationFailed(format!("failed to load session key: {e}")))?;

        raw.map(Self::decode_entry).transpose()
    }

    async fn save(&self, entry: SessionKeyEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO session_keys (peer_id, symmetric_key, derived_at_micros)
             VALUES (?1, ?2, ?3)",
            params![
                Self::to_sql_id(entry.peer_id),
                entry.symmetric_key.as_bytes().as_slice(),
                entry.derived_at.timestamp_micros(),
            ],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to save session key: {e}")))?;
        Ok(())
    }

    async fn delete(&self, peer_id: PeerId) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let removed = conn
            .execute(
                "DELETE FROM session_keys WHERE peer_id = ?1",
                params![Self::to_sql_id(peer_id)],
            )
            .map_err(|e| StoreError::OperationFailed(format!("failed to delete session key: {e}")))?;
        Ok(removed > 0)
    }

    async fn list(&self) -> Result<Vec<SessionKeyEntry>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT peer_id, symmetric_key, derived_at_micros FROM session_keys")
            .map_err(|e| StoreError::OperationFailed(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], Self::entry_from_row)
            .map_err(|e| StoreError::OperationFailed(format!("failed to list session keys: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| StoreError::OperationFailed(format!("failed to read row: {e}")))?;
            entries.push(Self::decode_entry(raw)?);
        }
        entries.sort_by_key(|e| e.peer_id);
        Ok(entries)
    }
}
