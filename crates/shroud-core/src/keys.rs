//! Identity key persistence.
//!
//! The node's key pair lives in two PEM files inside the data directory:
//! the PKCS#8 private key and the SPKI public key. [`load_or_create`] is
//! the only entry point callers need; it generates material on first run
//! and refuses to regenerate over anything it cannot read.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use zeroize::Zeroizing;

use shroud_crypto::identity::{IdentityKeyPair, PeerPublicKey};

use crate::errors::CoreError;
use crate::store::StoreError;

pub const PRIVATE_KEY_FILE: &str = "identity_private.pem";
pub const PUBLIC_KEY_FILE: &str = "identity_public.pem";

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key store lock poisoned")]
    Poisoned,
}

/// Identity material as it sits in storage.
#[derive(Clone)]
pub struct StoredIdentity {
    pub private_pem: Zeroizing<String>,
    pub public_pem: Option<String>,
}

/// Storage backend for the identity key pair.
pub trait IdentityStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredIdentity>, KeyStoreError>;
    fn store(&self, identity: &StoredIdentity) -> Result<(), KeyStoreError>;
    /// Replace only the public half; the private key is left untouched.
    fn store_public(&self, public_pem: &str) -> Result<(), KeyStoreError>;
    fn exists(&self) -> bool;
}

// ============================================================================
// File-backed store
// ============================================================================

pub struct FileIdentityStore {
    dir: PathBuf,
}

impl FileIdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_KEY_FILE)
    }
}

fn write_atomically(path: &Path, contents: &[u8], private: bool) -> Result<(), KeyStoreError> {
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if private {
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<StoredIdentity>, KeyStoreError> {
        let private_path = self.private_key_path();
        if !private_path.exists() {
            return Ok(None);
        }
        let private_pem = Zeroizing::new(fs::read_to_string(&private_path)?);

        let public_path = self.public_key_path();
        let public_pem = if public_path.exists() {
            Some(fs::read_to_string(&public_path)?)
        } else {
            None
        };

        Ok(Some(StoredIdentity {
            private_pem,
            public_pem,
        }))
    }

    fn store(&self, identity: &StoredIdentity) -> Result<(), KeyStoreError> {
        fs::create_dir_all(&self.dir)?;
        write_atomically(&self.private_key_path(), identity.private_pem.as_bytes(), true)?;
        if let Some(public_pem) = &identity.public_pem {
            write_atomically(&self.public_key_path(), public_pem.as_bytes(), false)?;
        }
        Ok(())
    }

    fn store_public(&self, public_pem: &str) -> Result<(), KeyStoreError> {
        fs::create_dir_all(&self.dir)?;
        write_atomically(&self.public_key_path(), public_pem.as_bytes(), false)
    }

    fn exists(&self) -> bool {
        self.private_key_path().exists()
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Non-persistent store for tests and throwaway identities.
#[derive(Default)]
pub struct MemoryIdentityStore {
    slot: Mutex<Option<StoredIdentity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_material(identity: StoredIdentity) -> Self {
        Self {
            slot: Mutex::new(Some(identity)),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<StoredIdentity>, KeyStoreError> {
        let slot = self.slot.lock().map_err(|_| KeyStoreError::Poisoned)?;
        Ok(slot.clone())
    }

    fn store(&self, identity: &StoredIdentity) -> Result<(), KeyStoreError> {
        let mut slot = self.slot.lock().map_err(|_| KeyStoreError::Poisoned)?;
        *slot = Some(identity.clone());
        Ok(())
    }

    fn store_public(&self, public_pem: &str) -> Result<(), KeyStoreError> {
        let mut slot = self.slot.lock().map_err(|_| KeyStoreError::Poisoned)?;
        if let Some(stored) = slot.as_mut() {
            stored.public_pem = Some(public_pem.to_string());
        }
        Ok(())
    }

    fn exists(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

// ============================================================================
// Load or create
// ============================================================================

fn key_load(e: impl std::fmt::Display) -> CoreError {
    CoreError::KeyLoad(e.to_string())
}

/// Load this node's identity, generating and persisting one on first run.
///
/// Stored material that cannot be parsed, or whose public half does not
/// match the private key, is a fatal [`CoreError::KeyLoad`].
pub fn load_or_create(store: &dyn IdentityStore) -> Result<IdentityKeyPair, CoreError> {
    if let Some(stored) = store.load().map_err(key_load)? {
        let identity = IdentityKeyPair::from_pkcs8_pem(&stored.private_pem).map_err(key_load)?;

        match stored.public_pem.as_deref() {
            Some(public_pem) => {
                let stored_public = PeerPublicKey::from_pem(public_pem).map_err(key_load)?;
                if stored_public != identity.public_key() {
                    return Err(CoreError::KeyLoad(
                        "stored public key does not match the private key".into(),
                    ));
                }
            }
            None => {
                tracing::warn!("public key file missing; rewriting it from the private key");
                let public_pem = identity.public_key_pem().map_err(key_load)?;
                store.store_public(&public_pem).map_err(key_load)?;
            }
        }

        tracing::debug!(
            fingerprint = %identity.fingerprint().unwrap_or_default(),
            "Loaded existing identity key pair"
        );
        return Ok(identity);
    }

    let identity = IdentityKeyPair::generate();
    let stored = StoredIdentity {
        private_pem: identity.to_pkcs8_pem().map_err(key_load)?,
        public_pem: Some(identity.public_key_pem().map_err(key_load)?),
    };
    store.store(&stored).map_err(key_load)?;

    tracing::info!(
        fingerprint = %identity.fingerprint().unwrap_or_default(),
        "Generated new identity key pair"
    );

    Ok(identity)
}

fn export_failed(path: &Path, e: impl std::fmt::Display) -> CoreError {
    CoreError::Store(StoreError::OperationFailed(format!(
        "export public key to {}: {e}",
        path.display()
    )))
}

/// Write the public key as SPKI PEM to `path`.
pub fn export_public_key(identity: &IdentityKeyPair, path: &Path) -> Result<(), CoreError> {
    let pem = identity
        .public_key_pem()
        .map_err(|e| CoreError::Crypto(e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| export_failed(path, e))?;
    }
    write_atomically(path, pem.as_bytes(), false).map_err(|e| export_failed(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_run_generates_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = FileIdentityStore::new(dir.path());
        assert!(!store.exists());

        let identity = load_or_create(&store).unwrap();
        assert!(store.exists());
        assert!(store.public_key_path().exists());

        let public_on_disk = fs::read_to_string(store.public_key_path()).unwrap();
        assert_eq!(
            PeerPublicKey::from_pem(&public_on_disk).unwrap(),
            identity.public_key()
        );
    }

    #[test]
    fn test_load_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileIdentityStore::new(dir.path());

        let first = load_or_create(&store).unwrap();
        let second = load_or_create(&store).unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileIdentityStore::new(dir.path());
        load_or_create(&store).unwrap();

        let mode = fs::metadata(store.private_key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_private_key_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = FileIdentityStore::new(dir.path());
        fs::write(store.private_key_path(), "not a pem").unwrap();

        let err = load_or_create(&store).unwrap_err();
        assert!(matches!(err, CoreError::KeyLoad(_)));
        assert!(err.is_fatal());
        // No silent regeneration.
        assert_eq!(fs::read_to_string(store.private_key_path()).unwrap(), "not a pem");
    }

    #[test]
    fn test_mismatched_public_key_is_fatal() {
        let other = IdentityKeyPair::generate();
        let mine = IdentityKeyPair::generate();
        let store = MemoryIdentityStore::with_material(StoredIdentity {
            private_pem: mine.to_pkcs8_pem().unwrap(),
            public_pem: Some(other.public_key_pem().unwrap()),
        });

        assert!(matches!(load_or_create(&store), Err(CoreError::KeyLoad(_))));
    }

    #[test]
    fn test_missing_public_key_is_rewritten() {
        let dir = TempDir::new().unwrap();
        let store = FileIdentityStore::new(dir.path());
        let identity = load_or_create(&store).unwrap();
        fs::remove_file(store.public_key_path()).unwrap();

        let reloaded = load_or_create(&store).unwrap();
        assert_eq!(reloaded.public_key(), identity.public_key());
        assert!(store.public_key_path().exists());
    }

    #[test]
    fn test_public_key_repair_leaves_private_key_untouched() {
        let dir = TempDir::new().unwrap();
        let store = FileIdentityStore::new(dir.path());
        let identity = IdentityKeyPair::generate();
        let private_pem = identity.to_pkcs8_pem().unwrap();
        fs::write(store.private_key_path(), private_pem.as_bytes()).unwrap();
        let before = fs::metadata(store.private_key_path()).unwrap().modified().unwrap();

        let loaded = load_or_create(&store).unwrap();
        assert_eq!(loaded.public_key(), identity.public_key());

        assert_eq!(fs::read_to_string(store.private_key_path()).unwrap(), *private_pem);
        let after = fs::metadata(store.private_key_path()).unwrap().modified().unwrap();
        assert_eq!(before, after);
        assert!(!store.private_key_path().with_extension("tmp").exists());

        let public_pem = fs::read_to_string(store.public_key_path()).unwrap();
        assert_eq!(PeerPublicKey::from_pem(&public_pem).unwrap(), identity.public_key());
    }

    #[test]
    fn test_memory_store_public_repair_keeps_private_pem() {
        let identity = IdentityKeyPair::generate();
        let private_pem = identity.to_pkcs8_pem().unwrap();
        let store = MemoryIdentityStore::with_material(StoredIdentity {
            private_pem: private_pem.clone(),
            public_pem: None,
        });

        load_or_create(&store).unwrap();
        let stored = store.load().unwrap().unwrap();
        assert_eq!(*stored.private_pem, *private_pem);
        assert!(stored.public_pem.is_some());
    }

    #[test]
    fn test_export_failure_is_not_an_identity_error() {
        let dir = TempDir::new().unwrap();
        let identity = IdentityKeyPair::generate();
        // A regular file where the parent directory should be.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let err = export_public_key(&identity, &blocker.join("me.pem")).unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::OperationFailed(_))));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_export_public_key() {
        let dir = TempDir::new().unwrap();
        let identity = IdentityKeyPair::generate();
        let path = dir.path().join("export").join("me.pem");

        export_public_key(&identity, &path).unwrap();
        let pem = fs::read_to_string(&path).unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_eq!(PeerPublicKey::from_pem(&pem).unwrap(), identity.public_key());
    }
}
