//! Assembles an [`EndToEndContext`] from the resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use shroud_core::directory::DirectoryError;
use shroud_core::http_directory::HttpDirectory;
use shroud_core::keys::{load_or_create, FileIdentityStore, PUBLIC_KEY_FILE};
use shroud_core::sqlite_store::SqliteStore;
use shroud_core::store::StoreError;
use shroud_core::{CoreError, EndToEndContext, PeerId, SessionKeys};
use shroud_crypto::identity::IdentityKeyPair;

use crate::config::Config;
use crate::ExitCode;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("own id is not configured (set [identity].own_id, SHROUD_OWN_ID or --own-id)")]
    MissingOwnId,

    #[error("failed to prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("directory client: {0}")]
    Directory(#[from] DirectoryError),

    #[error("session store: {0}")]
    Store(#[from] StoreError),
}

impl NodeError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            NodeError::MissingOwnId => ExitCode::InvalidInput,
            NodeError::DataDir { .. } | NodeError::Store(_) => ExitCode::GeneralError,
            NodeError::Core(e) => ExitCode::from_core_error(e),
            NodeError::Directory(_) => ExitCode::DirectoryUnavailable,
        }
    }
}

/// Display view of the local identity.
#[derive(Debug, Clone)]
pub struct IdentityInfo {
    pub own_id: Option<PeerId>,
    pub fingerprint: String,
    pub algorithm: &'static str,
    pub public_key_path: PathBuf,
}

fn prepare_data_dir(config: &Config) -> Result<PathBuf, NodeError> {
    let path = config.data_dir();
    std::fs::create_dir_all(&path).map_err(|source| NodeError::DataDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Load the identity from the data directory, creating one on first run.
pub fn load_identity(config: &Config) -> Result<IdentityKeyPair, NodeError> {
    let data_dir = prepare_data_dir(config)?;
    Ok(load_or_create(&FileIdentityStore::new(data_dir))?)
}

pub fn identity_info(config: &Config, identity: &IdentityKeyPair) -> Result<IdentityInfo, NodeError> {
    let fingerprint = identity
        .fingerprint()
        .map_err(|e| CoreError::Crypto(e.to_string()))?;
    Ok(IdentityInfo {
        own_id: config.own_id(),
        fingerprint,
        algorithm: "ECDH P-384",
        public_key_path: config.data_dir().join(PUBLIC_KEY_FILE),
    })
}

/// Build a full node: file identity, SQLite session cache, HTTP directory.
pub fn open(config: &Config) -> Result<EndToEndContext, NodeError> {
    let own_id = config.own_id().ok_or(NodeError::MissingOwnId)?;
    let identity = load_identity(config)?;

    let store = Arc::new(SqliteStore::new(config.sessions_db_path())?);
    let directory = Arc::new(HttpDirectory::new(config.http_directory())?);
    let sessions = SessionKeys::new(own_id, store, directory).with_kdf_mode(config.kdf_mode());

    tracing::debug!(
        own_id = %own_id,
        directory = %config.directory.url,
        data_dir = %config.data_dir().display(),
        "Opened node"
    );

    Ok(EndToEndContext::new(own_id, identity, sessions))
}
