//! Shroud Core - the end-to-end encryption layer over an untrusted chat transport.
//!
//! This crate implements:
//! - Identity key persistence (load or create)
//! - Directory client for peer public keys
//! - Session key store with staleness checks against the directory
//! - `EndToEndContext` for encrypting, decrypting and group fan-out
//! - The transport collaborator interface

#![forbid(unsafe_code)]

// Orchestration
pub mod context;
pub mod fanout;
pub mod session_keys;

// Collaborators
pub mod directory;
pub mod transport;

// Infrastructure
pub mod store;
pub mod keys;

// Supporting modules
pub mod errors;
pub mod harness;

#[cfg(feature = "http-directory")]
pub mod http_directory;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use context::{EndToEndContext, Inbound, SendReport};
pub use errors::{CoreError, UnavailableReason};
pub use session_keys::{KdfMode, SessionKeys};
pub use shroud_crypto::PeerId;
