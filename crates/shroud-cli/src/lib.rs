//! Shroud CLI - command-line front end for the end-to-end layer
//!
//! This crate provides commands for:
//! - Showing, exporting and publishing the node identity
//! - Encrypting and decrypting chat messages by hand
//! - Inspecting and forgetting cached session keys

pub mod cli;
pub mod config;
pub mod node;
pub mod output;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

use shroud_core::{CoreError, UnavailableReason};

/// Exit codes for CLI operations
///
/// - 0: Success
/// - 1: General error
/// - 2: Key unavailable - the peer has no usable published key
/// - 3: Directory unavailable - the key directory could not be reached
/// - 4: Decrypt failed - the message could not be decrypted
/// - 5: Invalid input - bad arguments or data provided
/// - 6: Identity load failed - stored identity key is unreadable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    KeyUnavailable = 2,
    DirectoryUnavailable = 3,
    DecryptFailed = 4,
    InvalidInput = 5,
    IdentityLoadFailed = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::KeyUnavailable => "KEY_UNAVAILABLE",
            ExitCode::DirectoryUnavailable => "DIRECTORY_UNAVAILABLE",
            ExitCode::DecryptFailed => "DECRYPT_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::IdentityLoadFailed => "IDENTITY_LOAD_FAILED",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::KeyUnavailable => "Peer has no usable published key",
            ExitCode::DirectoryUnavailable => "Key directory could not be reached",
            ExitCode::DecryptFailed => "Message could not be decrypted",
            ExitCode::InvalidInput => "Invalid arguments or data provided",
            ExitCode::IdentityLoadFailed => "Stored identity key could not be loaded",
        }
    }

    /// Map an error from the end-to-end layer onto an exit code.
    pub fn from_core_error(error: &CoreError) -> Self {
        match error {
            CoreError::KeyLoad(_) => ExitCode::IdentityLoadFailed,
            CoreError::Unavailable {
                reason: UnavailableReason::NotPublished,
                ..
            } => ExitCode::KeyUnavailable,
            CoreError::Unavailable {
                reason: UnavailableReason::DirectoryUnavailable(_),
                ..
            } => ExitCode::DirectoryUnavailable,
            CoreError::DirectoryUnavailable(_) => ExitCode::DirectoryUnavailable,
            CoreError::Agreement { .. } => ExitCode::KeyUnavailable,
            CoreError::Decrypt { .. } => ExitCode::DecryptFailed,
            CoreError::Store(_) | CoreError::Transport(_) | CoreError::Crypto(_) => ExitCode::GeneralError,
        }
    }
}
