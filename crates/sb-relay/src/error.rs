//! Relay error types
//!
//! `Display` output is what the browser sees in the corresponding error
//! frame, so messages carry the remote's reason without extra decoration
//! except where the channel convention adds a prefix.

use std::time::Duration;
use thiserror::Error;

/// Failures of the remote SSH connection and its sub-channels
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Connect frame is missing a required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Private key could not be decoded
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// TCP connect or SSH handshake failed
    #[error("{0}")]
    Connect(String),

    /// The server rejected the key
    #[error("All configured authentication methods failed")]
    AuthRejected,

    /// Handshake exceeded the configured deadline
    #[error("Connection timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Shell channel could not be opened
    #[error("{0}")]
    ShellOpen(String),

    /// Write to the shell channel failed
    #[error("{0}")]
    ShellWrite(String),

    /// File transfer operation failed
    #[error("SFTP error: {0}")]
    FileTransfer(String),

    /// No file transfer stream
    #[error("SFTP not initialized")]
    NotInitialized,
}

impl RemoteError {
    /// Wrap any displayable error as a file transfer failure
    pub fn file_transfer(err: impl std::fmt::Display) -> Self {
        RemoteError::FileTransfer(err.to_string())
    }
}
