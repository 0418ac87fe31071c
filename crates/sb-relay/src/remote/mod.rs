//! Remote session adapter
//!
//! Owns one SSH connection and derives from it at most one interactive shell
//! and one SFTP stream. Native SSH events are translated into neutral
//! [`RemoteEvent`]s that the session multiplexer consumes on its single
//! event path.
//!
//! The traits below are the seam between the multiplexer and the SSH
//! library; [`ssh`] implements them on top of russh.

pub mod sftp;
pub mod shell;
pub mod ssh;
mod stream;

pub use shell::{ShellHandle, ShellInput};
pub use sftp::{FileRequest, FileTransferHandle};
pub use ssh::SshConnector;
pub use stream::StreamHandle;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use sb_core::config::TerminalConfig;
use sb_protocol::{DirectoryEntry, SftpMessage, DEFAULT_SSH_PORT};

use crate::error::RemoteError;

/// Capacity of a session's remote event queue.
///
/// Shell output is the bulk of the traffic; a full queue makes the shell pump
/// wait, which in turn leaves the data in the SSH channel window.
pub const REMOTE_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Parameters of one SSH connection attempt
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Private key in OpenSSH or PEM text form
    pub private_key: String,
    pub passphrase: Option<String>,
}

impl ConnectParams {
    /// Validate the fields of a connect frame.
    ///
    /// A missing or zero port falls back to 22.
    pub fn new(
        host: String,
        port: Option<u16>,
        username: String,
        private_key: String,
        passphrase: Option<String>,
    ) -> Result<Self, RemoteError> {
        if host.trim().is_empty() {
            return Err(RemoteError::MissingField("host"));
        }
        if username.trim().is_empty() {
            return Err(RemoteError::MissingField("username"));
        }
        if private_key.trim().is_empty() {
            return Err(RemoteError::MissingField("privateKey"));
        }

        Ok(Self {
            host,
            port: port.filter(|p| *p != 0).unwrap_or(DEFAULT_SSH_PORT),
            username,
            private_key,
            passphrase: passphrase.filter(|p| !p.is_empty()),
        })
    }

    /// `user@host:port` for logs
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Establishes SSH connections
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Connect and authenticate; resolves once the connection is ready
    async fn connect(&self, params: ConnectParams)
        -> Result<Arc<dyn RemoteConnection>, RemoteError>;
}

/// An authenticated SSH connection
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Request a PTY-backed interactive shell
    async fn open_shell(&self, terminal: &TerminalConfig) -> Result<Box<dyn ShellIo>, RemoteError>;

    /// Start the SFTP subsystem
    async fn open_file_transfer(&self) -> Result<Box<dyn FileTransfer>, RemoteError>;

    /// Close the connection and every channel opened on it
    async fn disconnect(&self);
}

/// Byte-level access to an open shell channel
#[async_trait]
pub trait ShellIo: Send {
    /// Next chunk of output (stdout and stderr interleaved), `None` once the
    /// channel has closed
    async fn next_output(&mut self) -> Option<Bytes>;

    /// Forward raw input to the shell
    async fn write(&mut self, data: &[u8]) -> Result<(), RemoteError>;

    /// Change the terminal window size
    async fn resize(&mut self, cols: u32, rows: u32) -> Result<(), RemoteError>;
}

/// Whole-file SFTP operations
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// List a directory, without `.` and `..`
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, RemoteError>;

    /// Read a whole file into memory
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RemoteError>;

    /// Create or truncate `path` and write `data` to it
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteError>;
}

/// Neutral events delivered to the multiplexer
pub enum RemoteEvent {
    /// Handshake and authentication succeeded
    Connected(Arc<dyn RemoteConnection>),
    /// Handshake or authentication failed
    ConnectFailed(RemoteError),
    /// Shell channel is open and accepts input
    ShellOpened(mpsc::UnboundedSender<ShellInput>),
    ShellOpenFailed(RemoteError),
    /// Shell output, UTF-8 decoded
    ShellData(String),
    ShellWriteFailed(RemoteError),
    /// Shell channel closed by the remote
    ShellClosed,
    /// SFTP stream is open and accepts requests
    FileTransferOpened(mpsc::UnboundedSender<FileRequest>),
    FileTransferOpenFailed(RemoteError),
    /// Response to one file request
    FileTransferReply(SftpMessage),
}

impl fmt::Debug for RemoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteEvent::Connected(_) => f.write_str("Connected"),
            RemoteEvent::ConnectFailed(e) => f.debug_tuple("ConnectFailed").field(e).finish(),
            RemoteEvent::ShellOpened(_) => f.write_str("ShellOpened"),
            RemoteEvent::ShellOpenFailed(e) => f.debug_tuple("ShellOpenFailed").field(e).finish(),
            RemoteEvent::ShellData(data) => write!(f, "ShellData({} bytes)", data.len()),
            RemoteEvent::ShellWriteFailed(e) => {
                f.debug_tuple("ShellWriteFailed").field(e).finish()
            }
            RemoteEvent::ShellClosed => f.write_str("ShellClosed"),
            RemoteEvent::FileTransferOpened(_) => f.write_str("FileTransferOpened"),
            RemoteEvent::FileTransferOpenFailed(e) => {
                f.debug_tuple("FileTransferOpenFailed").field(e).finish()
            }
            RemoteEvent::FileTransferReply(msg) => f
                .debug_tuple("FileTransferReply")
                .field(&msg.message_type())
                .finish(),
        }
    }
}

/// Event tagged with the connection epoch it belongs to.
///
/// The multiplexer bumps its epoch every time it releases a remote
/// connection, so events from tasks of an earlier connection are recognized
/// and dropped.
#[derive(Debug)]
pub struct EpochEvent {
    pub epoch: u64,
    pub event: RemoteEvent,
}

/// Sending side of the event queue, bound to one epoch
#[derive(Clone)]
pub struct EventSender {
    epoch: u64,
    tx: mpsc::Sender<EpochEvent>,
}

impl EventSender {
    pub fn new(epoch: u64, tx: mpsc::Sender<EpochEvent>) -> Self {
        Self { epoch, tx }
    }

    /// Deliver an event; returns false once the session is gone
    pub async fn send(&self, event: RemoteEvent) -> bool {
        self.tx
            .send(EpochEvent {
                epoch: self.epoch,
                event,
            })
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_params_default_port() {
        let params = ConnectParams::new(
            "example.org".into(),
            None,
            "root".into(),
            "key".into(),
            None,
        )
        .unwrap();
        assert_eq!(params.port, 22);

        let params = ConnectParams::new(
            "example.org".into(),
            Some(0),
            "root".into(),
            "key".into(),
            Some(String::new()),
        )
        .unwrap();
        assert_eq!(params.port, 22);
        assert_eq!(params.passphrase, None);
        assert_eq!(params.target(), "root@example.org:22");
    }

    #[test]
    fn test_connect_params_missing_fields() {
        let err = ConnectParams::new(String::new(), None, "u".into(), "k".into(), None)
            .unwrap_err();
        assert_eq!(err, RemoteError::MissingField("host"));

        let err = ConnectParams::new("h".into(), None, " ".into(), "k".into(), None).unwrap_err();
        assert_eq!(err, RemoteError::MissingField("username"));

        let err = ConnectParams::new("h".into(), None, "u".into(), String::new(), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: privateKey");
    }

    #[test]
    fn test_connect_params_debug_hides_key() {
        let params = ConnectParams::new(
            "h".into(),
            Some(2200),
            "u".into(),
            "SECRET".into(),
            Some("pass".into()),
        )
        .unwrap();
        let rendered = format!("{:?}", params);
        assert!(!rendered.contains("SECRET"));
        assert!(!rendered.contains("pass\""));
    }
}
