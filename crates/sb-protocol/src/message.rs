//! Message types for the ssh-bridge protocol
//!
//! Every frame travels as one JSON text message on the transport. A frame
//! names a `channel` (which sub-channel handles it) and a `type` (the
//! operation or event, scoped to that channel). The remaining fields depend on
//! the type.
//!
//! # Message Flow
//!
//! Typical message sequence for a session:
//!
//! 1. Browser sends `shell/connect` with host, username and private key
//! 2. Server answers `shell/status` once the SSH handshake succeeds
//! 3. Shell output arrives as `shell/data`, keystrokes go back as `shell/input`
//! 4. File operations (`sftp/list-directory`, `sftp/download-file`,
//!    `sftp/upload-file`) are answered one by one in request order
//! 5. When the remote shell exits the server sends a final `shell/status`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default SSH port used when a connect frame omits `port`.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Sub-channel a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Interactive shell control and terminal data
    #[serde(alias = "ssh")]
    Shell,
    /// File transfer operations
    Sftp,
}

impl Channel {
    /// Wire name of the channel
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Shell => "shell",
            Channel::Sftp => "sftp",
        }
    }

    /// Parse a wire channel name.
    ///
    /// `ssh` is accepted as a legacy spelling of `shell`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "shell" | "ssh" => Some(Channel::Shell),
            "sftp" => Some(Channel::Sftp),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message type identifier on the shell channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellMessageType {
    /// Open the SSH connection (browser → server)
    Connect,
    /// Keystrokes for the remote shell (browser → server)
    Input,
    /// Terminal window size change (browser → server)
    Resize,
    /// Lifecycle notification (server → browser)
    Status,
    /// Failure report (server → browser)
    Error,
    /// Shell output (server → browser)
    Data,
}

impl ShellMessageType {
    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Input => "input",
            Self::Resize => "resize",
            Self::Status => "status",
            Self::Error => "error",
            Self::Data => "data",
        }
    }

    /// Parse a wire type name
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "connect" => Some(Self::Connect),
            "input" => Some(Self::Input),
            "resize" => Some(Self::Resize),
            "status" => Some(Self::Status),
            "error" => Some(Self::Error),
            "data" => Some(Self::Data),
            _ => None,
        }
    }
}

/// Message type identifier on the sftp channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SftpMessageType {
    ListDirectory,
    DirectoryListing,
    DownloadFile,
    FileContent,
    UploadFile,
    UploadSuccess,
    Error,
}

impl SftpMessageType {
    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListDirectory => "list-directory",
            Self::DirectoryListing => "directory-listing",
            Self::DownloadFile => "download-file",
            Self::FileContent => "file-content",
            Self::UploadFile => "upload-file",
            Self::UploadSuccess => "upload-success",
            Self::Error => "error",
        }
    }

    /// Parse a wire type name
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "list-directory" => Some(Self::ListDirectory),
            "directory-listing" => Some(Self::DirectoryListing),
            "download-file" => Some(Self::DownloadFile),
            "file-content" => Some(Self::FileContent),
            "upload-file" => Some(Self::UploadFile),
            "upload-success" => Some(Self::UploadSuccess),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Messages on the shell channel
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ShellMessage {
    /// Connect to a remote host.
    ///
    /// Missing fields deserialize as empty strings so the server can answer
    /// with a precise validation error instead of a generic parse failure.
    Connect {
        #[serde(default)]
        host: String,
        /// Remote port, 22 when absent or zero
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default)]
        username: String,
        /// Private key in OpenSSH or PEM text form
        #[serde(default, rename = "privateKey")]
        private_key: String,
        /// Passphrase for an encrypted private key
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },

    /// Raw input for the shell
    Input { data: String },

    /// Terminal resize
    Resize { cols: u32, rows: u32 },

    /// Lifecycle notification
    Status { message: String },

    /// Failure report
    Error { message: String },

    /// Raw shell output, UTF-8 decoded
    Data { data: String },
}

impl ShellMessage {
    /// Get the message type for this message
    pub fn message_type(&self) -> ShellMessageType {
        match self {
            ShellMessage::Connect { .. } => ShellMessageType::Connect,
            ShellMessage::Input { .. } => ShellMessageType::Input,
            ShellMessage::Resize { .. } => ShellMessageType::Resize,
            ShellMessage::Status { .. } => ShellMessageType::Status,
            ShellMessage::Error { .. } => ShellMessageType::Error,
            ShellMessage::Data { .. } => ShellMessageType::Data,
        }
    }
}

// Connect carries key material, keep it out of logs.
impl fmt::Debug for ShellMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellMessage::Connect {
                host,
                port,
                username,
                ..
            } => f
                .debug_struct("Connect")
                .field("host", host)
                .field("port", port)
                .field("username", username)
                .finish_non_exhaustive(),
            ShellMessage::Input { data } => f.debug_struct("Input").field("len", &data.len()).finish(),
            ShellMessage::Resize { cols, rows } => f
                .debug_struct("Resize")
                .field("cols", cols)
                .field("rows", rows)
                .finish(),
            ShellMessage::Status { message } => {
                f.debug_struct("Status").field("message", message).finish()
            }
            ShellMessage::Error { message } => {
                f.debug_struct("Error").field("message", message).finish()
            }
            ShellMessage::Data { data } => f.debug_struct("Data").field("len", &data.len()).finish(),
        }
    }
}

/// Messages on the sftp channel.
///
/// Requests may carry a `requestId` which the server copies onto the
/// matching response or error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SftpMessage {
    ListDirectory {
        path: String,
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    DirectoryListing {
        path: String,
        entries: Vec<DirectoryEntry>,
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    DownloadFile {
        path: String,
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// File contents, base64 encoded
    FileContent {
        path: String,
        content: String,
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// Upload request, `content` is base64 encoded
    UploadFile {
        path: String,
        content: String,
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    UploadSuccess {
        path: String,
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    Error {
        message: String,
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl SftpMessage {
    /// Get the message type for this message
    pub fn message_type(&self) -> SftpMessageType {
        match self {
            SftpMessage::ListDirectory { .. } => SftpMessageType::ListDirectory,
            SftpMessage::DirectoryListing { .. } => SftpMessageType::DirectoryListing,
            SftpMessage::DownloadFile { .. } => SftpMessageType::DownloadFile,
            SftpMessage::FileContent { .. } => SftpMessageType::FileContent,
            SftpMessage::UploadFile { .. } => SftpMessageType::UploadFile,
            SftpMessage::UploadSuccess { .. } => SftpMessageType::UploadSuccess,
            SftpMessage::Error { .. } => SftpMessageType::Error,
        }
    }

    /// Correlation id supplied by the requester, if any
    pub fn request_id(&self) -> Option<&str> {
        match self {
            SftpMessage::ListDirectory { request_id, .. }
            | SftpMessage::DirectoryListing { request_id, .. }
            | SftpMessage::DownloadFile { request_id, .. }
            | SftpMessage::FileContent { request_id, .. }
            | SftpMessage::UploadFile { request_id, .. }
            | SftpMessage::UploadSuccess { request_id, .. }
            | SftpMessage::Error { request_id, .. } => request_id.as_deref(),
        }
    }
}

/// Kind of a remote directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// File name without the directory part
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// POSIX mode bits as reported by the remote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,
    /// Modification time in seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<u32>,
}

impl DirectoryEntry {
    /// Create an entry with no attributes
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            size: None,
            permissions: None,
            modified: None,
        }
    }
}
