//! russh-backed remote connection
//!
//! One [`SshConnection`] wraps an authenticated client handle. The shell is a
//! PTY session channel; the file transfer stream is the `sftp` subsystem on a
//! second session channel, driven by russh-sftp.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileType;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use sb_core::config::TerminalConfig;
use sb_protocol::{DirectoryEntry, EntryKind};

use super::{ConnectParams, FileTransfer, RemoteConnection, RemoteConnector, ShellIo};
use crate::error::RemoteError;

/// Interval between SSH keepalive requests
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Opens SSH connections with public key authentication
pub struct SshConnector {
    config: Arc<Config>,
}

impl SshConnector {
    /// Create a connector with the default client configuration
    pub fn new() -> Self {
        let config = Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(
        &self,
        params: ConnectParams,
    ) -> Result<Arc<dyn RemoteConnection>, RemoteError> {
        let key = russh_keys::decode_secret_key(&params.private_key, params.passphrase.as_deref())
            .map_err(|e| RemoteError::InvalidKey(e.to_string()))?;

        let target = params.target();
        tracing::debug!("Connecting to {}", target);

        let handler = HostKeyLogger {
            target: target.clone(),
        };
        let mut handle = client::connect(
            Arc::clone(&self.config),
            (params.host.as_str(), params.port),
            handler,
        )
        .await
        .map_err(|e| RemoteError::Connect(e.to_string()))?;

        tracing::debug!("Authenticating as user '{}'", params.username);
        let authenticated = handle
            .authenticate_publickey(params.username.as_str(), Arc::new(key))
            .await
            .map_err(|e| RemoteError::Connect(e.to_string()))?;

        if !authenticated {
            return Err(RemoteError::AuthRejected);
        }

        tracing::info!("SSH connection established to {}", target);
        Ok(Arc::new(SshConnection {
            handle: Mutex::new(handle),
            target,
        }))
    }
}

/// Client handler that accepts and logs the server host key
struct HostKeyLogger {
    target: String,
}

#[async_trait]
impl client::Handler for HostKeyLogger {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // No known_hosts store; the key is trusted on every connect
        tracing::info!(
            "Host key for {}: {}",
            self.target,
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}

/// Authenticated SSH connection
pub struct SshConnection {
    handle: Mutex<Handle<HostKeyLogger>>,
    target: String,
}

impl SshConnection {
    async fn open_channel(&self) -> Result<Channel<Msg>, russh::Error> {
        self.handle.lock().await.channel_open_session().await
    }
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn open_shell(&self, terminal: &TerminalConfig) -> Result<Box<dyn ShellIo>, RemoteError> {
        let shell_error = |e: russh::Error| RemoteError::ShellOpen(e.to_string());

        let mut channel = self.open_channel().await.map_err(shell_error)?;
        channel
            .request_pty(true, &terminal.term, terminal.cols, terminal.rows, 0, 0, &[])
            .await
            .map_err(shell_error)?;
        channel.request_shell(true).await.map_err(shell_error)?;

        // Both requests want a reply; output may already be flowing
        let mut pending = VecDeque::new();
        let mut replies = 0;
        while replies < 2 {
            match channel.wait().await {
                Some(ChannelMsg::Success) => replies += 1,
                Some(ChannelMsg::Failure) => {
                    return Err(RemoteError::ShellOpen(
                        "Server refused the shell request".to_string(),
                    ))
                }
                Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                    pending.push_back(Bytes::copy_from_slice(&data));
                }
                Some(ChannelMsg::Close) | None => {
                    return Err(RemoteError::ShellOpen(
                        "Channel closed before the shell started".to_string(),
                    ))
                }
                Some(other) => tracing::trace!("Ignoring {:?} while opening shell", other),
            }
        }

        tracing::debug!("Shell opened on {}", self.target);
        Ok(Box::new(SshShell { channel, pending }))
    }

    async fn open_file_transfer(&self) -> Result<Box<dyn FileTransfer>, RemoteError> {
        let mut channel = self.open_channel().await.map_err(RemoteError::file_transfer)?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(RemoteError::file_transfer)?;

        let session = SftpSession::new(channel.into_stream())
            .await
            .map_err(RemoteError::file_transfer)?;

        tracing::debug!("SFTP subsystem started on {}", self.target);
        Ok(Box::new(SshFileTransfer { session }))
    }

    async fn disconnect(&self) {
        let handle = self.handle.lock().await;
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("Disconnect from {} failed: {}", self.target, e);
        } else {
            tracing::info!("Disconnected from {}", self.target);
        }
    }
}

struct SshShell {
    channel: Channel<Msg>,
    pending: VecDeque<Bytes>,
}

#[async_trait]
impl ShellIo for SshShell {
    async fn next_output(&mut self) -> Option<Bytes> {
        if let Some(chunk) = self.pending.pop_front() {
            return Some(chunk);
        }

        loop {
            match self.channel.wait().await? {
                ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. } => {
                    return Some(Bytes::copy_from_slice(&data));
                }
                ChannelMsg::Close => return None,
                ChannelMsg::Eof => tracing::debug!("Shell sent EOF"),
                ChannelMsg::ExitStatus { exit_status } => {
                    tracing::debug!("Shell exited with status {}", exit_status);
                }
                other => tracing::trace!("Ignoring {:?} on shell channel", other),
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), RemoteError> {
        self.channel
            .data(data)
            .await
            .map_err(|e| RemoteError::ShellWrite(e.to_string()))
    }

    async fn resize(&mut self, cols: u32, rows: u32) -> Result<(), RemoteError> {
        self.channel
            .window_change(cols, rows, 0, 0)
            .await
            .map_err(|e| RemoteError::ShellWrite(e.to_string()))
    }
}

struct SshFileTransfer {
    session: SftpSession,
}

fn entry_kind(file_type: FileType) -> EntryKind {
    match file_type {
        FileType::Dir => EntryKind::Directory,
        FileType::File => EntryKind::File,
        FileType::Symlink => EntryKind::Symlink,
        FileType::Other => EntryKind::Other,
    }
}

#[async_trait]
impl FileTransfer for SshFileTransfer {
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, RemoteError> {
        let entries = self
            .session
            .read_dir(path)
            .await
            .map_err(RemoteError::file_transfer)?;

        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let metadata = entry.metadata();
                let mut listed = DirectoryEntry::new(entry.file_name(), entry_kind(entry.file_type()));
                listed.size = metadata.size;
                listed.permissions = metadata.permissions;
                listed.modified = metadata.mtime;
                listed
            })
            .collect())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let mut file = self
            .session
            .open(path)
            .await
            .map_err(RemoteError::file_transfer)?;

        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .await
            .map_err(RemoteError::file_transfer)?;
        Ok(content)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteError> {
        let mut file = self
            .session
            .create(path)
            .await
            .map_err(RemoteError::file_transfer)?;

        file.write_all(data)
            .await
            .map_err(RemoteError::file_transfer)?;
        file.shutdown().await.map_err(RemoteError::file_transfer)?;
        Ok(())
    }
}
