//! File transfer worker
//!
//! Requests are executed one at a time in arrival order, so responses come
//! back in the order the requests were made.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::mpsc;

use sb_protocol::SftpMessage;

use super::stream::StreamHandle;
use super::{EventSender, FileTransfer, RemoteConnection, RemoteEvent};
use crate::error::RemoteError;

/// One queued file operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRequest {
    List {
        path: String,
        request_id: Option<String>,
    },
    Download {
        path: String,
        request_id: Option<String>,
    },
    Upload {
        path: String,
        /// Base64 content, decoded by the worker
        content: String,
        request_id: Option<String>,
    },
}

impl FileRequest {
    /// Build a request from an inbound sftp message, or hand the message back
    /// when it is not a request
    pub fn from_message(message: SftpMessage) -> Result<Self, SftpMessage> {
        match message {
            SftpMessage::ListDirectory { path, request_id } => {
                Ok(FileRequest::List { path, request_id })
            }
            SftpMessage::DownloadFile { path, request_id } => {
                Ok(FileRequest::Download { path, request_id })
            }
            SftpMessage::UploadFile {
                path,
                content,
                request_id,
            } => Ok(FileRequest::Upload {
                path,
                content,
                request_id,
            }),
            other => Err(other),
        }
    }

    fn path(&self) -> &str {
        match self {
            FileRequest::List { path, .. }
            | FileRequest::Download { path, .. }
            | FileRequest::Upload { path, .. } => path,
        }
    }
}

/// Handle to the file transfer worker
pub type FileTransferHandle = StreamHandle<FileRequest>;

/// Spawn the file transfer worker for `conn`
pub fn spawn(conn: Arc<dyn RemoteConnection>, events: EventSender) -> FileTransferHandle {
    StreamHandle::new(tokio::spawn(run_file_transfer(conn, events)))
}

async fn run_file_transfer(conn: Arc<dyn RemoteConnection>, events: EventSender) {
    let transfer = match conn.open_file_transfer().await {
        Ok(transfer) => transfer,
        Err(e) => {
            tracing::warn!("Failed to start SFTP: {}", e);
            events.send(RemoteEvent::FileTransferOpenFailed(e)).await;
            return;
        }
    };

    let (request_tx, mut request_rx) = mpsc::unbounded_channel();
    if !events.send(RemoteEvent::FileTransferOpened(request_tx)).await {
        return;
    }

    while let Some(request) = request_rx.recv().await {
        let reply = execute(transfer.as_ref(), request).await;
        if !events.send(RemoteEvent::FileTransferReply(reply)).await {
            break;
        }
    }
}

/// Run one request and build the response message
pub async fn execute(transfer: &dyn FileTransfer, request: FileRequest) -> SftpMessage {
    tracing::debug!("SFTP request for {}", request.path());

    match request {
        FileRequest::List { path, request_id } => match transfer.list_directory(&path).await {
            Ok(entries) => SftpMessage::DirectoryListing {
                path,
                entries,
                request_id,
            },
            Err(e) => error_reply(e, request_id),
        },

        FileRequest::Download { path, request_id } => match transfer.read_file(&path).await {
            Ok(content) => SftpMessage::FileContent {
                path,
                content: STANDARD.encode(content),
                request_id,
            },
            Err(e) => error_reply(e, request_id),
        },

        FileRequest::Upload {
            path,
            content,
            request_id,
        } => {
            let data = match STANDARD.decode(content.as_bytes()) {
                Ok(data) => data,
                Err(e) => {
                    let err = RemoteError::FileTransfer(format!("Invalid base64 content: {}", e));
                    return error_reply(err, request_id);
                }
            };
            match transfer.write_file(&path, &data).await {
                Ok(()) => SftpMessage::UploadSuccess { path, request_id },
                Err(e) => error_reply(e, request_id),
            }
        }
    }
}

fn error_reply(err: RemoteError, request_id: Option<String>) -> SftpMessage {
    tracing::debug!("SFTP request failed: {}", err);
    SftpMessage::Error {
        message: err.to_string(),
        request_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sb_protocol::{DirectoryEntry, EntryKind};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryTransfer {
        files: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl FileTransfer for MemoryTransfer {
        async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, RemoteError> {
            if path != "/" {
                return Err(RemoteError::file_transfer("No such file"));
            }
            let files = self.files.lock().unwrap();
            let mut names: Vec<_> = files.keys().cloned().collect();
            names.sort();
            Ok(names
                .into_iter()
                .map(|name| DirectoryEntry::new(name.trim_start_matches('/'), EntryKind::File))
                .collect())
        }

        async fn read_file(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| RemoteError::file_transfer("No such file"))
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteError> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let transfer = MemoryTransfer::default();
        let content = STANDARD.encode([0u8, 1, 2, 255]);

        let reply = execute(
            &transfer,
            FileRequest::Upload {
                path: "/a.bin".into(),
                content: content.clone(),
                request_id: Some("1".into()),
            },
        )
        .await;
        assert_eq!(
            reply,
            SftpMessage::UploadSuccess {
                path: "/a.bin".into(),
                request_id: Some("1".into())
            }
        );

        let reply = execute(
            &transfer,
            FileRequest::Download {
                path: "/a.bin".into(),
                request_id: None,
            },
        )
        .await;
        assert_eq!(
            reply,
            SftpMessage::FileContent {
                path: "/a.bin".into(),
                content,
                request_id: None
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_base64_is_rejected_without_write() {
        let transfer = MemoryTransfer::default();
        let reply = execute(
            &transfer,
            FileRequest::Upload {
                path: "/x".into(),
                content: "***".into(),
                request_id: Some("9".into()),
            },
        )
        .await;

        match reply {
            SftpMessage::Error {
                message,
                request_id,
            } => {
                assert!(message.starts_with("SFTP error: Invalid base64 content"));
                assert_eq!(request_id.as_deref(), Some("9"));
            }
            other => panic!("Expected error reply, got {:?}", other),
        }
        assert!(transfer.files.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_reports_reason() {
        let transfer = MemoryTransfer::default();
        let reply = execute(
            &transfer,
            FileRequest::Download {
                path: "/missing".into(),
                request_id: None,
            },
        )
        .await;
        assert_eq!(
            reply,
            SftpMessage::Error {
                message: "SFTP error: No such file".into(),
                request_id: None
            }
        );
    }

    #[test]
    fn test_from_message_rejects_responses() {
        let msg = SftpMessage::UploadSuccess {
            path: "/x".into(),
            request_id: None,
        };
        assert_eq!(FileRequest::from_message(msg.clone()), Err(msg));
    }
}
