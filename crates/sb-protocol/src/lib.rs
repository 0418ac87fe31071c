//! sb-protocol: Wire protocol for ssh-bridge
//!
//! This crate defines the JSON frames exchanged between the browser terminal
//! and the relay over a single WebSocket connection. Each frame is tagged
//! with a channel (`shell` or `sftp`) and a message type.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;

pub use codec::{decode, encode};
pub use error::ProtocolError;
pub use frame::Frame;
pub use message::{
    Channel, DirectoryEntry, EntryKind, SftpMessage, SftpMessageType, ShellMessage,
    ShellMessageType, DEFAULT_SSH_PORT,
};
pub use session::SessionId;
