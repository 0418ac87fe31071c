//! sb-relay: browser-to-SSH relay daemon
//!
//! The relay accepts WebSocket connections from browser terminals. Each
//! connection becomes one session that opens an SSH connection on request
//! and multiplexes an interactive shell and SFTP file operations over the
//! single transport.

pub mod error;
pub mod remote;
pub mod server;
pub mod session;
pub mod state;

pub use error::RemoteError;
pub use server::RelayServer;
pub use state::RelayState;
