//! WebSocket transport listener

mod listener;
mod transport;

pub use listener::RelayServer;
pub use transport::serve_socket;
