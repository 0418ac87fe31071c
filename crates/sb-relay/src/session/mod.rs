//! Browser sessions

mod manager;
mod multiplexer;

pub use manager::{Registration, SessionHandle, SessionManager, SessionState};
pub use multiplexer::{
    Session, ALREADY_CONNECTED, SHELL_NOT_READY, STATUS_CONNECTED, STATUS_SHELL_CLOSED,
};
