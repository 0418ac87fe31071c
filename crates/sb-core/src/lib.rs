//! sb-core: Core types and text utilities for ssh-bridge
//!
//! This crate provides configuration, the error taxonomy shared by the relay,
//! the line-coalescing buffer used to turn terminal output into log lines,
//! and the connection-profile store interface.

pub mod ansi;
pub mod config;
pub mod error;
pub mod lines;
pub mod profile;

pub use ansi::strip_ansi;
pub use error::{ConfigError, StoreError};
pub use lines::{append_terminal_data, LineBuffer};
pub use profile::{
    ConnectionProfile, FileProfileStore, KeyRecord, MemoryProfileStore, ProfileId, ProfileStore,
};
