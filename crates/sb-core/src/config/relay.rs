//! Relay daemon configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::option_duration_secs;

/// Configuration for the relay daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address to bind the WebSocket listener to
    pub bind_address: String,

    /// HTTP path that accepts WebSocket upgrades
    pub ws_path: String,

    /// Upper bound on the SSH handshake (connect + authenticate).
    ///
    /// Unset or 0 waits indefinitely.
    #[serde(with = "option_duration_secs")]
    pub connect_timeout: Option<Duration>,

    /// Capacity of each session's outbound frame queue
    pub outbound_buffer: usize,

    /// Maximum number of concurrent sessions
    pub max_sessions: Option<u32>,

    /// Pseudo-terminal settings requested for the remote shell
    pub terminal: TerminalConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            ws_path: "/".to_string(),
            connect_timeout: None,
            outbound_buffer: 256,
            max_sessions: None,
            terminal: TerminalConfig::default(),
        }
    }
}

/// Pseudo-terminal request parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Value for the remote `TERM`
    pub term: String,
    /// Initial width in columns
    pub cols: u32,
    /// Initial height in rows
    pub rows: u32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
        }
    }
}
