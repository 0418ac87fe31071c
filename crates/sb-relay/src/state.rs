//! Global relay state

use std::net::SocketAddr;
use std::sync::Arc;

use sb_core::config::RelayConfig;

use crate::remote::RemoteConnector;
use crate::session::{Registration, SessionManager, SessionState};

/// State shared by the listener and every session
pub struct RelayState {
    /// Configuration
    pub config: Arc<RelayConfig>,
    /// Live sessions
    pub sessions: Arc<SessionManager>,
    /// Opens remote SSH connections
    pub connector: Arc<dyn RemoteConnector>,
}

impl RelayState {
    /// Create relay state
    pub fn new(config: RelayConfig, connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionManager::new()),
            connector,
        }
    }

    /// Get the session manager
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Reserve a session slot for `peer`; `None` once `max_sessions` are live
    pub fn reserve_session(&self, peer: Option<SocketAddr>) -> Option<Registration> {
        let limit = self.config.max_sessions.map(|max| max as usize);
        self.sessions.try_register(peer, limit)
    }

    /// Plain-text health summary: total live sessions and a count per state
    pub fn health_summary(&self) -> String {
        let mut summary = format!("ok sessions={}", self.sessions.len());
        for state in SessionState::ALL {
            summary.push_str(&format!(" {}={}", state, self.sessions.count_in(state)));
        }
        summary
    }
}
