//! Session registry

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use sb_protocol::SessionId;

/// Lifecycle of one browser session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// No remote connection
    Idle = 0,
    /// SSH handshake in progress
    Connecting = 1,
    /// Authenticated; shell and file transfer streams may be open
    Ready = 2,
    /// Terminal; the session is being torn down
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Connecting,
            2 => SessionState::Ready,
            _ => SessionState::Closed,
        }
    }

    /// Every state, in lifecycle order
    pub const ALL: [SessionState; 4] = [
        SessionState::Idle,
        SessionState::Connecting,
        SessionState::Ready,
        SessionState::Closed,
    ];

    /// Lowercase name for logs and the health endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared view of a running session
#[derive(Debug)]
pub struct SessionHandle {
    /// Session ID
    pub id: SessionId,
    /// Browser address
    pub peer: Option<SocketAddr>,
    state: AtomicU8,
    shell_open: AtomicBool,
    file_transfer_open: AtomicBool,
}

impl SessionHandle {
    pub fn new(id: SessionId, peer: Option<SocketAddr>) -> Self {
        Self {
            id,
            peer,
            state: AtomicU8::new(SessionState::Idle as u8),
            shell_open: AtomicBool::new(false),
            file_transfer_open: AtomicBool::new(false),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Publish a state change
    pub fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Whether the shell accepts input
    pub fn shell_open(&self) -> bool {
        self.shell_open.load(Ordering::Acquire)
    }

    /// Whether the file transfer stream accepts requests
    pub fn file_transfer_open(&self) -> bool {
        self.file_transfer_open.load(Ordering::Acquire)
    }

    pub(crate) fn set_shell_open(&self, open: bool) {
        self.shell_open.store(open, Ordering::Release);
    }

    pub(crate) fn set_file_transfer_open(&self, open: bool) {
        self.file_transfer_open.store(open, Ordering::Release);
    }
}

/// Tracks all live sessions of the relay
pub struct SessionManager {
    /// Sessions indexed by session ID
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    /// Next session ID to allocate
    next_session_id: AtomicU32,
    /// Registered sessions; updated before the map so limits are exact
    live: AtomicUsize,
}

impl SessionManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_session_id: AtomicU32::new(1),
            live: AtomicUsize::new(0),
        }
    }

    /// Allocate a new session ID
    pub fn allocate_id(&self) -> SessionId {
        SessionId::new(self.next_session_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Create and register a session for `peer`
    pub fn register(&self, peer: Option<SocketAddr>) -> Arc<SessionHandle> {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.insert(peer)
    }

    /// Register a session for `peer` unless `limit` sessions are live.
    ///
    /// The returned [`Registration`] unregisters the session when dropped.
    pub fn try_register(
        self: &Arc<Self>,
        peer: Option<SocketAddr>,
        limit: Option<usize>,
    ) -> Option<Registration> {
        let limit = limit.unwrap_or(usize::MAX);
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < limit).then_some(live + 1)
            })
            .ok()?;

        Some(Registration {
            handle: self.insert(peer),
            manager: Arc::clone(self),
        })
    }

    fn insert(&self, peer: Option<SocketAddr>) -> Arc<SessionHandle> {
        let handle = Arc::new(SessionHandle::new(self.allocate_id(), peer));
        self.sessions.insert(handle.id, Arc::clone(&handle));
        tracing::debug!("Registered {} ({} live)", handle.id, self.sessions.len());
        handle
    }

    /// Remove a session
    pub fn remove(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.remove(&id).map(|(_, handle)| handle);
        if removed.is_some() {
            self.live.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!("Unregistered {} ({} live)", id, self.sessions.len());
        }
        removed
    }

    /// List all sessions
    pub fn list(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Number of sessions in `state`
    pub fn count_in(&self, state: SessionState) -> usize {
        self.sessions.iter().filter(|r| r.state() == state).count()
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registered session slot, released on drop
pub struct Registration {
    handle: Arc<SessionHandle>,
    manager: Arc<SessionManager>,
}

impl Registration {
    /// The registered session
    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.manager.remove(self.handle.id);
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let manager = SessionManager::new();
        let a = manager.register(None);
        let b = manager.register(None);
        assert_ne!(a.id, b.id);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_remove() {
        let manager = SessionManager::new();
        let handle = manager.register(None);
        assert_eq!(manager.list()[0].id, handle.id);
        assert!(manager.remove(handle.id).is_some());
        assert!(manager.remove(handle.id).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_state_is_shared() {
        let manager = SessionManager::new();
        let handle = manager.register(None);
        assert_eq!(handle.state(), SessionState::Idle);

        handle.set_state(SessionState::Ready);
        assert_eq!(manager.list()[0].state(), SessionState::Ready);
        assert_eq!(manager.count_in(SessionState::Ready), 1);
        assert_eq!(manager.count_in(SessionState::Idle), 0);
    }

    #[test]
    fn test_try_register_respects_limit() {
        let manager = Arc::new(SessionManager::new());
        let first = manager.try_register(None, Some(2)).unwrap();
        let _second = manager.try_register(None, Some(2)).unwrap();
        assert!(manager.try_register(None, Some(2)).is_none());
        assert_eq!(manager.len(), 2);

        drop(first);
        assert_eq!(manager.len(), 1);
        assert!(manager.try_register(None, Some(2)).is_some());
        assert!(manager.try_register(None, None).is_some());
    }

    #[test]
    fn test_try_register_is_exact_under_contention() {
        let manager = Arc::new(SessionManager::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.try_register(None, Some(3)))
            })
            .collect();
        let granted: Vec<_> = threads
            .into_iter()
            .map(|thread| thread.join().unwrap())
            .collect();

        assert_eq!(granted.iter().filter(|slot| slot.is_some()).count(), 3);
        assert_eq!(manager.len(), 3);
        drop(granted);
        assert!(manager.is_empty());
    }
}
