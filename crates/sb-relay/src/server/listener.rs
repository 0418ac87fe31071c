//! HTTP listener
//!
//! Serves WebSocket upgrades on the configured path and a plain-text health
//! endpoint. Each upgraded socket is handed to its own session task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::transport::serve_socket;
use crate::state::RelayState;

/// How long shutdown waits for sessions to release their remotes
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Request-handler context
#[derive(Clone)]
struct AppContext {
    state: Arc<RelayState>,
    cancel: CancellationToken,
}

/// WebSocket relay server
pub struct RelayServer {
    /// Shared relay state
    state: Arc<RelayState>,
    /// Cancellation token for graceful shutdown
    cancel: CancellationToken,
}

impl RelayServer {
    /// Create a new relay server
    pub fn new(state: Arc<RelayState>, cancel: CancellationToken) -> Self {
        Self { state, cancel }
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.state.config.ws_path, get(websocket_handler))
            .route("/health", get(health_handler))
            .with_state(AppContext {
                state: Arc::clone(&self.state),
                cancel: self.cancel.clone(),
            })
    }

    /// Bind `bind_addr` and serve until cancelled
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let ws_path = &self.state.config.ws_path;
        anyhow::ensure!(
            ws_path.starts_with('/'),
            "WebSocket path must start with '/': {:?}",
            ws_path
        );

        let local_addr = listener.local_addr()?;
        tracing::info!("Relay listening on ws://{}{}", local_addr, ws_path);

        let cancel = self.cancel.clone();
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Relay server failed")?;

        tracing::info!("Relay server shutting down");
        self.drain_sessions().await;
        Ok(())
    }

    /// Wait for live sessions to finish their teardown
    async fn drain_sessions(&self) {
        let sessions = self.state.session_manager();
        let deadline = tokio::time::Instant::now() + SESSION_DRAIN_TIMEOUT;

        while !sessions.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("{} sessions still open at shutdown", sessions.len());
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

async fn websocket_handler(
    State(ctx): State<AppContext>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    ws: WebSocketUpgrade,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);

    // The slot is held from here; an upgrade that never completes drops it
    let Some(registration) = ctx.state.reserve_session(peer) else {
        tracing::warn!("Rejecting connection from {:?}: session limit reached", peer);
        return (StatusCode::SERVICE_UNAVAILABLE, "Session limit reached").into_response();
    };

    let cancel = ctx.cancel.child_token();
    ws.on_upgrade(move |socket| serve_socket(socket, registration, ctx.state, cancel))
}

async fn health_handler(State(ctx): State<AppContext>) -> String {
    ctx.state.health_summary()
}
