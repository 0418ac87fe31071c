//! WebSocket side of a session
//!
//! Splits the socket into a writer task fed by the session's outbound queue
//! and an inbound text stream consumed by the session.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::future;
use futures::stream::{BoxStream, Stream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sb_protocol::ProtocolError;

use crate::session::{Registration, Session};
use crate::state::RelayState;

/// How long queued frames may take to flush after the session ended
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one session on an upgraded socket.
///
/// The session stays registered until this returns.
pub async fn serve_socket(
    socket: WebSocket,
    registration: Registration,
    state: Arc<RelayState>,
    cancel: CancellationToken,
) {
    let handle = Arc::clone(registration.handle());
    let id = handle.id;
    match handle.peer {
        Some(addr) => tracing::info!("{} connected from {}", id, addr),
        None => tracing::info!("{} connected", id),
    }

    let (mut sink, stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(state.config.outbound_buffer.max(1));

    // Drains everything the session queued, then closes the socket
    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let session = Session::new(
        Arc::clone(&handle),
        Arc::clone(&state.config),
        Arc::clone(&state.connector),
        outbound_tx,
    );
    session.run(inbound_text(stream), cancel).await;

    if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        tracing::debug!("{}: outbound frames not flushed in time", id);
        writer.abort();
    }

    drop(registration);
    tracing::info!("{} disconnected", id);
}

/// Text payloads of `stream` up to the first close frame or read error.
///
/// Binary messages are read as UTF-8 text.
fn inbound_text<S>(stream: S) -> BoxStream<'static, Result<String, ProtocolError>>
where
    S: Stream<Item = Result<Message, axum::Error>> + Send + 'static,
{
    stream
        .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    Some(String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8))
                }
                _ => None,
            })
        })
        .boxed()
}
