//! Per-connection session multiplexer
//!
//! A [`Session`] owns one browser transport and at most one remote SSH
//! connection. Inbound frames and remote events are handled on a single task
//! in arrival order; all session state lives in that task.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sb_core::config::RelayConfig;
use sb_protocol::{Channel, Frame, ProtocolError, SftpMessage, ShellMessage};

use super::manager::{SessionHandle, SessionState};
use crate::error::RemoteError;
use crate::remote::{
    sftp, shell, ConnectParams, EpochEvent, EventSender, FileRequest, FileTransferHandle,
    RemoteConnection, RemoteConnector, RemoteEvent, ShellHandle, ShellInput,
    REMOTE_EVENT_CHANNEL_CAPACITY,
};

/// Status sent once the SSH handshake succeeded
pub const STATUS_CONNECTED: &str = "SSH Connected";

/// Status sent when the remote shell went away
pub const STATUS_SHELL_CLOSED: &str = "SSH Session closed.";

/// Error for shell input without an open shell
pub const SHELL_NOT_READY: &str = "Shell not ready.";

/// Error for a second connect on the same session
pub const ALREADY_CONNECTED: &str = "Already connected.";

/// Reason given to file requests cut off by a released remote
const SFTP_CONNECTION_CLOSED: &str = "connection closed";

/// One browser session
pub struct Session {
    handle: Arc<SessionHandle>,
    config: Arc<RelayConfig>,
    connector: Arc<dyn RemoteConnector>,
    outbound: mpsc::Sender<String>,
    state: SessionState,
    /// Bumped whenever the remote is released; older events are stale
    epoch: u64,
    events_tx: mpsc::Sender<EpochEvent>,
    events_rx: mpsc::Receiver<EpochEvent>,
    connect_task: Option<JoinHandle<()>>,
    remote: Option<Arc<dyn RemoteConnection>>,
    shell: Option<ShellHandle>,
    sftp: Option<FileTransferHandle>,
    /// `requestId`s of queued file requests, oldest first
    sftp_pending: VecDeque<Option<String>>,
}

impl Session {
    /// Create a session writing encoded frames to `outbound`
    pub fn new(
        handle: Arc<SessionHandle>,
        config: Arc<RelayConfig>,
        connector: Arc<dyn RemoteConnector>,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(REMOTE_EVENT_CHANNEL_CAPACITY);
        Self {
            handle,
            config,
            connector,
            outbound,
            state: SessionState::Idle,
            epoch: 0,
            events_tx,
            events_rx,
            connect_task: None,
            remote: None,
            shell: None,
            sftp: None,
            sftp_pending: VecDeque::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until the transport closes, `cancel` fires or the
    /// session reaches `Closed`.
    ///
    /// `inbound` yields transport messages, or the error for a message that
    /// could not be read as text. Every remote resource is released before
    /// this returns.
    pub async fn run<S>(mut self, mut inbound: S, cancel: CancellationToken)
    where
        S: Stream<Item = Result<String, ProtocolError>> + Unpin + Send,
    {
        let id = self.handle.id;
        tracing::info!("{} started", id);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("{} cancelled", id);
                    break;
                }

                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await;
                }

                text = inbound.next() => match text {
                    Some(Ok(text)) => self.handle_text(&text).await,
                    Some(Err(err)) => self.handle_decode_error(err).await,
                    None => {
                        tracing::debug!("{} transport closed", id);
                        break;
                    }
                }
            }

            if self.state == SessionState::Closed {
                break;
            }
        }

        self.teardown().await;
        tracing::info!("{} closed", id);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!("{}: {} -> {}", self.handle.id, self.state, state);
            self.state = state;
            self.handle.set_state(state);
        }
    }

    fn event_sender(&self) -> EventSender {
        EventSender::new(self.epoch, self.events_tx.clone())
    }

    async fn send(&self, frame: Frame) {
        let text = match sb_protocol::encode(&frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("{}: failed to encode {} frame: {}", self.handle.id, frame.type_name(), e);
                return;
            }
        };
        if self.outbound.send(text).await.is_err() {
            tracing::debug!("{}: transport gone, dropping {} frame", self.handle.id, frame.type_name());
        }
    }

    async fn handle_text(&mut self, text: &str) {
        match sb_protocol::decode(text) {
            Ok(frame) => self.handle_frame(frame).await,
            Err(err) => self.handle_decode_error(err).await,
        }
    }

    async fn handle_decode_error(&mut self, err: ProtocolError) {
        tracing::debug!("{}: rejected frame: {}", self.handle.id, err);

        let frame = match err.channel() {
            Some(Channel::Sftp) if !self.file_transfer_ready() => {
                Frame::sftp_error(RemoteError::NotInitialized.to_string(), None)
            }
            channel => Frame::error_on(channel, err.to_string()),
        };
        self.send(frame).await;
    }

    async fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Shell(message) => self.handle_shell(message).await,
            Frame::Sftp(message) => self.handle_sftp(message).await,
            // Inbound top-level frames carry no channel to route by
            Frame::Error { .. } => {
                self.send(Frame::protocol_error(ProtocolError::MissingChannel.to_string()))
                    .await
            }
        }
    }

    async fn handle_shell(&mut self, message: ShellMessage) {
        match message {
            ShellMessage::Connect {
                host,
                port,
                username,
                private_key,
                passphrase,
            } => {
                if self.state != SessionState::Idle {
                    self.send(Frame::shell_error(ALREADY_CONNECTED)).await;
                    return;
                }
                match ConnectParams::new(host, port, username, private_key, passphrase) {
                    Ok(params) => self.start_connect(params),
                    Err(e) => self.send(Frame::shell_error(e.to_string())).await,
                }
            }

            ShellMessage::Input { data } => self.send_to_shell(ShellInput::Data(data)).await,

            ShellMessage::Resize { cols, rows } => {
                self.send_to_shell(ShellInput::Resize { cols, rows }).await
            }

            other => {
                let kind = other.message_type().as_str();
                self.send(Frame::shell_error(unsupported(Channel::Shell, kind)))
                    .await
            }
        }
    }

    async fn send_to_shell(&mut self, input: ShellInput) {
        let delivered = self.shell.as_ref().is_some_and(|shell| shell.send(input));
        if !delivered {
            self.send(Frame::shell_error(SHELL_NOT_READY)).await;
        }
    }

    fn file_transfer_ready(&self) -> bool {
        self.sftp.as_ref().is_some_and(|sftp| sftp.is_ready())
    }

    async fn handle_sftp(&mut self, message: SftpMessage) {
        let request_id = message.request_id().map(str::to_string);

        if !self.file_transfer_ready() {
            self.send(Frame::sftp_error(
                RemoteError::NotInitialized.to_string(),
                request_id,
            ))
            .await;
            return;
        }

        match FileRequest::from_message(message) {
            Ok(request) => {
                let queued = self.sftp.as_ref().is_some_and(|sftp| sftp.send(request));
                if queued {
                    self.sftp_pending.push_back(request_id);
                } else {
                    self.send(Frame::sftp_error(
                        RemoteError::NotInitialized.to_string(),
                        request_id,
                    ))
                    .await;
                }
            }
            Err(other) => {
                let kind = other.message_type().as_str();
                self.send(Frame::sftp_error(unsupported(Channel::Sftp, kind), request_id))
                    .await;
            }
        }
    }

    fn start_connect(&mut self, params: ConnectParams) {
        tracing::info!("{}: connecting to {}", self.handle.id, params.target());
        self.set_state(SessionState::Connecting);

        let events = self.event_sender();
        let connector = Arc::clone(&self.connector);
        let timeout = self.config.connect_timeout;

        self.connect_task = Some(tokio::spawn(async move {
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, connector.connect(params))
                    .await
                    .unwrap_or(Err(RemoteError::Timeout(limit))),
                None => connector.connect(params).await,
            };

            let event = match result {
                Ok(conn) => RemoteEvent::Connected(conn),
                Err(e) => RemoteEvent::ConnectFailed(e),
            };
            events.send(event).await;
        }));
    }

    async fn handle_event(&mut self, EpochEvent { epoch, event }: EpochEvent) {
        if epoch != self.epoch {
            tracing::trace!("{}: dropping stale {:?}", self.handle.id, event);
            if let RemoteEvent::Connected(conn) = event {
                conn.disconnect().await;
            }
            return;
        }

        match event {
            RemoteEvent::Connected(conn) => {
                self.connect_task = None;
                self.remote = Some(Arc::clone(&conn));
                self.set_state(SessionState::Ready);
                self.send(Frame::shell_status(STATUS_CONNECTED)).await;

                self.shell = Some(shell::spawn(
                    Arc::clone(&conn),
                    self.config.terminal.clone(),
                    self.event_sender(),
                ));
                self.sftp = Some(sftp::spawn(conn, self.event_sender()));
            }

            RemoteEvent::ConnectFailed(err) => {
                tracing::warn!("{}: connection failed: {}", self.handle.id, err);
                self.connect_task = None;
                self.send(Frame::shell_error(err.to_string())).await;
                self.set_state(SessionState::Closed);
            }

            RemoteEvent::ShellOpened(input) => {
                if let Some(shell) = self.shell.as_mut() {
                    shell.attach(input);
                    self.handle.set_shell_open(true);
                }
            }

            RemoteEvent::ShellOpenFailed(err) => {
                self.shell = None;
                self.handle.set_shell_open(false);
                self.send(Frame::shell_error(err.to_string())).await;
            }

            RemoteEvent::ShellData(data) => self.send(Frame::shell_data(data)).await,

            RemoteEvent::ShellWriteFailed(err) => {
                self.send(Frame::shell_error(err.to_string())).await
            }

            RemoteEvent::ShellClosed => {
                self.send(Frame::shell_status(STATUS_SHELL_CLOSED)).await;
                // The shell's end is the end of the remote connection
                self.release_remote().await;
                self.set_state(SessionState::Idle);
            }

            RemoteEvent::FileTransferOpened(requests) => {
                if let Some(sftp) = self.sftp.as_mut() {
                    sftp.attach(requests);
                    self.handle.set_file_transfer_open(true);
                }
            }

            RemoteEvent::FileTransferOpenFailed(err) => {
                self.sftp = None;
                self.handle.set_file_transfer_open(false);
                self.send(Frame::sftp_error(err.to_string(), None)).await;
            }

            RemoteEvent::FileTransferReply(message) => {
                self.sftp_pending.pop_front();
                self.send(Frame::Sftp(message)).await
            }
        }
    }

    /// Stop all remote work and close the SSH connection
    async fn release_remote(&mut self) {
        self.epoch += 1;
        self.handle.set_shell_open(false);
        self.handle.set_file_transfer_open(false);

        if let Some(task) = self.connect_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(shell) = self.shell.take() {
            shell.shutdown().await;
        }
        if let Some(sftp) = self.sftp.take() {
            sftp.shutdown().await;
        }
        if let Some(remote) = self.remote.take() {
            remote.disconnect().await;
        }

        // Requests still queued or in flight when the worker stopped
        let message = RemoteError::file_transfer(SFTP_CONNECTION_CLOSED).to_string();
        while let Some(request_id) = self.sftp_pending.pop_front() {
            self.send(Frame::sftp_error(message.clone(), request_id)).await;
        }
    }

    async fn teardown(&mut self) {
        self.release_remote().await;

        // A handshake may have completed after the last event was handled
        while let Ok(EpochEvent { event, .. }) = self.events_rx.try_recv() {
            if let RemoteEvent::Connected(conn) = event {
                conn.disconnect().await;
            }
        }

        self.set_state(SessionState::Closed);
    }
}

fn unsupported(channel: Channel, kind: &str) -> String {
    ProtocolError::UnknownType {
        channel,
        kind: kind.to_string(),
    }
    .to_string()
}
