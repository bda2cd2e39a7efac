//! One chat session over one established connection.
//!
//! ```text
//! Establishing ──ok──▶ Active ──exit / peer gone──▶ Closing ──▶ Closed
//!       └──────────────error────────────────────────────────────▲
//! ```
//!
//! While `Active` two tasks share the [`Transport`]: the foreground loop in
//! [`Session::run`] handling local input, and the background [`Receiver`]
//! feeding inbound lines to an [`InboundDispatcher`].

use std::fmt;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use tether_net::{
    receive_file, EstablishError, InboundSink, Receiver, ReceiverExit, Transport,
    TransportError, TransportListener,
};
use tether_shared::constants::{CLOSE_NOTICE, FILE_MARKER_PREFIX};
use tether_shared::{ChatRecord, ControlLine, Identity};
use tether_store::Database;

use crate::commands::{self, Command, CommandContext};
use crate::config::ChatConfig;
use crate::events::{emit, EventSender, SessionEvent};

pub type SharedStore = Arc<Mutex<Database>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Establishing,
    Active,
    Closing,
    Closed,
}

#[derive(Debug)]
pub enum EstablishMode {
    /// Listen on `0.0.0.0:port` and wait for one peer.
    Listen { port: u16 },
    /// Accept on a listener the caller already bound.
    Bound(TransportListener),
    Dial { host: String, port: u16 },
}

/// Who ended the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    LocalExit,
    PeerClosed,
    PeerDisconnected,
    Failed(String),
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalExit => write!(f, "you left the chat"),
            Self::PeerClosed => write!(f, "the peer left the chat"),
            Self::PeerDisconnected => write!(f, "the peer disconnected"),
            Self::Failed(reason) => write!(f, "connection failed: {reason}"),
        }
    }
}

pub struct Session {
    pub(crate) transport: Arc<Transport>,
    pub(crate) local: Identity,
    pub(crate) peer: Identity,
    pub(crate) download_dir: PathBuf,
    pub(crate) store: SharedStore,
    pub(crate) events: EventSender,
    state: watch::Sender<SessionState>,
}

impl Session {
    /// Connect to (or accept) a peer and exchange names.
    ///
    /// On success the session is `Active` and the peer is saved to the store.
    pub async fn establish(
        mode: EstablishMode,
        local: Identity,
        config: &ChatConfig,
        store: SharedStore,
        events: EventSender,
    ) -> Result<Self, EstablishError> {
        let (state, _) = watch::channel(SessionState::Establishing);
        let establisher = config.establisher();

        let result = match mode {
            EstablishMode::Listen { port } => {
                emit(
                    &events,
                    SessionEvent::Info(format!(
                        "Waiting for a peer on port {port} ({}s timeout)...",
                        config.accept_timeout.as_secs()
                    )),
                );
                establisher
                    .accept_peer(&local, port, config.accept_timeout)
                    .await
            }
            EstablishMode::Bound(listener) => {
                establisher
                    .accept_peer_with(listener, &local, config.accept_timeout)
                    .await
            }
            EstablishMode::Dial { host, port } => {
                emit(
                    &events,
                    SessionEvent::Info(format!("Connecting to {host}:{port}...")),
                );
                establisher
                    .connect_to_peer(&local, &host, port, &config.retry_policy())
                    .await
            }
        };

        let (transport, peer) = match result {
            Ok(established) => established,
            Err(e) => {
                state.send_replace(SessionState::Closed);
                warn!(error = %e, "Session establishment failed");
                return Err(e);
            }
        };

        if let Err(e) = with_store(&store, |db| db.save_user(&peer)) {
            warn!(peer = %peer, error = %e, "Could not save peer");
        }

        state.send_replace(SessionState::Active);
        info!(local = %local, peer = %peer, "Session active");
        emit(
            &events,
            SessionEvent::Info(format!("Connected to {peer}")),
        );

        Ok(Self {
            transport: Arc::new(transport),
            local,
            peer,
            download_dir: config.download_dir.clone(),
            store,
            events,
            state,
        })
    }

    pub fn peer(&self) -> &Identity {
        &self.peer
    }

    pub fn local(&self) -> &Identity {
        &self.local
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Drive the session until either side ends it. Closing `input` counts as
    /// a local exit.
    pub async fn run(self, input: &mut mpsc::Receiver<String>) -> SessionOutcome {
        let receiver = Receiver::start(
            self.transport.clone(),
            InboundDispatcher {
                transport: self.transport.clone(),
                local: self.local.name().to_string(),
                peer: self.peer.name().to_string(),
                download_dir: self.download_dir.clone(),
                store: self.store.clone(),
                events: self.events.clone(),
            },
        );

        let stopped = receiver.stopped();
        tokio::pin!(stopped);

        let outcome = loop {
            tokio::select! {
                _ = &mut stopped => break outcome_of(receiver.exit_reason()),
                line = input.recv() => {
                    let Some(line) = line else {
                        debug!("Input closed, leaving session");
                        break SessionOutcome::LocalExit;
                    };
                    if let ControlFlow::Break(outcome) =
                        self.handle_input(line, input, &receiver).await
                    {
                        break outcome;
                    }
                }
            }
        };

        self.shutdown(&receiver, &outcome).await;
        emit(&self.events, SessionEvent::Closed(outcome.clone()));
        outcome
    }

    async fn handle_input(
        &self,
        line: String,
        input: &mut mpsc::Receiver<String>,
        receiver: &Receiver,
    ) -> ControlFlow<SessionOutcome> {
        if line.trim().is_empty() {
            return ControlFlow::Continue(());
        }

        match Command::parse(&line) {
            Some(Ok(command)) => {
                let mut ctx = CommandContext {
                    session: self,
                    input,
                    receiver,
                };
                commands::dispatch(command, &mut ctx).await
            }
            Some(Err(e)) => {
                emit(&self.events, SessionEvent::Error(e.to_string()));
                ControlFlow::Continue(())
            }
            None => self.send_chat(line).await,
        }
    }

    async fn send_chat(&self, text: String) -> ControlFlow<SessionOutcome> {
        // The peer would read these as a file marker or close notice.
        if !matches!(ControlLine::parse(&text), ControlLine::Chat(_)) {
            emit(
                &self.events,
                SessionEvent::Error(format!(
                    "Message not sent: lines starting with {FILE_MARKER_PREFIX} or equal to \
                     {CLOSE_NOTICE} are reserved"
                )),
            );
            return ControlFlow::Continue(());
        }

        match self.transport.send_line(&text).await {
            Ok(()) => {
                let record = ChatRecord::text(self.local.name(), self.peer.name(), text);
                self.record(&record);
                emit(&self.events, SessionEvent::ChatSent(record));
                ControlFlow::Continue(())
            }
            Err(TransportError::Protocol(e)) => {
                emit(&self.events, SessionEvent::Error(format!("Message not sent: {e}")));
                ControlFlow::Continue(())
            }
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Chat send failed");
                emit(&self.events, SessionEvent::Error(format!("Message not sent: {e}")));
                ControlFlow::Break(SessionOutcome::Failed(e.to_string()))
            }
        }
    }

    async fn shutdown(&self, receiver: &Receiver, outcome: &SessionOutcome) {
        self.state.send_replace(SessionState::Closing);

        if *outcome == SessionOutcome::LocalExit && self.transport.is_open() {
            if let Err(e) = self.transport.send_line(CLOSE_NOTICE).await {
                debug!(error = %e, "Could not send close notice");
            }
        }

        receiver.stop().await;
        self.transport.close().await;

        self.state.send_replace(SessionState::Closed);
        info!(peer = %self.peer, outcome = ?outcome, "Session closed");
    }

    /// Persist a record, reporting (not propagating) store failures.
    pub(crate) fn record(&self, record: &ChatRecord) {
        save_record(&self.store, &self.events, record);
    }

    /// Emit the stored conversation with the peer.
    pub fn show_history(&self) {
        let (local, peer) = (self.local.name(), self.peer.name());
        match with_store(&self.store, |db| db.get_history(local, peer)) {
            Ok(records) => emit(
                &self.events,
                SessionEvent::History {
                    peer: peer.to_string(),
                    records,
                },
            ),
            Err(e) => emit(
                &self.events,
                SessionEvent::Error(format!("Could not load history: {e}")),
            ),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("local", &self.local)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}

fn outcome_of(exit: Option<ReceiverExit>) -> SessionOutcome {
    match exit {
        Some(ReceiverExit::PeerClosed) => SessionOutcome::PeerClosed,
        Some(ReceiverExit::PeerDisconnected) => SessionOutcome::PeerDisconnected,
        Some(ReceiverExit::Failed(reason)) => SessionOutcome::Failed(reason),
        Some(ReceiverExit::Stopped) | None => {
            SessionOutcome::Failed("connection closed".to_string())
        }
    }
}

/// Run `f` against the store without holding the lock past the call.
pub(crate) fn with_store<T>(
    store: &SharedStore,
    f: impl FnOnce(&Database) -> tether_store::Result<T>,
) -> Result<T, String> {
    let db = store
        .lock()
        .map_err(|_| "history store is unavailable".to_string())?;
    f(&db).map_err(|e| e.to_string())
}

fn save_record(store: &SharedStore, events: &EventSender, record: &ChatRecord) {
    if let Err(e) = with_store(store, |db| db.save_message(record)) {
        warn!(id = %record.id, error = %e, "Could not save message");
        emit(events, SessionEvent::Error(format!("Could not save message: {e}")));
    }
}

/// Handles inbound lines on the receiver task.
struct InboundDispatcher {
    transport: Arc<Transport>,
    local: String,
    peer: String,
    download_dir: PathBuf,
    store: SharedStore,
    events: EventSender,
}

impl InboundDispatcher {
    async fn on_file(&mut self) -> ControlFlow<ReceiverExit> {
        match receive_file(&self.transport, &self.download_dir).await {
            Ok(file) => {
                let record = ChatRecord::file(
                    &self.peer,
                    &self.local,
                    file.name.clone(),
                    file.path.display().to_string(),
                );
                save_record(&self.store, &self.events, &record);
                emit(
                    &self.events,
                    SessionEvent::FileReceived {
                        name: file.name,
                        size: file.size,
                        path: file.path,
                        from: self.peer.clone(),
                    },
                );
                ControlFlow::Continue(())
            }
            Err(e) if e.is_fatal() => {
                emit(
                    &self.events,
                    SessionEvent::Error(format!("File receive failed: {e}")),
                );
                ControlFlow::Break(ReceiverExit::Failed(e.to_string()))
            }
            Err(e) => {
                warn!(error = %e, "Received file could not be saved");
                emit(
                    &self.events,
                    SessionEvent::Error(format!("Received file could not be saved: {e}")),
                );
                ControlFlow::Continue(())
            }
        }
    }
}

impl InboundSink for InboundDispatcher {
    async fn on_message(&mut self, line: String) -> ControlFlow<ReceiverExit> {
        match ControlLine::parse(&line) {
            ControlLine::CloseNotice => {
                emit(
                    &self.events,
                    SessionEvent::Info(format!("{} left the chat", self.peer)),
                );
                ControlFlow::Break(ReceiverExit::PeerClosed)
            }
            ControlLine::FileMarker(name) => {
                debug!(name, "Incoming file");
                self.on_file().await
            }
            ControlLine::Chat(text) => {
                let record = ChatRecord::text(&self.peer, &self.local, text);
                save_record(&self.store, &self.events, &record);
                emit(&self.events, SessionEvent::ChatReceived(record));
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_error(&mut self, exit: &ReceiverExit) {
        let message = match exit {
            ReceiverExit::PeerDisconnected => format!("{} disconnected", self.peer),
            ReceiverExit::Failed(reason) => format!("Connection error: {reason}"),
            ReceiverExit::Stopped | ReceiverExit::PeerClosed => return,
        };
        emit(&self.events, SessionEvent::Error(message));
    }
}
