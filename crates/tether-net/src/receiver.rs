//! Background read loop for an established [`Transport`].

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::Transport;

/// Why a receive loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverExit {
    /// `stop()` was called, or the transport was closed locally.
    Stopped,
    /// The sink saw the peer's close notice.
    PeerClosed,
    /// End of stream without a close notice.
    PeerDisconnected,
    /// A read or decode failure.
    Failed(String),
}

/// Consumer of inbound lines.
///
/// `on_message` is awaited before the next read, so an implementation may
/// read a blob off the same transport after seeing a file marker.
pub trait InboundSink: Send + 'static {
    fn on_message(
        &mut self,
        line: String,
    ) -> impl Future<Output = ControlFlow<ReceiverExit>> + Send;

    /// Called once if the loop ends on end of stream or a read failure.
    fn on_error(&mut self, exit: &ReceiverExit) -> impl Future<Output = ()> + Send;
}

pub struct Receiver {
    transport: Arc<Transport>,
    running: watch::Receiver<bool>,
    exit: Arc<Mutex<Option<ReceiverExit>>>,
    stop_requested: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Flips `running` to false however the task ends, panics included.
struct RunningGuard(watch::Sender<bool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl Receiver {
    /// Spawn the loop. Must be called from within a tokio runtime.
    pub fn start<S: InboundSink>(transport: Arc<Transport>, sink: S) -> Self {
        let (running_tx, running) = watch::channel(true);
        let exit = Arc::new(Mutex::new(None));
        let stop_requested = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(run_loop(
            transport.clone(),
            sink,
            RunningGuard(running_tx),
            exit.clone(),
            stop_requested.clone(),
        ));

        Self {
            transport,
            running,
            exit,
            stop_requested,
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Resolves once the loop has ended.
    pub fn stopped(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut running = self.running.clone();
        async move {
            let _ = running.wait_for(|running| !*running).await;
        }
    }

    pub fn exit_reason(&self) -> Option<ReceiverExit> {
        self.exit.lock().ok().and_then(|exit| exit.clone())
    }

    /// Close the transport and wait for the loop to finish.
    ///
    /// Do not call this from inside the sink; return `ControlFlow::Break`
    /// instead.
    pub async fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.transport.close().await;
        self.stopped().await;
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("running", &self.is_running())
            .field("exit", &self.exit_reason())
            .finish()
    }
}

async fn run_loop<S: InboundSink>(
    transport: Arc<Transport>,
    mut sink: S,
    _running: RunningGuard,
    exit_slot: Arc<Mutex<Option<ReceiverExit>>>,
    stop_requested: Arc<AtomicBool>,
) {
    let peer = transport.peer_addr();
    debug!(peer = %peer, "Receive loop started");

    let exit = loop {
        let exit = match transport.receive_line().await {
            Ok(Some(line)) => match sink.on_message(line).await {
                ControlFlow::Continue(()) => continue,
                ControlFlow::Break(exit) => {
                    debug!(peer = %peer, exit = ?exit, "Sink ended the receive loop");
                    break exit;
                }
            },
            Ok(None) | Err(_) if stop_requested.load(Ordering::SeqCst) => ReceiverExit::Stopped,
            Err(TransportError::Closed) => ReceiverExit::Stopped,
            Ok(None) => ReceiverExit::PeerDisconnected,
            Err(e) => ReceiverExit::Failed(e.to_string()),
        };

        if exit != ReceiverExit::Stopped {
            warn!(peer = %peer, exit = ?exit, "Receive loop failed");
            sink.on_error(&exit).await;
        }
        break exit;
    };

    info!(peer = %peer, exit = ?exit, "Receive loop ended");

    if let Ok(mut slot) = exit_slot.lock() {
        *slot = Some(exit);
    }
}
