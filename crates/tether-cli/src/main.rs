//! # tether
//!
//! Interactive direct chat: pick a port, then either dial a peer or wait for
//! one, chat and exchange files until either side leaves, and go back to the
//! menu.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tether_cli::events::{emit, EventReceiver, EventSender};
use tether_cli::session::SharedStore;
use tether_cli::{ChatConfig, EstablishMode, Session, SessionEvent};
use tether_shared::constants::APP_NAME;
use tether_shared::sys::{self, PortStatus};
use tether_shared::Identity;
use tether_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG, writes to stderr)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tether_net=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration and prepare local state
    // -----------------------------------------------------------------------
    let config = ChatConfig::from_env();
    info!(?config, "Loaded configuration");

    if !sys::ensure_directory(&config.download_dir) {
        anyhow::bail!(
            "cannot create download directory {}",
            config.download_dir.display()
        );
    }

    let db = match &config.db_path {
        Some(path) => Database::open_at(path),
        None => Database::open_default(),
    }
    .context("failed to open chat history")?;
    let store: SharedStore = Arc::new(Mutex::new(db));

    // -----------------------------------------------------------------------
    // 3. Spawn input and output plumbing
    // -----------------------------------------------------------------------
    let (events, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events_rx));

    let (input_tx, mut input) = mpsc::channel::<String>(32);
    spawn_stdin_reader(input_tx.clone());

    // First Ctrl+C leaves the current session cleanly, the second one quits.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = input_tx.send("/exit".to_string()).await;
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    // -----------------------------------------------------------------------
    // 4. Pick a port and build the local identity
    // -----------------------------------------------------------------------
    let Some(port) = ask_port(&events, &mut input, config.port).await else {
        return finish(events, printer).await;
    };

    let name = config
        .display_name
        .clone()
        .or_else(sys::local_hostname)
        .unwrap_or_else(|| format!("User-{port}"));
    let local = Identity::new(name, sys::local_ipv4(), port);

    {
        let db = store
            .lock()
            .map_err(|_| anyhow::anyhow!("history store lock poisoned"))?;
        if let Err(e) = db.save_user(&local) {
            warn!(error = %e, "Could not save local user");
        }
    }
    emit(&events, SessionEvent::Info(format!("You are {local}")));

    // -----------------------------------------------------------------------
    // 5. Menu loop (returns when the user quits or stdin closes)
    // -----------------------------------------------------------------------
    loop {
        emit(
            &events,
            SessionEvent::Prompt(
                "\n1) Connect to a peer\n2) Wait for a peer\n3) Quit\nChoice: ".to_string(),
            ),
        );
        let Some(choice) = input.recv().await else {
            break;
        };

        let mode = match choice.trim() {
            "1" => match ask_peer(&events, &mut input, config.port).await {
                Some((host, port)) => EstablishMode::Dial { host, port },
                None => continue,
            },
            "2" => EstablishMode::Listen { port },
            "3" | "/exit" | "/quit" => break,
            other => {
                emit(
                    &events,
                    SessionEvent::Error(format!("Unknown choice: {other}")),
                );
                continue;
            }
        };

        let session = match Session::establish(
            mode,
            local.clone(),
            &config,
            store.clone(),
            events.clone(),
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                emit(&events, SessionEvent::Error(e.to_string()));
                continue;
            }
        };

        session.show_history();
        emit(
            &events,
            SessionEvent::Info("Type a message and press Enter. /help lists commands.".into()),
        );

        let outcome = session.run(&mut input).await;
        info!(?outcome, "Session finished");
    }

    finish(events, printer).await
}

/// Flush pending output before leaving.
async fn finish(events: EventSender, printer: tokio::task::JoinHandle<()>) -> anyhow::Result<()> {
    emit(&events, SessionEvent::Info("Goodbye".to_string()));
    drop(events);
    printer.await.context("output task failed")?;
    Ok(())
}

async fn print_events(mut events: EventReceiver) {
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        let written = match &event {
            SessionEvent::Prompt(_) => write!(stdout, "{event}"),
            _ => writeln!(stdout, "{event}"),
        };
        if written.and_then(|_| stdout.flush()).is_err() {
            break;
        }
    }
}

/// Read stdin on a plain thread; tokio's stdin would keep the runtime alive
/// on shutdown while a read is pending.
fn spawn_stdin_reader(tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
}

async fn ask_port(
    events: &EventSender,
    input: &mut mpsc::Receiver<String>,
    default: u16,
) -> Option<u16> {
    loop {
        emit(
            events,
            SessionEvent::Prompt(format!("Listen port [{default}]: ")),
        );
        let line = input.recv().await?;
        let line = line.trim();

        let candidate = if line.is_empty() {
            u32::from(default)
        } else {
            match line.parse::<u32>() {
                Ok(port) => port,
                Err(_) => {
                    emit(events, SessionEvent::Error(format!("Not a number: {line}")));
                    continue;
                }
            }
        };

        match sys::probe_port(candidate) {
            PortStatus::Available => return u16::try_from(candidate).ok(),
            PortStatus::InUse => emit(
                events,
                SessionEvent::Error(format!("Port {candidate} is already in use")),
            ),
            PortStatus::InvalidRange => emit(
                events,
                SessionEvent::Error("Port must be between 1 and 65535".to_string()),
            ),
        }
    }
}

async fn ask_peer(
    events: &EventSender,
    input: &mut mpsc::Receiver<String>,
    default_port: u16,
) -> Option<(String, u16)> {
    emit(events, SessionEvent::Prompt("Peer IP address: ".to_string()));
    let host = input.recv().await?.trim().to_string();
    if host.is_empty() {
        emit(events, SessionEvent::Error("No address given".to_string()));
        return None;
    }

    emit(
        events,
        SessionEvent::Prompt(format!("Peer port [{default_port}]: ")),
    );
    let line = input.recv().await?;
    let line = line.trim();
    if line.is_empty() {
        return Some((host, default_port));
    }
    match line.parse::<u16>() {
        Ok(port) if port != 0 => Some((host, port)),
        _ => {
            emit(events, SessionEvent::Error(format!("Invalid port: {line}")));
            None
        }
    }
}
