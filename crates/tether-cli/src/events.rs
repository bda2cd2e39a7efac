//! What a session reports to whoever is rendering it.

use std::fmt;
use std::path::PathBuf;

use chrono::Local;
use tokio::sync::mpsc;

use tether_shared::types::format_size;
use tether_shared::{ChatRecord, MessageKind};

use crate::commands::CommandInfo;
use crate::session::SessionOutcome;

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ChatReceived(ChatRecord),
    ChatSent(ChatRecord),
    FileReceived {
        name: String,
        size: u64,
        path: PathBuf,
        from: String,
    },
    FileSent {
        name: String,
        size: u64,
    },
    History {
        peer: String,
        records: Vec<ChatRecord>,
    },
    Help(&'static [CommandInfo]),
    /// The session is waiting for a line of input.
    Prompt(String),
    Info(String),
    Error(String),
    Closed(SessionOutcome),
}

pub fn emit(events: &EventSender, event: SessionEvent) {
    if events.send(event).is_err() {
        tracing::debug!("Event receiver dropped");
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChatReceived(record) | Self::ChatSent(record) => {
                write!(f, "{}", render_record(record))
            }
            Self::FileReceived {
                name,
                size,
                path,
                from,
            } => write!(
                f,
                "Received {name} ({}) from {from}, saved to {}",
                format_size(*size),
                path.display()
            ),
            Self::FileSent { name, size } => {
                write!(f, "Sent {name} ({})", format_size(*size))
            }
            Self::History { peer, records } => {
                if records.is_empty() {
                    return write!(f, "No chat history with {peer}");
                }
                writeln!(f, "---- History with {peer} ----")?;
                for record in records {
                    writeln!(f, "{}", render_record(record))?;
                }
                write!(f, "---- end of history ----")
            }
            Self::Help(commands) => {
                writeln!(f, "Available commands:")?;
                for (i, cmd) in commands.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "  {:<16} {}", cmd.usage, cmd.description)?;
                }
                Ok(())
            }
            Self::Prompt(text) => write!(f, "{text}"),
            Self::Info(text) => write!(f, "* {text}"),
            Self::Error(text) => write!(f, "! {text}"),
            Self::Closed(outcome) => write!(f, "* Session closed: {outcome}"),
        }
    }
}

fn render_record(record: &ChatRecord) -> String {
    let time = record.sent_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
    match record.kind {
        MessageKind::Text => format!("[{time}] {}: {}", record.sender, record.content),
        MessageKind::File => format!("[{time}] {} sent a file: {}", record.sender, record.content),
        MessageKind::System => format!("[{time}] {}", record.content),
    }
}
