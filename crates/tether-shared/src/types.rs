use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A peer as it presents itself: a self-asserted display name plus the
/// address it was reached at. Names are not unique across the network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    pub display_name: String,
    pub address: String,
    pub port: u16,
}

impl Identity {
    pub fn new(display_name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
            port,
        }
    }

    pub fn name(&self) -> &str {
        &self.display_name
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.display_name, self.address, self.port)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::File => "FILE",
            Self::System => "SYSTEM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(Self::Text),
            "FILE" => Some(Self::File),
            "SYSTEM" => Some(Self::System),
            _ => None,
        }
    }
}

/// One sent or received unit of conversation. Built once, persisted, never
/// mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRecord {
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub kind: MessageKind,
    /// Local path of the transferred file for `File` records.
    pub file_path: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl ChatRecord {
    pub fn text(sender: &str, receiver: &str, content: impl Into<String>) -> Self {
        Self::build(sender, receiver, content.into(), MessageKind::Text, None)
    }

    pub fn file(
        sender: &str,
        receiver: &str,
        content: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self::build(
            sender,
            receiver,
            content.into(),
            MessageKind::File,
            Some(file_path.into()),
        )
    }

    pub fn system(sender: &str, receiver: &str, content: impl Into<String>) -> Self {
        Self::build(sender, receiver, content.into(), MessageKind::System, None)
    }

    fn build(
        sender: &str,
        receiver: &str,
        content: String,
        kind: MessageKind,
        file_path: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            content,
            kind,
            file_path,
            sent_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for ChatRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            MessageKind::Text => write!(f, "{}: {}", self.sender, self.content),
            MessageKind::File => write!(f, "{}: [file] {}", self.sender, self.content),
            MessageKind::System => write!(f, "[system] {}", self.content),
        }
    }
}

/// Human-readable byte count, e.g. `1.50 KB`.
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size < KB {
        format!("{size} B")
    } else if size < MB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else if size < GB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else {
        format!("{:.2} GB", size as f64 / GB as f64)
    }
}
