use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use tether_shared::ProtocolError;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("No peer connected within {0:?}")]
    AcceptTimeout(Duration),

    #[error("Failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Connection is closed")]
    Closed,
}

/// Outcomes of opening a session: listening, dialing and the name exchange.
#[derive(Error, Debug)]
pub enum EstablishError {
    #[error("Cannot listen on port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("Timed out after {0:?} waiting for a peer")]
    Timeout(Duration),

    #[error("Could not connect to {addr} after {attempts} attempts: {source}")]
    ConnectFailed {
        addr: String,
        attempts: u32,
        source: io::Error,
    },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl TransferError {
    /// Whether the connection can no longer be trusted to be in sync.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<ProtocolError> for TransferError {
    fn from(e: ProtocolError) -> Self {
        Self::Transport(TransportError::Protocol(e))
    }
}
