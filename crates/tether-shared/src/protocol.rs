//! Line-level wire protocol.
//!
//! Text lines and file blobs share one byte stream. A blob is always
//! announced by exactly one `FILE:<name>` line immediately before it, and the
//! reader must consume exactly one blob after seeing that line before it goes
//! back to reading lines. Nothing on the wire can detect a violation; the
//! stream is simply misread from that point on.

use serde::{Deserialize, Serialize};

use crate::constants::{CLOSE_NOTICE, FILE_MARKER_PREFIX, MAX_FILE_SIZE};
use crate::error::ProtocolError;

/// Classification of one inbound text line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine<'a> {
    /// The peer is leaving the session.
    CloseNotice,
    /// Exactly one blob named by the payload follows on the wire.
    FileMarker(&'a str),
    /// Anything else is conversation.
    Chat(&'a str),
}

impl<'a> ControlLine<'a> {
    /// Pure prefix test, no I/O.
    pub fn parse(line: &'a str) -> Self {
        if line == CLOSE_NOTICE {
            Self::CloseNotice
        } else if let Some(name) = line.strip_prefix(FILE_MARKER_PREFIX) {
            Self::FileMarker(name)
        } else {
            Self::Chat(line)
        }
    }
}

/// Build the marker line announcing `file_name`.
pub fn file_marker(file_name: &str) -> String {
    format!("{FILE_MARKER_PREFIX}{file_name}")
}

/// A whole file in memory plus its metadata, sent as one unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileBlob {
    pub name: String,
    pub size: u64,
    pub bytes: Vec<u8>,
    pub sender: String,
    pub receiver: String,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, sender: &str, receiver: &str) -> Self {
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            bytes,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
        }
    }

    /// Size and length checks shared by both directions.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.size > MAX_FILE_SIZE {
            return Err(ProtocolError::BlobTooLarge {
                size: self.size,
                max: MAX_FILE_SIZE,
            });
        }
        if self.bytes.len() as u64 != self.size {
            return Err(ProtocolError::BlobSizeMismatch {
                declared: self.size,
                actual: self.bytes.len() as u64,
            });
        }
        Ok(())
    }

    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        self.validate()?;
        bincode::serialize(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserialize from binary and validate
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let blob: Self =
            bincode::deserialize(data).map_err(|e| ProtocolError::Decode(e.to_string()))?;
        blob.validate()?;
        Ok(blob)
    }
}
