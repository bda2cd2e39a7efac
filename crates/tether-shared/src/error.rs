use thiserror::Error;

/// Violations of the line/blob wire discipline.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Blob encoding failed: {0}")]
    Encode(String),

    #[error("Blob decoding failed: {0}")]
    Decode(String),

    #[error("Blob declares {declared} bytes but carries {actual}")]
    BlobSizeMismatch { declared: u64, actual: u64 },

    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: u64, max: u64 },

    #[error("Invalid line: {0}")]
    InvalidLine(String),
}
