// Direct TCP session transport: one connection, lines and blobs multiplexed.

pub mod error;
pub mod establish;
pub mod file_transfer;
pub mod receiver;
pub mod transport;

pub use error::{EstablishError, TransferError, TransportError};
pub use establish::{Establisher, RetryPolicy};
pub use file_transfer::{receive_file, send_file, ReceivedFile, SentFile};
pub use receiver::{InboundSink, Receiver, ReceiverExit};
pub use transport::{BlobFrame, SendGuard, Transport, TransportListener};
