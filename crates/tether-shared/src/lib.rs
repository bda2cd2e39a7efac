//! Types, wire protocol and host helpers shared by every tether crate.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod sys;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{ControlLine, FileBlob};
pub use types::{ChatRecord, Identity, MessageKind};
