//! # tether-cli
//!
//! Session coordination and the interactive shell for Tether.
//!
//! [`session::Session`] owns one established connection: it runs the
//! background receiver, dispatches local input (chat lines and `/commands`)
//! and reports everything that happens as [`events::SessionEvent`]s. The
//! `tether` binary wires stdin and stdout around it.

pub mod commands;
pub mod config;
pub mod events;
pub mod session;

pub use config::ChatConfig;
pub use events::SessionEvent;
pub use session::{EstablishMode, Session, SessionOutcome, SessionState};
