//! # tether-store
//!
//! Local chat history for Tether, kept in a plain SQLite file.
//!
//! The crate exposes a synchronous `Database` handle wrapping a
//! `rusqlite::Connection`, with typed helpers for the two tables it owns:
//! known users and exchanged messages.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
