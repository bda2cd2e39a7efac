//! v001 -- Initial schema: `users` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (peers and the local user, keyed by display name)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    username   TEXT PRIMARY KEY NOT NULL,
    ip_address TEXT NOT NULL,
    port       INTEGER NOT NULL,
    updated_at TEXT NOT NULL                 -- RFC-3339
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq       INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
    id        TEXT NOT NULL UNIQUE,               -- UUID v4
    sender    TEXT NOT NULL,
    receiver  TEXT NOT NULL,
    content   TEXT NOT NULL,
    kind      TEXT NOT NULL,                      -- TEXT | FILE | SYSTEM
    file_path TEXT,
    sent_at   TEXT NOT NULL                       -- RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_messages_pair
    ON messages(sender, receiver);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
