use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use tether_shared::{ChatRecord, MessageKind};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    pub fn save_message(&self, record: &ChatRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, sender, receiver, content, kind, file_path, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.to_string(),
                record.sender,
                record.receiver,
                record.content,
                record.kind.as_str(),
                record.file_path,
                record.sent_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Every message exchanged between `a` and `b`, in either direction,
    /// oldest first.
    pub fn get_history(&self, a: &str, b: &str) -> Result<Vec<ChatRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender, receiver, content, kind, file_path, sent_at
             FROM messages
             WHERE (sender = ?1 AND receiver = ?2)
                OR (sender = ?2 AND receiver = ?1)
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![a, b], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Delete the conversation between `a` and `b` in both directions.
    /// Returns the number of messages removed.
    pub fn clear_history(&self, a: &str, b: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages
             WHERE (sender = ?1 AND receiver = ?2)
                OR (sender = ?2 AND receiver = ?1)",
            params![a, b],
        )?;
        tracing::info!(a, b, affected, "cleared chat history");
        Ok(affected)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRecord> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(4)?;
    let ts_str: String = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let kind = MessageKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            Box::new(StoreError::InvalidKind(kind_str.clone())),
        )
    })?;

    let sent_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ChatRecord {
        id,
        sender: row.get(1)?,
        receiver: row.get(2)?,
        content: row.get(3)?,
        kind,
        file_path: row.get(5)?,
        sent_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_both_directions_in_order() {
        let db = Database::open_in_memory().unwrap();

        let first = ChatRecord::text("alice", "bob", "hi bob");
        let second = ChatRecord::text("bob", "alice", "hi alice");
        let third = ChatRecord::file("alice", "bob", "report.pdf", "/tmp/report.pdf");
        let unrelated = ChatRecord::text("carol", "bob", "psst");

        for record in [&first, &second, &unrelated, &third] {
            db.save_message(record).unwrap();
        }

        let history = db.get_history("alice", "bob").unwrap();
        assert_eq!(history, vec![first.clone(), second.clone(), third.clone()]);

        // Argument order does not matter
        assert_eq!(db.get_history("bob", "alice").unwrap(), history);
        assert_eq!(history[2].file_path.as_deref(), Some("/tmp/report.pdf"));
    }

    #[test]
    fn clear_history_only_touches_the_pair() {
        let db = Database::open_in_memory().unwrap();
        db.save_message(&ChatRecord::text("alice", "bob", "1")).unwrap();
        db.save_message(&ChatRecord::text("bob", "alice", "2")).unwrap();
        db.save_message(&ChatRecord::text("carol", "bob", "3")).unwrap();

        assert_eq!(db.clear_history("bob", "alice").unwrap(), 2);
        assert!(db.get_history("alice", "bob").unwrap().is_empty());
        assert_eq!(db.get_history("carol", "bob").unwrap().len(), 1);
        assert_eq!(db.clear_history("alice", "bob").unwrap(), 0);
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        let record = ChatRecord::system("alice", "bob", "bob left");
        {
            let db = Database::open_at(&path).unwrap();
            db.save_message(&record).unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.get_history("alice", "bob").unwrap(), vec![record]);
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO messages (id, sender, receiver, content, kind, sent_at)
                 VALUES (?1, 'alice', 'bob', 'x', 'VIDEO', ?2)",
                params![Uuid::new_v4().to_string(), Utc::now().to_rfc3339()],
            )
            .unwrap();
        assert!(db.get_history("alice", "bob").is_err());
    }
}
