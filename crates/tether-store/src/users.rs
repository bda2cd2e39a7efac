use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use tether_shared::Identity;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert or refresh a user. The display name is the key, so a second
    /// peer using the same name replaces the first one's address.
    pub fn save_user(&self, user: &Identity) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (username, ip_address, port, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(username) DO UPDATE SET
                ip_address = excluded.ip_address,
                port       = excluded.port,
                updated_at = excluded.updated_at",
            params![
                user.display_name,
                user.address,
                user.port,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, username: &str) -> Result<Option<Identity>> {
        let user = self
            .conn()
            .query_row(
                "SELECT username, ip_address, port FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(Identity {
                        display_name: row.get(0)?,
                        address: row.get(1)?,
                        port: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_user_upserts_by_name() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_user("alice").unwrap().is_none());

        db.save_user(&Identity::new("alice", "10.0.0.2", 6001)).unwrap();
        db.save_user(&Identity::new("alice", "10.0.0.9", 7000)).unwrap();

        let alice = db.get_user("alice").unwrap().unwrap();
        assert_eq!(alice.address, "10.0.0.9");
        assert_eq!(alice.port, 7000);

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
