//! Local SQLite storage: key/value config and the persisted login session.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::auth::Session;
use crate::error::Result;

const SESSION_KEY: &str = "auth_session";
pub const DB_FILE: &str = "stakewatch.db";

pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (creating if needed) `<dir>/stakewatch.db`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join(DB_FILE);
        log::debug!("storage: open {:?}", db_path);
        let conn = Connection::open(&db_path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS config (key TEXT PRIMARY KEY, value TEXT NOT NULL);
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn config_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM config WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn config_remove(&self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM config WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn session_save(&self, session: &Session) -> Result<()> {
        self.config_set(SESSION_KEY, &serde_json::to_string(session)?)
    }

    /// Stored session; an unreadable entry is dropped and reported as none.
    pub fn session_load(&self) -> Result<Option<Session>> {
        let Some(raw) = self.config_get(SESSION_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                log::warn!("storage: discarding unreadable session: {}", e);
                self.config_remove(SESSION_KEY)?;
                Ok(None)
            }
        }
    }

    pub fn session_clear(&self) -> Result<()> {
        self.config_remove(SESSION_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use chrono::Utc;

    fn session() -> Session {
        Session {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            user_id: UserId::parse("f27978af-e56a-4b45-aede-fb450557699a").unwrap(),
            email: Some("a@b.c".into()),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn config_roundtrip_and_overwrite() {
        let s = Storage::in_memory().unwrap();
        assert_eq!(s.config_get("k").unwrap(), None);
        s.config_set("k", "1").unwrap();
        s.config_set("k", "2").unwrap();
        assert_eq!(s.config_get("k").unwrap().as_deref(), Some("2"));
        s.config_remove("k").unwrap();
        assert_eq!(s.config_get("k").unwrap(), None);
    }

    #[test]
    fn session_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let saved = session();
        Storage::open(dir.path()).unwrap().session_save(&saved).unwrap();
        let loaded = Storage::open(dir.path()).unwrap().session_load().unwrap();
        assert_eq!(loaded, Some(saved));
    }

    #[test]
    fn corrupt_session_is_discarded() {
        let s = Storage::in_memory().unwrap();
        s.config_set(SESSION_KEY, "{not json").unwrap();
        assert_eq!(s.session_load().unwrap(), None);
        assert_eq!(s.config_get(SESSION_KEY).unwrap(), None);
    }
}
