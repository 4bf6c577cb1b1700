//! SQLite-backed storage for the action log.
//!
//! The database lives at `~/.teap/actions.db` by default. Rows are
//! append-only: nothing updates or deletes an entry after it is written.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::{Error, Result};

use super::ChatEvent;

/// One recorded chat-affecting operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    pub id: i64,
    pub event: String,
    pub timestamp: String,
    pub data: String,
    pub message: Option<String>,
    pub success: bool,
}

impl ActionEntry {
    /// Parse the stored payload back into the typed event union.
    pub fn event(&self) -> Result<ChatEvent> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

pub struct ActionDb {
    conn: Mutex<Connection>,
}

impl ActionDb {
    /// Open (and create if needed) the database at the default location.
    pub fn open() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| Error::Config("home directory not found".into()))?;
        let dir = home.join(".teap");
        std::fs::create_dir_all(&dir)?;
        Self::open_at(&dir.join("actions.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                data TEXT NOT NULL,
                message TEXT,
                success INTEGER NOT NULL DEFAULT 1
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".teap").join("actions.db"))
    }

    /// Append one entry. Returns the assigned sequence id.
    pub fn record(&self, event: &ChatEvent, success: bool, message: Option<&str>) -> Result<i64> {
        let data = serde_json::to_string(event)?;
        let conn = self.conn.lock().expect("action db lock");
        conn.execute(
            "INSERT INTO actions (event, timestamp, data, message, success)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.kind(),
                Utc::now().to_rfc3339(),
                data,
                message,
                success
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn entries(&self, limit: i64) -> Result<Vec<ActionEntry>> {
        self.query(
            "SELECT id, event, timestamp, data, message, success
             FROM actions ORDER BY id DESC LIMIT ?1",
            limit,
        )
    }

    /// Failed entries, oldest first, for replay.
    pub fn failed_entries(&self) -> Result<Vec<ActionEntry>> {
        self.query(
            "SELECT id, event, timestamp, data, message, success
             FROM actions WHERE success = 0 ORDER BY id ASC LIMIT ?1",
            i64::MAX,
        )
    }

    fn query(&self, sql: &str, limit: i64) -> Result<Vec<ActionEntry>> {
        let conn = self.conn.lock().expect("action db lock");
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(ActionEntry {
                id: row.get(0)?,
                event: row.get(1)?,
                timestamp: row.get(2)?,
                data: row.get(3)?,
                message: row.get(4)?,
                success: row.get(5)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, ActionDb) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ActionDb::open_at(&dir.path().join("actions.db")).expect("open");
        (dir, db)
    }

    #[test]
    fn test_record_and_read_back() {
        let (_dir, db) = open_temp();
        let event = ChatEvent::CreateGroup {
            name: "Franchise-France".into(),
        };
        let id = db.record(&event, true, None).unwrap();
        assert!(id > 0);

        let entries = db.entries(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "group-creation");
        assert!(entries[0].success);
        assert_eq!(entries[0].event().unwrap(), event);
        assert!(!entries[0].timestamp.is_empty());
    }

    #[test]
    fn test_failed_entries_oldest_first() {
        let (_dir, db) = open_temp();
        db.record(&ChatEvent::CreateChannel { name: "a".into() }, false, Some("timeout"))
            .unwrap();
        db.record(&ChatEvent::CreateChannel { name: "b".into() }, true, None)
            .unwrap();
        db.record(&ChatEvent::CreateChannel { name: "c".into() }, false, Some("500"))
            .unwrap();

        let failed = db.failed_entries().unwrap();
        assert_eq!(failed.len(), 2);
        assert_eq!(
            failed[0].event().unwrap(),
            ChatEvent::CreateChannel { name: "a".into() }
        );
        assert_eq!(failed[0].message.as_deref(), Some("timeout"));
        assert_eq!(
            failed[1].event().unwrap(),
            ChatEvent::CreateChannel { name: "c".into() }
        );
    }

    #[test]
    fn test_entries_are_append_only_sequence() {
        let (_dir, db) = open_temp();
        let first = db
            .record(&ChatEvent::CreateGroup { name: "x".into() }, true, None)
            .unwrap();
        let second = db
            .record(&ChatEvent::CreateGroup { name: "y".into() }, true, None)
            .unwrap();
        assert!(second > first);
    }
}
