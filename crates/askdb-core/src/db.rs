//! SQLite persistence for the chat log.

use crate::{AskError, Result};
use askdb_types::ChatRecord;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Append-only sink for finished exchanges.
pub trait ChatLog: Send + Sync {
    fn append_record(&self, record: &ChatRecord) -> Result<()>;
}

/// SQLite-based chat log.
pub struct ChatLogStore {
    conn: Mutex<Connection>,
}

impl ChatLogStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                user_message TEXT,
                generated_sql TEXT,
                ai_message TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chat_history_session ON chat_history(session_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AskError::Persistence("chat log connection poisoned".to_string()))
    }

    /// All records for a session, oldest first.
    pub fn list_for_session(&self, session_id: &str) -> Result<Vec<ChatRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT session_id, user_message, generated_sql, ai_message, created_at
            FROM chat_history
            WHERE session_id = ?1
            ORDER BY id ASC
            "#,
        )?;
        let records = stmt
            .query_map(params![session_id], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Total number of stored records.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chat_history", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ChatRecord> {
        let created_at: String = row.get("created_at")?;
        Ok(ChatRecord {
            session_id: row.get("session_id")?,
            user_message: row
                .get::<_, Option<String>>("user_message")?
                .unwrap_or_default(),
            generated_sql: row.get("generated_sql")?,
            ai_message: row.get("ai_message")?,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_default(),
        })
    }
}

impl ChatLog for ChatLogStore {
    fn append_record(&self, record: &ChatRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO chat_history (
                session_id, user_message, generated_sql, ai_message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.session_id,
                record.user_message,
                record.generated_sql,
                record.ai_message,
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AskError::Persistence(e.to_string()))?;
        Ok(())
    }
}
