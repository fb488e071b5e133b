//! Read-only execution against the reporting database.

use crate::schema::{format_schema, SchemaSource};
use crate::{AskError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Transaction};
use serde_json::{Map, Number, Value};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// One result row, columns in select order.
pub type Row = Map<String, Value>;

/// Runs an already-sanitized statement and returns its rows.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, sql: &str) -> Result<Vec<Row>>;
}

/// SQLite executor over the reporting view.
///
/// Every statement runs inside a transaction that is rolled back afterwards,
/// and SQLite must report it as read-only before it is stepped.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
    view: String,
}

impl SqliteExecutor {
    /// Open an existing reporting database without write access.
    pub fn open_read_only(path: &Path, view: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn, view))
    }

    /// Wrap an existing connection, e.g. an in-memory fixture.
    pub fn from_connection(conn: Connection, view: impl Into<String>) -> Self {
        Self {
            conn: Mutex::new(conn),
            view: view.into(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AskError::Execution("reporting connection poisoned".to_string()))
    }

    fn run(tx: &Transaction<'_>, sql: &str) -> Result<Vec<Row>> {
        let mut stmt = tx
            .prepare(sql)
            .map_err(|e| AskError::Execution(e.to_string()))?;
        if !stmt.readonly() {
            return Err(AskError::Execution(
                "only read-only statements can be executed".to_string(),
            ));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt
            .query([])
            .map_err(|e| AskError::Execution(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| AskError::Execution(e.to_string()))? {
            let mut record = Map::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| AskError::Execution(e.to_string()))?;
                record.insert(name.clone(), to_json(value));
            }
            out.push(record);
        }
        Ok(out)
    }
}

impl QueryExecutor for SqliteExecutor {
    fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| AskError::Execution(e.to_string()))?;

        let result = Self::run(&tx, sql);

        if let Err(e) = tx.rollback() {
            warn!(target: "askdb::db", "Rollback failed: {}", e);
        }
        match &result {
            Ok(rows) => debug!(target: "askdb::db", "Query returned {} rows", rows.len()),
            Err(e) => warn!(target: "askdb::db", "{}", e),
        }
        result
    }
}

impl SchemaSource for SqliteExecutor {
    fn describe(&self) -> Result<String> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
            .map_err(|e| AskError::Schema(e.to_string()))?;
        let columns: Vec<(String, String)> = stmt
            .query_map([&self.view], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .and_then(|rows| rows.collect())
            .map_err(|e| AskError::Schema(e.to_string()))?;

        if columns.is_empty() {
            return Err(AskError::Schema(format!("view '{}' not found", self.view)));
        }
        Ok(format_schema(
            &self.view,
            columns.iter().map(|(n, t)| (n.as_str(), t.as_str())),
        ))
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2);
            for b in bytes {
                let _ = write!(hex, "{:02x}", b);
            }
            Value::String(hex)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fixture() -> SqliteExecutor {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE v_open_order (
                order_no TEXT,
                item_no TEXT,
                balance_qty REAL,
                raw BLOB
            );
            INSERT INTO v_open_order VALUES ('SO-1', 'AB-123', 5.0, x'0aff');
            INSERT INTO v_open_order VALUES ('SO-2', 'CD-456', 0.0, NULL);
            "#,
        )
        .unwrap();
        SqliteExecutor::from_connection(conn, "v_open_order")
    }

    #[test]
    fn test_execute_preserves_column_order_and_types() {
        let exec = fixture();
        let rows = exec
            .execute("SELECT order_no, balance_qty, raw FROM v_open_order ORDER BY order_no")
            .unwrap();
        assert_eq!(rows.len(), 2);
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["order_no", "balance_qty", "raw"]);
        assert_eq!(rows[0]["order_no"], "SO-1");
        assert_eq!(rows[0]["balance_qty"], 5.0);
        assert_eq!(rows[0]["raw"], "0aff");
        assert!(rows[1]["raw"].is_null());
    }

    #[test]
    fn test_execute_refuses_writes() {
        let exec = fixture();
        let err = exec.execute("DELETE FROM v_open_order").unwrap_err();
        assert!(matches!(err, AskError::Execution(_)));
        assert_eq!(exec.execute("SELECT * FROM v_open_order").unwrap().len(), 2);
    }

    #[test]
    fn test_execute_reports_sqlite_errors() {
        let exec = fixture();
        let err = exec.execute("SELECT nope FROM v_open_order").unwrap_err();
        assert!(err.to_string().starts_with("Query failed:"));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_describe_view() {
        let exec = fixture();
        assert_eq!(
            exec.describe().unwrap(),
            "v_open_order(order_no:TEXT, item_no:TEXT, balance_qty:REAL, raw:BLOB)"
        );
    }

    #[test]
    fn test_describe_missing_view() {
        let conn = Connection::open_in_memory().unwrap();
        let exec = SqliteExecutor::from_connection(conn, "v_open_order");
        assert!(matches!(exec.describe(), Err(AskError::Schema(_))));
    }

    #[test]
    fn test_open_read_only_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("erp.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE v_open_order (item_no TEXT); INSERT INTO v_open_order VALUES ('AB-123');")
                .unwrap();
        }
        let exec = SqliteExecutor::open_read_only(&path, "v_open_order").unwrap();
        assert_eq!(exec.execute("SELECT item_no FROM v_open_order").unwrap().len(), 1);
        assert!(exec.execute("INSERT INTO v_open_order VALUES ('X-1')").is_err());
    }
}
