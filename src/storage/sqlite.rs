//! SQLite store adapter

use rusqlite::{Connection, ErrorCode, params_from_iter};
use crate::value::Value;
use crate::{Error, Result};
use super::descriptor::Descriptor;

/// Tracing target used for statement echo
pub const SQL_TARGET: &str = "rowkeeper::sql";

/// A statement with positional parameters (`?1`, `?2`, ...)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Append a parameter and return its placeholder
    pub fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }
}

/// Rows returned by a statement
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a write statement
    pub affected: usize,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Translate an engine error, surfacing constraint failures as integrity errors
pub(crate) fn classify(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(ffi, msg) if ffi.code == ErrorCode::ConstraintViolation => {
            Error::Integrity {
                detail: msg.clone().unwrap_or_else(|| ffi.to_string()),
            }
        }
        _ => Error::Storage(err),
    }
}

/// Single-writer connection to the backing store
pub struct SqliteStore {
    conn: Connection,
    echo: bool,
}

impl SqliteStore {
    /// Open a connection for a descriptor (creates the file if it doesn't exist)
    pub fn connect(descriptor: &Descriptor, echo: bool) -> Result<Self> {
        let target = descriptor.open_target();
        let connection_error = |e: rusqlite::Error| Error::Connection {
            descriptor: descriptor.to_string(),
            reason: e.to_string(),
        };

        let conn = Connection::open(&target).map_err(connection_error)?;
        conn.execute_batch("PRAGMA foreign_keys = ON").map_err(connection_error)?;
        // Touch the file so an unreachable path fails here rather than on first use
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
            .map_err(connection_error)?;

        tracing::debug!("Connected to {}", descriptor);
        Ok(Self { conn, echo })
    }

    /// Open a private in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::connect(&Descriptor::memory(), false)
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    fn log(&self, sql: &str, params: &[Value]) {
        let sql = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        if self.echo {
            tracing::info!(target: SQL_TARGET, "{} {:?}", sql, params);
        } else {
            tracing::debug!(target: SQL_TARGET, "{} {:?}", sql, params);
        }
    }

    /// Run one statement, returning its rows (if any) and the affected count
    pub fn execute(&self, statement: &Statement) -> Result<RowSet> {
        self.log(&statement.sql, &statement.params);

        let mut stmt = self.conn.prepare(&statement.sql).map_err(classify)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        if columns.is_empty() {
            let affected = stmt
                .execute(params_from_iter(statement.params.iter()))
                .map_err(classify)?;
            return Ok(RowSet {
                columns,
                rows: Vec::new(),
                affected,
            });
        }

        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt
            .query(params_from_iter(statement.params.iter()))
            .map_err(classify)?;
        while let Some(row) = cursor.next().map_err(classify)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Value>(i).map_err(classify)?);
            }
            rows.push(values);
        }

        Ok(RowSet {
            columns,
            rows,
            affected: 0,
        })
    }

    /// Run parameterless SQL (DDL, pragmas, transaction control)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.log(sql, &[]);
        self.conn.execute_batch(sql).map_err(classify)
    }

    /// Row id assigned by the most recent insert on this connection
    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    // ========== Transactions ==========

    /// Begin a transaction
    pub fn begin(&self) -> Result<()> {
        self.execute_batch("BEGIN")
    }

    /// Commit a transaction
    pub fn commit(&self) -> Result<()> {
        self.execute_batch("COMMIT")
    }

    /// Rollback a transaction
    pub fn rollback(&self) -> Result<()> {
        self.execute_batch("ROLLBACK")
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    // ========== Introspection ==========

    /// Names of the user tables in the store
    pub fn table_names(&self) -> Result<Vec<String>> {
        let rows = self.execute(&Statement::new(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        ))?;
        Ok(rows
            .rows
            .into_iter()
            .filter_map(|r| r.into_iter().next())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    /// Number of rows in a table
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .map_err(classify)?;
        Ok(count as usize)
    }
}
