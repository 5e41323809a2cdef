//! SQLite event log implementation for Scriptorium.
//!
//! This crate provides the durable [`EventLog`] used by the desktop
//! application: a single local SQLite database file holding the append-only
//! audit trail of commands and events.
//!
//! Uses a simple `Arc<Mutex<Connection>>` wrapper: SQLite in WAL mode
//! supports multiple readers but a single writer, so a mutex is all the
//! coordination the log needs.
//!
//! # Example
//!
//! ```ignore
//! use scriptorium_sqlite::SqliteEventLog;
//!
//! let log = SqliteEventLog::open("scriptorium.db")?;
//! let records = log.find_by_type("AiProfileCreatedEvent", 50)?;
//! ```

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use scriptorium_core::record::{EventLog, EventLogError, EventRecord, NewEventRecord, RequestId};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS event_log (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id     TEXT NOT NULL,
    event_type     TEXT NOT NULL,
    payload        TEXT NOT NULL,
    success        INTEGER NOT NULL,
    failure_reason TEXT,
    undeclared     INTEGER NOT NULL DEFAULT 0,
    recorded_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_event_log_request ON event_log(request_id);
CREATE INDEX IF NOT EXISTS idx_event_log_type ON event_log(event_type);
";

/// Durable, append-only event log backed by a local SQLite database.
#[derive(Clone)]
pub struct SqliteEventLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventLog {
    /// Open (or create) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] if the database cannot be opened
    /// or the schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EventLogError> {
        info!(path = %path.as_ref().display(), "opening SQLite event log");
        let conn = Connection::open(path).map_err(storage)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory log, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, EventLogError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, EventLogError> {
        debug!("configuring SQLite pragmas and schema");
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(storage)?;
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventLog for SqliteEventLog {
    fn append(&self, record: NewEventRecord) -> Result<EventRecord, EventLogError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO event_log
                 (request_id, event_type, payload, success, failure_reason, undeclared, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.request_id.to_string(),
                record.event_type,
                record.payload.to_string(),
                record.success,
                record.failure_reason,
                record.undeclared,
                record.recorded_at.to_rfc3339(),
            ],
        )
        .map_err(storage)?;
        let id = conn.last_insert_rowid();

        Ok(EventRecord {
            id,
            request_id: record.request_id,
            event_type: record.event_type,
            payload: record.payload,
            success: record.success,
            failure_reason: record.failure_reason,
            undeclared: record.undeclared,
            recorded_at: record.recorded_at,
        })
    }

    fn find_by_type(
        &self,
        event_type: &str,
        limit: usize,
    ) -> Result<Vec<EventRecord>, EventLogError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, request_id, event_type, payload, success, failure_reason,
                        undeclared, recorded_at
                 FROM event_log WHERE event_type = ?1 ORDER BY id ASC LIMIT ?2",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map(rusqlite::params![event_type, limit], read_raw_row)
            .map_err(storage)?
            .collect::<Result<Vec<RawRow>, _>>()
            .map_err(storage)?;
        rows.into_iter().map(RawRow::into_record).collect()
    }

    fn find_by_request_id(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<EventRecord>, EventLogError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, request_id, event_type, payload, success, failure_reason,
                        undeclared, recorded_at
                 FROM event_log WHERE request_id = ?1 ORDER BY id ASC",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map(rusqlite::params![request_id.to_string()], read_raw_row)
            .map_err(storage)?
            .collect::<Result<Vec<RawRow>, _>>()
            .map_err(storage)?;
        rows.into_iter().map(RawRow::into_record).collect()
    }
}

fn storage(err: rusqlite::Error) -> EventLogError {
    EventLogError::Storage(err.to_string())
}

struct RawRow {
    id: i64,
    request_id: String,
    event_type: String,
    payload: String,
    success: bool,
    failure_reason: Option<String>,
    undeclared: bool,
    recorded_at: String,
}

fn read_raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        request_id: row.get(1)?,
        event_type: row.get(2)?,
        payload: row.get(3)?,
        success: row.get(4)?,
        failure_reason: row.get(5)?,
        undeclared: row.get(6)?,
        recorded_at: row.get(7)?,
    })
}

impl RawRow {
    fn into_record(self) -> Result<EventRecord, EventLogError> {
        let request_id: RequestId = self
            .request_id
            .parse()
            .map_err(|err: scriptorium_core::record::ParseRequestIdError| {
                EventLogError::Serialization(err.to_string())
            })?;
        let payload: serde_json::Value = serde_json::from_str(&self.payload)
            .map_err(|err| EventLogError::Serialization(err.to_string()))?;
        let recorded_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&self.recorded_at)
            .map_err(|err| EventLogError::Serialization(err.to_string()))?
            .with_timezone(&Utc);

        Ok(EventRecord {
            id: self.id,
            request_id,
            event_type: self.event_type,
            payload,
            success: self.success,
            failure_reason: self.failure_reason,
            undeclared: self.undeclared,
            recorded_at,
        })
    }
}
