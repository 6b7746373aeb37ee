//! Prediction history log

use chrono::{DateTime, SecondsFormat, Utc};
use leafid_core::{CaptureSource, Error, HistoryEntry, NewHistoryEntry, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::time::Duration;

use crate::db_error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT,
    label TEXT NOT NULL,
    confidence REAL NOT NULL,
    source TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

/// Append-only record of past identifications, kept in its own database
/// file so the plant metadata can stay read-only
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Open (creating if needed) the history database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_error("open history database"))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(db_error("set busy timeout"))?;
        tracing::info!("Recording prediction history in {}", path.display());
        Self::with_connection(conn)
    }

    /// History kept only for the lifetime of the process
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_error("open history database"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(db_error("create history table"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one row, returning its id
    pub fn record(&self, entry: &NewHistoryEntry) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO history (filename, label, confidence, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.filename,
                entry.label,
                entry.confidence as f64,
                entry.source.as_str(),
                entry.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .map_err(db_error("insert history row"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent `limit` rows, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, filename, label, confidence, source, created_at
                 FROM history
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1",
            )
            .map_err(db_error("prepare history query"))?;

        let rows = stmt
            .query_map([limit as i64], RawRow::read)
            .map_err(db_error("query history"))?;

        let entries = rows
            .map(|row| row.map_err(db_error("read history row"))?.into_entry())
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Number of stored rows
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .map_err(db_error("count history"))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Columns as stored; source and timestamp are parsed after the row
/// callback so their failures surface as store errors
struct RawRow {
    id: i64,
    filename: Option<String>,
    label: String,
    confidence: f64,
    source: String,
    created_at: String,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            label: row.get(2)?,
            confidence: row.get(3)?,
            source: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_entry(self) -> Result<HistoryEntry> {
        let source = self
            .source
            .parse::<CaptureSource>()
            .map_err(|e| Error::store(format!("history row {}: {}", self.id, e)))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| Error::store(format!("history row {} has a bad timestamp: {}", self.id, e)))?
            .with_timezone(&Utc);

        Ok(HistoryEntry {
            id: self.id,
            filename: self.filename,
            label: self.label,
            confidence: self.confidence as f32,
            source,
            created_at,
        })
    }
}
