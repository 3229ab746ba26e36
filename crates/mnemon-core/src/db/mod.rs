//! Direct SQLite database access.
//!
//! Two schemas live here: the memory schema (memories + access events) and the
//! snapshot schema (state snapshots). They are normally applied to separate
//! database files, but nothing prevents applying both to one connection.
//!
//! Timestamps are stored as unix milliseconds; embeddings as little-endian
//! `f32` BLOBs; lists and metadata as JSON text.

mod access;
mod memories;
mod snapshots;

use crate::error::{Error, Result};
use crate::types::{AccessOperation, MemoryContext, MemoryTier};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::path::Path;
use std::sync::Mutex;

const MEMORY_SCHEMA: &str = include_str!("migrations/001_memory_tables.sql");
const SNAPSHOT_SCHEMA: &str = include_str!("migrations/002_state_snapshots.sql");

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open database at specific path, creating it if needed
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(Error::Database)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply the memory + access event schema
    pub fn migrate_memory_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch(MEMORY_SCHEMA)?;
        Ok(())
    }

    /// Apply the state snapshot schema
    pub fn migrate_snapshot_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch(SNAPSHOT_SCHEMA)?;
        Ok(())
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column Encoding
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Encode an embedding as little-endian `f32` bytes.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian `f32` BLOB. Trailing partial values are ignored.
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn parse_text<T>(value: ValueRef<'_>) -> FromSqlResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .as_str()?
        .parse()
        .map_err(|e: String| FromSqlError::Other(e.into()))
}

impl ToSql for MemoryTier {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MemoryTier {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

impl ToSql for MemoryContext {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MemoryContext {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

impl ToSql for AccessOperation {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccessOperation {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

/// Parse a JSON text column inside a row mapper.
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    text: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_blob_encoding() {
        let embedding = vec![0.25_f32, -1.5, 3.0];
        let bytes = encode_embedding(&embedding);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_embedding(&bytes), embedding);
    }

    #[test]
    fn test_open_path_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.db");
        let db = Database::open_path(&path).unwrap();
        db.migrate_memory_schema().unwrap();
        db.ping().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.migrate_memory_schema().unwrap();
        db.migrate_memory_schema().unwrap();
        db.migrate_snapshot_schema().unwrap();
        db.migrate_snapshot_schema().unwrap();
    }
}
