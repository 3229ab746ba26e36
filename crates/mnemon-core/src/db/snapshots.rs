//! State snapshot table operations.

use super::{Database, from_millis, to_millis};
use crate::error::{Error, Result};
use crate::types::{SnapshotRecord, SnapshotSummary};
use rusqlite::{OptionalExtension, Row, params};

const SUMMARY_COLUMNS: &str =
    "id, scope, name, created_at, expires_at, importance, compressed, size_bytes";

impl Database {
    /// Store a snapshot
    pub fn insert_snapshot(&self, snapshot: &SnapshotRecord) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            "INSERT INTO state_snapshots
             (id, scope, name, created_at, expires_at, importance, compressed, size_bytes, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                snapshot.id,
                snapshot.scope,
                snapshot.name,
                to_millis(snapshot.created_at),
                snapshot.expires_at.map(to_millis),
                snapshot.importance,
                snapshot.compressed,
                snapshot.size_bytes as i64,
                snapshot.payload,
            ],
        )?;
        Ok(())
    }

    /// Get snapshot (with payload) by ID
    pub fn get_snapshot(&self, id: &str) -> Result<Option<SnapshotRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let sql = format!(
            "SELECT {}, payload FROM state_snapshots WHERE id = ?1",
            SUMMARY_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![id], |row| {
                let summary = Self::map_snapshot_summary(row)?;
                Ok(SnapshotRecord {
                    id: summary.id,
                    scope: summary.scope,
                    name: summary.name,
                    created_at: summary.created_at,
                    expires_at: summary.expires_at,
                    importance: summary.importance,
                    compressed: summary.compressed,
                    size_bytes: summary.size_bytes,
                    payload: row.get(8)?,
                })
            })
            .optional()?)
    }

    /// List snapshot summaries, newest first, optionally for one scope
    pub fn list_snapshots(&self, scope: Option<&str>) -> Result<Vec<SnapshotSummary>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let snapshots = if let Some(scope) = scope {
            let sql = format!(
                "SELECT {} FROM state_snapshots WHERE scope = ?1
                 ORDER BY created_at DESC, id DESC",
                SUMMARY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![scope], Self::map_snapshot_summary)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let sql = format!(
                "SELECT {} FROM state_snapshots ORDER BY created_at DESC, id DESC",
                SUMMARY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map([], Self::map_snapshot_summary)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(snapshots)
    }

    /// Delete snapshots by ID. Returns rows removed.
    pub fn delete_snapshots(&self, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM state_snapshots WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn map_snapshot_summary(row: &Row<'_>) -> rusqlite::Result<SnapshotSummary> {
        let size_bytes: i64 = row.get(7)?;
        Ok(SnapshotSummary {
            id: row.get(0)?,
            scope: row.get(1)?,
            name: row.get(2)?,
            created_at: from_millis(row.get(3)?),
            expires_at: row.get::<_, Option<i64>>(4)?.map(from_millis),
            importance: row.get(5)?,
            compressed: row.get(6)?,
            size_bytes: size_bytes.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate_snapshot_schema().unwrap();
        db
    }

    fn snapshot(id: &str, scope: &str, age_mins: i64) -> SnapshotRecord {
        SnapshotRecord {
            id: id.to_string(),
            scope: scope.to_string(),
            name: format!("snap {}", id),
            created_at: Utc::now() - Duration::minutes(age_mins),
            expires_at: None,
            importance: 0.5,
            compressed: false,
            size_bytes: 2,
            payload: b"{}".to_vec(),
        }
    }

    #[test]
    fn test_insert_get_list_delete() {
        let db = test_db();
        db.insert_snapshot(&snapshot("s1", "alpha", 10)).unwrap();
        db.insert_snapshot(&snapshot("s2", "alpha", 5)).unwrap();
        db.insert_snapshot(&snapshot("s3", "beta", 1)).unwrap();

        let loaded = db.get_snapshot("s1").unwrap().unwrap();
        assert_eq!(loaded.payload, b"{}".to_vec());
        assert_eq!(loaded.scope, "alpha");

        let alpha = db.list_snapshots(Some("alpha")).unwrap();
        let ids: Vec<_> = alpha.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
        assert_eq!(db.list_snapshots(None).unwrap().len(), 3);

        assert_eq!(db.delete_snapshots(&["s1".into(), "nope".into()]).unwrap(), 1);
        assert!(db.get_snapshot("s1").unwrap().is_none());
    }
}
