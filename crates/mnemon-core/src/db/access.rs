//! Access event log (append-only).

use super::{Database, from_millis, json_column, to_millis};
use crate::error::{Error, Result};
use crate::types::{AccessCount, AccessEvent, ScoreComponents};
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};

impl Database {
    /// Append access events in one transaction
    pub fn record_access_events(&self, events: &[AccessEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO access_events (memory_id, timestamp, operation, components, latency_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for event in events {
                let components = event
                    .components
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                stmt.execute(params![
                    event.memory_id,
                    to_millis(event.timestamp),
                    event.operation,
                    components,
                    event.latency_ms.map(|ms| ms as i64),
                ])?;
            }
        }
        tx.commit()?;
        Ok(events.len())
    }

    /// Most recent events for one memory, newest first
    pub fn events_for_memory(&self, memory_id: &str, limit: usize) -> Result<Vec<AccessEvent>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, memory_id, timestamp, operation, components, latency_ms
             FROM access_events WHERE memory_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let events = stmt
            .query_map(params![memory_id, limit as i64], Self::map_access_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Recall/restore counts per memory since `since`, busiest first.
    ///
    /// Migration and consolidation events are system bookkeeping and not
    /// counted as accesses.
    pub fn access_counts_since(&self, since: DateTime<Utc>) -> Result<Vec<AccessCount>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT memory_id, COUNT(*), MAX(timestamp)
             FROM access_events
             WHERE timestamp >= ?1 AND operation IN ('recall', 'restore')
             GROUP BY memory_id
             ORDER BY COUNT(*) DESC, memory_id ASC",
        )?;
        let counts = stmt
            .query_map(params![to_millis(since)], |row| {
                let count: i64 = row.get(1)?;
                Ok(AccessCount {
                    memory_id: row.get(0)?,
                    count: count.max(0) as u64,
                    last_access: from_millis(row.get(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    /// Delete events older than `before`. This is the only way events are removed.
    pub fn prune_access_events(&self, before: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let deleted = conn.execute(
            "DELETE FROM access_events WHERE timestamp < ?1",
            params![to_millis(before)],
        )?;
        Ok(deleted)
    }

    /// Count all access events
    pub fn count_access_events(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM access_events", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn map_access_event(row: &Row<'_>) -> rusqlite::Result<AccessEvent> {
        let components: Option<String> = row.get(4)?;
        let components = match components {
            Some(text) => Some(json_column::<ScoreComponents>(4, &text)?),
            None => None,
        };
        Ok(AccessEvent {
            id: row.get(0)?,
            memory_id: row.get(1)?,
            timestamp: from_millis(row.get(2)?),
            operation: row.get(3)?,
            components,
            latency_ms: row.get::<_, Option<i64>>(5)?.map(|ms| ms.max(0) as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccessOperation;
    use chrono::Duration;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate_memory_schema().unwrap();
        db
    }

    #[test]
    fn test_record_and_read_events() {
        let db = test_db();
        let now = Utc::now();
        let components = ScoreComponents {
            semantic: 0.9,
            recency: 1.0,
            importance: 0.5,
            frequency: 0.0,
            total: 0.76,
        };
        db.record_access_events(&[
            AccessEvent::new("m1", AccessOperation::Recall, now - Duration::minutes(1))
                .with_components(components)
                .with_latency_ms(12),
            AccessEvent::new("m1", AccessOperation::Migrate, now),
        ])
        .unwrap();

        let events = db.events_for_memory("m1", 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].operation, AccessOperation::Migrate);
        assert_eq!(events[1].components, Some(components));
        assert_eq!(events[1].latency_ms, Some(12));
        assert!(events[1].id.is_some());
    }

    #[test]
    fn test_access_counts_ignore_system_operations() {
        let db = test_db();
        let now = Utc::now();
        db.record_access_events(&[
            AccessEvent::new("hot", AccessOperation::Recall, now),
            AccessEvent::new("hot", AccessOperation::Recall, now),
            AccessEvent::new("hot", AccessOperation::Restore, now),
            AccessEvent::new("cold", AccessOperation::Recall, now - Duration::days(10)),
            AccessEvent::new("sys", AccessOperation::Consolidate, now),
        ])
        .unwrap();

        let counts = db.access_counts_since(now - Duration::days(1)).unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].memory_id, "hot");
        assert_eq!(counts[0].count, 3);
    }

    #[test]
    fn test_prune_access_events() {
        let db = test_db();
        let now = Utc::now();
        db.record_access_events(&[
            AccessEvent::new("m1", AccessOperation::Recall, now - Duration::days(40)),
            AccessEvent::new("m1", AccessOperation::Recall, now),
        ])
        .unwrap();

        assert_eq!(db.prune_access_events(now - Duration::days(30)).unwrap(), 1);
        assert_eq!(db.count_access_events().unwrap(), 1);
    }
}
