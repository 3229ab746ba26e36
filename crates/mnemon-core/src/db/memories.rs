//! Memory table operations.

use super::{Database, decode_embedding, encode_embedding, from_millis, json_column, to_millis};
use crate::error::{Error, Result};
use crate::metadata::validate_key;
use crate::types::{
    ExactQuery, Memory, MemoryContext, MemoryFilter, MemoryOrder, MemoryTier, MergeWrite,
    TierStats,
};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, ToSql, params};

/// Max bound parameters per `IN (...)` statement.
const ID_CHUNK: usize = 500;

fn select_columns(include_embeddings: bool) -> String {
    format!(
        "id, content, content_hash, context, importance, {}, tier, created_at, accessed_at,
         modified_at, access_count, tier_migrated_at, parent_memory_id, consolidated_from, metadata",
        if include_embeddings { "embedding" } else { "zeroblob(0)" }
    )
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl Database {
    // ─────────────────────────────────────────────────────────────────────────
    // Memory Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a complete memory record in a single transaction
    pub fn insert_memory(&self, memory: &Memory) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let consolidated_from = serde_json::to_string(&memory.consolidated_from)?;
        let metadata = serde_json::to_string(&memory.metadata)?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO memories
             (id, content, content_hash, context, importance, embedding, tier, created_at,
              accessed_at, modified_at, access_count, tier_migrated_at, parent_memory_id,
              consolidated_from, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                memory.id,
                memory.content,
                memory.content_hash,
                memory.context,
                memory.importance,
                encode_embedding(&memory.embedding),
                memory.tier,
                to_millis(memory.created_at),
                to_millis(memory.accessed_at),
                to_millis(memory.modified_at),
                memory.access_count as i64,
                memory.tier_migrated_at.map(to_millis),
                memory.parent_memory_id,
                consolidated_from,
                metadata,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Move a memory from `from` to `to`, only if it is still in `from`.
    ///
    /// Returns `false` when the row is gone or its tier changed since it was
    /// read. Downward moves are rejected.
    pub fn update_tier_if(
        &self,
        id: &str,
        from: MemoryTier,
        to: MemoryTier,
        migrated_at: DateTime<Utc>,
    ) -> Result<bool> {
        if to <= from {
            return Err(Error::validation(format!(
                "tier migration must move forward ({} -> {})",
                from, to
            )));
        }
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let changed = conn.execute(
            "UPDATE memories SET tier = ?1, tier_migrated_at = ?2 WHERE id = ?3 AND tier = ?4",
            params![to, to_millis(migrated_at), id, from],
        )?;
        Ok(changed == 1)
    }

    /// Bump access count and access time; content and `modified_at` are untouched
    pub fn touch_memories(&self, ids: &[String], at: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;
        let mut touched = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE memories
                 SET access_count = access_count + 1, accessed_at = MAX(accessed_at, ?1)
                 WHERE id = ?2",
            )?;
            for id in ids {
                touched += stmt.execute(params![to_millis(at), id])?;
            }
        }
        tx.commit()?;
        Ok(touched)
    }

    /// Commit a consolidation merge: update the survivor and delete absorbed rows.
    ///
    /// Fails with [`Error::Conflict`] (and changes nothing) when the survivor was
    /// modified or any absorbed row disappeared since the merge was planned.
    pub fn apply_merge(&self, merge: &MergeWrite) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let consolidated_from = serde_json::to_string(&merge.consolidated_from)?;

        let tx = conn.transaction()?;
        let current: Option<i64> = tx
            .query_row(
                "SELECT modified_at FROM memories WHERE id = ?1",
                params![merge.survivor_id],
                |row| row.get(0),
            )
            .optional()?;
        match current {
            None => {
                return Err(Error::Conflict(format!(
                    "survivor {} no longer exists",
                    merge.survivor_id
                )));
            }
            Some(ms) if ms != to_millis(merge.expected_modified_at) => {
                return Err(Error::Conflict(format!(
                    "survivor {} was modified concurrently",
                    merge.survivor_id
                )));
            }
            Some(_) => {}
        }

        for absorbed in &merge.absorbed_ids {
            let deleted = tx.execute("DELETE FROM memories WHERE id = ?1", params![absorbed])?;
            if deleted == 0 {
                return Err(Error::Conflict(format!(
                    "absorbed memory {} no longer exists",
                    absorbed
                )));
            }
        }

        tx.execute(
            "UPDATE memories
             SET content = ?1, content_hash = ?2, embedding = ?3, importance = ?4,
                 consolidated_from = ?5, modified_at = ?6
             WHERE id = ?7",
            params![
                merge.content,
                merge.content_hash,
                encode_embedding(&merge.embedding),
                merge.importance,
                consolidated_from,
                to_millis(merge.modified_at),
                merge.survivor_id,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a memory. Returns whether a row was removed.
    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let deleted = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Delete several memories in one transaction. Returns rows removed.
    pub fn delete_memories(&self, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM memories WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memory Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Get memory by ID (with embedding)
    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let sql = format!("SELECT {} FROM memories WHERE id = ?1", select_columns(true));
        Ok(conn
            .query_row(&sql, params![id], Self::map_memory)
            .optional()?)
    }

    /// Get several memories by ID (with embeddings). Missing ids are skipped;
    /// order is unspecified.
    pub fn get_memories(&self, ids: &[String]) -> Result<Vec<Memory>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut memories = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "SELECT {} FROM memories WHERE id IN ({})",
                select_columns(true),
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk.iter()), Self::map_memory)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            memories.extend(rows);
        }
        Ok(memories)
    }

    /// Find a memory with identical content in the same context
    pub fn find_by_hash(
        &self,
        content_hash: &str,
        context: MemoryContext,
    ) -> Result<Option<Memory>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let sql = format!(
            "SELECT {} FROM memories WHERE content_hash = ?1 AND context = ?2
             ORDER BY created_at ASC, id ASC LIMIT 1",
            select_columns(false)
        );
        Ok(conn
            .query_row(&sql, params![content_hash, context], Self::map_memory)
            .optional()?)
    }

    /// List memories matching a filter
    pub fn list_memories(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;

        let mut sql = format!(
            "SELECT {} FROM memories WHERE 1=1",
            select_columns(filter.include_embeddings)
        );
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(context) = filter.context {
            sql.push_str(" AND context = ?");
            params_vec.push(Box::new(context));
        }
        if !filter.tiers.is_empty() {
            sql.push_str(&format!(" AND tier IN ({})", placeholders(filter.tiers.len())));
            for tier in &filter.tiers {
                params_vec.push(Box::new(*tier));
            }
        }

        sql.push_str(match filter.order {
            MemoryOrder::CreatedAsc => " ORDER BY created_at ASC, id ASC",
            MemoryOrder::AccessedDesc => " ORDER BY accessed_at DESC, id ASC",
        });
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let memories = stmt
            .query_map(params_refs.as_slice(), Self::map_memory)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(memories)
    }

    /// Case-insensitive substring search over content or a metadata field.
    ///
    /// Ordered by importance, then most recent access, then id.
    pub fn search_exact(&self, query: &ExactQuery) -> Result<Vec<Memory>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;

        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
        let target = match &query.field {
            Some(field) => {
                validate_key(field)?;
                params_vec.push(Box::new(format!("$.\"{}\"", field)));
                "json_extract(metadata, ?)"
            }
            None => "content",
        };

        let mut sql = format!(
            "SELECT {} FROM memories WHERE lower({}) LIKE lower(?) ESCAPE '\\'",
            select_columns(true),
            target
        );
        params_vec.push(Box::new(format!("%{}%", escape_like(&query.pattern))));

        if let Some(context) = query.context {
            sql.push_str(" AND context = ?");
            params_vec.push(Box::new(context));
        }
        if !query.tiers.is_empty() {
            sql.push_str(&format!(" AND tier IN ({})", placeholders(query.tiers.len())));
            for tier in &query.tiers {
                params_vec.push(Box::new(*tier));
            }
        }
        sql.push_str(" ORDER BY importance DESC, accessed_at DESC, id ASC LIMIT ?");
        params_vec.push(Box::new(query.limit as i64));

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let memories = stmt
            .query_map(params_refs.as_slice(), Self::map_memory)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(memories)
    }

    /// Every (id, embedding) pair, for rebuilding the vector index
    pub fn all_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare("SELECT id, embedding FROM memories ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(1)?;
                Ok((row.get::<_, String>(0)?, decode_embedding(&bytes)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count all memories
    pub fn count_memories(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Count, age range and mean importance per tier. All tiers are present.
    pub fn tier_stats(&self) -> Result<Vec<TierStats>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT tier, COUNT(*), MIN(created_at), MAX(created_at), AVG(importance)
             FROM memories GROUP BY tier",
        )?;
        let found = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok(TierStats {
                    tier: row.get(0)?,
                    count: count.max(0) as u64,
                    oldest: row.get::<_, Option<i64>>(2)?.map(from_millis),
                    newest: row.get::<_, Option<i64>>(3)?.map(from_millis),
                    avg_importance: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(MemoryTier::ALL
            .into_iter()
            .map(|tier| {
                found
                    .iter()
                    .find(|s| s.tier == tier)
                    .cloned()
                    .unwrap_or(TierStats {
                        tier,
                        count: 0,
                        oldest: None,
                        newest: None,
                        avg_importance: 0.0,
                    })
            })
            .collect())
    }

    fn map_memory(row: &Row<'_>) -> rusqlite::Result<Memory> {
        let embedding: Vec<u8> = row.get(5)?;
        let access_count: i64 = row.get(10)?;
        let consolidated_from: String = row.get(13)?;
        let metadata: String = row.get(14)?;
        Ok(Memory {
            id: row.get(0)?,
            content: row.get(1)?,
            content_hash: row.get(2)?,
            context: row.get(3)?,
            importance: row.get(4)?,
            embedding: decode_embedding(&embedding),
            tier: row.get(6)?,
            created_at: from_millis(row.get(7)?),
            accessed_at: from_millis(row.get(8)?),
            modified_at: from_millis(row.get(9)?),
            access_count: access_count.max(0) as u64,
            tier_migrated_at: row.get::<_, Option<i64>>(11)?.map(from_millis),
            parent_memory_id: row.get(12)?,
            consolidated_from: json_column(13, &consolidated_from)?,
            metadata: json_column(14, &metadata)?,
        })
    }
}
