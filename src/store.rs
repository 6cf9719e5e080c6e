//! Memory graph storage using SQLite

use crate::error::Result;
use crate::search::MemorySearch;
use crate::types::{
    ordered_pair, AccessLogEntry, Association, ConsolidationLogEntry, Memory, MemoryId,
    MemoryKind, WorkingMemorySlot,
};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;

const MEMORY_COLUMNS: &str = "id, kind, content, encoded_at, last_recalled_at, recall_count, \
     activation, emotion, emotion_weight, context, chunk_id, reconsolidation_count";

const ASSOCIATION_COLUMNS: &str =
    "id, source_id, target_id, strength, formed_at, association_type";

/// SQLite-backed memory store with a lexical index on the side
pub struct MemoryStore {
    pool: SqlitePool,
    search: MemorySearch,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("pool", &"<SqlitePool>")
            .field("search", &self.search)
            .finish()
    }
}

impl MemoryStore {
    /// Open (or create) the database at `path`, run migrations and rebuild
    /// the search index
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        tracing::info!("Opened memory database at {}", path.display());
        Self::from_pool(pool).await
    }

    /// Create an in-memory store for testing
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .create_if_missing(true)
            .foreign_keys(true);

        // A single connection that never idles out, or the database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        let store = Self {
            pool,
            search: MemorySearch::in_ram()?,
        };
        let memories = store.get_all(None).await?;
        store.search.reindex_all(&memories)?;
        Ok(store)
    }

    /// Get a reference to the SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ─── Memories ──────────────────────────────────────────────────────────

    /// Insert a memory and its first access in one transaction, then index it
    pub async fn save(&self, memory: &Memory, first_access: &AccessLogEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO memories ({MEMORY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&memory.id)
        .bind(memory.kind.as_str())
        .bind(&memory.content)
        .bind(millis(memory.encoded_at))
        .bind(memory.last_recalled_at.map(millis))
        .bind(memory.recall_count)
        .bind(memory.activation)
        .bind(memory.emotion.as_str())
        .bind(memory.emotion_weight)
        .bind(memory.context.as_deref())
        .bind(memory.chunk_id.as_deref())
        .bind(memory.reconsolidation_count)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO access_log (id, memory_id, accessed_at, access_type) VALUES (?, ?, ?, ?)",
        )
        .bind(&first_access.id)
        .bind(&first_access.memory_id)
        .bind(millis(first_access.accessed_at))
        .bind(first_access.access_type.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.search.index_memory(memory)?;
        Ok(())
    }

    /// Load a memory by ID
    pub async fn load(&self, id: &str) -> Result<Option<Memory>> {
        let row = sqlx::query(&format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_memory).transpose()
    }

    pub async fn find_by_id_prefix(&self, prefix: &str) -> Result<Vec<Memory>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories \
             WHERE substr(id, 1, length(?)) = ? ORDER BY id"
        ))
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_memory).collect()
    }

    /// All memories, newest first
    pub async fn get_all(&self, kind: Option<MemoryKind>) -> Result<Vec<Memory>> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories WHERE kind = ? \
                     ORDER BY encoded_at DESC, id"
                ))
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories ORDER BY encoded_at DESC, id"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_memory).collect()
    }

    /// Memories whose context starts with `context_prefix`
    pub async fn get_by_context(
        &self,
        context_prefix: &str,
        kind: Option<MemoryKind>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        self.get_top_by_activation(kind, Some(context_prefix), limit)
            .await
    }

    pub async fn get_top_by_activation(
        &self,
        kind: Option<MemoryKind>,
        context_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let mut conditions = Vec::new();
        if kind.is_some() {
            conditions.push("kind = ?");
        }
        if context_prefix.is_some() {
            conditions.push("context IS NOT NULL AND substr(context, 1, length(?)) = ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query_str = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories {where_clause} \
             ORDER BY activation DESC, id LIMIT ?"
        );

        let mut query = sqlx::query(&query_str);
        if let Some(kind) = kind {
            query = query.bind(kind.as_str());
        }
        if let Some(prefix) = context_prefix {
            query = query.bind(prefix).bind(prefix);
        }
        let rows = query
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_memory).collect()
    }

    /// Non-procedural memories with activation below `threshold`, weakest first
    pub async fn get_below_activation(&self, threshold: f64) -> Result<Vec<Memory>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories \
             WHERE activation < ? AND kind != 'procedural' ORDER BY activation ASC, id"
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_memory).collect()
    }

    /// Memories with activation above `threshold`, strongest first
    pub async fn get_above_activation(&self, threshold: f64) -> Result<Vec<Memory>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE activation > ? \
             ORDER BY activation DESC, id"
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_memory).collect()
    }

    /// Update the mutable fields of an existing memory
    pub async fn update(&self, memory: &Memory) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE memories
            SET kind = ?, last_recalled_at = ?, recall_count = ?, activation = ?,
                emotion = ?, emotion_weight = ?, context = ?, chunk_id = ?,
                reconsolidation_count = ?
            WHERE id = ?
            "#,
        )
        .bind(memory.kind.as_str())
        .bind(memory.last_recalled_at.map(millis))
        .bind(memory.recall_count)
        .bind(memory.activation)
        .bind(memory.emotion.as_str())
        .bind(memory.emotion_weight)
        .bind(memory.context.as_deref())
        .bind(memory.chunk_id.as_deref())
        .bind(memory.reconsolidation_count)
        .bind(&memory.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a memory; its access log and edges go with it
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM access_log WHERE memory_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM associations WHERE source_id = ? OR target_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM memories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.search.remove_memory(id)?;
        }
        Ok(deleted)
    }

    pub async fn count(&self, kind: Option<MemoryKind>) -> Result<i64> {
        let count: i64 = match kind {
            Some(kind) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM memories WHERE kind = ?")
                    .bind(kind.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM memories")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Ranked lexical search over memory content
    pub fn search_ids(&self, query: &str, limit: usize) -> Result<Vec<MemoryId>> {
        self.search.search(query, limit)
    }

    // ─── Access Log ────────────────────────────────────────────────────────

    /// Append one access
    pub async fn record_access(&self, entry: &AccessLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO access_log (id, memory_id, accessed_at, access_type) VALUES (?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.memory_id)
        .bind(millis(entry.accessed_at))
        .bind(entry.access_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_access_timestamps(&self, memory_id: &str) -> Result<Vec<DateTime<Utc>>> {
        let stamps: Vec<i64> = sqlx::query_scalar(
            "SELECT accessed_at FROM access_log WHERE memory_id = ? ORDER BY accessed_at ASC",
        )
        .bind(memory_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(stamps.into_iter().map(from_millis).collect())
    }

    pub async fn get_access_log(&self, memory_id: &str) -> Result<Vec<AccessLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, memory_id, accessed_at, access_type
            FROM access_log
            WHERE memory_id = ?
            ORDER BY accessed_at ASC
            "#,
        )
        .bind(memory_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_access).collect()
    }

    // ─── Associations ──────────────────────────────────────────────────────

    /// Create an association, or update strength and type of the pair's edge
    pub async fn create_association(&self, association: &Association) -> Result<()> {
        let (lo, hi) = association.pair_key();

        sqlx::query(
            r#"
            INSERT INTO associations
                (id, source_id, target_id, pair_lo, pair_hi, strength, formed_at, association_type)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(pair_lo, pair_hi) DO UPDATE SET
                strength = excluded.strength,
                association_type = excluded.association_type
            "#,
        )
        .bind(&association.id)
        .bind(&association.source_id)
        .bind(&association.target_id)
        .bind(lo)
        .bind(hi)
        .bind(association.strength)
        .bind(millis(association.formed_at))
        .bind(association.association_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_association_between(&self, a: &str, b: &str) -> Result<Option<Association>> {
        let (lo, hi) = ordered_pair(a, b);
        let row = sqlx::query(&format!(
            "SELECT {ASSOCIATION_COLUMNS} FROM associations WHERE pair_lo = ? AND pair_hi = ?"
        ))
        .bind(lo)
        .bind(hi)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_association).transpose()
    }

    /// Get all associations for a memory, strongest first
    pub async fn get_associations(&self, memory_id: &str) -> Result<Vec<Association>> {
        let rows = sqlx::query(&format!(
            "SELECT {ASSOCIATION_COLUMNS} FROM associations \
             WHERE source_id = ? OR target_id = ? ORDER BY strength DESC, id"
        ))
        .bind(memory_id)
        .bind(memory_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_association).collect()
    }

    pub async fn get_associations_from(&self, source_id: &str) -> Result<Vec<Association>> {
        let rows = sqlx::query(&format!(
            "SELECT {ASSOCIATION_COLUMNS} FROM associations \
             WHERE source_id = ? ORDER BY strength DESC, id"
        ))
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_association).collect()
    }

    pub async fn set_association_strength(&self, id: &str, strength: f64) -> Result<()> {
        sqlx::query("UPDATE associations SET strength = ? WHERE id = ?")
            .bind(strength)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Number of edges touching `memory_id`
    pub async fn get_fan_count(&self, memory_id: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM associations WHERE source_id = ? OR target_id = ?",
        )
        .bind(memory_id)
        .bind(memory_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub async fn delete_weak_associations(&self, min_strength: f64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM associations WHERE strength < ?")
            .bind(min_strength)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_associations(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM associations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ─── Working Memory ────────────────────────────────────────────────────

    pub async fn get_working_memory(&self) -> Result<Vec<WorkingMemorySlot>> {
        let rows = sqlx::query(
            "SELECT slot, memory_ref, content, pushed_at FROM working_memory ORDER BY slot",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<WorkingMemorySlot> {
                let slot: i64 = row.try_get("slot")?;
                Ok(WorkingMemorySlot {
                    slot: u32::try_from(slot).unwrap_or_default(),
                    memory_ref: row.try_get("memory_ref")?,
                    content: row.try_get("content")?,
                    pushed_at: from_millis(row.try_get("pushed_at")?),
                })
            })
            .collect()
    }

    pub async fn put_working_memory_slot(&self, slot: &WorkingMemorySlot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO working_memory (slot, memory_ref, content, pushed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(slot) DO UPDATE SET
                memory_ref = excluded.memory_ref,
                content = excluded.content,
                pushed_at = excluded.pushed_at
            "#,
        )
        .bind(i64::from(slot.slot))
        .bind(slot.memory_ref.as_deref())
        .bind(&slot.content)
        .bind(millis(slot.pushed_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn remove_working_memory_slot(&self, slot: u32) -> Result<()> {
        sqlx::query("DELETE FROM working_memory WHERE slot = ?")
            .bind(i64::from(slot))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn clear_working_memory(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM working_memory")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // ─── Consolidation Log ─────────────────────────────────────────────────

    pub async fn log_consolidation(&self, entry: &ConsolidationLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consolidation_log
                (id, ran_at, strengthened, pruned, facts_extracted, associations_discovered)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(millis(entry.ran_at))
        .bind(entry.strengthened)
        .bind(entry.pruned)
        .bind(entry.facts_extracted)
        .bind(entry.associations_discovered)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_last_consolidation(&self) -> Result<Option<ConsolidationLogEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, ran_at, strengthened, pruned, facts_extracted, associations_discovered
            FROM consolidation_log
            ORDER BY ran_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<ConsolidationLogEntry> {
            Ok(ConsolidationLogEntry {
                id: row.try_get("id")?,
                ran_at: from_millis(row.try_get("ran_at")?),
                strengthened: row.try_get("strengthened")?,
                pruned: row.try_get("pruned")?,
                facts_extracted: row.try_get("facts_extracted")?,
                associations_discovered: row.try_get("associations_discovered")?,
            })
        })
        .transpose()
    }

    // ─── Chunks ────────────────────────────────────────────────────────────

    /// Assign chunk ids to their members in a single transaction
    pub async fn assign_chunks(&self, chunks: &[(String, Vec<MemoryId>)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (chunk_id, members) in chunks {
            for member in members {
                sqlx::query("UPDATE memories SET chunk_id = ? WHERE id = ?")
                    .bind(chunk_id)
                    .bind(member)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Helper: Convert database row to Memory
fn row_to_memory(row: &SqliteRow) -> Result<Memory> {
    let kind: String = row.try_get("kind")?;
    let emotion: String = row.try_get("emotion")?;
    let last_recalled_at: Option<i64> = row.try_get("last_recalled_at")?;

    Ok(Memory {
        id: row.try_get("id")?,
        kind: kind.parse()?,
        content: row.try_get("content")?,
        encoded_at: from_millis(row.try_get("encoded_at")?),
        last_recalled_at: last_recalled_at.map(from_millis),
        recall_count: row.try_get("recall_count")?,
        activation: row.try_get("activation")?,
        emotion: emotion.parse()?,
        emotion_weight: row.try_get("emotion_weight")?,
        context: row.try_get("context")?,
        chunk_id: row.try_get("chunk_id")?,
        reconsolidation_count: row.try_get("reconsolidation_count")?,
    })
}

/// Helper: Convert database row to Association
fn row_to_association(row: &SqliteRow) -> Result<Association> {
    let association_type: String = row.try_get("association_type")?;

    Ok(Association {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        target_id: row.try_get("target_id")?,
        strength: row.try_get("strength")?,
        formed_at: from_millis(row.try_get("formed_at")?),
        association_type: association_type.parse()?,
    })
}

fn row_to_access(row: &SqliteRow) -> Result<AccessLogEntry> {
    let access_type: String = row.try_get("access_type")?;

    Ok(AccessLogEntry {
        id: row.try_get("id")?,
        memory_id: row.try_get("memory_id")?,
        accessed_at: from_millis(row.try_get("accessed_at")?),
        access_type: access_type.parse()?,
    })
}
