use crate::error::Result;
use crate::store::MemoryStore;
use crate::types::{
    AccessLogEntry, Association, ConsolidationLogEntry, Memory, MemoryId, MemoryKind,
    WorkingMemorySlot,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence contract consumed by the cognitive core
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn backend_name(&self) -> &'static str;

    // ─── Memories ──────────────────────────────────────────────────────────
    async fn get_memory(&self, id: &str) -> Result<Option<Memory>>;
    /// Memories whose id starts with `prefix`
    async fn find_by_id_prefix(&self, prefix: &str) -> Result<Vec<Memory>>;
    /// All memories, newest first, optionally of one kind
    async fn all_memories(&self, kind: Option<MemoryKind>) -> Result<Vec<Memory>>;
    /// Context-prefix matches, highest cached activation first
    async fn memories_by_context(
        &self,
        context_prefix: &str,
        kind: Option<MemoryKind>,
        limit: usize,
    ) -> Result<Vec<Memory>>;
    /// Highest cached activation first
    async fn top_by_activation(
        &self,
        kind: Option<MemoryKind>,
        context_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>>;
    /// Non-procedural memories below `threshold`
    async fn memories_below_activation(&self, threshold: f64) -> Result<Vec<Memory>>;
    async fn memories_above_activation(&self, threshold: f64) -> Result<Vec<Memory>>;
    /// Insert a memory together with its first access, atomically
    async fn insert_memory(&self, memory: &Memory, first_access: &AccessLogEntry) -> Result<()>;
    async fn update_memory(&self, memory: &Memory) -> Result<()>;
    /// Delete a memory with its access log and edges
    async fn delete_memory(&self, id: &str) -> Result<bool>;
    async fn count_memories(&self, kind: Option<MemoryKind>) -> Result<i64>;

    // ─── Access log ────────────────────────────────────────────────────────
    async fn log_access(&self, entry: &AccessLogEntry) -> Result<()>;
    /// Access times, oldest first
    async fn access_timestamps(&self, memory_id: &str) -> Result<Vec<DateTime<Utc>>>;
    async fn access_log(&self, memory_id: &str) -> Result<Vec<AccessLogEntry>>;

    // ─── Associations ──────────────────────────────────────────────────────
    /// The edge between `a` and `b` in either direction
    async fn find_association(&self, a: &str, b: &str) -> Result<Option<Association>>;
    /// Edges touching `memory_id`, strongest first
    async fn associations_of(&self, memory_id: &str) -> Result<Vec<Association>>;
    async fn associations_from(&self, source_id: &str) -> Result<Vec<Association>>;
    /// Insert, or update strength and type of the existing edge for the pair
    async fn upsert_association(&self, association: &Association) -> Result<()>;
    async fn update_association_strength(&self, id: &str, strength: f64) -> Result<()>;
    async fn fan_count(&self, memory_id: &str) -> Result<usize>;
    async fn delete_weak_associations(&self, min_strength: f64) -> Result<u64>;
    async fn count_associations(&self) -> Result<i64>;

    // ─── Working memory ────────────────────────────────────────────────────
    async fn working_memory(&self) -> Result<Vec<WorkingMemorySlot>>;
    async fn put_working_memory_slot(&self, slot: &WorkingMemorySlot) -> Result<()>;
    async fn remove_working_memory_slot(&self, slot: u32) -> Result<()>;
    async fn clear_working_memory(&self) -> Result<u64>;

    // ─── Consolidation log ─────────────────────────────────────────────────
    async fn log_consolidation(&self, entry: &ConsolidationLogEntry) -> Result<()>;
    async fn last_consolidation(&self) -> Result<Option<ConsolidationLogEntry>>;

    // ─── Search and batches ────────────────────────────────────────────────
    /// Ranked lexical matches for `query`
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryId>>;
    /// Set `chunk_id` on every member of every chunk, atomically
    async fn assign_chunks(&self, chunks: &[(String, Vec<MemoryId>)]) -> Result<()>;
}

#[async_trait]
impl StorageBackend for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        self.load(id).await
    }

    async fn find_by_id_prefix(&self, prefix: &str) -> Result<Vec<Memory>> {
        self.find_by_id_prefix(prefix).await
    }

    async fn all_memories(&self, kind: Option<MemoryKind>) -> Result<Vec<Memory>> {
        self.get_all(kind).await
    }

    async fn memories_by_context(
        &self,
        context_prefix: &str,
        kind: Option<MemoryKind>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        self.get_by_context(context_prefix, kind, limit).await
    }

    async fn top_by_activation(
        &self,
        kind: Option<MemoryKind>,
        context_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        self.get_top_by_activation(kind, context_prefix, limit).await
    }

    async fn memories_below_activation(&self, threshold: f64) -> Result<Vec<Memory>> {
        self.get_below_activation(threshold).await
    }

    async fn memories_above_activation(&self, threshold: f64) -> Result<Vec<Memory>> {
        self.get_above_activation(threshold).await
    }

    async fn insert_memory(&self, memory: &Memory, first_access: &AccessLogEntry) -> Result<()> {
        self.save(memory, first_access).await
    }

    async fn update_memory(&self, memory: &Memory) -> Result<()> {
        self.update(memory).await
    }

    async fn delete_memory(&self, id: &str) -> Result<bool> {
        self.delete(id).await
    }

    async fn count_memories(&self, kind: Option<MemoryKind>) -> Result<i64> {
        self.count(kind).await
    }

    async fn log_access(&self, entry: &AccessLogEntry) -> Result<()> {
        self.record_access(entry).await
    }

    async fn access_timestamps(&self, memory_id: &str) -> Result<Vec<DateTime<Utc>>> {
        self.get_access_timestamps(memory_id).await
    }

    async fn access_log(&self, memory_id: &str) -> Result<Vec<AccessLogEntry>> {
        self.get_access_log(memory_id).await
    }

    async fn find_association(&self, a: &str, b: &str) -> Result<Option<Association>> {
        self.get_association_between(a, b).await
    }

    async fn associations_of(&self, memory_id: &str) -> Result<Vec<Association>> {
        self.get_associations(memory_id).await
    }

    async fn associations_from(&self, source_id: &str) -> Result<Vec<Association>> {
        self.get_associations_from(source_id).await
    }

    async fn upsert_association(&self, association: &Association) -> Result<()> {
        self.create_association(association).await
    }

    async fn update_association_strength(&self, id: &str, strength: f64) -> Result<()> {
        self.set_association_strength(id, strength).await
    }

    async fn fan_count(&self, memory_id: &str) -> Result<usize> {
        self.get_fan_count(memory_id).await
    }

    async fn delete_weak_associations(&self, min_strength: f64) -> Result<u64> {
        self.delete_weak_associations(min_strength).await
    }

    async fn count_associations(&self) -> Result<i64> {
        self.count_associations().await
    }

    async fn working_memory(&self) -> Result<Vec<WorkingMemorySlot>> {
        self.get_working_memory().await
    }

    async fn put_working_memory_slot(&self, slot: &WorkingMemorySlot) -> Result<()> {
        self.put_working_memory_slot(slot).await
    }

    async fn remove_working_memory_slot(&self, slot: u32) -> Result<()> {
        self.remove_working_memory_slot(slot).await
    }

    async fn clear_working_memory(&self) -> Result<u64> {
        self.clear_working_memory().await
    }

    async fn log_consolidation(&self, entry: &ConsolidationLogEntry) -> Result<()> {
        self.log_consolidation(entry).await
    }

    async fn last_consolidation(&self) -> Result<Option<ConsolidationLogEntry>> {
        self.get_last_consolidation().await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryId>> {
        self.search_ids(query, limit)
    }

    async fn assign_chunks(&self, chunks: &[(String, Vec<MemoryId>)]) -> Result<()> {
        self.assign_chunks(chunks).await
    }
}
