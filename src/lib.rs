//! # Engram - Cognitive Memory Engine for AI Agents
//!
//! Memories decay with time and strengthen with use, link into a weighted
//! association graph, and are periodically consolidated: rehearsed memories
//! are strengthened, faded ones pruned, and recurring episodes summarized
//! into semantic facts.
//!
//! ```no_run
//! use engram::{CognitiveConfig, EncodeInput, Emotion, MemoryEngine, MemoryKind, RecallOptions};
//!
//! # async fn demo() -> engram::Result<()> {
//! let engine = MemoryEngine::open(CognitiveConfig::default()).await?;
//! engine
//!     .encode(&EncodeInput::new("Prod outage after deploy", MemoryKind::Episodic)
//!         .with_emotion(Emotion::Anxiety))
//!     .await?;
//! let _hits = engine.recall("outage", &RecallOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod associations;
pub mod chunking;
pub mod config;
pub mod consolidation;
pub mod encoder;
pub mod error;
pub mod forgetting;
pub mod keywords;
pub mod recall;
pub mod reconsolidation;
pub mod search;
pub mod storage_backend;
pub mod store;
pub mod types;
pub mod working_memory;

#[cfg(test)]
mod testing;

pub use activation::{ActivationBreakdown, GaussianNoise, NoiseSource, ZeroNoise};
pub use associations::SpreadTarget;
pub use chunking::DisjointSet;
pub use config::{CognitiveConfig, CognitiveConfigBuilder};
pub use consolidation::ConsolidationReport;
pub use error::{MemoryError, Result};
pub use forgetting::{ebbinghaus_retention, memory_strength, RefreshReport};
pub use recall::{FocusLoad, RecallOptions};
pub use reconsolidation::ReconsolidationContext;
pub use search::MemorySearch;
pub use storage_backend::StorageBackend;
pub use store::MemoryStore;
pub use types::{
    AccessLogEntry, AccessType, ArousalTier, Association, AssociationType, Chunk,
    ConsolidationLogEntry, EncodeInput, Emotion, Memory, MemoryId, MemoryKind, RecallResult,
    WorkingMemorySlot,
};
pub use working_memory::{FocusUtilization, PushOutcome, WorkingMemoryBuffer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default number of hits loaded by [`MemoryEngine::recall_to_focus`]
const FOCUS_RECALL_LIMIT: usize = 3;

/// Counts across the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub episodic: i64,
    pub semantic: i64,
    pub procedural: i64,
    pub associations: i64,
    pub working_memory: usize,
    /// Memories below the retrieval threshold
    pub at_risk: usize,
    pub last_consolidation: Option<ConsolidationLogEntry>,
}

/// Everything known about one memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInspection {
    pub memory: Memory,
    pub access_log: Vec<AccessLogEntry>,
    pub associations: Vec<Association>,
}

/// Main memory engine
///
/// Holds the storage backend, tunables and noise source. There is no global
/// state; every operation goes through an engine value.
pub struct MemoryEngine {
    store: Arc<dyn StorageBackend>,
    config: CognitiveConfig,
    noise: Arc<dyn NoiseSource>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("backend", &self.store.backend_name())
            .field("db_path", &self.config.db_path)
            .finish()
    }
}

impl MemoryEngine {
    /// Open (or create) the SQLite store at the configured `db_path`
    pub async fn open(config: CognitiveConfig) -> Result<Self> {
        config.validate()?;
        let path = config.resolved_db_path();
        let store = MemoryStore::open(&path).await?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Engine over a private in-memory store
    pub async fn in_memory(config: CognitiveConfig) -> Result<Self> {
        config.validate()?;
        let store = MemoryStore::connect_in_memory().await?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Engine over any storage backend, with Gaussian noise
    pub fn with_store(store: Arc<dyn StorageBackend>, config: CognitiveConfig) -> Self {
        Self {
            store,
            config,
            noise: Arc::new(GaussianNoise),
            sequence: AtomicU64::new(0),
        }
    }

    /// Replace the noise source
    pub fn with_noise(mut self, noise: Arc<dyn NoiseSource>) -> Self {
        self.noise = noise;
        self
    }

    pub fn config(&self) -> &CognitiveConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn StorageBackend {
        self.store.as_ref()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    // ─── Encoding ─────────────────────────────────────────────────────────

    pub async fn encode(&self, input: &EncodeInput) -> Result<Memory> {
        self.encode_at(input, Utc::now()).await
    }

    /// Encode as of `now`
    pub async fn encode_at(&self, input: &EncodeInput, now: DateTime<Utc>) -> Result<Memory> {
        let memory = encoder::encode(
            self.store(),
            input,
            &self.config,
            now,
            self.next_sequence(),
        )
        .await?;
        tracing::info!("Encoded {} memory {}", memory.kind, memory.id);
        Ok(memory)
    }

    pub async fn encode_procedural(&self, content: &str, context: Option<&str>) -> Result<Memory> {
        encoder::encode_procedural(
            self.store(),
            content,
            context,
            &self.config,
            Utc::now(),
            self.next_sequence(),
        )
        .await
    }

    /// All procedural memories, newest first
    pub async fn skills(&self) -> Result<Vec<Memory>> {
        encoder::skills(self.store()).await
    }

    pub async fn promote_to_skill(&self, id: &str) -> Result<Option<Memory>> {
        encoder::promote_to_skill(self.store(), id).await
    }

    // ─── Retrieval ────────────────────────────────────────────────────────

    /// Cue-driven recall, ranked by activation
    pub async fn recall(&self, cue: &str, options: &RecallOptions) -> Result<Vec<RecallResult>> {
        let results = recall::recall(
            self.store(),
            cue,
            &self.config,
            options,
            self.noise.as_ref(),
        )
        .await?;
        tracing::info!("Recall for {:?} returned {} memories", cue, results.len());
        Ok(results)
    }

    /// Recall the top three hits into working memory
    pub async fn recall_to_focus(&self, cue: &str) -> Result<FocusLoad> {
        self.recall_to_focus_with(cue, &RecallOptions::default().limit(FOCUS_RECALL_LIMIT))
            .await
    }

    pub async fn recall_to_focus_with(
        &self,
        cue: &str,
        options: &RecallOptions,
    ) -> Result<FocusLoad> {
        recall::recall_to_focus(
            self.store(),
            cue,
            &self.config,
            options,
            self.noise.as_ref(),
        )
        .await
    }

    /// Look up a memory by exact id
    pub async fn memory(&self, id: &str) -> Result<Option<Memory>> {
        self.store.get_memory(id).await
    }

    /// A memory with its access history and edges, found by exact id or by
    /// an id prefix matching exactly one memory
    pub async fn inspect(&self, id_or_prefix: &str) -> Result<Option<MemoryInspection>> {
        let memory = match self.store.get_memory(id_or_prefix).await? {
            Some(memory) => memory,
            None => {
                let mut matches = self.store.find_by_id_prefix(id_or_prefix).await?;
                match matches.len() {
                    0 => return Ok(None),
                    1 => matches.remove(0),
                    n => {
                        return Err(MemoryError::Validation(format!(
                            "id prefix {id_or_prefix:?} matches {n} memories"
                        )))
                    }
                }
            }
        };

        let access_log = self.store.access_log(&memory.id).await?;
        let associations = self.store.associations_of(&memory.id).await?;
        Ok(Some(MemoryInspection {
            memory,
            access_log,
            associations,
        }))
    }

    // ─── Association Graph ────────────────────────────────────────────────

    /// Link or strengthen every pair of memories recalled together
    pub async fn record_co_recall(&self, memory_ids: &[MemoryId]) -> Result<Vec<Association>> {
        associations::record_co_recall(self.store(), memory_ids, &self.config, Utc::now()).await
    }

    pub async fn spreading_activation(&self, source_id: &str) -> Result<Vec<SpreadTarget>> {
        associations::spreading_activation(self.store(), source_id, &self.config).await
    }

    // ─── Working Memory ───────────────────────────────────────────────────

    pub async fn push_focus(&self, content: &str, memory_ref: Option<MemoryId>) -> Result<PushOutcome> {
        working_memory::push_focus(self.store(), &self.config, content, memory_ref, Utc::now())
            .await
    }

    pub async fn pop_focus(&self) -> Result<Option<WorkingMemorySlot>> {
        working_memory::pop_focus(self.store(), &self.config).await
    }

    /// Occupied slots in slot order
    pub async fn get_focus(&self) -> Result<Vec<WorkingMemorySlot>> {
        let buffer = working_memory::load_focus(self.store(), &self.config).await?;
        Ok(buffer.slots().to_vec())
    }

    pub async fn clear_focus(&self) -> Result<usize> {
        working_memory::clear_focus(self.store()).await
    }

    pub async fn focus_utilization(&self) -> Result<FocusUtilization> {
        let buffer = working_memory::load_focus(self.store(), &self.config).await?;
        Ok(buffer.utilization())
    }

    // ─── Maintenance ──────────────────────────────────────────────────────

    pub async fn consolidate(&self) -> Result<ConsolidationReport> {
        self.consolidate_at(Utc::now()).await
    }

    pub async fn consolidate_at(&self, now: DateTime<Utc>) -> Result<ConsolidationReport> {
        consolidation::consolidate(self.store(), &self.config, now, &self.sequence).await
    }

    pub async fn discover_chunks(&self) -> Result<Vec<Chunk>> {
        let chunks = chunking::discover_chunks(self.store(), &self.config).await?;
        tracing::info!("Discovered {} chunks", chunks.len());
        Ok(chunks)
    }

    pub async fn chunk_members(&self, chunk_id: &str) -> Result<Vec<Memory>> {
        chunking::chunk_members(self.store(), chunk_id).await
    }

    /// Blend the recall context into a stored memory and persist it.
    /// `None` for unknown ids.
    pub async fn reconsolidate(
        &self,
        id: &str,
        context: &ReconsolidationContext,
    ) -> Result<Option<Memory>> {
        let Some(memory) = self.store.get_memory(id).await? else {
            return Ok(None);
        };

        let updated = reconsolidation::reconsolidate(memory, context, &self.config)?;
        self.store.update_memory(&updated).await?;
        tracing::debug!(
            "Reconsolidated {} (count {})",
            updated.id,
            updated.reconsolidation_count
        );
        Ok(Some(updated))
    }

    pub async fn refresh_activations(&self) -> Result<RefreshReport> {
        forgetting::refresh_activations(self.store(), &self.config, Utc::now()).await
    }

    /// Store-wide counts; refreshes cached activations first
    pub async fn stats(&self) -> Result<MemoryStats> {
        let refresh = self.refresh_activations().await?;

        Ok(MemoryStats {
            episodic: self.store.count_memories(Some(MemoryKind::Episodic)).await?,
            semantic: self.store.count_memories(Some(MemoryKind::Semantic)).await?,
            procedural: self.store.count_memories(Some(MemoryKind::Procedural)).await?,
            associations: self.store.count_associations().await?,
            working_memory: self.store.working_memory().await?.len(),
            at_risk: refresh.at_risk,
            last_consolidation: self.store.last_consolidation().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::secs;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    async fn engine() -> MemoryEngine {
        init_tracing();
        MemoryEngine::in_memory(CognitiveConfig::default())
            .await
            .unwrap()
            .with_noise(Arc::new(ZeroNoise))
    }

    #[tokio::test]
    async fn anxious_memory_outranks_neutral() {
        let engine = engine().await;
        let calm = engine
            .encode_at(
                &EncodeInput::new("outage in eu-west resolved", MemoryKind::Episodic),
                secs(0),
            )
            .await
            .unwrap();
        let anxious = engine
            .encode_at(
                &EncodeInput::new("outage paged the whole team", MemoryKind::Episodic)
                    .with_emotion(Emotion::Anxiety),
                secs(0),
            )
            .await
            .unwrap();

        let results = engine
            .recall("outage", &RecallOptions::default().deterministic().at(secs(10)))
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.memory.id.as_str()).collect();
        assert_eq!(ids, vec![anxious.id.as_str(), calm.id.as_str()]);
        assert!(results[0].latency < results[1].latency);
    }

    #[tokio::test]
    async fn incident_memories_survive_consolidation_and_recall_together() {
        let engine = engine().await;
        let at = |ms: i64| crate::testing::t0() + chrono::Duration::milliseconds(ms);

        let mut ids = Vec::new();
        for (ms, content) in [
            (0, "user reported checkout errors"),
            (1_000, "traced to pool exhaustion"),
            (2_000, "fixed by pool resize"),
        ] {
            let input = EncodeInput::new(content, MemoryKind::Episodic).with_context("incident:checkout");
            ids.push(engine.encode_at(&input, at(ms)).await.unwrap().id);
        }

        // Encoding linked each memory to the earlier ones in its context
        for (earlier, later) in [(0, 1), (1, 2), (0, 2)] {
            let edge = engine
                .store()
                .find_association(&ids[earlier], &ids[later])
                .await
                .unwrap()
                .unwrap();
            assert_eq!(edge.association_type, AssociationType::Causal);
            assert_eq!(edge.source_id, ids[earlier]);
        }

        let report = engine.consolidate_at(at(5_000)).await.unwrap();
        assert_eq!(report.pruned, 0);

        let results = engine
            .recall("checkout errors", &RecallOptions::default().deterministic().at(at(10_000)))
            .await
            .unwrap();
        let mut recalled: Vec<&str> = results.iter().map(|r| r.memory.id.as_str()).collect();
        recalled.sort();
        let mut expected: Vec<&str> = ids.iter().map(String::as_str).collect();
        expected.sort();
        assert_eq!(recalled, expected);
        assert!(results.iter().all(|r| r.activation.is_finite()));
        assert!(results.iter().all(|r| r.spreading_activation > 0.0));
    }

    #[tokio::test]
    async fn focus_round_trip() {
        let engine = engine().await;
        engine
            .encode(&EncodeInput::new("grafana dashboard for latency", MemoryKind::Semantic))
            .await
            .unwrap();

        let load = engine.recall_to_focus("grafana").await.unwrap();
        assert_eq!(load.loaded.len(), 1);
        assert_eq!(load.utilization.used, 1);

        engine.push_focus("check p99", None).await.unwrap();
        let focus = engine.get_focus().await.unwrap();
        assert_eq!(focus.len(), 2);
        assert_eq!(focus[0].memory_ref.as_ref(), Some(&load.loaded[0]));

        assert_eq!(engine.pop_focus().await.unwrap().unwrap().content, "check p99");
        assert_eq!(engine.clear_focus().await.unwrap(), 1);
        assert_eq!(engine.focus_utilization().await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn reconsolidate_persists_and_ignores_unknown_ids() {
        let engine = engine().await;
        let m = engine
            .encode(&EncodeInput::new("standup moved to 10am", MemoryKind::Episodic).with_context("team"))
            .await
            .unwrap();

        let ctx = ReconsolidationContext::default().with_context("calendar");
        let updated = engine.reconsolidate(&m.id, &ctx).await.unwrap().unwrap();
        assert_eq!(updated.context.as_deref(), Some("team, calendar"));

        let stored = engine.memory(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.reconsolidation_count, 1);
        assert_eq!(stored.context.as_deref(), Some("team, calendar"));

        assert!(engine.reconsolidate("epi:missing:000000", &ctx).await.unwrap().is_none());

        // Bad input is rejected before anything is written
        let bad = ReconsolidationContext::default().with_emotion(Emotion::Joy, Some(f64::NAN));
        assert!(matches!(
            engine.reconsolidate(&m.id, &bad).await,
            Err(MemoryError::Validation(_))
        ));
        let stored = engine.memory(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.reconsolidation_count, 1);
        assert_eq!(stored.emotion, Emotion::Neutral);
    }

    #[tokio::test]
    async fn stats_and_inspect() {
        let engine = engine().await;
        let a = engine
            .encode(&EncodeInput::new("postgres vacuum tuning", MemoryKind::Episodic).with_context("db"))
            .await
            .unwrap();
        let b = engine
            .encode(&EncodeInput::new("postgres autovacuum settings", MemoryKind::Semantic).with_context("db"))
            .await
            .unwrap();
        engine.encode_procedural("run EXPLAIN ANALYZE first", Some("db")).await.unwrap();
        engine.record_co_recall(&[a.id.clone(), b.id.clone()]).await.unwrap();
        engine.consolidate().await.unwrap();

        let stats = engine.stats().await.unwrap();
        assert_eq!((stats.episodic, stats.semantic, stats.procedural), (1, 1, 1));
        assert!(stats.associations >= 1);
        assert_eq!(stats.at_risk, 0);
        assert!(stats.last_consolidation.is_some());

        let inspection = engine.inspect(&a.id).await.unwrap().unwrap();
        assert_eq!(inspection.memory.id, a.id);
        assert_eq!(inspection.access_log[0].access_type, AccessType::Encode);
        assert!(inspection
            .associations
            .iter()
            .any(|edge| edge.other_end(&a.id) == b.id));

        // "epi:" is unique here; "" is not
        let by_prefix = engine.inspect("epi:").await.unwrap().unwrap();
        assert_eq!(by_prefix.memory.id, a.id);
        assert!(matches!(engine.inspect("").await, Err(MemoryError::Validation(_))));
        assert!(engine.inspect("sem:nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn spreading_and_chunks_through_the_engine() {
        let engine = engine().await;
        let ids: Vec<MemoryId> = {
            let mut ids = Vec::new();
            for content in ["kafka consumer lag", "kafka partition rebalance"] {
                ids.push(
                    engine
                        .encode(&EncodeInput::new(content, MemoryKind::Episodic))
                        .await
                        .unwrap()
                        .id,
                );
            }
            ids
        };
        // 0.3 on creation, then +0.1 per repeat
        for _ in 0..5 {
            engine.record_co_recall(&ids).await.unwrap();
        }

        let reached = engine.spreading_activation(&ids[0]).await.unwrap();
        assert_eq!(reached.len(), 1);
        assert_eq!(reached[0].memory_id, ids[1]);

        let chunks = engine.discover_chunks().await.unwrap();
        assert_eq!(chunks.len(), 1);
        let members = engine.chunk_members(&chunks[0].id).await.unwrap();
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn on_disk_engine_reopens_with_search() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let config = CognitiveConfigBuilder::new()
            .db_path(dir.path().join("nested").join("memory.db"))
            .build();

        let id = {
            let engine = MemoryEngine::open(config.clone()).await.unwrap();
            engine
                .encode(&EncodeInput::new("terraform state lock stuck", MemoryKind::Episodic))
                .await
                .unwrap()
                .id
        };

        let engine = MemoryEngine::open(config)
            .await
            .unwrap()
            .with_noise(Arc::new(ZeroNoise));
        let results = engine
            .recall("terraform", &RecallOptions::default())
            .await
            .unwrap();
        assert_eq!(results[0].memory.id, id);
        assert_eq!(results[0].memory.recall_count, 1);
    }
}
