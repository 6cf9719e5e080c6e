//! Recall: cue-driven retrieval ranked by activation
//!
//! Candidates come from lexical search, working memory, context matches and
//! the most active memories. Spreading activation from those seeds pulls in
//! associated memories. Everything is then scored, thresholded and ranked,
//! and the winners are strengthened by logging a recall access.

use crate::activation::{compute_activation, fan_attenuated_strength, NoiseSource, ZeroNoise};
use crate::associations::spread_from;
use crate::config::CognitiveConfig;
use crate::error::Result;
use crate::storage_backend::StorageBackend;
use crate::types::{AccessLogEntry, AccessType, Memory, MemoryId, MemoryKind, RecallResult};
use crate::working_memory::{self, FocusUtilization};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Recall options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallOptions {
    pub limit: usize,
    pub kind: Option<MemoryKind>,
    /// Context prefix filter
    pub context: Option<String>,
    /// Use the association graph
    pub associative: bool,
    /// Score without noise
    pub deterministic: bool,
    pub now: Option<DateTime<Utc>>,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            kind: None,
            context: None,
            associative: true,
            deterministic: false,
            now: None,
        }
    }
}

impl RecallOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn context(mut self, prefix: impl Into<String>) -> Self {
        self.context = Some(prefix.into());
        self
    }

    pub fn associative(mut self, associative: bool) -> Self {
        self.associative = associative;
        self
    }

    pub fn deterministic(mut self) -> Self {
        self.deterministic = true;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn admits(&self, memory: &Memory) -> bool {
        self.kind.map_or(true, |k| memory.kind == k)
            && self
                .context
                .as_deref()
                .map_or(true, |prefix| memory.context_matches(prefix))
    }
}

/// Memories pulled into working memory by [`recall_to_focus`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusLoad {
    pub loaded: Vec<MemoryId>,
    pub utilization: FocusUtilization,
}

/// Candidate set under construction; `direct` marks seeds found by the cue
/// itself rather than only through working memory
#[derive(Default)]
struct Candidates {
    memories: HashMap<MemoryId, Memory>,
    direct: HashSet<MemoryId>,
}

impl Candidates {
    fn add(&mut self, memory: Memory, direct: bool) {
        if direct {
            self.direct.insert(memory.id.clone());
        }
        self.memories.entry(memory.id.clone()).or_insert(memory);
    }
}

async fn gather_candidates(
    store: &dyn StorageBackend,
    cue: &str,
    options: &RecallOptions,
) -> Result<Candidates> {
    let mut candidates = Candidates::default();
    let wide = options.limit.saturating_mul(2);

    for id in store.search(cue, wide).await? {
        if let Some(memory) = store.get_memory(&id).await? {
            if options.admits(&memory) {
                candidates.add(memory, true);
            }
        }
    }

    for slot in store.working_memory().await? {
        if let Some(id) = slot.memory_ref {
            if let Some(memory) = store.get_memory(&id).await? {
                candidates.add(memory, false);
            }
        }
    }

    if let Some(prefix) = options.context.as_deref() {
        for memory in store.memories_by_context(prefix, options.kind, wide).await? {
            candidates.add(memory, true);
        }
    }

    for memory in store
        .top_by_activation(options.kind, options.context.as_deref(), options.limit)
        .await?
    {
        candidates.add(memory, true);
    }

    Ok(candidates)
}

/// Sum of `strength · S(fan(other))` over the memory's direct edges
async fn direct_neighbour_spread(
    store: &dyn StorageBackend,
    memory_id: &str,
    config: &CognitiveConfig,
) -> Result<f64> {
    let mut sum = 0.0;
    for edge in store.associations_of(memory_id).await? {
        let fan = store.fan_count(edge.other_end(memory_id)).await?;
        sum += edge.strength * fan_attenuated_strength(config.max_spreading_activation, fan);
    }
    Ok(sum)
}

/// Retrieve memories for `cue`, best first.
///
/// Scores are `base + emotion_boost + spreading + noise`; anything at or
/// below `retrieval_threshold` is dropped and ties break by id. The returned
/// memories reflect the strengthening writeback, while each result's
/// `activation` is the score it was ranked by.
pub async fn recall(
    store: &dyn StorageBackend,
    cue: &str,
    config: &CognitiveConfig,
    options: &RecallOptions,
    noise: &dyn NoiseSource,
) -> Result<Vec<RecallResult>> {
    if options.limit == 0 {
        return Ok(Vec::new());
    }
    let now = options.now.unwrap_or_else(Utc::now);
    let noise: &dyn NoiseSource = if options.deterministic {
        &ZeroNoise
    } else {
        noise
    };

    let mut candidates = gather_candidates(store, cue, options).await?;
    if candidates.memories.is_empty() {
        return Ok(Vec::new());
    }

    let mut boosts: HashMap<MemoryId, f64> = HashMap::new();
    if options.associative {
        let mut seeds: Vec<(MemoryId, f64)> = candidates
            .memories
            .keys()
            .map(|id| {
                let weight = if candidates.direct.contains(id) {
                    1.0
                } else {
                    config.working_memory_priming_weight
                };
                (id.clone(), weight)
            })
            .collect();
        seeds.sort_by(|a, b| a.0.cmp(&b.0));

        for (seed, weight) in &seeds {
            let reached =
                spread_from(store, seed, *weight, config, config.recall_spreading_depth).await?;
            for target in reached {
                *boosts.entry(target.memory_id).or_insert(0.0) += target.boost;
            }
        }

        let mut reached_ids: Vec<&MemoryId> = boosts.keys().collect();
        reached_ids.sort();
        for id in reached_ids {
            if candidates.memories.contains_key(id) {
                continue;
            }
            if let Some(memory) = store.get_memory(id).await? {
                candidates.add(memory, false);
            }
        }
    }

    let mut scored = Vec::new();
    for memory in candidates.memories.into_values() {
        if !options.admits(&memory) {
            continue;
        }

        let spreading = if !options.associative {
            0.0
        } else if let Some(boost) = boosts.get(&memory.id) {
            *boost
        } else {
            direct_neighbour_spread(store, &memory.id, config).await?
        };

        let timestamps = store.access_timestamps(&memory.id).await?;
        let breakdown = compute_activation(
            &timestamps,
            now,
            config,
            spreading,
            memory.emotion_weight,
            noise,
        );
        if breakdown.activation <= config.retrieval_threshold {
            continue;
        }

        scored.push(RecallResult {
            memory,
            activation: breakdown.activation,
            spreading_activation: spreading,
            latency: breakdown.latency,
        });
    }

    scored.sort_by(|a, b| {
        b.activation
            .total_cmp(&a.activation)
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
    scored.truncate(options.limit);

    for result in &mut scored {
        strengthen(store, &mut result.memory, result.spreading_activation, config, now).await?;
    }

    tracing::debug!(
        "Recall for {:?} returned {} memories",
        cue,
        scored.len()
    );
    Ok(scored)
}

/// Retrieval practice: log the recall and refresh the cached activation
async fn strengthen(
    store: &dyn StorageBackend,
    memory: &mut Memory,
    spreading: f64,
    config: &CognitiveConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    store
        .log_access(&AccessLogEntry {
            id: Uuid::new_v4().to_string(),
            memory_id: memory.id.clone(),
            accessed_at: now,
            access_type: AccessType::Recall,
        })
        .await?;

    memory.recall_count += 1;
    memory.last_recalled_at = Some(now);

    let timestamps = store.access_timestamps(&memory.id).await?;
    memory.activation = compute_activation(
        &timestamps,
        now,
        config,
        spreading,
        memory.emotion_weight,
        &ZeroNoise,
    )
    .activation;

    store.update_memory(memory).await
}

/// Recall (default limit 3) and load every hit into working memory
pub async fn recall_to_focus(
    store: &dyn StorageBackend,
    cue: &str,
    config: &CognitiveConfig,
    options: &RecallOptions,
    noise: &dyn NoiseSource,
) -> Result<FocusLoad> {
    let now = options.now.unwrap_or_else(Utc::now);
    let options = RecallOptions {
        now: Some(now),
        ..options.clone()
    };

    let results = recall(store, cue, config, &options, noise).await?;

    let mut loaded = Vec::with_capacity(results.len());
    for result in &results {
        working_memory::push_focus(
            store,
            config,
            &result.memory.content,
            Some(result.memory.id.clone()),
            now,
        )
        .await?;
        loaded.push(result.memory.id.clone());
    }

    let utilization = working_memory::load_focus(store, config)
        .await?
        .utilization();
    Ok(FocusLoad {
        loaded,
        utilization,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::base_level;
    use crate::testing::{insert, memory, secs, store};
    use crate::types::{Association, AssociationType, Emotion};

    fn deterministic(now: DateTime<Utc>) -> RecallOptions {
        RecallOptions::default().deterministic().at(now)
    }

    #[tokio::test]
    async fn lexical_hit_is_scored_and_strengthened() {
        let store = store().await;
        let config = CognitiveConfig::default();
        insert(&store, &memory("a", "postgres vacuum tuning", secs(0))).await;

        let results = recall(&store, "vacuum", &config, &deterministic(secs(60)), &ZeroNoise)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert!((hit.activation - base_level(&[secs(0)], secs(60), 0.5)).abs() < 1e-9);
        assert_eq!(hit.spreading_activation, 0.0);
        assert_eq!(hit.memory.recall_count, 1);
        assert_eq!(hit.memory.last_recalled_at, Some(secs(60)));

        let stored = store.load("a").await.unwrap().unwrap();
        assert_eq!(stored.recall_count, 1);
        assert_eq!(store.access_timestamps("a").await.unwrap().len(), 2);
        // cached activation includes the new recall access
        assert!(stored.activation > hit.activation);
    }

    #[tokio::test]
    async fn emotion_breaks_otherwise_equal_candidates() {
        let store = store().await;
        let config = CognitiveConfig::default();
        let mut anxious = memory("a", "server outage postmortem", secs(0));
        anxious.emotion = Emotion::Anxiety;
        anxious.emotion_weight = 0.8;
        let calm = memory("b", "server outage postmortem", secs(0));
        insert(&store, &anxious).await;
        insert(&store, &calm).await;

        let results = recall(&store, "outage", &config, &deterministic(secs(10)), &ZeroNoise)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].memory.id, "a");
        assert!(results[0].activation > results[1].activation);
    }

    #[tokio::test]
    async fn decayed_memories_fall_below_threshold() {
        let store = store().await;
        let config = CognitiveConfig::default();
        insert(&store, &memory("a", "ancient history", secs(0))).await;

        let week = secs(7 * 86_400);
        let results = recall(&store, "ancient", &config, &deterministic(week), &ZeroNoise)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(store.access_timestamps("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn spreading_pulls_in_associated_memories() {
        let store = store().await;
        let config = CognitiveConfig::default();
        insert(&store, &memory("a", "kafka consumer lag", secs(0))).await;
        insert(&store, &memory("b", "rebalance storm", secs(0))).await;
        store
            .upsert_association(&Association::new("a", "b", AssociationType::Causal, 0.8, secs(0)))
            .await
            .unwrap();

        let wide = recall(&store, "kafka", &config, &deterministic(secs(31)), &ZeroNoise)
            .await
            .unwrap();
        assert_eq!(wide.len(), 2);
        let b = wide.iter().find(|r| r.memory.id == "b").unwrap();
        assert!((b.spreading_activation - 0.8 * 1.5).abs() < 1e-9);

        let flat = recall(
            &store,
            "kafka",
            &config,
            &deterministic(secs(32)).associative(false),
            &ZeroNoise,
        )
        .await
        .unwrap();
        assert!(flat.iter().all(|r| r.spreading_activation == 0.0));
    }

    #[tokio::test]
    async fn priming_seed_spreads_at_reduced_weight() {
        let store = store().await;
        let config = CognitiveConfig::default();
        insert(&store, &memory("alpha", "kestrel sighting", secs(0))).await;
        insert(&store, &memory("beta", "nesting box", secs(0))).await;
        // Low cached activation keeps omega out of the top-by-activation seeds
        let mut omega = memory("omega", "field notebook", secs(0));
        omega.activation = -1.0;
        insert(&store, &omega).await;
        for (s, t) in [("alpha", "beta"), ("omega", "beta")] {
            store
                .upsert_association(&Association::new(s, t, AssociationType::Semantic, 1.0, secs(0)))
                .await
                .unwrap();
        }
        working_memory::push_focus(&store, &config, "notebook", Some("omega".into()), secs(5))
            .await
            .unwrap();

        let results = recall(
            &store,
            "kestrel",
            &config,
            &deterministic(secs(10)).limit(2),
            &ZeroNoise,
        )
        .await
        .unwrap();

        // alpha is a direct seed at 1.0, omega only primes at 0.5
        let s = fan_attenuated_strength(config.max_spreading_activation, 1);
        let expected = 1.0 * 1.0 * s + config.working_memory_priming_weight * 1.0 * s;
        let beta = results.iter().find(|r| r.memory.id == "beta").unwrap();
        assert!((beta.spreading_activation - expected).abs() < 1e-9);
        assert!((beta.spreading_activation - 2.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn filters_apply_to_every_candidate() {
        let store = store().await;
        let config = CognitiveConfig::default();
        let mut a = memory("a", "billing retry logic", secs(0));
        a.context = Some("svc:billing".into());
        let mut b = memory("b", "billing dashboard", secs(0));
        b.context = Some("svc:web".into());
        b.kind = MemoryKind::Semantic;
        insert(&store, &a).await;
        insert(&store, &b).await;
        store
            .upsert_association(&Association::new("a", "b", AssociationType::Semantic, 0.9, secs(0)))
            .await
            .unwrap();

        let by_context = recall(
            &store,
            "billing",
            &config,
            &deterministic(secs(5)).context("svc:bill"),
            &ZeroNoise,
        )
        .await
        .unwrap();
        let ids: Vec<&str> = by_context.iter().map(|r| r.memory.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);

        let by_kind = recall(
            &store,
            "billing",
            &config,
            &deterministic(secs(6)).kind(MemoryKind::Semantic),
            &ZeroNoise,
        )
        .await
        .unwrap();
        let ids: Vec<&str> = by_kind.iter().map(|r| r.memory.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn ties_break_by_id_and_limit_zero_is_empty() {
        let store = store().await;
        let config = CognitiveConfig::default();
        insert(&store, &memory("b", "twin record", secs(0))).await;
        insert(&store, &memory("a", "twin record", secs(0))).await;

        let results = recall(&store, "twin", &config, &deterministic(secs(1)), &ZeroNoise)
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.memory.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let none = recall(&store, "twin", &config, &deterministic(secs(2)).limit(0), &ZeroNoise)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn recall_to_focus_loads_working_memory() {
        let store = store().await;
        let config = CognitiveConfig::default();
        for (id, content) in [("a", "graphql schema"), ("b", "graphql resolver"), ("c", "graphql cache"), ("d", "graphql auth")] {
            insert(&store, &memory(id, content, secs(0))).await;
        }

        let load = recall_to_focus(
            &store,
            "graphql",
            &config,
            &deterministic(secs(5)).limit(3),
            &ZeroNoise,
        )
        .await
        .unwrap();
        assert_eq!(load.loaded.len(), 3);
        assert_eq!(load.utilization.used, 3);
        assert_eq!(load.utilization.capacity, 7);

        let slots = store.working_memory().await.unwrap();
        assert!(slots.iter().all(|s| s.memory_ref.is_some()));
    }
}
