//! Association graph: edge formation rules and spreading activation
//!
//! Every formation rule is check-then-upsert. A pair that already has an
//! edge of any type is skipped, so re-running a rule never duplicates or
//! weakens an edge. Strength only grows through co-recall.

use crate::activation::fan_attenuated_strength;
use crate::config::CognitiveConfig;
use crate::error::Result;
use crate::keywords::extract_keywords;
use crate::storage_backend::StorageBackend;
use crate::types::{Association, AssociationType, Emotion, Memory, MemoryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Window for context-free temporal linking
const TEMPORAL_WINDOW_MS: f64 = 300_000.0;
/// Strength of a freshly formed co-recall edge
const CO_RECALL_INITIAL_STRENGTH: f64 = 0.3;
/// Emotion weight a memory must exceed to take part in emotional linking
const EMOTIONAL_WEIGHT_FLOOR: f64 = 0.3;
/// Boosts at or below this stop the spreading walk
const MIN_SPREAD_BOOST: f64 = 0.01;

/// A memory reached by spreading activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadTarget {
    pub memory_id: MemoryId,
    pub boost: f64,
    /// Hops from the source (1-based)
    pub depth: u32,
}

/// Insert `source -> target` unless the pair is already linked
async fn link_if_absent(
    store: &dyn StorageBackend,
    source: &str,
    target: &str,
    association_type: AssociationType,
    strength: f64,
    now: DateTime<Utc>,
) -> Result<Option<Association>> {
    if source == target || store.find_association(source, target).await?.is_some() {
        return Ok(None);
    }

    let association = Association::new(source, target, association_type, strength, now);
    store.upsert_association(&association).await?;
    Ok(Some(association))
}

/// Same-context memories other than `memory`, most recent first
fn context_neighbours<'a>(memory: &Memory, population: &'a [Memory]) -> Vec<&'a Memory> {
    let Some(context) = memory.context.as_deref() else {
        return Vec::new();
    };

    let mut neighbours: Vec<&Memory> = population
        .iter()
        .filter(|other| other.id != memory.id && other.context_matches(context))
        .collect();
    neighbours.sort_by(|a, b| b.encoded_at.cmp(&a.encoded_at).then_with(|| a.id.cmp(&b.id)));
    neighbours
}

// ─── Formation Rules ──────────────────────────────────────────────────────────

/// Link `memory` to memories encoded near it.
///
/// With a context, the `temporal_context_window` most recent same-context
/// memories are linked with strength `max(0.1, 1/(1+rank))`. Without one,
/// every memory encoded within five minutes is linked with
/// `max(0.1, 0.8·(1 − Δt/window))`.
pub async fn form_temporal_associations(
    store: &dyn StorageBackend,
    memory: &Memory,
    population: &[Memory],
    config: &CognitiveConfig,
    now: DateTime<Utc>,
) -> Result<Vec<Association>> {
    let mut formed = Vec::new();

    if memory.context.is_some() {
        let neighbours = context_neighbours(memory, population);
        for (i, other) in neighbours
            .into_iter()
            .take(config.temporal_context_window)
            .enumerate()
        {
            let gap = (i + 1) as f64;
            let strength = (1.0 / (1.0 + gap)).max(0.1);
            if let Some(a) = link_if_absent(
                store,
                &memory.id,
                &other.id,
                AssociationType::Temporal,
                strength,
                now,
            )
            .await?
            {
                formed.push(a);
            }
        }
    } else {
        for other in population.iter().filter(|o| o.id != memory.id) {
            let diff = (memory.encoded_at - other.encoded_at)
                .num_milliseconds()
                .unsigned_abs() as f64;
            if diff > TEMPORAL_WINDOW_MS {
                continue;
            }
            let strength = ((1.0 - diff / TEMPORAL_WINDOW_MS) * 0.8).max(0.1);
            if let Some(a) = link_if_absent(
                store,
                &memory.id,
                &other.id,
                AssociationType::Temporal,
                strength,
                now,
            )
            .await?
            {
                formed.push(a);
            }
        }
    }

    Ok(formed)
}

/// Link memories whose top-5 keywords overlap.
///
/// Strength is `max(0.1, |overlap| / max(|kw_a|, |kw_b|))`.
pub async fn form_semantic_associations(
    store: &dyn StorageBackend,
    memory: &Memory,
    population: &[Memory],
    now: DateTime<Utc>,
) -> Result<Vec<Association>> {
    let keywords = extract_keywords(&memory.content, 5);
    if keywords.is_empty() {
        return Ok(Vec::new());
    }

    let mut formed = Vec::new();
    for other in population.iter().filter(|o| o.id != memory.id) {
        let other_keywords = extract_keywords(&other.content, 5);
        let overlap = keywords
            .iter()
            .filter(|k| other_keywords.contains(k))
            .count();
        if overlap == 0 {
            continue;
        }

        let strength =
            (overlap as f64 / keywords.len().max(other_keywords.len()) as f64).max(0.1);
        if let Some(a) = link_if_absent(
            store,
            &memory.id,
            &other.id,
            AssociationType::Semantic,
            strength,
            now,
        )
        .await?
        {
            formed.push(a);
        }
    }

    Ok(formed)
}

fn emotionally_salient(memory: &Memory) -> bool {
    memory.emotion != Emotion::Neutral && memory.emotion_weight > EMOTIONAL_WEIGHT_FLOOR
}

/// Emotional edge strength, or `None` when the pair should not be linked
pub fn emotional_strength(a: &Memory, b: &Memory) -> Option<f64> {
    if !emotionally_salient(a) || !emotionally_salient(b) {
        return None;
    }

    let closeness = 1.0 - (a.emotion_weight - b.emotion_weight).abs();
    let strength = if a.emotion == b.emotion {
        closeness
    } else if a.emotion.arousal_tier() == b.emotion.arousal_tier() {
        0.3 * closeness
    } else {
        return None;
    };

    (strength >= 0.1).then_some(strength)
}

/// Link memories with matching affect.
///
/// Same label gives `1 − |Δw|`, same arousal tier `0.3·(1 − |Δw|)`.
pub async fn form_emotional_associations(
    store: &dyn StorageBackend,
    memory: &Memory,
    population: &[Memory],
    now: DateTime<Utc>,
) -> Result<Vec<Association>> {
    if !emotionally_salient(memory) {
        return Ok(Vec::new());
    }

    let mut formed = Vec::new();
    for other in population.iter().filter(|o| o.id != memory.id) {
        let Some(strength) = emotional_strength(memory, other) else {
            continue;
        };
        if let Some(a) = link_if_absent(
            store,
            &memory.id,
            &other.id,
            AssociationType::Emotional,
            strength,
            now,
        )
        .await?
        {
            formed.push(a);
        }
    }

    Ok(formed)
}

/// Link earlier same-context memories to `memory` (earlier → later),
/// strength `1/(1+rank)`
pub async fn form_causal_associations(
    store: &dyn StorageBackend,
    memory: &Memory,
    population: &[Memory],
    config: &CognitiveConfig,
    now: DateTime<Utc>,
) -> Result<Vec<Association>> {
    let mut formed = Vec::new();

    let earlier = context_neighbours(memory, population)
        .into_iter()
        .filter(|other| other.encoded_at < memory.encoded_at)
        .take(config.temporal_context_window);

    for (i, source) in earlier.enumerate() {
        let gap = (i + 1) as f64;
        if let Some(a) = link_if_absent(
            store,
            &source.id,
            &memory.id,
            AssociationType::Causal,
            1.0 / (1.0 + gap),
            now,
        )
        .await?
        {
            formed.push(a);
        }
    }

    Ok(formed)
}

/// Strengthen or create edges between every pair of co-recalled memories.
///
/// Existing edges gain `retrieval_strengthening_boost` (capped at 1.0) and
/// keep their type. Returns only newly created edges.
pub async fn record_co_recall(
    store: &dyn StorageBackend,
    memory_ids: &[MemoryId],
    config: &CognitiveConfig,
    now: DateTime<Utc>,
) -> Result<Vec<Association>> {
    let mut formed = Vec::new();

    for (i, source) in memory_ids.iter().enumerate() {
        for target in &memory_ids[i + 1..] {
            if source == target {
                continue;
            }
            match store.find_association(source, target).await? {
                Some(link) => {
                    let strength =
                        (link.strength + config.retrieval_strengthening_boost).min(1.0);
                    store.update_association_strength(&link.id, strength).await?;
                }
                None => {
                    let association = Association::new(
                        source.as_str(),
                        target.as_str(),
                        AssociationType::CoRecall,
                        CO_RECALL_INITIAL_STRENGTH,
                        now,
                    );
                    store.upsert_association(&association).await?;
                    formed.push(association);
                }
            }
        }
    }

    Ok(formed)
}

// ─── Spreading Activation ─────────────────────────────────────────────────────

/// Spreading activation from a single source with boost 1.0, bounded by
/// `recall_spreading_depth`
pub async fn spreading_activation(
    store: &dyn StorageBackend,
    source_id: &str,
    config: &CognitiveConfig,
) -> Result<Vec<SpreadTarget>> {
    spread_from(store, source_id, 1.0, config, config.recall_spreading_depth).await
}

/// Breadth-first spread from `source_id` starting at `initial_boost`.
///
/// A node is marked visited the first time any edge reaches it, so each
/// memory is reported at most once, at its shallowest depth. A child's boost
/// is `parent · edge_strength · S(fan(parent))`; boosts at or below 0.01 are
/// neither reported nor expanded.
pub async fn spread_from(
    store: &dyn StorageBackend,
    source_id: &str,
    initial_boost: f64,
    config: &CognitiveConfig,
    max_depth: u32,
) -> Result<Vec<SpreadTarget>> {
    let mut visited: HashSet<MemoryId> = HashSet::from([source_id.to_string()]);
    let mut results = Vec::new();
    let mut frontier: Vec<(MemoryId, f64)> = vec![(source_id.to_string(), initial_boost)];

    for depth in 1..=max_depth {
        if frontier.is_empty() {
            break;
        }
        let mut next_frontier = Vec::new();

        for (id, boost) in &frontier {
            let edges = store.associations_of(id).await?;
            if edges.is_empty() {
                continue;
            }
            let fan = store.fan_count(id).await?.max(1);
            let spread = fan_attenuated_strength(config.max_spreading_activation, fan);

            for edge in &edges {
                let target = edge.other_end(id);
                if !visited.insert(target.to_string()) {
                    continue;
                }

                let child = boost * edge.strength * spread;
                if child > MIN_SPREAD_BOOST {
                    results.push(SpreadTarget {
                        memory_id: target.to_string(),
                        boost: child,
                        depth,
                    });
                    next_frontier.push((target.to_string(), child));
                }
            }
        }

        frontier = next_frontier;
    }

    Ok(results)
}
