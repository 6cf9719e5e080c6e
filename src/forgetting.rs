//! Forgetting: activation refresh and retention estimates

use crate::activation::resting_activation;
use crate::config::CognitiveConfig;
use crate::error::Result;
use crate::storage_backend::StorageBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Changes smaller than this are not written back
const ACTIVATION_EPSILON: f64 = 0.001;

/// Outcome of an activation refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Memories whose cached activation was rewritten
    pub updated: usize,
    /// Memories now below the retrieval threshold
    pub at_risk: usize,
}

/// Recompute the cached activation (base level plus emotion boost) of every
/// non-procedural memory at `now`.
pub async fn refresh_activations(
    store: &dyn StorageBackend,
    config: &CognitiveConfig,
    now: DateTime<Utc>,
) -> Result<RefreshReport> {
    let mut report = RefreshReport::default();

    for mut memory in store.all_memories(None).await? {
        if memory.is_decay_exempt() {
            continue;
        }

        let timestamps = store.access_timestamps(&memory.id).await?;
        let activation = resting_activation(&timestamps, now, memory.emotion_weight, config);

        if (activation - memory.activation).abs() > ACTIVATION_EPSILON {
            memory.activation = activation;
            store.update_memory(&memory).await?;
            report.updated += 1;
        }
        if activation < config.retrieval_threshold {
            report.at_risk += 1;
        }
    }

    tracing::debug!(
        "Refreshed activations: {} updated, {} at risk",
        report.updated,
        report.at_risk
    );
    Ok(report)
}

/// Ebbinghaus retention `R = e^(-t/S)`; zero for non-positive strength
pub fn ebbinghaus_retention(time_since_recall: f64, strength: f64) -> f64 {
    if strength <= 0.0 {
        return 0.0;
    }
    (-time_since_recall / strength).exp()
}

/// Retention strength from rehearsal, affect and connectedness
pub fn memory_strength(
    recall_count: i64,
    emotion_weight: f64,
    association_count: usize,
    emotional_boost_factor: f64,
) -> f64 {
    let recall = 1.0 + recall_count as f64 * 0.8;
    let emotional = 1.0 + emotion_weight * emotional_boost_factor;
    let associative = 1.0 + (1.0 + association_count as f64).ln() * 0.5;
    recall * emotional * associative
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert, memory, secs, store};
    use crate::types::MemoryKind;

    #[test]
    fn retention_curve() {
        assert_eq!(ebbinghaus_retention(0.0, 5.0), 1.0);
        assert_eq!(ebbinghaus_retention(10.0, 0.0), 0.0);
        assert!(ebbinghaus_retention(10.0, 5.0) < ebbinghaus_retention(5.0, 5.0));
        assert!((ebbinghaus_retention(5.0, 5.0) - (-1f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn strength_grows_with_each_factor() {
        let base = memory_strength(0, 0.0, 0, 2.0);
        assert_eq!(base, 1.0);
        assert!(memory_strength(2, 0.0, 0, 2.0) > base);
        assert!(memory_strength(0, 0.8, 0, 2.0) > base);
        assert!(memory_strength(0, 0.0, 3, 2.0) > base);
        assert!((memory_strength(1, 0.5, 0, 2.0) - 1.8 * 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn refresh_updates_decayed_memories_and_skips_procedural() {
        let store = store().await;
        let config = CognitiveConfig::default();

        let episode = memory("e", "old episode", secs(0));
        let mut skill = memory("p", "old skill", secs(0));
        skill.kind = MemoryKind::Procedural;
        insert(&store, &episode).await;
        insert(&store, &skill).await;

        // A week later: ln(604800^-0.5) is about -6.7, below the -3 threshold
        let report = refresh_activations(&store, &config, secs(604_800)).await.unwrap();
        assert_eq!(report, RefreshReport { updated: 1, at_risk: 1 });

        let refreshed = store.load("e").await.unwrap().unwrap();
        assert!((refreshed.activation - (604_800f64).powf(-0.5).ln()).abs() < 1e-9);
        assert_eq!(store.load("p").await.unwrap().unwrap().activation, 0.0);

        // Nothing moved, nothing rewritten
        let again = refresh_activations(&store, &config, secs(604_800)).await.unwrap();
        assert_eq!(again.updated, 0);
        assert_eq!(again.at_risk, 1);
    }
}
