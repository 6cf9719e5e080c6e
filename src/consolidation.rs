//! Consolidation: the offline "sleep" pass
//!
//! Runs in a fixed order: refresh activations, strengthen recently rehearsed
//! memories, refresh again, prune what decayed below the pruning threshold,
//! extract semantic facts from recurring episodes, re-run association
//! discovery, drop weak edges and append a log entry. Every step dedups or
//! thresholds its own work, so an interrupted pass can simply be re-run.

use crate::associations::{
    form_causal_associations, form_emotional_associations, form_semantic_associations,
    form_temporal_associations,
};
use crate::config::CognitiveConfig;
use crate::encoder::encode;
use crate::error::Result;
use crate::forgetting::refresh_activations;
use crate::keywords::{extract_keywords, tokenize, unique_tokens};
use crate::storage_backend::StorageBackend;
use crate::types::{
    AccessLogEntry, AccessType, ConsolidationLogEntry, EncodeInput, Memory, MemoryId, MemoryKind,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Marker prefixed to every extracted fact
pub const EXTRACTED_MARKER: &str = "[extracted]";

/// Keywords per episode considered for fact extraction
const EXTRACTION_KEYWORDS: usize = 3;

/// Summary of one consolidation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub strengthened: usize,
    pub pruned: usize,
    pub facts_extracted: usize,
    pub associations_discovered: usize,
    /// Memories below the retrieval threshold after the first refresh
    pub at_risk: usize,
    pub pruned_ids: Vec<MemoryId>,
    pub extracted_facts: Vec<String>,
    /// `(source, target)` of every edge formed by discovery, in processing
    /// order (newest memory first)
    pub discovered_pairs: Vec<(MemoryId, MemoryId)>,
}

/// Run a full consolidation pass at `now`.
///
/// `sequence` supplies id salts for the facts this pass encodes.
pub async fn consolidate(
    store: &dyn StorageBackend,
    config: &CognitiveConfig,
    now: DateTime<Utc>,
    sequence: &AtomicU64,
) -> Result<ConsolidationReport> {
    let mut report = ConsolidationReport::default();

    let refresh = refresh_activations(store, config, now).await?;
    report.at_risk = refresh.at_risk;

    report.strengthened = strengthen_rehearsed(store, now).await?;
    tracing::debug!("Consolidation strengthened {} memories", report.strengthened);

    refresh_activations(store, config, now).await?;

    for memory in store.memories_below_activation(config.pruning_threshold).await? {
        if store.delete_memory(&memory.id).await? {
            report.pruned_ids.push(memory.id);
        }
    }
    report.pruned = report.pruned_ids.len();
    tracing::debug!("Consolidation pruned {} memories", report.pruned);

    report.extracted_facts = extract_semantic_facts(store, config, now, sequence).await?;
    report.facts_extracted = report.extracted_facts.len();

    let population = store.all_memories(None).await?;
    for memory in &population {
        let mut formed =
            form_temporal_associations(store, memory, &population, config, now).await?;
        formed.extend(form_semantic_associations(store, memory, &population, now).await?);
        formed.extend(form_emotional_associations(store, memory, &population, now).await?);
        formed.extend(form_causal_associations(store, memory, &population, config, now).await?);

        report
            .discovered_pairs
            .extend(formed.into_iter().map(|a| (a.source_id, a.target_id)));
    }
    report.associations_discovered = report.discovered_pairs.len();

    let removed = store
        .delete_weak_associations(config.min_association_strength)
        .await?;
    tracing::debug!("Consolidation removed {} weak associations", removed);

    store
        .log_consolidation(&ConsolidationLogEntry {
            id: Uuid::new_v4().to_string(),
            ran_at: now,
            strengthened: report.strengthened as i64,
            pruned: report.pruned as i64,
            facts_extracted: report.facts_extracted as i64,
            associations_discovered: report.associations_discovered as i64,
        })
        .await?;

    tracing::info!(
        "Consolidation complete: {} strengthened, {} pruned, {} facts, {} associations",
        report.strengthened,
        report.pruned,
        report.facts_extracted,
        report.associations_discovered
    );
    Ok(report)
}

/// Give every non-procedural memory with two or more accesses in the last
/// 24 hours a synthetic `consolidate` access
async fn strengthen_rehearsed(store: &dyn StorageBackend, now: DateTime<Utc>) -> Result<usize> {
    let day = Duration::hours(24);
    let mut strengthened = 0;

    for memory in store.all_memories(None).await? {
        if memory.is_decay_exempt() {
            continue;
        }
        let recent = store
            .access_timestamps(&memory.id)
            .await?
            .into_iter()
            .filter(|t| now - *t < day)
            .count();
        if recent < 2 {
            continue;
        }

        store
            .log_access(&AccessLogEntry {
                id: Uuid::new_v4().to_string(),
                memory_id: memory.id.clone(),
                accessed_at: now,
                access_type: AccessType::Consolidate,
            })
            .await?;
        strengthened += 1;
    }

    Ok(strengthened)
}

/// Whether an extracted fact already covers `keyword`
fn already_extracted(facts: &[Memory], keyword: &str) -> bool {
    facts.iter().any(|fact| {
        fact.content.contains(EXTRACTED_MARKER) && tokenize(&fact.content).iter().any(|t| t == keyword)
    })
}

/// Summarize recurring episodes into semantic facts.
///
/// Episodes are grouped under each of their top three keywords. A group of
/// at least `semantic_extraction_threshold` episodes yields one fact, unless
/// an extracted fact mentioning the keyword already exists.
pub async fn extract_semantic_facts(
    store: &dyn StorageBackend,
    config: &CognitiveConfig,
    now: DateTime<Utc>,
    sequence: &AtomicU64,
) -> Result<Vec<String>> {
    let threshold = config.semantic_extraction_threshold.max(1);
    let mut episodes = store.all_memories(Some(MemoryKind::Episodic)).await?;
    if episodes.len() < threshold {
        return Ok(Vec::new());
    }
    episodes.sort_by(|a, b| a.encoded_at.cmp(&b.encoded_at).then_with(|| a.id.cmp(&b.id)));

    // keyword groups in first-seen order
    let mut groups: Vec<(String, Vec<&Memory>)> = Vec::new();
    for episode in &episodes {
        for keyword in extract_keywords(&episode.content, EXTRACTION_KEYWORDS) {
            match groups.iter_mut().find(|(k, _)| *k == keyword) {
                Some((_, members)) => members.push(episode),
                None => groups.push((keyword, vec![episode])),
            }
        }
    }

    let mut facts = store.all_memories(Some(MemoryKind::Semantic)).await?;
    let mut extracted = Vec::new();

    for (keyword, members) in groups {
        if members.len() < threshold || already_extracted(&facts, &keyword) {
            continue;
        }

        let token_sets: Vec<HashSet<String>> = members
            .iter()
            .map(|m| tokenize(&m.content).into_iter().collect())
            .collect();
        let shared: Vec<String> = unique_tokens(&members[0].content)
            .into_iter()
            .filter(|t| token_sets.iter().all(|set| set.contains(t)))
            .collect();

        let content = if shared.len() > 1 {
            format!(
                "{EXTRACTED_MARKER} Pattern observed across {} episodes: {}",
                members.len(),
                shared.join(", ")
            )
        } else {
            format!(
                "{EXTRACTED_MARKER} Recurring theme ({}x): {}",
                members.len(),
                keyword
            )
        };

        let mut input = EncodeInput::new(content.clone(), MemoryKind::Semantic);
        input.context = members[0].context.clone();
        let fact = encode(
            store,
            &input,
            config,
            now,
            sequence.fetch_add(1, Ordering::Relaxed),
        )
        .await?;

        tracing::debug!("Extracted fact {} from {} episodes", fact.id, members.len());
        facts.push(fact);
        extracted.push(content);
    }

    Ok(extracted)
}
