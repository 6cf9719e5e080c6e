//! Encoding new memories, and the procedural skill store built on top of it

use crate::activation::resting_activation;
use crate::associations::{form_causal_associations, form_emotional_associations};
use crate::config::CognitiveConfig;
use crate::error::{MemoryError, Result};
use crate::storage_backend::StorageBackend;
use crate::types::{
    generate_memory_id, AccessLogEntry, AccessType, EncodeInput, Emotion, Memory, MemoryKind,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Store a new memory.
///
/// The record and its first `encode` access are written atomically; the
/// initial activation is the base level of that single access plus the
/// emotion boost. Emotional and causal links to existing memories are
/// formed right away. `sequence` disambiguates identical content encoded in
/// the same millisecond.
pub async fn encode(
    store: &dyn StorageBackend,
    input: &EncodeInput,
    config: &CognitiveConfig,
    now: DateTime<Utc>,
    sequence: u64,
) -> Result<Memory> {
    if input.content.trim().is_empty() {
        return Err(MemoryError::Validation(
            "memory content must not be empty".to_string(),
        ));
    }

    let emotion = input.emotion.unwrap_or(Emotion::Neutral);
    let emotion_weight = match input.emotion_weight {
        Some(w) if !w.is_finite() => {
            return Err(MemoryError::Validation(format!(
                "emotion weight must be a finite number, got {w}"
            )))
        }
        Some(w) => w.clamp(0.0, 1.0),
        None => emotion.default_weight(),
    };

    let salt = format!("{}:{}", now.timestamp_millis(), sequence);
    let memory = Memory {
        id: generate_memory_id(&input.content, input.kind, &salt),
        kind: input.kind,
        content: input.content.clone(),
        encoded_at: now,
        last_recalled_at: None,
        recall_count: 0,
        activation: resting_activation(&[now], now, emotion_weight, config),
        emotion,
        emotion_weight,
        context: input.context.clone().filter(|c| !c.is_empty()),
        chunk_id: None,
        reconsolidation_count: 0,
    };

    let first_access = AccessLogEntry {
        id: Uuid::new_v4().to_string(),
        memory_id: memory.id.clone(),
        accessed_at: now,
        access_type: AccessType::Encode,
    };
    store.insert_memory(&memory, &first_access).await?;

    let population = store.all_memories(None).await?;
    let emotional = form_emotional_associations(store, &memory, &population, now).await?;
    let causal = form_causal_associations(store, &memory, &population, config, now).await?;

    tracing::debug!(
        "Encoded {} ({}, {} emotional / {} causal links)",
        memory.id,
        memory.kind,
        emotional.len(),
        causal.len()
    );
    Ok(memory)
}

// ─── Procedural Store ─────────────────────────────────────────────────────────

/// Encode a skill; procedural memories never decay out of the store
pub async fn encode_procedural(
    store: &dyn StorageBackend,
    content: &str,
    context: Option<&str>,
    config: &CognitiveConfig,
    now: DateTime<Utc>,
    sequence: u64,
) -> Result<Memory> {
    let mut input = EncodeInput::new(content, MemoryKind::Procedural);
    input.context = context.map(str::to_string);
    encode(store, &input, config, now, sequence).await
}

/// All procedural memories, newest first
pub async fn skills(store: &dyn StorageBackend) -> Result<Vec<Memory>> {
    store.all_memories(Some(MemoryKind::Procedural)).await
}

/// Turn an existing memory into a skill. `None` for unknown ids.
pub async fn promote_to_skill(store: &dyn StorageBackend, id: &str) -> Result<Option<Memory>> {
    let Some(mut memory) = store.get_memory(id).await? else {
        return Ok(None);
    };

    memory.kind = MemoryKind::Procedural;
    store.update_memory(&memory).await?;
    Ok(Some(memory))
}
