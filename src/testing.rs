//! Shared fixtures for unit tests

use crate::store::MemoryStore;
use crate::types::{AccessLogEntry, AccessType, Emotion, Memory, MemoryKind};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Fixed reference instant so tests never depend on the wall clock
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).unwrap_or_default()
}

pub fn secs(s: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(s)
}

pub fn memory(id: &str, content: &str, at: DateTime<Utc>) -> Memory {
    Memory {
        id: id.to_string(),
        kind: MemoryKind::Episodic,
        content: content.to_string(),
        encoded_at: at,
        last_recalled_at: None,
        recall_count: 0,
        activation: 0.0,
        emotion: Emotion::Neutral,
        emotion_weight: 0.0,
        context: None,
        chunk_id: None,
        reconsolidation_count: 0,
    }
}

pub async fn store() -> MemoryStore {
    MemoryStore::connect_in_memory()
        .await
        .expect("in-memory store")
}

/// Insert `memory` with an encode access at its encode time
pub async fn insert(store: &MemoryStore, memory: &Memory) {
    let access = AccessLogEntry {
        id: Uuid::new_v4().to_string(),
        memory_id: memory.id.clone(),
        accessed_at: memory.encoded_at,
        access_type: AccessType::Encode,
    };
    store.save(memory, &access).await.expect("insert memory");
}
