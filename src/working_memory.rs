//! Fixed-capacity working-memory buffer
//!
//! A small set of numbered slots holding what the agent is currently
//! attending to. Slots that reference a stored memory prime recall.

use crate::config::CognitiveConfig;
use crate::error::Result;
use crate::storage_backend::StorageBackend;
use crate::types::{MemoryId, WorkingMemorySlot};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Result of pushing an item into the buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub slot: WorkingMemorySlot,
    /// Slots displaced to make room, oldest first
    pub evicted: Vec<WorkingMemorySlot>,
}

/// Buffer occupancy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusUtilization {
    pub used: usize,
    pub capacity: usize,
    /// `used / capacity`
    pub utilization: f64,
}

#[derive(Debug, Clone)]
pub struct WorkingMemoryBuffer {
    slots: Vec<WorkingMemorySlot>,
    capacity: usize,
}

impl WorkingMemoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    /// Rebuild a buffer from persisted slots
    pub fn from_slots(mut slots: Vec<WorkingMemorySlot>, capacity: usize) -> Self {
        slots.sort_by_key(|s| s.slot);
        Self { slots, capacity }
    }

    /// Occupied slots in slot order
    pub fn slots(&self) -> &[WorkingMemorySlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn oldest_index(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| (s.pushed_at, s.slot))
            .map(|(i, _)| i)
    }

    fn newest_index(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .max_by_key(|(_, s)| (s.pushed_at, s.slot))
            .map(|(i, _)| i)
    }

    /// Push an item, evicting the oldest when the buffer is full.
    ///
    /// The item takes the lowest free slot index. Its push time is kept
    /// strictly after every existing push time, so `now` values that collide
    /// or run backwards are stamped 1ms after the newest slot.
    ///
    /// A zero-capacity buffer holds nothing: every slot is evicted and the
    /// new item is returned in `evicted` as well.
    pub fn push(
        &mut self,
        content: impl Into<String>,
        memory_ref: Option<MemoryId>,
        now: DateTime<Utc>,
    ) -> PushOutcome {
        let mut evicted = Vec::new();
        while !self.slots.is_empty() && self.slots.len() >= self.capacity {
            match self.oldest_index() {
                Some(i) => evicted.push(self.slots.remove(i)),
                None => break,
            }
        }

        let mut pushed_at = now;
        if let Some(newest) = self.newest_index().map(|i| self.slots[i].pushed_at) {
            if pushed_at <= newest {
                pushed_at = newest + Duration::milliseconds(1);
            }
        }

        let mut index: u32 = 0;
        while self.slots.iter().any(|s| s.slot == index) {
            index += 1;
        }

        let slot = WorkingMemorySlot {
            slot: index,
            memory_ref,
            content: content.into(),
            pushed_at,
        };
        if self.capacity == 0 {
            evicted.push(slot.clone());
        } else {
            self.slots.push(slot.clone());
            self.slots.sort_by_key(|s| s.slot);
        }

        PushOutcome { slot, evicted }
    }

    /// Whether `slot` is currently held
    pub fn holds(&self, slot: &WorkingMemorySlot) -> bool {
        self.slots.iter().any(|s| s == slot)
    }

    /// Remove and return the most recently pushed slot
    pub fn pop(&mut self) -> Option<WorkingMemorySlot> {
        let i = self.newest_index()?;
        Some(self.slots.remove(i))
    }

    /// Empty the buffer, returning how many slots were occupied
    pub fn clear(&mut self) -> usize {
        let count = self.slots.len();
        self.slots.clear();
        count
    }

    pub fn utilization(&self) -> FocusUtilization {
        let used = self.slots.len();
        FocusUtilization {
            used,
            capacity: self.capacity,
            utilization: if self.capacity == 0 {
                0.0
            } else {
                used as f64 / self.capacity as f64
            },
        }
    }

    /// Memory ids referenced by occupied slots; these prime recall
    pub fn priming_ids(&self) -> Vec<MemoryId> {
        self.slots
            .iter()
            .filter_map(|s| s.memory_ref.clone())
            .collect()
    }
}

// ─── Persistence ──────────────────────────────────────────────────────────────

/// Load the persisted buffer
pub async fn load_focus(
    store: &dyn StorageBackend,
    config: &CognitiveConfig,
) -> Result<WorkingMemoryBuffer> {
    let slots = store.working_memory().await?;
    Ok(WorkingMemoryBuffer::from_slots(
        slots,
        config.working_memory_capacity,
    ))
}

/// Push into the persisted buffer, writing back only the changed slots
pub async fn push_focus(
    store: &dyn StorageBackend,
    config: &CognitiveConfig,
    content: &str,
    memory_ref: Option<MemoryId>,
    now: DateTime<Utc>,
) -> Result<PushOutcome> {
    let mut buffer = load_focus(store, config).await?;
    let outcome = buffer.push(content, memory_ref, now);

    for evicted in &outcome.evicted {
        store.remove_working_memory_slot(evicted.slot).await?;
    }
    if buffer.holds(&outcome.slot) {
        store.put_working_memory_slot(&outcome.slot).await?;
    }

    if let Some(evicted) = outcome.evicted.first() {
        tracing::debug!("Working memory full, evicted slot {}", evicted.slot);
    }
    Ok(outcome)
}

pub async fn pop_focus(
    store: &dyn StorageBackend,
    config: &CognitiveConfig,
) -> Result<Option<WorkingMemorySlot>> {
    let mut buffer = load_focus(store, config).await?;
    let popped = buffer.pop();
    if let Some(slot) = &popped {
        store.remove_working_memory_slot(slot.slot).await?;
    }
    Ok(popped)
}

pub async fn clear_focus(store: &dyn StorageBackend) -> Result<usize> {
    let removed = store.clear_working_memory().await?;
    Ok(usize::try_from(removed).unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::secs;

    fn contents(buffer: &WorkingMemoryBuffer) -> Vec<&str> {
        buffer.slots().iter().map(|s| s.content.as_str()).collect()
    }

    #[test]
    fn full_buffer_evicts_oldest() {
        let mut buffer = WorkingMemoryBuffer::new(3);
        for (i, item) in ["A", "B", "C"].into_iter().enumerate() {
            let outcome = buffer.push(item, None, secs(i as i64));
            assert!(outcome.evicted.is_empty());
        }

        let outcome = buffer.push("D", None, secs(3));
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].content, "A");
        // D reuses the freed slot 0
        assert_eq!(outcome.slot.slot, 0);

        let mut remaining = contents(&buffer);
        remaining.sort();
        assert_eq!(remaining, vec!["B", "C", "D"]);
    }

    #[test]
    fn pop_returns_newest() {
        let mut buffer = WorkingMemoryBuffer::new(7);
        buffer.push("first", None, secs(0));
        buffer.push("second", None, secs(1));

        assert_eq!(buffer.pop().unwrap().content, "second");
        assert_eq!(buffer.pop().unwrap().content, "first");
        assert!(buffer.pop().is_none());
    }

    #[test]
    fn same_instant_pushes_keep_order() {
        let mut buffer = WorkingMemoryBuffer::new(2);
        let a = buffer.push("a", None, secs(5));
        let b = buffer.push("b", None, secs(5));
        let c = buffer.push("c", None, secs(1));
        assert!(a.slot.pushed_at < b.slot.pushed_at);
        assert!(b.slot.pushed_at < c.slot.pushed_at);

        // "a" was oldest, so it was the one evicted
        assert_eq!(c.evicted[0].content, "a");
        assert_eq!(buffer.pop().unwrap().content, "c");
    }

    #[test]
    fn lowest_free_index_is_reused() {
        let mut buffer = WorkingMemoryBuffer::new(5);
        buffer.push("a", None, secs(0));
        buffer.push("b", None, secs(1));
        buffer.push("c", None, secs(2));
        buffer.pop();
        buffer.pop();
        let outcome = buffer.push("d", None, secs(3));
        assert_eq!(outcome.slot.slot, 1);
    }

    #[test]
    fn clear_utilization_and_priming() {
        let mut buffer = WorkingMemoryBuffer::new(4);
        buffer.push("note", None, secs(0));
        buffer.push("ref", Some("epi:ref:abc123".into()), secs(1));

        let u = buffer.utilization();
        assert_eq!((u.used, u.capacity), (2, 4));
        assert!((u.utilization - 0.5).abs() < 1e-12);
        assert_eq!(buffer.priming_ids(), vec!["epi:ref:abc123".to_string()]);

        assert_eq!(buffer.clear(), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.clear(), 0);
    }

    #[tokio::test]
    async fn persisted_focus_survives_reload() {
        let store = crate::testing::store().await;
        let config = crate::config::CognitiveConfigBuilder::new()
            .working_memory_capacity(2)
            .build();

        push_focus(&store, &config, "a", None, secs(0)).await.unwrap();
        push_focus(&store, &config, "b", Some("epi:b:000001".into()), secs(1))
            .await
            .unwrap();
        let outcome = push_focus(&store, &config, "c", None, secs(2)).await.unwrap();
        assert_eq!(outcome.evicted[0].content, "a");

        let buffer = load_focus(&store, &config).await.unwrap();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.priming_ids(), vec!["epi:b:000001".to_string()]);

        assert_eq!(pop_focus(&store, &config).await.unwrap().unwrap().content, "c");
        assert_eq!(clear_focus(&store).await.unwrap(), 1);
        assert!(pop_focus(&store, &config).await.unwrap().is_none());
    }

    #[test]
    fn shrunken_capacity_evicts_down_to_fit() {
        let slots = (0..4)
            .map(|i| WorkingMemorySlot {
                slot: i,
                memory_ref: None,
                content: format!("item{i}"),
                pushed_at: secs(i as i64),
            })
            .collect();
        let mut buffer = WorkingMemoryBuffer::from_slots(slots, 2);
        let outcome = buffer.push("new", None, secs(10));
        assert_eq!(outcome.evicted.len(), 3);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn zero_capacity_holds_nothing() {
        let mut buffer = WorkingMemoryBuffer::new(0);
        for i in 0..3 {
            let outcome = buffer.push(format!("item{i}"), None, secs(i));
            assert_eq!(outcome.evicted, vec![outcome.slot.clone()]);
            assert!(buffer.is_empty());
        }
        assert_eq!(buffer.utilization().utilization, 0.0);

        // Shrinking to zero drains what was persisted before
        let slots = vec![WorkingMemorySlot {
            slot: 0,
            memory_ref: None,
            content: "old".into(),
            pushed_at: secs(0),
        }];
        let mut buffer = WorkingMemoryBuffer::from_slots(slots, 0);
        let outcome = buffer.push("new", None, secs(1));
        assert_eq!(outcome.evicted.len(), 2);
        assert_eq!(outcome.evicted[0].content, "old");
        assert!(buffer.is_empty());
    }

    #[test]
    fn push_outcome_serializes() {
        let mut buffer = WorkingMemoryBuffer::new(1);
        buffer.push("a", None, secs(0));
        let outcome = buffer.push("b", Some("sem:b:000002".into()), secs(1));

        let json = serde_json::to_string(&outcome).unwrap();
        let back: PushOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }
}
