//! Chunking: cluster strongly associated memories into labelled groups

use crate::config::CognitiveConfig;
use crate::error::Result;
use crate::keywords::extract_keywords;
use crate::storage_backend::StorageBackend;
use crate::types::{Chunk, Memory, MemoryId};
use std::collections::HashMap;
use uuid::Uuid;

/// Disjoint set over arena indices, with union by rank and path compression
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl DisjointSet {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // compress
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`; false when already joined
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    /// Sets as lists of indices. Sets are ordered by their smallest member
    /// and members ascend within a set.
    pub fn components(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            let slot = *by_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(i);
        }
        groups
    }
}

/// Label a group by the top three keywords of its combined content
fn chunk_label(members: &[&Memory]) -> String {
    let joined = members
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let keywords = extract_keywords(&joined, 3);
    if keywords.is_empty() {
        "chunk".to_string()
    } else {
        keywords.join(" + ")
    }
}

/// Group unchunked memories connected by edges at least
/// `chunking_similarity_threshold` strong.
///
/// Every component of two or more memories becomes a chunk; assignments are
/// committed in one transaction. Memories already in a chunk are left out.
pub async fn discover_chunks(
    store: &dyn StorageBackend,
    config: &CognitiveConfig,
) -> Result<Vec<Chunk>> {
    let mut candidates: Vec<Memory> = store
        .all_memories(None)
        .await?
        .into_iter()
        .filter(|m| m.chunk_id.is_none())
        .collect();
    candidates.sort_by(|a, b| a.id.cmp(&b.id));

    let index: HashMap<&str, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.as_str(), i))
        .collect();

    let mut sets = DisjointSet::new(candidates.len());
    for (i, memory) in candidates.iter().enumerate() {
        for edge in store.associations_of(&memory.id).await? {
            if edge.strength < config.chunking_similarity_threshold {
                continue;
            }
            if let Some(&j) = index.get(edge.other_end(&memory.id)) {
                sets.union(i, j);
            }
        }
    }

    let chunks: Vec<Chunk> = sets
        .components()
        .into_iter()
        .filter(|group| group.len() >= 2)
        .map(|group| {
            let members: Vec<&Memory> = group.iter().map(|&i| &candidates[i]).collect();
            Chunk {
                id: Uuid::new_v4().to_string(),
                member_ids: members.iter().map(|m| m.id.clone()).collect(),
                label: chunk_label(&members),
            }
        })
        .collect();

    if !chunks.is_empty() {
        let assignments: Vec<(String, Vec<MemoryId>)> = chunks
            .iter()
            .map(|c| (c.id.clone(), c.member_ids.clone()))
            .collect();
        store.assign_chunks(&assignments).await?;
    }

    tracing::debug!(
        "Chunking grouped {} memories into {} chunks",
        chunks.iter().map(|c| c.member_ids.len()).sum::<usize>(),
        chunks.len()
    );
    Ok(chunks)
}

/// Members of a chunk, newest first
pub async fn chunk_members(store: &dyn StorageBackend, chunk_id: &str) -> Result<Vec<Memory>> {
    Ok(store
        .all_memories(None)
        .await?
        .into_iter()
        .filter(|m| m.chunk_id.as_deref() == Some(chunk_id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert, memory, secs, store};
    use crate::types::{Association, AssociationType};

    #[test]
    fn disjoint_set_merges_transitively() {
        let mut sets = DisjointSet::new(5);
        assert!(sets.union(0, 1));
        assert!(sets.union(3, 4));
        assert!(sets.union(1, 4));
        assert!(!sets.union(0, 3));
        assert_eq!(sets.find(0), sets.find(4));
        assert_ne!(sets.find(2), sets.find(0));
        assert_eq!(sets.components(), vec![vec![0, 1, 3, 4], vec![2]]);
    }

    #[tokio::test]
    async fn strong_edges_form_labelled_chunks() {
        let store = store().await;
        let config = CognitiveConfig::default();
        let items = [
            ("a", "redis cache eviction"),
            ("b", "redis cache warmup"),
            ("c", "redis cluster failover"),
            ("d", "team lunch"),
            ("e", "team offsite"),
        ];
        for (id, content) in items {
            insert(&store, &memory(id, content, secs(0))).await;
        }
        for (s, t, strength) in [("a", "b", 0.9), ("b", "c", 0.6), ("d", "e", 0.59)] {
            store
                .upsert_association(&Association::new(s, t, AssociationType::Semantic, strength, secs(0)))
                .await
                .unwrap();
        }

        let chunks = discover_chunks(&store, &config).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].member_ids, vec!["a", "b", "c"]);
        assert_eq!(chunks[0].label, "redis + cache + eviction");

        let members = chunk_members(&store, &chunks[0].id).await.unwrap();
        assert_eq!(members.len(), 3);
        assert!(store.load("d").await.unwrap().unwrap().chunk_id.is_none());

        // Already chunked memories are not regrouped
        assert!(discover_chunks(&store, &config).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unlabelable_chunk_falls_back() {
        let store = store().await;
        let config = CognitiveConfig::default();
        insert(&store, &memory("a", "!", secs(0))).await;
        insert(&store, &memory("b", "?", secs(0))).await;
        store
            .upsert_association(&Association::new("a", "b", AssociationType::Temporal, 0.8, secs(0)))
            .await
            .unwrap();

        let chunks = discover_chunks(&store, &config).await.unwrap();
        assert_eq!(chunks[0].label, "chunk");
    }
}
