//! Memory types and graph structures

use crate::error::MemoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for memories
pub type MemoryId = String;

/// A discrete memory record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    /// Content-derived identifier (`epi:some-slug:1a2b3c`)
    pub id: MemoryId,
    /// Memory system this record belongs to
    pub kind: MemoryKind,
    /// The memory content
    pub content: String,
    /// When the memory was encoded
    pub encoded_at: DateTime<Utc>,
    /// When the memory was last surfaced by recall
    pub last_recalled_at: Option<DateTime<Utc>>,
    /// Number of successful recalls
    pub recall_count: i64,
    /// Cached activation score (refreshed by recall and consolidation)
    pub activation: f64,
    /// Affective tag
    pub emotion: Emotion,
    /// Strength of the affective tag (0.0 - 1.0)
    pub emotion_weight: f64,
    /// Free-text context tag, matched by prefix
    pub context: Option<String>,
    /// Chunk this memory was clustered into
    pub chunk_id: Option<String>,
    /// Number of times this memory was reconsolidated
    pub reconsolidation_count: i64,
}

impl Memory {
    /// Procedural memories never decay out of the store
    pub fn is_decay_exempt(&self) -> bool {
        self.kind == MemoryKind::Procedural
    }

    /// Whether this memory's context starts with `prefix`
    pub fn context_matches(&self, prefix: &str) -> bool {
        self.context
            .as_deref()
            .is_some_and(|ctx| ctx.starts_with(prefix))
    }
}

/// The three memory systems
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Something that happened
    Episodic,
    /// A fact or generalization
    Semantic,
    /// A skill; immune to decay
    Procedural,
}

impl MemoryKind {
    /// All memory kinds
    pub const ALL: &[MemoryKind] = &[
        MemoryKind::Episodic,
        MemoryKind::Semantic,
        MemoryKind::Procedural,
    ];

    /// Prefix used in content-derived ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            MemoryKind::Episodic => "epi",
            MemoryKind::Semantic => "sem",
            MemoryKind::Procedural => "proc",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Episodic => "episodic",
            MemoryKind::Semantic => "semantic",
            MemoryKind::Procedural => "procedural",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "episodic" => Ok(MemoryKind::Episodic),
            "semantic" => Ok(MemoryKind::Semantic),
            "procedural" => Ok(MemoryKind::Procedural),
            other => Err(MemoryError::Validation(format!(
                "invalid memory kind '{other}' (expected episodic, semantic or procedural)"
            ))),
        }
    }
}

/// Affective tag attached to a memory
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Joy,
    Anxiety,
    Frustration,
    Surprise,
    Satisfaction,
    Curiosity,
    Neutral,
}

/// Coarse arousal grouping used by emotional association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArousalTier {
    High,
    Medium,
    Low,
}

impl Emotion {
    /// All emotions
    pub const ALL: &[Emotion] = &[
        Emotion::Joy,
        Emotion::Anxiety,
        Emotion::Frustration,
        Emotion::Surprise,
        Emotion::Satisfaction,
        Emotion::Curiosity,
        Emotion::Neutral,
    ];

    /// Weight used when the caller does not supply one
    pub fn default_weight(&self) -> f64 {
        match self {
            Emotion::Anxiety => 0.8,
            Emotion::Surprise => 0.7,
            Emotion::Frustration => 0.6,
            Emotion::Joy => 0.5,
            Emotion::Satisfaction => 0.4,
            Emotion::Curiosity => 0.3,
            Emotion::Neutral => 0.0,
        }
    }

    pub fn arousal_tier(&self) -> ArousalTier {
        match self {
            Emotion::Anxiety | Emotion::Surprise => ArousalTier::High,
            Emotion::Joy | Emotion::Frustration => ArousalTier::Medium,
            Emotion::Satisfaction | Emotion::Curiosity | Emotion::Neutral => ArousalTier::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Anxiety => "anxiety",
            Emotion::Frustration => "frustration",
            Emotion::Surprise => "surprise",
            Emotion::Satisfaction => "satisfaction",
            Emotion::Curiosity => "curiosity",
            Emotion::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Emotion::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| MemoryError::Validation(format!("invalid emotion '{s}'")))
    }
}

/// Why a memory was accessed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Encode,
    Recall,
    Consolidate,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Encode => "encode",
            AccessType::Recall => "recall",
            AccessType::Consolidate => "consolidate",
        }
    }
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "encode" => Ok(AccessType::Encode),
            "recall" => Ok(AccessType::Recall),
            "consolidate" => Ok(AccessType::Consolidate),
            other => Err(MemoryError::Validation(format!("invalid access type '{other}'"))),
        }
    }
}

/// One entry of the append-only access log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessLogEntry {
    pub id: String,
    pub memory_id: MemoryId,
    pub accessed_at: DateTime<Utc>,
    pub access_type: AccessType,
}

/// Association between two memories (graph edge)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Association {
    /// Unique identifier
    pub id: String,
    /// Source memory ID
    pub source_id: MemoryId,
    /// Target memory ID
    pub target_id: MemoryId,
    /// Edge strength (0.0 - 1.0)
    pub strength: f64,
    /// When the association was formed
    pub formed_at: DateTime<Utc>,
    /// How the association was formed
    pub association_type: AssociationType,
}

impl Association {
    /// Create a new association
    pub fn new(
        source_id: impl Into<MemoryId>,
        target_id: impl Into<MemoryId>,
        association_type: AssociationType,
        strength: f64,
        formed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            strength: strength.clamp(0.0, 1.0),
            formed_at,
            association_type,
        }
    }

    /// The endpoint opposite `memory_id`
    pub fn other_end(&self, memory_id: &str) -> &str {
        if self.source_id == memory_id {
            &self.target_id
        } else {
            &self.source_id
        }
    }

    /// Endpoints ordered lexicographically; the storage uniqueness key
    pub fn pair_key(&self) -> (&str, &str) {
        ordered_pair(&self.source_id, &self.target_id)
    }
}

/// Order two ids so that an unordered pair has a single representation
pub fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Types of associations between memories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AssociationType {
    /// Encoded close together in time or context
    Temporal,
    /// Shared keywords
    Semantic,
    /// Shared affect
    Emotional,
    /// Earlier event preceding a later one in the same context
    Causal,
    /// Recalled together
    CoRecall,
}

impl AssociationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationType::Temporal => "temporal",
            AssociationType::Semantic => "semantic",
            AssociationType::Emotional => "emotional",
            AssociationType::Causal => "causal",
            AssociationType::CoRecall => "co-recall",
        }
    }
}

impl std::fmt::Display for AssociationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssociationType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temporal" => Ok(AssociationType::Temporal),
            "semantic" => Ok(AssociationType::Semantic),
            "emotional" => Ok(AssociationType::Emotional),
            "causal" => Ok(AssociationType::Causal),
            "co-recall" => Ok(AssociationType::CoRecall),
            other => Err(MemoryError::Validation(format!(
                "invalid association type '{other}'"
            ))),
        }
    }
}

/// A slot of the working-memory buffer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingMemorySlot {
    pub slot: u32,
    pub memory_ref: Option<MemoryId>,
    pub content: String,
    pub pushed_at: DateTime<Utc>,
}

/// Audit record of one consolidation pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsolidationLogEntry {
    pub id: String,
    pub ran_at: DateTime<Utc>,
    pub strengthened: i64,
    pub pruned: i64,
    pub facts_extracted: i64,
    pub associations_discovered: i64,
}

/// A cluster of strongly associated memories
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub member_ids: Vec<MemoryId>,
    pub label: String,
}

/// Input for encoding a memory
#[derive(Debug, Clone)]
pub struct EncodeInput {
    pub content: String,
    pub kind: MemoryKind,
    pub emotion: Option<Emotion>,
    pub emotion_weight: Option<f64>,
    pub context: Option<String>,
}

impl EncodeInput {
    pub fn new(content: impl Into<String>, kind: MemoryKind) -> Self {
        Self {
            content: content.into(),
            kind,
            emotion: None,
            emotion_weight: None,
            context: None,
        }
    }

    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = Some(emotion);
        self
    }

    pub fn with_emotion_weight(mut self, weight: f64) -> Self {
        self.emotion_weight = Some(weight);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// A ranked recall hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallResult {
    /// The memory, as persisted after retrieval strengthening
    pub memory: Memory,
    /// Activation the memory was ranked by
    pub activation: f64,
    /// Spreading component of `activation`
    pub spreading_activation: f64,
    /// Predicted retrieval latency in seconds
    pub latency: f64,
}

/// Build a content-derived memory id: `<prefix>:<slug>:<hash6>`.
///
/// `salt` is mixed into the hash together with the content so that two
/// encodes of identical content get distinct ids.
pub fn generate_memory_id(content: &str, kind: MemoryKind, salt: &str) -> MemoryId {
    format!(
        "{}:{}:{}",
        kind.id_prefix(),
        content_slug(content, 30),
        short_hash(&format!("{content}{salt}"))
    )
}

fn content_slug(content: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(content.len());
    for c in content.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let cut: String = slug.chars().take(max_len).collect();
    cut.trim_end_matches('-').to_string()
}

/// 32-bit FNV-1a, first six hex digits
fn short_hash(input: &str) -> String {
    let mut h: u32 = 0x811c_9dc5;
    for unit in input.encode_utf16() {
        h ^= u32::from(unit);
        h = h.wrapping_mul(0x0100_0193);
    }
    let mut hex = format!("{h:06x}");
    hex.truncate(6);
    hex
}
