//! Cognitive tunables
//!
//! Every scoring, graph and maintenance constant the engine uses lives here.
//! Values come from [`Default`], optionally overlaid by a partial JSON
//! document and then by `ENGRAM_*` environment variables.

use crate::error::{MemoryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CognitiveConfig {
    /// Power-law decay exponent `d` in the base-level equation
    pub decay_rate: f64,
    /// Activation a memory must exceed to be recalled
    pub retrieval_threshold: f64,
    /// `F` in the latency equation
    pub latency_factor: f64,
    /// `f` in the latency equation
    pub latency_exponent: f64,
    /// Standard deviation of activation noise
    pub activation_noise: f64,
    /// Number of working-memory slots
    pub working_memory_capacity: usize,
    /// Maximum associative strength `S` before fan attenuation
    pub max_spreading_activation: f64,
    /// Associations weaker than this are deleted by consolidation
    pub min_association_strength: f64,
    /// Multiplier applied to emotion weight in the emotion boost
    pub emotional_boost_factor: f64,
    /// Non-procedural memories below this activation are pruned
    pub pruning_threshold: f64,
    /// Reserved: minimum co-occurrences before an association is formed.
    /// No formation rule reads it yet.
    pub association_formation_threshold: u32,
    /// Strength added to an existing edge when its endpoints are co-recalled
    pub retrieval_strengthening_boost: f64,
    /// Weight of the new emotion during reconsolidation
    pub reconsolidation_blend_rate: f64,
    /// Minimum edge strength for two memories to share a chunk
    pub chunking_similarity_threshold: f64,
    /// Episodes sharing a keyword needed to extract a semantic fact
    pub semantic_extraction_threshold: usize,
    /// Same-context neighbours considered by temporal and causal linking
    pub temporal_context_window: usize,
    /// Maximum depth of spreading activation during recall
    pub recall_spreading_depth: u32,
    /// Seed weight for working-memory items during recall
    pub working_memory_priming_weight: f64,
    /// SQLite database location (`~` is expanded)
    pub db_path: PathBuf,
}

impl Default for CognitiveConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.5,
            retrieval_threshold: -3.0,
            latency_factor: 1.0,
            latency_exponent: 1.0,
            activation_noise: 0.25,
            working_memory_capacity: 7,
            max_spreading_activation: 1.5,
            min_association_strength: 0.1,
            emotional_boost_factor: 2.0,
            pruning_threshold: -2.0,
            association_formation_threshold: 2,
            retrieval_strengthening_boost: 0.1,
            reconsolidation_blend_rate: 0.1,
            chunking_similarity_threshold: 0.6,
            semantic_extraction_threshold: 3,
            temporal_context_window: 10,
            recall_spreading_depth: 3,
            working_memory_priming_weight: 0.5,
            db_path: PathBuf::from("~/.engram/memory.db"),
        }
    }
}

impl CognitiveConfig {
    /// Defaults overlaid with `ENGRAM_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Parse a (possibly partial) JSON document; missing keys keep defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)?.with_env_overrides()
    }

    /// Apply `ENGRAM_DB_PATH`, `ENGRAM_DECAY_RATE`, `ENGRAM_WM_CAPACITY`
    /// and `ENGRAM_RETRIEVAL_THRESHOLD`
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(path) = std::env::var("ENGRAM_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(rate) = env_number("ENGRAM_DECAY_RATE")? {
            self.decay_rate = rate;
        }
        if let Some(capacity) = env_number("ENGRAM_WM_CAPACITY")? {
            self.working_memory_capacity = capacity;
        }
        if let Some(threshold) = env_number("ENGRAM_RETRIEVAL_THRESHOLD")? {
            self.retrieval_threshold = threshold;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the scoring functions cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.decay_rate > 0.0) {
            return Err(MemoryError::Configuration(format!(
                "decay_rate must be positive, got {}",
                self.decay_rate
            )));
        }
        if self.working_memory_capacity == 0 {
            return Err(MemoryError::Configuration(
                "working_memory_capacity must be at least 1".to_string(),
            ));
        }
        if self.activation_noise < 0.0 {
            return Err(MemoryError::Configuration(
                "activation_noise must not be negative".to_string(),
            ));
        }
        for (name, value) in [
            ("reconsolidation_blend_rate", self.reconsolidation_blend_rate),
            ("working_memory_priming_weight", self.working_memory_priming_weight),
            ("min_association_strength", self.min_association_strength),
            ("chunking_similarity_threshold", self.chunking_similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MemoryError::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    /// `db_path` with a leading `~` replaced by the home directory
    pub fn resolved_db_path(&self) -> PathBuf {
        resolve_db_path(&self.db_path)
    }
}

/// Expand a leading `~` using `HOME` (or `USERPROFILE`), falling back to `/tmp`
pub fn resolve_db_path(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(rest)
        }
        Err(_) => path.to_path_buf(),
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| MemoryError::Configuration(format!("{key} is not a valid number: {raw}"))),
        Err(_) => Ok(None),
    }
}

/// Builder for cognitive config
pub struct CognitiveConfigBuilder {
    config: CognitiveConfig,
}

impl CognitiveConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CognitiveConfig::default(),
        }
    }

    pub fn decay_rate(mut self, rate: f64) -> Self {
        self.config.decay_rate = rate;
        self
    }

    pub fn retrieval_threshold(mut self, threshold: f64) -> Self {
        self.config.retrieval_threshold = threshold;
        self
    }

    pub fn pruning_threshold(mut self, threshold: f64) -> Self {
        self.config.pruning_threshold = threshold;
        self
    }

    pub fn activation_noise(mut self, stddev: f64) -> Self {
        self.config.activation_noise = stddev;
        self
    }

    pub fn working_memory_capacity(mut self, capacity: usize) -> Self {
        self.config.working_memory_capacity = capacity;
        self
    }

    pub fn max_spreading_activation(mut self, strength: f64) -> Self {
        self.config.max_spreading_activation = strength;
        self
    }

    pub fn min_association_strength(mut self, strength: f64) -> Self {
        self.config.min_association_strength = strength;
        self
    }

    pub fn emotional_boost_factor(mut self, factor: f64) -> Self {
        self.config.emotional_boost_factor = factor;
        self
    }

    pub fn reconsolidation_blend_rate(mut self, rate: f64) -> Self {
        self.config.reconsolidation_blend_rate = rate;
        self
    }

    pub fn chunking_similarity_threshold(mut self, threshold: f64) -> Self {
        self.config.chunking_similarity_threshold = threshold;
        self
    }

    pub fn semantic_extraction_threshold(mut self, threshold: usize) -> Self {
        self.config.semantic_extraction_threshold = threshold;
        self
    }

    pub fn temporal_context_window(mut self, window: usize) -> Self {
        self.config.temporal_context_window = window;
        self
    }

    pub fn recall_spreading_depth(mut self, depth: u32) -> Self {
        self.config.recall_spreading_depth = depth;
        self
    }

    pub fn working_memory_priming_weight(mut self, weight: f64) -> Self {
        self.config.working_memory_priming_weight = weight;
        self
    }

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    pub fn build(self) -> CognitiveConfig {
        self.config
    }
}

impl Default for CognitiveConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CognitiveConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.working_memory_capacity, 7);
        assert_eq!(config.retrieval_threshold, -3.0);
        assert_eq!(config.recall_spreading_depth, 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            CognitiveConfig::from_json(r#"{ "decay_rate": 0.7, "working_memory_capacity": 4 }"#)
                .unwrap();
        assert_eq!(config.decay_rate, 0.7);
        assert_eq!(config.working_memory_capacity, 4);
        assert_eq!(config.pruning_threshold, -2.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = CognitiveConfigBuilder::new().working_memory_capacity(0).build();
        assert!(matches!(config.validate(), Err(MemoryError::Configuration(_))));

        let config = CognitiveConfigBuilder::new().reconsolidation_blend_rate(1.5).build();
        assert!(config.validate().is_err());

        assert!(CognitiveConfig::from_json(r#"{ "decay_rate": -1.0 }"#).is_err());
    }

    #[test]
    fn tilde_is_expanded() {
        let resolved = resolve_db_path(Path::new("~/.engram/memory.db"));
        assert!(!resolved.starts_with("~"));
        assert!(resolved.ends_with(".engram/memory.db"));

        let absolute = resolve_db_path(Path::new("/var/db/memory.db"));
        assert_eq!(absolute, PathBuf::from("/var/db/memory.db"));
    }
}
