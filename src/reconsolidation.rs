//! Reconsolidation: a recalled memory absorbs the context it was recalled in

use crate::config::CognitiveConfig;
use crate::error::{MemoryError, Result};
use crate::types::{Emotion, Memory};
use serde::{Deserialize, Serialize};

/// Weight assumed for the current emotion when the caller gives none
const DEFAULT_CURRENT_WEIGHT: f64 = 0.5;
/// Blend rates above this always adopt the new emotion label
const RELABEL_BLEND_RATE: f64 = 0.3;
/// Stored weights below this are weak enough to be relabelled
const RELABEL_WEIGHT_CEILING: f64 = 0.2;

/// Circumstances of the recall that triggers reconsolidation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconsolidationContext {
    pub new_context: Option<String>,
    pub current_emotion: Option<Emotion>,
    pub current_emotion_weight: Option<f64>,
}

impl ReconsolidationContext {
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.new_context = Some(context.into());
        self
    }

    pub fn with_emotion(mut self, emotion: Emotion, weight: Option<f64>) -> Self {
        self.current_emotion = Some(emotion);
        self.current_emotion_weight = weight;
        self
    }
}

/// Blend the recall context into `memory`.
///
/// The context tag gains `", new"` unless it already contains the new text.
/// A differing emotion moves the weight toward the new one by
/// `reconsolidation_blend_rate`; the label itself only changes when the rate
/// exceeds 0.3 or the stored weight is below 0.2. A non-finite current
/// weight is rejected with `Validation`.
pub fn reconsolidate(
    mut memory: Memory,
    recall: &ReconsolidationContext,
    config: &CognitiveConfig,
) -> Result<Memory> {
    if let Some(weight) = recall.current_emotion_weight.filter(|w| !w.is_finite()) {
        return Err(MemoryError::Validation(format!(
            "emotion weight must be a finite number, got {weight}"
        )));
    }
    let rate = config.reconsolidation_blend_rate;

    if let Some(new_context) = recall.new_context.as_deref().filter(|c| !c.is_empty()) {
        memory.context = match memory.context.take() {
            Some(old) if old.contains(new_context) => Some(old),
            Some(old) => Some(format!("{old}, {new_context}")),
            None => Some(new_context.to_string()),
        };
    }

    if let Some(emotion) = recall.current_emotion.filter(|e| *e != memory.emotion) {
        let new_weight = recall
            .current_emotion_weight
            .unwrap_or(DEFAULT_CURRENT_WEIGHT);
        let blended = memory.emotion_weight * (1.0 - rate) + new_weight * rate;

        if rate > RELABEL_BLEND_RATE || memory.emotion_weight < RELABEL_WEIGHT_CEILING {
            memory.emotion = emotion;
        }
        memory.emotion_weight = blended.clamp(0.0, 1.0);
    }

    memory.reconsolidation_count += 1;
    Ok(memory)
}
