//! Activation model
//!
//! Closed-form retrievability scoring:
//!
//! ```text
//! B_i  = ln(Σ t_j^(-d))            base level, t_j = seconds since access j
//! S_ji = S - ln(fan_j)             fan-attenuated associative strength
//! A_i  = B_i + Σ W_j·S_ji + ε      total activation
//! T_i  = F · e^(-f·A_i)            retrieval latency
//! ```

use crate::config::CognitiveConfig;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Smallest elapsed time (seconds) an access contributes with
const MIN_ELAPSED_SECS: f64 = 0.001;

// ─── Base Level ───────────────────────────────────────────────────────────────

/// Base-level activation from the full access history.
///
/// Returns negative infinity for an empty history.
pub fn base_level(timestamps: &[DateTime<Utc>], now: DateTime<Utc>, decay_rate: f64) -> f64 {
    if timestamps.is_empty() {
        return f64::NEG_INFINITY;
    }

    let sum: f64 = timestamps
        .iter()
        .map(|ts| {
            let elapsed = (now - *ts).num_milliseconds() as f64 / 1000.0;
            elapsed.max(MIN_ELAPSED_SECS).powf(-decay_rate)
        })
        .sum();

    sum.ln()
}

/// Additive boost for emotionally tagged memories
pub fn emotion_boost(weight: f64, factor: f64) -> f64 {
    if weight > 0.0 {
        (1.0 + weight * factor).ln()
    } else {
        0.0
    }
}

/// Associative strength a node can spread, attenuated by its fan-out
pub fn fan_attenuated_strength(max_strength: f64, fan_count: usize) -> f64 {
    if fan_count == 0 {
        return 0.0;
    }
    (max_strength - (fan_count as f64).ln()).max(0.0)
}

pub fn total(base: f64, spreading_sum: f64, noise: f64) -> f64 {
    base + spreading_sum + noise
}

/// Predicted retrieval time; falls as activation rises
pub fn latency(activation: f64, factor: f64, exponent: f64) -> f64 {
    factor * (-exponent * activation).exp()
}

pub fn retrievable(activation: f64, threshold: f64) -> bool {
    activation > threshold
}

// ─── Noise ────────────────────────────────────────────────────────────────────

/// Source of transient activation noise
pub trait NoiseSource: Send + Sync {
    /// Sample noise with the given standard deviation
    fn sample(&self, stddev: f64) -> f64;
}

/// Gaussian noise via the Box–Muller transform
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianNoise;

impl NoiseSource for GaussianNoise {
    fn sample(&self, stddev: f64) -> f64 {
        if stddev == 0.0 {
            return 0.0;
        }
        let mut rng = rand::rng();
        // u1 in (0, 1] keeps ln finite
        let u1: f64 = 1.0 - rng.random::<f64>();
        let u2: f64 = rng.random::<f64>();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        z * stddev
    }
}

/// Always zero; makes scoring deterministic
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroNoise;

impl NoiseSource for ZeroNoise {
    fn sample(&self, _stddev: f64) -> f64 {
        0.0
    }
}

// ─── Combined ─────────────────────────────────────────────────────────────────

/// Components of one activation computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivationBreakdown {
    pub activation: f64,
    /// Base level including the emotion boost
    pub base_level: f64,
    pub spreading: f64,
    pub noise: f64,
    pub latency: f64,
}

/// Full activation of a memory given its history, priming and affect
pub fn compute_activation(
    timestamps: &[DateTime<Utc>],
    now: DateTime<Utc>,
    config: &CognitiveConfig,
    spreading: f64,
    emotion_weight: f64,
    noise: &dyn NoiseSource,
) -> ActivationBreakdown {
    let base = base_level(timestamps, now, config.decay_rate)
        + emotion_boost(emotion_weight, config.emotional_boost_factor);
    let noise = noise.sample(config.activation_noise);
    let activation = total(base, spreading, noise);

    ActivationBreakdown {
        activation,
        base_level: base,
        spreading,
        noise,
        latency: latency(activation, config.latency_factor, config.latency_exponent),
    }
}

/// Cached activation used for refresh and pruning: base level plus emotion
pub fn resting_activation(
    timestamps: &[DateTime<Utc>],
    now: DateTime<Utc>,
    emotion_weight: f64,
    config: &CognitiveConfig,
) -> f64 {
    base_level(timestamps, now, config.decay_rate)
        + emotion_boost(emotion_weight, config.emotional_boost_factor)
}
