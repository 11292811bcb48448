//! Surprise metrics gating memory consolidation
//!
//! Surprise quantifies how unexpected an observed outcome was versus a
//! prediction, always in [0, 1]. It is an advisory signal: malformed
//! input degrades to a neutral 0.5 rather than erroring, so a bad
//! prediction vector can never take down a store/update path.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::embedding::tokenize;

/// Smallest probability mass after distribution clipping
const PROB_EPSILON: f64 = 1e-10;

/// Which metric a [`SurpriseCalculator`] applies, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurpriseMetric {
    /// Mean squared error through a saturating curve
    ErrorBased,
    /// Angular distance derived from cosine similarity
    AngularDistance,
    /// KL-style divergence between normalized distributions
    Divergence,
}

/// Computes bounded surprise scores from (actual, predicted) pairs
#[derive(Debug, Clone, Copy)]
pub struct SurpriseCalculator {
    metric: SurpriseMetric,
}

impl SurpriseCalculator {
    /// Create a calculator with the given metric
    pub fn new(metric: SurpriseMetric) -> Self {
        Self { metric }
    }

    /// The metric this calculator dispatches to
    pub fn metric(&self) -> SurpriseMetric {
        self.metric
    }

    /// Compute surprise for an (actual, predicted) vector pair.
    ///
    /// Always returns a value in [0, 1]. Empty, mismatched, or
    /// non-finite input yields the neutral 0.5. A zero-norm or
    /// antiparallel pair in angular mode is defined (maximum surprise),
    /// not malformed.
    pub fn compute(&self, actual: &[f32], predicted: &[f32]) -> f32 {
        if actual.is_empty() || actual.len() != predicted.len() {
            return 0.5;
        }
        if !is_finite(actual) || !is_finite(predicted) {
            return 0.5;
        }

        let surprise = match self.metric {
            SurpriseMetric::ErrorBased => error_surprise(actual, predicted),
            SurpriseMetric::AngularDistance => angular_surprise(actual, predicted),
            SurpriseMetric::Divergence => divergence_surprise(actual, predicted),
        };
        surprise.clamp(0.0, 1.0)
    }
}

impl Default for SurpriseCalculator {
    fn default() -> Self {
        Self::new(SurpriseMetric::AngularDistance)
    }
}

fn is_finite(values: &[f32]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// MSE saturating toward 1 as error grows unbounded, 0 as error -> 0
fn error_surprise(actual: &[f32], predicted: &[f32]) -> f32 {
    let mse: f32 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p) * (a - p))
        .sum::<f32>()
        / actual.len() as f32;
    mse / (1.0 + mse)
}

/// Maps cosine similarity in [-1, 1] to surprise in [0, 1]; zero-norm
/// inputs are maximally surprising.
fn angular_surprise(actual: &[f32], predicted: &[f32]) -> f32 {
    let dot: f32 = actual.iter().zip(predicted.iter()).map(|(a, p)| a * p).sum();
    let norm_a: f32 = actual.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_p: f32 = predicted.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_p == 0.0 {
        return 1.0;
    }
    let cosine = (dot / (norm_a * norm_p)).clamp(-1.0, 1.0);
    (1.0 - cosine) / 2.0
}

/// Normalizes both inputs to clipped probability distributions, takes KL
/// divergence, and maps it through `1 - e^(-kl)`.
fn divergence_surprise(actual: &[f32], predicted: &[f32]) -> f32 {
    let p = to_distribution(actual);
    let q = to_distribution(predicted);
    let kl: f64 = p
        .iter()
        .zip(q.iter())
        .map(|(pi, qi)| pi * (pi / qi).ln())
        .sum();
    (1.0 - (-kl.max(0.0)).exp()) as f32
}

fn to_distribution(values: &[f32]) -> Vec<f64> {
    let shifted: Vec<f64> = values
        .iter()
        .map(|v| (*v as f64).abs().max(PROB_EPSILON))
        .collect();
    let total: f64 = shifted.iter().sum();
    shifted.into_iter().map(|v| v / total).collect()
}

/// Token-set Jaccard surprise for textual patterns, for callers that
/// prefer not to invoke embeddings.
///
/// Similarity at or above `threshold` maps to low surprise, below it to
/// high surprise, scaled into [0, 1].
pub fn compute_code_surprise(observed: &str, expected: &str, threshold: f32) -> f32 {
    let threshold = threshold.clamp(0.0, 1.0);
    let observed_tokens: HashSet<String> = tokenize(observed).into_iter().collect();
    let expected_tokens: HashSet<String> = tokenize(expected).into_iter().collect();

    if observed_tokens.is_empty() && expected_tokens.is_empty() {
        return 0.0;
    }
    if observed_tokens.is_empty() || expected_tokens.is_empty() {
        return 1.0;
    }

    let intersection = observed_tokens.intersection(&expected_tokens).count() as f32;
    let union = observed_tokens.union(&expected_tokens).count() as f32;
    let jaccard = intersection / union;

    if jaccard >= threshold {
        // Inside the acceptance band: scale down toward 0 at perfect match
        if threshold >= 1.0 {
            return 0.0;
        }
        0.5 * (1.0 - jaccard) / (1.0 - threshold).max(f32::EPSILON)
    } else {
        // Below the band: scale up toward 1 at zero overlap
        0.5 + 0.5 * (threshold - jaccard) / threshold.max(f32::EPSILON)
    }
}
