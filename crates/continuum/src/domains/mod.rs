//! Domain specializations of the Continuum Memory System
//!
//! Each specialization is a pre-configured CMS with its own level layout,
//! per-level encoders, and entry points for recording events, learning
//! from feedback, and retrieving merged suggestions.

pub mod chat;
pub mod code;
pub mod scenario;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::memory::cms::ContinuumMemorySystem;
use crate::memory::types::ScoredItem;

pub use chat::{ConversationTurn, ConversationalMemory};
pub use code::{CodeFragment, CodeMemory};
pub use scenario::{ExecutionRecord, ScenarioMemory, TuningAction, TuningDecision};

/// Over-fetch factor per level before merging, so reranking has slack
pub(crate) const CANDIDATE_MULTIPLIER: usize = 3;

/// How strongly a stored surprise score demotes an item in the merged
/// ranking. A surprise of 1.0 halves the weighted similarity.
const SURPRISE_DEMOTION: f32 = 0.5;

/// Merge per-level ranked lists into one list.
///
/// Each candidate's score is `similarity x level_weight x
/// (1 - 0.5 x surprise)`, clamped to [0, 1]. Duplicate payloads keep
/// their best-scoring occurrence; ties order by key for determinism.
pub(crate) fn merge_ranked(
    cms: &ContinuumMemorySystem,
    per_level: BTreeMap<String, Vec<(String, f32, Value)>>,
    weights: &BTreeMap<String, f32>,
    k: usize,
) -> Vec<ScoredItem> {
    let mut merged: Vec<ScoredItem> = Vec::new();

    for (level_name, ranked) in per_level {
        let weight = weights.get(&level_name).copied().unwrap_or(0.5);
        for (key, similarity, payload) in ranked {
            let similarity = similarity.clamp(0.0, 1.0);
            let surprise = cms
                .level(&level_name)
                .and_then(|l| l.surprise_of(&key))
                .unwrap_or(0.0);
            let score =
                (similarity * weight * (1.0 - SURPRISE_DEMOTION * surprise)).clamp(0.0, 1.0);
            merged.push(ScoredItem {
                key,
                level: level_name.clone(),
                similarity,
                score,
                payload,
            });
        }
    }

    // Deduplicate by payload content, keeping the best-scoring copy
    let mut best: BTreeMap<String, ScoredItem> = BTreeMap::new();
    for item in merged {
        let content = payload_fingerprint(&item.payload);
        match best.get(&content) {
            Some(existing) if existing.score >= item.score => {}
            _ => {
                best.insert(content, item);
            }
        }
    }

    let mut results: Vec<ScoredItem> = best.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.key.cmp(&b.key))
    });
    results.truncate(k);
    results
}

/// Canonical content string used for payload deduplication
fn payload_fingerprint(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            for field in ["text", "content", "code"] {
                if let Some(Value::String(s)) = map.get(field) {
                    return s.clone();
                }
            }
            payload.to_string()
        }
        _ => payload.to_string(),
    }
}
