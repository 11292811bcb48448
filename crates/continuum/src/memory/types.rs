//! Memory types for the Continuum system
//!
//! Defines the entry record owned by each level, the observable outcome
//! of mutating calls, and the read-only stats snapshots exposed for
//! observability.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single record stored inside one memory level.
///
/// Owned exclusively by the level that stores it; levels never share
/// entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Opaque unique key supplied by the caller
    pub key: String,
    /// Opaque domain record (code fragment, message, execution record)
    pub payload: Value,
    /// Embedding at the owning level's dimensionality
    pub embedding: Vec<f32>,
    /// Surprise score attached at the last update, in [0, 1]
    pub surprise: f32,
    /// Global step at which this entry was first recorded
    pub recorded_step: u64,
    /// Global step of the most recent write
    pub updated_step: u64,
    /// Wall-clock insertion timestamp (observability only)
    pub created_at: DateTime<Utc>,
    /// Wall-clock timestamp of the most recent write
    pub updated_at: DateTime<Utc>,
}

impl MemoryEntry {
    /// Create a fresh entry at the given step
    pub fn new(key: String, payload: Value, embedding: Vec<f32>, step: u64) -> Self {
        let now = Utc::now();
        Self {
            key,
            payload,
            embedding,
            surprise: 0.0,
            recorded_step: step,
            updated_step: step,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Observable outcome of a mutating level call.
///
/// Frozen rejection is an explicit outcome rather than a silent no-op so
/// callers and tests can see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    /// A new entry was inserted
    Inserted,
    /// An existing entry with the same key was overwritten
    Updated,
    /// The level is frozen; nothing was mutated
    RejectedFrozen,
}

impl WriteOutcome {
    /// Whether the call mutated the level
    pub fn mutated(&self) -> bool {
        !matches!(self, Self::RejectedFrozen)
    }
}

/// Per-level counters and gauges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelStats {
    /// Level name
    pub name: String,
    /// Successful encode operations
    pub encodes: u64,
    /// Encode failures absorbed with the neutral embedding
    pub encode_failures: u64,
    /// Surprise-carrying update operations
    pub updates: u64,
    /// Query operations served
    pub retrievals: u64,
    /// Running average of surprise scores seen by this level
    pub avg_surprise: f32,
    /// Global step of the most recent mutation
    pub last_updated_step: u64,
    /// Current entry count
    pub size: usize,
    /// Configured consolidation cadence
    pub update_freq: u64,
    /// Whether this level is frozen
    pub frozen: bool,
}

/// Read-only snapshot of a whole CMS instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsStats {
    /// The shared step counter
    pub global_step: u64,
    /// Per-level stats keyed by level name
    pub levels: BTreeMap<String, LevelStats>,
}

/// One merged retrieval result, tagged with its originating level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    /// Key of the matching entry
    pub key: String,
    /// Name of the level the entry came from
    pub level: String,
    /// Raw cosine similarity at the originating level, in [0, 1]
    pub similarity: f32,
    /// Final merged score after level weighting and surprise demotion,
    /// in [0, 1]
    pub score: f32,
    /// The stored payload
    pub payload: Value,
}
