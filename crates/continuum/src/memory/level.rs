//! A single temporal-scale memory level
//!
//! Each level owns an LRU-ordered entry index, a fixed encoding strategy,
//! and its own counters. Writes to a frozen level are rejected with an
//! explicit outcome; encoding failures are absorbed with a neutral
//! embedding so a malformed payload can never crash a caller.

use std::num::NonZeroUsize;

use lru::LruCache;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MemoryLevelConfig;
use crate::embedding::{Context, Encoder, cosine_similarity};
use crate::error::{ContinuumError, Result};
use crate::memory::types::{LevelStats, MemoryEntry, WriteOutcome};

/// Entries whose decayed retention falls below this floor are dropped
/// during consolidation.
const RETENTION_FLOOR: f32 = 0.05;

/// One temporal-scale store: key -> payload plus an embedding index
pub struct MemoryLevel {
    config: MemoryLevelConfig,
    encoder: Encoder,
    entries: LruCache<String, MemoryEntry>,
    encodes: u64,
    encode_failures: u64,
    updates: u64,
    retrievals: u64,
    surprise_sum: f64,
    surprise_count: u64,
    last_updated_step: u64,
}

impl MemoryLevel {
    /// Create an empty level with the given config and encoder.
    ///
    /// The encoder's dimensionality must match the config; every stored
    /// key maps to exactly one embedding of that dimensionality.
    pub fn new(config: MemoryLevelConfig, encoder: Encoder) -> Result<Self> {
        config.validate()?;
        if encoder.dimension() != config.dimension {
            return Err(ContinuumError::Config(format!(
                "level '{}': encoder dimension {} does not match configured dimension {}",
                config.name,
                encoder.dimension(),
                config.dimension
            )));
        }
        let capacity = NonZeroUsize::new(config.capacity)
            .ok_or_else(|| ContinuumError::Config("capacity must be >= 1".to_string()))?;
        Ok(Self {
            config,
            encoder,
            entries: LruCache::new(capacity),
            encodes: 0,
            encode_failures: 0,
            updates: 0,
            retrievals: 0,
            surprise_sum: 0.0,
            surprise_count: 0,
            last_updated_step: 0,
        })
    }

    /// Level name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether this level is frozen
    pub fn is_frozen(&self) -> bool {
        self.config.frozen
    }

    /// Consolidation cadence in global steps
    pub fn update_freq(&self) -> u64 {
        self.config.update_freq
    }

    /// Current entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the level holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seed an entry regardless of the frozen flag.
    ///
    /// Used at construction time to populate frozen levels with static
    /// knowledge; a frozen level's entry count never changes afterwards.
    pub fn seed(&mut self, key: impl Into<String>, payload: Value, context: &Context) {
        let key = key.into();
        let embedding = self.encode_or_neutral(&payload, context);
        let entry = MemoryEntry::new(key.clone(), payload, embedding, 0);
        self.entries.put(key, entry);
    }

    /// Encode a payload with this level's strategy.
    ///
    /// Pure and deterministic. Surfaces [`ContinuumError::Encoding`] only
    /// to direct callers; the store/update paths absorb it.
    pub fn encode(&self, payload: &Value, context: &Context) -> Result<Vec<f32>> {
        self.encoder.encode(payload, context)
    }

    /// Insert or overwrite an entry. Rejected without mutation when the
    /// level is frozen.
    pub fn store(
        &mut self,
        key: impl Into<String>,
        payload: Value,
        context: &Context,
        step: u64,
    ) -> WriteOutcome {
        self.write(key.into(), payload, context, step, None)
    }

    /// As [`store`](Self::store), additionally recording a surprise score.
    pub fn update(
        &mut self,
        key: impl Into<String>,
        payload: Value,
        context: &Context,
        step: u64,
        surprise: f32,
    ) -> WriteOutcome {
        self.write(key.into(), payload, context, step, Some(surprise))
    }

    fn write(
        &mut self,
        key: String,
        payload: Value,
        context: &Context,
        step: u64,
        surprise: Option<f32>,
    ) -> WriteOutcome {
        if self.config.frozen {
            warn!(level = %self.config.name, %key, "write rejected: level is frozen");
            return WriteOutcome::RejectedFrozen;
        }

        let embedding = self.encode_or_neutral(&payload, context);
        let surprise = surprise.map(|s| if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.5 });

        if let Some(s) = surprise {
            self.updates += 1;
            self.surprise_sum += s as f64;
            self.surprise_count += 1;
        }
        self.last_updated_step = step;

        // put() promotes the key, so iteration order stays
        // most-recently-updated first and a full level evicts its
        // least-recently-updated entry.
        match self.entries.pop(&key) {
            Some(mut existing) => {
                existing.payload = payload;
                existing.embedding = embedding;
                existing.updated_step = step;
                existing.updated_at = chrono::Utc::now();
                if let Some(s) = surprise {
                    existing.surprise = s;
                }
                self.entries.put(key, existing);
                WriteOutcome::Updated
            }
            None => {
                let mut entry = MemoryEntry::new(key.clone(), payload, embedding, step);
                if let Some(s) = surprise {
                    entry.surprise = s;
                }
                self.entries.put(key, entry);
                WriteOutcome::Inserted
            }
        }
    }

    /// Return the `k` entries most similar to `embedding` as
    /// `(key, similarity, payload)`, ranked by cosine similarity with
    /// ties broken by most-recently-updated. An empty level returns an
    /// empty vec, never an error.
    pub fn query(&mut self, embedding: &[f32], k: usize) -> Vec<(String, f32, Value)> {
        self.retrievals += 1;
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        // iter() is most-recently-used first and does not promote, so the
        // recency rank doubles as the tie-break.
        let mut scored: Vec<(usize, f32, &MemoryEntry)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(rank, (_, entry))| {
                (rank, cosine_similarity(embedding, &entry.embedding), entry)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(k)
            .map(|(_, similarity, entry)| (entry.key.clone(), similarity, entry.payload.clone()))
            .collect()
    }

    /// Look up the surprise currently attached to a key
    pub fn surprise_of(&self, key: &str) -> Option<f32> {
        self.entries.peek(key).map(|e| e.surprise)
    }

    /// Keys of entries whose payload matches a predicate, used by
    /// feedback paths to find entries for a given piece of content
    pub fn keys_where<F>(&self, pred: F) -> Vec<String>
    where
        F: Fn(&Value) -> bool,
    {
        self.entries
            .iter()
            .filter(|(_, entry)| pred(&entry.payload))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Housekeeping pass driven by the CMS step clock.
    ///
    /// Applies the configured decay to stale entries, dropping those
    /// whose surprise-weighted retention falls below the floor. Frozen
    /// levels are never touched.
    pub fn consolidate(&mut self, step: u64) {
        if self.config.frozen || self.config.decay_rate <= 0.0 {
            return;
        }

        let stale_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                let stale_periods =
                    (step.saturating_sub(entry.updated_step)) / self.config.update_freq;
                let decayed = (1.0 - self.config.decay_rate).powi(stale_periods as i32);
                // High-surprise entries earn a longer lease
                let retention = decayed * (0.5 + 0.5 * entry.surprise);
                retention < RETENTION_FLOOR
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale_keys {
            self.entries.pop(key);
        }

        if !stale_keys.is_empty() {
            debug!(
                level = %self.config.name,
                dropped = stale_keys.len(),
                step,
                "consolidation dropped stale entries"
            );
        }
    }

    /// Snapshot of this level's counters. Never fails and never blocks
    /// the operations it observes.
    pub fn stats(&self) -> LevelStats {
        let avg_surprise = if self.surprise_count > 0 {
            (self.surprise_sum / self.surprise_count as f64) as f32
        } else {
            0.0
        };
        LevelStats {
            name: self.config.name.clone(),
            encodes: self.encodes,
            encode_failures: self.encode_failures,
            updates: self.updates,
            retrievals: self.retrievals,
            avg_surprise,
            last_updated_step: self.last_updated_step,
            size: self.entries.len(),
            update_freq: self.config.update_freq,
            frozen: self.config.frozen,
        }
    }

    fn encode_or_neutral(&mut self, payload: &Value, context: &Context) -> Vec<f32> {
        match self.encoder.encode(payload, context) {
            Ok(embedding) => {
                self.encodes += 1;
                embedding
            }
            Err(err) => {
                warn!(
                    level = %self.config.name,
                    %err,
                    "encoding failed, substituting neutral embedding"
                );
                self.encode_failures += 1;
                self.encoder.neutral()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_level(name: &str, update_freq: u64) -> MemoryLevel {
        let config = MemoryLevelConfig::new(name, update_freq);
        let encoder = Encoder::Token { dimension: config.dimension };
        MemoryLevel::new(config, encoder).unwrap()
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let config = MemoryLevelConfig::new("token", 1);
        let encoder = Encoder::Token { dimension: 32 };
        assert!(MemoryLevel::new(config, encoder).is_err());
    }

    #[test]
    fn test_store_then_query_round_trip() {
        let mut level = token_level("token", 1);
        let ctx = Context::new();
        let outcome = level.store("k1", json!("let total = 0;"), &ctx, 1);
        assert_eq!(outcome, WriteOutcome::Inserted);

        let query = level.encode(&json!("let total = 0;"), &ctx).unwrap();
        let results = level.query(&query, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "k1");
        assert!(results[0].1 >= 0.99);
    }

    #[test]
    fn test_overwrite_same_key() {
        let mut level = token_level("token", 1);
        let ctx = Context::new();
        level.store("k1", json!("first version"), &ctx, 1);
        let outcome = level.store("k1", json!("second version"), &ctx, 2);
        assert_eq!(outcome, WriteOutcome::Updated);
        assert_eq!(level.len(), 1);
    }

    #[test]
    fn test_frozen_level_rejects_writes() {
        let config = MemoryLevelConfig::frozen("platform");
        let encoder = Encoder::Token { dimension: config.dimension };
        let mut level = MemoryLevel::new(config, encoder).unwrap();
        let ctx = Context::new();
        level.seed("idiom-1", json!("use Result<T, E> for fallible calls"), &ctx);

        let seeded = level.len();
        for i in 0..10 {
            let outcome = level.store(format!("k{i}"), json!("new knowledge"), &ctx, i);
            assert_eq!(outcome, WriteOutcome::RejectedFrozen);
            let outcome = level.update(format!("u{i}"), json!("more"), &ctx, i, 0.9);
            assert_eq!(outcome, WriteOutcome::RejectedFrozen);
        }
        assert_eq!(level.len(), seeded, "frozen entry count must not change");
    }

    #[test]
    fn test_query_empty_level_returns_empty() {
        let mut level = token_level("token", 1);
        let results = level.query(&[0.5; 128], 3);
        assert!(results.is_empty());
    }

    #[test]
    fn test_query_ranks_identical_payload_first() {
        let mut level = token_level("token", 1);
        let ctx = Context::new();
        level.store("match", json!("fn render(frame: &mut Frame)"), &ctx, 1);
        level.store("other", json!("SELECT * FROM sessions WHERE id = ?"), &ctx, 2);

        let query = level
            .encode(&json!("fn render(frame: &mut Frame)"), &ctx)
            .unwrap();
        let results = level.query(&query, 2);
        assert_eq!(results[0].0, "match");
        assert!(results[0].1 >= 0.99);
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_tie_break_prefers_most_recently_updated() {
        let mut level = token_level("token", 1);
        let ctx = Context::new();
        // Identical payloads encode identically, forcing a similarity tie
        level.store("older", json!("cache.invalidate(key)"), &ctx, 1);
        level.store("newer", json!("cache.invalidate(key)"), &ctx, 2);

        let query = level.encode(&json!("cache.invalidate(key)"), &ctx).unwrap();
        let results = level.query(&query, 2);
        assert_eq!(results[0].0, "newer");
    }

    #[test]
    fn test_capacity_evicts_least_recently_updated() {
        let config = MemoryLevelConfig::new("token", 1).with_capacity(3);
        let encoder = Encoder::Token { dimension: config.dimension };
        let mut level = MemoryLevel::new(config, encoder).unwrap();
        let ctx = Context::new();

        level.store("a", json!("alpha entry"), &ctx, 1);
        level.store("b", json!("beta entry"), &ctx, 2);
        level.store("c", json!("gamma entry"), &ctx, 3);
        // Touch "a" so "b" becomes least-recently-updated
        level.store("a", json!("alpha entry again"), &ctx, 4);
        level.store("d", json!("delta entry"), &ctx, 5);

        assert_eq!(level.len(), 3);
        assert!(level.surprise_of("b").is_none(), "b should have been evicted");
        assert!(level.surprise_of("a").is_some());
        assert!(level.surprise_of("d").is_some());
    }

    #[test]
    fn test_encode_failure_substitutes_neutral() {
        let mut level = token_level("token", 1);
        let ctx = Context::new();
        let outcome = level.store("bad", json!(12345), &ctx, 1);
        assert_eq!(outcome, WriteOutcome::Inserted);
        assert_eq!(level.stats().encode_failures, 1);

        // Neutral embedding scores 0 against everything but still exists
        let results = level.query(&[1.0; 128], 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, 0.0);
    }

    #[test]
    fn test_update_clamps_surprise() {
        let mut level = token_level("token", 1);
        let ctx = Context::new();
        level.update("k1", json!("payload text"), &ctx, 1, 3.5);
        assert_eq!(level.surprise_of("k1"), Some(1.0));
        level.update("k1", json!("payload text"), &ctx, 2, f32::NAN);
        assert_eq!(level.surprise_of("k1"), Some(0.5));
    }

    #[test]
    fn test_consolidate_drops_stale_low_surprise_entries() {
        let config = MemoryLevelConfig::new("token", 1).with_decay_rate(0.5);
        let encoder = Encoder::Token { dimension: config.dimension };
        let mut level = MemoryLevel::new(config, encoder).unwrap();
        let ctx = Context::new();

        level.update("stale", json!("old forgotten thing"), &ctx, 0, 0.0);
        level.update("surprising", json!("notable recent thing"), &ctx, 0, 1.0);

        // Four periods at decay 0.5: retention 0.5^4 * 0.5 = 0.031 for the
        // low-surprise entry (below floor), 0.0625 for the surprising one.
        level.consolidate(4);
        assert!(level.surprise_of("surprising").is_some());
        assert!(level.surprise_of("stale").is_none());
    }

    #[test]
    fn test_consolidate_never_touches_frozen() {
        let config = MemoryLevelConfig::frozen("platform");
        let encoder = Encoder::Token { dimension: config.dimension };
        let mut level = MemoryLevel::new(config, encoder).unwrap();
        let ctx = Context::new();
        level.seed("idiom-1", json!("prefer iterators over index loops"), &ctx);

        level.consolidate(1_000_000);
        assert_eq!(level.len(), 1);
    }

    #[test]
    fn test_stats_counters() {
        let mut level = token_level("token", 10);
        let ctx = Context::new();
        level.store("k1", json!("one two three"), &ctx, 1);
        level.update("k2", json!("four five six"), &ctx, 2, 0.8);
        level.update("k3", json!("seven eight nine"), &ctx, 3, 0.2);
        level.query(&[0.1; 128], 2);

        let stats = level.stats();
        assert_eq!(stats.encodes, 3);
        assert_eq!(stats.updates, 2);
        assert_eq!(stats.retrievals, 1);
        assert_eq!(stats.size, 3);
        assert_eq!(stats.update_freq, 10);
        assert!((stats.avg_surprise - 0.5).abs() < 0.001);
        assert!(!stats.frozen);
    }
}
