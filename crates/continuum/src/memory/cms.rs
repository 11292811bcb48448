//! The multi-level Continuum Memory System
//!
//! Owns a named, ordered set of [`MemoryLevel`]s and one shared step
//! counter. The step counter is the sole driver of time: no level reads
//! a wall clock for scheduling, and every instance owns its own counter.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::embedding::{Context, Encoder};
use crate::error::{ContinuumError, Result};
use crate::memory::level::MemoryLevel;
use crate::memory::types::{CmsStats, WriteOutcome};

/// A multi-level associative memory with a shared step clock
pub struct ContinuumMemorySystem {
    levels: Vec<MemoryLevel>,
    global_step: u64,
}

impl ContinuumMemorySystem {
    /// Build a CMS from an ordered list of `(config, encoder)` pairs.
    ///
    /// Levels are created once here and live for the lifetime of the
    /// instance.
    pub fn new(
        levels: Vec<(crate::config::MemoryLevelConfig, Encoder)>,
    ) -> Result<Self> {
        let mut built = Vec::with_capacity(levels.len());
        for (config, encoder) in levels {
            let name = config.name.clone();
            if built.iter().any(|l: &MemoryLevel| l.name() == name) {
                return Err(ContinuumError::Config(format!(
                    "duplicate level name: {name}"
                )));
            }
            built.push(MemoryLevel::new(config, encoder)?);
        }
        if built.is_empty() {
            return Err(ContinuumError::Config(
                "at least one level is required".to_string(),
            ));
        }
        Ok(Self {
            levels: built,
            global_step: 0,
        })
    }

    /// Build a CMS from a declarative config, deriving each level's
    /// encoder from its configured kind
    pub fn from_config(config: &crate::config::CmsConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            config
                .levels
                .iter()
                .map(|level| (level.clone(), level.build_encoder()))
                .collect(),
        )
    }

    /// The current value of the shared step counter
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Names of all configured levels, in temporal order
    pub fn level_names(&self) -> Vec<&str> {
        self.levels.iter().map(|l| l.name()).collect()
    }

    /// Borrow a level mutably by name, for seeding and direct inspection
    pub fn level_mut(&mut self, name: &str) -> Option<&mut MemoryLevel> {
        self.levels.iter_mut().find(|l| l.name() == name)
    }

    /// Borrow a level by name
    pub fn level(&self, name: &str) -> Option<&MemoryLevel> {
        self.levels.iter().find(|l| l.name() == name)
    }

    /// Store a payload into the named level.
    ///
    /// Fails with [`ContinuumError::UnknownLevel`] for an unconfigured
    /// name; a frozen target reports [`WriteOutcome::RejectedFrozen`].
    pub fn store(
        &mut self,
        level_name: &str,
        key: impl Into<String>,
        payload: Value,
        context: &Context,
    ) -> Result<WriteOutcome> {
        let step = self.global_step;
        let level = self.named_level_mut(level_name)?;
        Ok(level.store(key, payload, context, step))
    }

    /// As [`store`](Self::store), additionally recording a surprise score
    pub fn update_level(
        &mut self,
        level_name: &str,
        key: impl Into<String>,
        payload: Value,
        context: &Context,
        surprise: f32,
    ) -> Result<WriteOutcome> {
        let step = self.global_step;
        let level = self.named_level_mut(level_name)?;
        Ok(level.update(key, payload, context, step, surprise))
    }

    /// Retrieve the `k` most similar entries per requested level.
    ///
    /// The query payload is encoded independently per level with that
    /// level's own strategy. Level names absent from this CMS are
    /// silently skipped, so callers may request a superset of known
    /// names.
    pub fn retrieve_similar(
        &mut self,
        query_payload: &Value,
        level_names: &[&str],
        k: usize,
        context: &Context,
    ) -> BTreeMap<String, Vec<(String, f32, Value)>> {
        let mut results = BTreeMap::new();
        for level in self.levels.iter_mut() {
            if !level_names.contains(&level.name()) {
                continue;
            }
            let embedding = match level.encode(query_payload, context) {
                Ok(embedding) => embedding,
                // An unencodable query yields no results from this level
                // rather than an error
                Err(_) => continue,
            };
            results.insert(level.name().to_string(), level.query(&embedding, k));
        }
        results
    }

    /// Advance the shared clock by exactly one step.
    ///
    /// This is the only operation that mutates `global_step`. A level is
    /// due for housekeeping when `global_step % update_freq == 0`; each
    /// due level gets at most one consolidation pass per call.
    pub fn step(&mut self) -> u64 {
        self.global_step += 1;
        let step = self.global_step;
        for level in self.levels.iter_mut() {
            if level.is_frozen() {
                continue;
            }
            if step % level.update_freq() == 0 {
                debug!(level = %level.name(), step, "running consolidation pass");
                level.consolidate(step);
            }
        }
        step
    }

    /// Read-only observability snapshot; no side effects
    pub fn stats(&self) -> CmsStats {
        CmsStats {
            global_step: self.global_step,
            levels: self
                .levels
                .iter()
                .map(|l| (l.name().to_string(), l.stats()))
                .collect(),
        }
    }

    fn named_level_mut(&mut self, name: &str) -> Result<&mut MemoryLevel> {
        self.levels
            .iter_mut()
            .find(|l| l.name() == name)
            .ok_or_else(|| ContinuumError::UnknownLevel(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryLevelConfig;
    use serde_json::json;

    fn two_level_cms() -> ContinuumMemorySystem {
        let char_config = MemoryLevelConfig::new("char", 1);
        let token_config = MemoryLevelConfig::new("token", 10);
        ContinuumMemorySystem::new(vec![
            (
                char_config.clone(),
                Encoder::CharNgram { dimension: char_config.dimension, n: 3 },
            ),
            (
                token_config.clone(),
                Encoder::Token { dimension: token_config.dimension },
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_unknown_level_errors() {
        let mut cms = two_level_cms();
        let ctx = Context::new();
        let result = cms.store("galaxy", "k1", json!("text"), &ctx);
        assert!(matches!(result, Err(ContinuumError::UnknownLevel(_))));
        let result = cms.update_level("galaxy", "k1", json!("text"), &ctx, 0.5);
        assert!(matches!(result, Err(ContinuumError::UnknownLevel(_))));
    }

    #[test]
    fn test_duplicate_level_names_rejected() {
        let config = MemoryLevelConfig::new("char", 1);
        let result = ContinuumMemorySystem::new(vec![
            (config.clone(), Encoder::Token { dimension: config.dimension }),
            (config.clone(), Encoder::Token { dimension: config.dimension }),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_step_is_monotonic_and_exclusive() {
        let mut cms = two_level_cms();
        let ctx = Context::new();
        assert_eq!(cms.global_step(), 0);

        // Non-step operations never move the clock
        cms.store("char", "k1", json!("some text"), &ctx).unwrap();
        cms.update_level("token", "k2", json!("more text"), &ctx, 0.3)
            .unwrap();
        cms.retrieve_similar(&json!("some text"), &["char", "token"], 3, &ctx);
        cms.stats();
        assert_eq!(cms.global_step(), 0);

        for _ in 0..25 {
            cms.step();
        }
        assert_eq!(cms.global_step(), 25);
    }

    #[test]
    fn test_retrieve_similar_skips_unknown_levels() {
        let mut cms = two_level_cms();
        let ctx = Context::new();
        cms.store("char", "k1", json!("hello world"), &ctx).unwrap();

        let results =
            cms.retrieve_similar(&json!("hello world"), &["char", "nonexistent"], 3, &ctx);
        assert!(results.contains_key("char"));
        assert!(!results.contains_key("nonexistent"));
    }

    #[test]
    fn test_retrieve_similar_encodes_per_level() {
        let mut cms = two_level_cms();
        let ctx = Context::new();
        cms.store("char", "k1", json!("fn compute_total()"), &ctx)
            .unwrap();
        cms.store("token", "k1", json!("fn compute_total()"), &ctx)
            .unwrap();

        let results =
            cms.retrieve_similar(&json!("fn compute_total()"), &["char", "token"], 1, &ctx);
        // Each level ranks with its own encoder, both find the entry
        assert!(results["char"][0].1 >= 0.99);
        assert!(results["token"][0].1 >= 0.99);
    }

    #[test]
    fn test_end_to_end_top1_is_identical_payload() {
        let mut cms = two_level_cms();
        let ctx = Context::new();
        cms.store("token", "k1", json!("open the file for reading"), &ctx)
            .unwrap();
        cms.store("token", "k2", json!("connect to the postgres database"), &ctx)
            .unwrap();
        cms.store("token", "k3", json!("render the html template"), &ctx)
            .unwrap();

        let results = cms.retrieve_similar(
            &json!("connect to the postgres database"),
            &["token"],
            3,
            &ctx,
        );
        let ranked = &results["token"];
        assert_eq!(ranked[0].0, "k2");
        assert!(ranked[0].1 >= 0.99);
    }

    #[test]
    fn test_unencodable_query_yields_no_results_not_error() {
        let mut cms = two_level_cms();
        let ctx = Context::new();
        cms.store("char", "k1", json!("content"), &ctx).unwrap();

        let results = cms.retrieve_similar(&json!(null), &["char"], 3, &ctx);
        assert!(results.is_empty());
    }

    #[test]
    fn test_stats_snapshot() {
        let mut cms = two_level_cms();
        let ctx = Context::new();
        cms.store("char", "k1", json!("abc def"), &ctx).unwrap();
        cms.step();
        cms.step();

        let stats = cms.stats();
        assert_eq!(stats.global_step, 2);
        assert_eq!(stats.levels.len(), 2);
        assert_eq!(stats.levels["char"].size, 1);
        assert_eq!(stats.levels["token"].size, 0);
    }
}
