//! Automation-scenario memory and parameter tuning
//!
//! Alongside the embedding levels, this specialization keeps explicit
//! per-scenario success/failure tables and derives "recommended
//! parameters" from a per-key majority vote over successful runs. The
//! tuning policy maps the observed success rate onto replace / merge /
//! keep decisions with an explicit diff of changed keys.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{CmsConfig, EncoderKind, MemoryLevelConfig};
use crate::domains::{CANDIDATE_MULTIPLIER, merge_ranked};
use crate::embedding::Context;
use crate::error::Result;
use crate::memory::cms::ContinuumMemorySystem;
use crate::memory::types::{CmsStats, ScoredItem};

const SCENARIO_CADENCE: u64 = 10;
const DOMAIN_CADENCE: u64 = 100;

/// Success rates below this trigger wholesale parameter replacement
const REPLACE_THRESHOLD: f32 = 0.3;
/// Success rates above this keep the current parameters untouched
const KEEP_THRESHOLD: f32 = 0.7;

const MERGE_CONFIDENCE: f32 = 0.6;
const KEEP_CONFIDENCE: f32 = 0.9;
/// Confidence when no run history exists for a scenario
const NO_HISTORY_CONFIDENCE: f32 = 0.5;

/// Surprise applied for successful / failed runs
const SUCCESS_SURPRISE: f32 = 0.1;
const FAILURE_SURPRISE: f32 = 0.9;

/// One recorded automation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Scenario this run belongs to
    pub scenario_id: String,
    /// Parameters the run executed with
    pub params: BTreeMap<String, Value>,
    /// Whether the run succeeded
    pub success: bool,
    /// Run duration in milliseconds
    pub duration_ms: u64,
    /// Error text for failed runs
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// Create a successful run record
    pub fn success(scenario_id: impl Into<String>, params: BTreeMap<String, Value>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            params,
            success: true,
            duration_ms: 0,
            error: None,
        }
    }

    /// Create a failed run record
    pub fn failure(
        scenario_id: impl Into<String>,
        params: BTreeMap<String, Value>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            params,
            success: false,
            duration_ms: 0,
            error: Some(error.into()),
        }
    }
}

/// What the tuning policy decided to do with a scenario's parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TuningAction {
    /// Replace the current parameters wholesale with the recommendation
    Replace,
    /// Merge recommended parameters into the current set
    Merge,
    /// Keep the current parameters unchanged
    Keep,
}

/// Outcome of a tuning decision, including the explicit parameter diff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningDecision {
    /// The chosen action
    pub action: TuningAction,
    /// Confidence in the decision, in [0, 1]
    pub confidence: f32,
    /// The resulting parameter set
    pub params: BTreeMap<String, Value>,
    /// Keys whose value differs from the current parameters
    pub changed_keys: Vec<String>,
}

/// CMS specialization backing automation-scenario parameter tuning
pub struct ScenarioMemory {
    cms: ContinuumMemorySystem,
    events: u64,
    successes: HashMap<String, Vec<ExecutionRecord>>,
    failures: HashMap<String, Vec<ExecutionRecord>>,
}

impl ScenarioMemory {
    /// The level layout this specialization runs on
    pub fn default_config() -> CmsConfig {
        CmsConfig::new(vec![
            MemoryLevelConfig::new("run", 1).with_encoder(EncoderKind::Execution),
            MemoryLevelConfig::new("scenario", SCENARIO_CADENCE)
                .with_encoder(EncoderKind::Execution),
            MemoryLevelConfig::new("domain", DOMAIN_CADENCE)
                .with_encoder(EncoderKind::Execution),
        ])
    }

    /// Create an empty scenario memory
    pub fn new() -> Result<Self> {
        Ok(Self {
            cms: ContinuumMemorySystem::from_config(&Self::default_config())?,
            events: 0,
            successes: HashMap::new(),
            failures: HashMap::new(),
        })
    }

    /// Record one automation run.
    ///
    /// Appends to the explicit success/failure tables, writes the run
    /// level unconditionally and the slower levels on cadence, and
    /// advances the shared step exactly once. Returns the generated
    /// entry key.
    pub fn record_execution(
        &mut self,
        record: &ExecutionRecord,
        context: &Context,
    ) -> Result<String> {
        self.events += 1;
        let table = if record.success {
            &mut self.successes
        } else {
            &mut self.failures
        };
        table
            .entry(record.scenario_id.clone())
            .or_default()
            .push(record.clone());

        let key = Uuid::new_v4().to_string();
        let payload = serde_json::to_value(record)
            .map_err(|e| crate::ContinuumError::Serialization(e.to_string()))?;

        self.cms.store("run", key.clone(), payload.clone(), context)?;
        if self.events % SCENARIO_CADENCE == 0 {
            self.cms
                .store("scenario", key.clone(), payload.clone(), context)?;
        }
        if self.events % DOMAIN_CADENCE == 0 {
            self.cms.store("domain", key.clone(), payload, context)?;
        }

        self.cms.step();
        Ok(key)
    }

    /// Learn from a run outcome: success is low surprise, failure high.
    /// Updates the run and scenario levels; the domain level is left to
    /// cadence writes. Returns the applied surprise.
    pub fn learn_from_outcome(&mut self, record: &ExecutionRecord) -> Result<f32> {
        let surprise = if record.success {
            SUCCESS_SURPRISE
        } else {
            FAILURE_SURPRISE
        };
        let payload = serde_json::to_value(record)
            .map_err(|e| crate::ContinuumError::Serialization(e.to_string()))?;
        let ctx = Context::new();
        let key = format!("outcome-{}", record.scenario_id);
        for level_name in ["run", "scenario"] {
            self.cms
                .update_level(level_name, key.clone(), payload.clone(), &ctx, surprise)?;
        }
        Ok(surprise)
    }

    /// Retrieve up to `k` runs similar to the given record
    pub fn similar_runs(
        &mut self,
        record: &ExecutionRecord,
        context: &Context,
        k: usize,
    ) -> Vec<ScoredItem> {
        if k == 0 {
            return Vec::new();
        }
        let payload = match serde_json::to_value(record) {
            Ok(payload) => payload,
            // Treat retrieval failures as "no results from this source"
            Err(_) => return Vec::new(),
        };
        let weights: BTreeMap<String, f32> = [
            ("run".to_string(), 1.0),
            ("scenario".to_string(), 0.9),
            ("domain".to_string(), 0.7),
        ]
        .into();
        let names: Vec<&str> = vec!["run", "scenario", "domain"];
        let per_level =
            self.cms
                .retrieve_similar(&payload, &names, k * CANDIDATE_MULTIPLIER, context);
        merge_ranked(&self.cms, per_level, &weights, k)
    }

    /// Observed success rate for a scenario, if any runs are recorded
    pub fn success_rate(&self, scenario_id: &str) -> Option<f32> {
        let successes = self
            .successes
            .get(scenario_id)
            .map(Vec::len)
            .unwrap_or_default();
        let failures = self
            .failures
            .get(scenario_id)
            .map(Vec::len)
            .unwrap_or_default();
        let total = successes + failures;
        if total == 0 {
            return None;
        }
        Some(successes as f32 / total as f32)
    }

    /// Majority-vote parameters across a scenario's successful runs.
    ///
    /// For each parameter key, the most frequent value wins; frequency
    /// ties resolve to the smallest canonical encoding so the result is
    /// deterministic.
    pub fn recommended_params(&self, scenario_id: &str) -> BTreeMap<String, Value> {
        let mut votes: BTreeMap<String, HashMap<String, (Value, usize)>> = BTreeMap::new();
        for record in self.successes.get(scenario_id).into_iter().flatten() {
            for (key, value) in &record.params {
                let canonical = value.to_string();
                votes
                    .entry(key.clone())
                    .or_default()
                    .entry(canonical)
                    .and_modify(|(_, count)| *count += 1)
                    .or_insert((value.clone(), 1));
            }
        }

        votes
            .into_iter()
            .filter_map(|(key, candidates)| {
                candidates
                    .into_iter()
                    .max_by(|(repr_a, (_, count_a)), (repr_b, (_, count_b))| {
                        count_a.cmp(count_b).then_with(|| repr_b.cmp(repr_a))
                    })
                    .map(|(_, (value, _))| (key, value))
            })
            .collect()
    }

    /// Decide what to do with a scenario's current parameters.
    ///
    /// - success rate < 0.3: replace wholesale with the recommendation,
    /// - 0.3 ..= 0.7: merge the recommendation into the current set,
    /// - above 0.7: keep the current parameters.
    ///
    /// Every branch reports the explicit diff of changed keys. A
    /// scenario with no recorded runs keeps its parameters at reduced
    /// confidence.
    pub fn tune(
        &self,
        scenario_id: &str,
        current: &BTreeMap<String, Value>,
    ) -> TuningDecision {
        let Some(rate) = self.success_rate(scenario_id) else {
            return TuningDecision {
                action: TuningAction::Keep,
                confidence: NO_HISTORY_CONFIDENCE,
                params: current.clone(),
                changed_keys: Vec::new(),
            };
        };

        if rate < REPLACE_THRESHOLD {
            let recommended = self.recommended_params(scenario_id);
            let changed_keys = diff_keys(current, &recommended);
            // Confidence grows as the rate falls further below threshold
            let confidence =
                (0.8 + 0.2 * (REPLACE_THRESHOLD - rate) / REPLACE_THRESHOLD).min(1.0);
            TuningDecision {
                action: TuningAction::Replace,
                confidence,
                params: recommended,
                changed_keys,
            }
        } else if rate <= KEEP_THRESHOLD {
            let recommended = self.recommended_params(scenario_id);
            let mut merged = current.clone();
            for (key, value) in recommended {
                merged.insert(key, value);
            }
            let changed_keys = diff_keys(current, &merged);
            TuningDecision {
                action: TuningAction::Merge,
                confidence: MERGE_CONFIDENCE,
                params: merged,
                changed_keys,
            }
        } else {
            TuningDecision {
                action: TuningAction::Keep,
                confidence: KEEP_CONFIDENCE,
                params: current.clone(),
                changed_keys: Vec::new(),
            }
        }
    }

    /// Read-only stats snapshot
    pub fn stats(&self) -> CmsStats {
        self.cms.stats()
    }
}

/// Keys added, removed, or changed between two parameter sets
fn diff_keys(before: &BTreeMap<String, Value>, after: &BTreeMap<String, Value>) -> Vec<String> {
    let mut keys: Vec<String> = before
        .iter()
        .filter(|(key, value)| after.get(*key) != Some(value))
        .map(|(key, _)| key.clone())
        .collect();
    for key in after.keys() {
        if !before.contains_key(key) {
            keys.push(key.clone());
        }
    }
    keys.sort();
    keys.dedup();
    keys
}
