//! Code-completion memory
//!
//! Five levels of increasing temporal scope: char (every keystroke),
//! token, function, project, and a frozen platform level seeded with
//! static idiom knowledge. Feedback on completions is turned into a
//! Jaccard-based surprise score that demotes rejected suggestions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::{CmsConfig, EncoderKind, MemoryLevelConfig};
use crate::domains::{CANDIDATE_MULTIPLIER, merge_ranked};
use crate::embedding::Context;
use crate::error::Result;
use crate::memory::cms::ContinuumMemorySystem;
use crate::memory::surprise::compute_code_surprise;
use crate::memory::types::{CmsStats, ScoredItem};

/// Jaccard similarity at or above this counts as an acceptable match
const ACCEPTANCE_THRESHOLD: f32 = 0.5;

/// Feedback on accepted completions is dampened by this factor
const ACCEPTED_DAMPENING: f32 = 0.3;

/// Rejected completions carry at least this much surprise
const REJECTED_FLOOR: f32 = 0.7;

/// Event cadences for the slower levels (specialization policy, not CMS
/// policy)
const TOKEN_CADENCE: u64 = 10;
const FUNCTION_CADENCE: u64 = 100;
const PROJECT_CADENCE: u64 = 1000;

/// Feedback reaches the function level only every N feedback events
const FUNCTION_FEEDBACK_CADENCE: u64 = 10;

/// A source-code fragment observed by the editor integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeFragment {
    /// The fragment text
    pub text: String,
    /// Language tag, if known
    pub language: Option<String>,
    /// Source file path, if known
    pub path: Option<String>,
}

impl CodeFragment {
    /// Create a fragment carrying only text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            path: None,
        }
    }
}

/// CMS specialization backing code-completion ranking
pub struct CodeMemory {
    cms: ContinuumMemorySystem,
    events: u64,
    feedback_events: u64,
}

impl CodeMemory {
    /// Create a code memory with an empty platform level
    pub fn new() -> Result<Self> {
        Self::with_platform_knowledge(&[])
    }

    /// The level layout this specialization runs on
    pub fn default_config() -> CmsConfig {
        CmsConfig::new(vec![
            MemoryLevelConfig::new("char", 1).with_encoder(EncoderKind::CharNgram),
            MemoryLevelConfig::new("token", TOKEN_CADENCE),
            MemoryLevelConfig::new("function", FUNCTION_CADENCE)
                .with_encoder(EncoderKind::CodeStructure),
            MemoryLevelConfig::new("project", PROJECT_CADENCE)
                .with_encoder(EncoderKind::ContextTagged)
                .with_context_keys(vec!["project_id".to_string()]),
            MemoryLevelConfig::frozen("platform"),
        ])
    }

    /// Create a code memory whose frozen platform level is seeded with
    /// static idiom fragments
    pub fn with_platform_knowledge(snippets: &[&str]) -> Result<Self> {
        let mut cms = ContinuumMemorySystem::from_config(&Self::default_config())?;

        let ctx = Context::new();
        if let Some(platform) = cms.level_mut("platform") {
            for (i, snippet) in snippets.iter().enumerate() {
                platform.seed(format!("platform-{i}"), json!(*snippet), &ctx);
            }
        }

        Ok(Self {
            cms,
            events: 0,
            feedback_events: 0,
        })
    }

    /// Record one editing event.
    ///
    /// Writes the char level unconditionally, the slower levels on their
    /// cadences, and advances the shared step exactly once. Returns the
    /// generated entry key.
    pub fn record(&mut self, fragment: &CodeFragment, context: &Context) -> Result<String> {
        self.events += 1;
        let key = Uuid::new_v4().to_string();
        let payload = serde_json::to_value(fragment)
            .map_err(|e| crate::ContinuumError::Serialization(e.to_string()))?;

        self.cms.store("char", key.clone(), payload.clone(), context)?;
        if self.events % TOKEN_CADENCE == 0 {
            self.cms.store("token", key.clone(), payload.clone(), context)?;
        }
        if self.events % FUNCTION_CADENCE == 0 {
            self.cms
                .store("function", key.clone(), payload.clone(), context)?;
        }
        if self.events % PROJECT_CADENCE == 0 {
            self.cms.store("project", key.clone(), payload, context)?;
        }

        self.cms.step();
        Ok(key)
    }

    /// Learn from a completion outcome.
    ///
    /// Surprise comes from token-set Jaccard between what the user typed
    /// (`observed`) and what was suggested (`expected`): accepted
    /// suggestions are dampened toward zero, rejected ones floored high.
    /// Fast levels are updated every time; the function level on its own
    /// cadence; project and platform never. Returns the applied surprise.
    pub fn learn_from_feedback(
        &mut self,
        observed: &str,
        expected: &str,
        accepted: bool,
    ) -> Result<f32> {
        self.feedback_events += 1;
        let raw = compute_code_surprise(observed, expected, ACCEPTANCE_THRESHOLD);
        let surprise = if accepted {
            raw * ACCEPTED_DAMPENING
        } else {
            raw.max(REJECTED_FLOOR)
        };

        let ctx = Context::new();
        let mut fast_levels = vec!["char", "token"];
        if self.feedback_events % FUNCTION_FEEDBACK_CADENCE == 0 {
            fast_levels.push("function");
        }

        for level_name in fast_levels {
            // Demote (or record) every entry matching the suggested text
            let matching = self
                .cms
                .level(level_name)
                .map(|l| l.keys_where(|p| payload_matches_text(p, expected)))
                .unwrap_or_default();

            if matching.is_empty() {
                let key = format!("fb-{:016x}", xxhash_rust::xxh3::xxh3_64(expected.as_bytes()));
                self.cms.update_level(
                    level_name,
                    key,
                    json!(CodeFragment::new(expected)),
                    &ctx,
                    surprise,
                )?;
            } else {
                for key in matching {
                    self.cms.update_level(
                        level_name,
                        key,
                        json!(CodeFragment::new(expected)),
                        &ctx,
                        surprise,
                    )?;
                }
            }
        }

        Ok(surprise)
    }

    /// Retrieve up to `k` merged completion candidates for a query.
    ///
    /// Level weights depend on context: `focus=new_content` favors the
    /// fast levels, `focus=platform_specific` favors the platform level.
    pub fn retrieve(&mut self, query: &str, context: &Context, k: usize) -> Vec<ScoredItem> {
        if k == 0 {
            return Vec::new();
        }
        let weights = self.level_weights(context);
        let names: Vec<&str> = vec!["char", "token", "function", "project", "platform"];
        let payload = json!(query);
        let per_level =
            self.cms
                .retrieve_similar(&payload, &names, k * CANDIDATE_MULTIPLIER, context);
        merge_ranked(&self.cms, per_level, &weights, k)
    }

    /// Read-only stats snapshot
    pub fn stats(&self) -> CmsStats {
        self.cms.stats()
    }

    /// Number of recorded editing events
    pub fn events(&self) -> u64 {
        self.events
    }

    fn level_weights(&self, context: &Context) -> BTreeMap<String, f32> {
        let focus = context.get("focus").map(String::as_str);
        let pairs: [(&str, f32); 5] = match focus {
            Some("new_content") => [
                ("char", 1.0),
                ("token", 1.0),
                ("function", 0.6),
                ("project", 0.4),
                ("platform", 0.3),
            ],
            Some("platform_specific") => [
                ("char", 0.4),
                ("token", 0.5),
                ("function", 0.6),
                ("project", 0.9),
                ("platform", 1.0),
            ],
            _ => [
                ("char", 1.0),
                ("token", 0.9),
                ("function", 0.8),
                ("project", 0.7),
                ("platform", 0.6),
            ],
        };
        pairs
            .into_iter()
            .map(|(name, weight)| (name.to_string(), weight))
            .collect()
    }
}

fn payload_matches_text(payload: &Value, text: &str) -> bool {
    match payload {
        Value::String(s) => s == text,
        Value::Object(map) => matches!(map.get("text"), Some(Value::String(s)) if s == text),
        _ => false,
    }
}
