//! Conversational context memory
//!
//! Levels span one turn up to a whole session, plus a frozen persona
//! level seeded with static assistant facts. Feedback arrives as 1-5
//! ratings on earlier turns and is mapped onto surprise: a 5 is fully
//! expected, a 1 maximally surprising.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::{CmsConfig, EncoderKind, MemoryLevelConfig};
use crate::domains::{CANDIDATE_MULTIPLIER, merge_ranked};
use crate::embedding::Context;
use crate::error::Result;
use crate::memory::cms::ContinuumMemorySystem;
use crate::memory::types::{CmsStats, ScoredItem};

const EXCHANGE_CADENCE: u64 = 5;
const TOPIC_CADENCE: u64 = 25;
const SESSION_CADENCE: u64 = 200;

/// One turn of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker role ("user", "assistant", ...)
    pub role: String,
    /// Message text
    pub text: String,
    /// Session this turn belongs to, if any
    pub session_id: Option<String>,
}

impl ConversationTurn {
    /// Create a turn without a session id
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
            session_id: None,
        }
    }

    /// Attach a session id
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// CMS specialization backing conversational context retrieval
pub struct ConversationalMemory {
    cms: ContinuumMemorySystem,
    events: u64,
}

impl ConversationalMemory {
    /// Create a conversational memory with an empty persona level
    pub fn new() -> Result<Self> {
        Self::with_persona(&[])
    }

    /// The level layout this specialization runs on
    pub fn default_config() -> CmsConfig {
        CmsConfig::new(vec![
            MemoryLevelConfig::new("turn", 1).with_encoder(EncoderKind::ChatTurn),
            MemoryLevelConfig::new("exchange", EXCHANGE_CADENCE)
                .with_encoder(EncoderKind::ChatTurn),
            MemoryLevelConfig::new("topic", TOPIC_CADENCE),
            MemoryLevelConfig::new("session", SESSION_CADENCE)
                .with_encoder(EncoderKind::ContextTagged)
                .with_context_keys(vec!["session_id".to_string()]),
            MemoryLevelConfig::frozen("persona"),
        ])
    }

    /// Create a conversational memory whose frozen persona level is
    /// seeded with static profile facts
    pub fn with_persona(facts: &[&str]) -> Result<Self> {
        let mut cms = ContinuumMemorySystem::from_config(&Self::default_config())?;

        let ctx = Context::new();
        if let Some(persona) = cms.level_mut("persona") {
            for (i, fact) in facts.iter().enumerate() {
                persona.seed(format!("persona-{i}"), json!(*fact), &ctx);
            }
        }

        Ok(Self { cms, events: 0 })
    }

    /// Record one conversational turn.
    ///
    /// The turn level is written unconditionally, slower levels on their
    /// cadences; the shared step advances exactly once. Returns the
    /// generated entry key.
    pub fn record(&mut self, turn: &ConversationTurn, context: &Context) -> Result<String> {
        self.events += 1;
        let key = Uuid::new_v4().to_string();
        let payload = serde_json::to_value(turn)
            .map_err(|e| crate::ContinuumError::Serialization(e.to_string()))?;

        let mut ctx = context.clone();
        if let Some(session_id) = &turn.session_id {
            ctx.insert("session_id".to_string(), session_id.clone());
        }

        self.cms.store("turn", key.clone(), payload.clone(), &ctx)?;
        if self.events % EXCHANGE_CADENCE == 0 {
            self.cms
                .store("exchange", key.clone(), payload.clone(), &ctx)?;
        }
        if self.events % TOPIC_CADENCE == 0 {
            self.cms.store("topic", key.clone(), payload.clone(), &ctx)?;
        }
        if self.events % SESSION_CADENCE == 0 {
            self.cms.store("session", key.clone(), payload, &ctx)?;
        }

        self.cms.step();
        Ok(key)
    }

    /// Learn from a 1-5 rating of a remembered turn.
    ///
    /// A rating of 5 maps to surprise 0, a rating of 1 to surprise 1.
    /// Updates the turn and exchange levels; slower levels are left to
    /// consolidation. Returns the applied surprise.
    pub fn learn_from_feedback(&mut self, turn_text: &str, rating: u8) -> Result<f32> {
        let rating = rating.clamp(1, 5);
        let surprise = (5 - rating) as f32 / 4.0;

        let ctx = Context::new();
        for level_name in ["turn", "exchange"] {
            let matching = self
                .cms
                .level(level_name)
                .map(|l| l.keys_where(|p| payload_text_is(p, turn_text)))
                .unwrap_or_default();

            if matching.is_empty() {
                let key =
                    format!("fb-{:016x}", xxhash_rust::xxh3::xxh3_64(turn_text.as_bytes()));
                self.cms.update_level(
                    level_name,
                    key,
                    json!({"role": "assistant", "text": turn_text}),
                    &ctx,
                    surprise,
                )?;
            } else {
                for key in matching {
                    self.cms.update_level(
                        level_name,
                        key,
                        json!({"role": "assistant", "text": turn_text}),
                        &ctx,
                        surprise,
                    )?;
                }
            }
        }

        Ok(surprise)
    }

    /// Retrieve up to `k` merged context items for a query.
    ///
    /// `scope=recent` favors the turn/exchange levels, `scope=session`
    /// favors topic/session.
    pub fn retrieve(&mut self, query: &str, context: &Context, k: usize) -> Vec<ScoredItem> {
        if k == 0 {
            return Vec::new();
        }
        let weights = self.level_weights(context);
        let names: Vec<&str> = vec!["turn", "exchange", "topic", "session", "persona"];
        let payload = json!({ "text": query });
        let per_level =
            self.cms
                .retrieve_similar(&payload, &names, k * CANDIDATE_MULTIPLIER, context);
        merge_ranked(&self.cms, per_level, &weights, k)
    }

    /// Read-only stats snapshot
    pub fn stats(&self) -> CmsStats {
        self.cms.stats()
    }

    fn level_weights(&self, context: &Context) -> BTreeMap<String, f32> {
        let scope = context.get("scope").map(String::as_str);
        let pairs: [(&str, f32); 5] = match scope {
            Some("recent") => [
                ("turn", 1.0),
                ("exchange", 1.0),
                ("topic", 0.5),
                ("session", 0.4),
                ("persona", 0.3),
            ],
            Some("session") => [
                ("turn", 0.5),
                ("exchange", 0.6),
                ("topic", 0.9),
                ("session", 1.0),
                ("persona", 0.5),
            ],
            _ => [
                ("turn", 1.0),
                ("exchange", 0.9),
                ("topic", 0.8),
                ("session", 0.7),
                ("persona", 0.6),
            ],
        };
        pairs
            .into_iter()
            .map(|(name, weight)| (name.to_string(), weight))
            .collect()
    }
}

fn payload_text_is(payload: &Value, text: &str) -> bool {
    matches!(payload.get("text"), Some(Value::String(s)) if s == text)
}
