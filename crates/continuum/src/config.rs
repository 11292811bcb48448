//! Configuration for Continuum memory instances
//!
//! Levels are described declaratively and validated once at construction.
//! Configs deserialize from TOML so embedding applications can keep level
//! layouts in their own config files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::embedding::Encoder;
use crate::error::{ContinuumError, Result};

/// Which encoding strategy a configured level uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    /// Character n-gram hashing
    CharNgram,
    /// Token and token-bigram hashing
    #[default]
    Token,
    /// Identifier and structural-symbol hashing
    CodeStructure,
    /// Token hashing mixed with selected context fields
    ContextTagged,
    /// Conversational turn encoding
    ChatTurn,
    /// Automation execution-record encoding
    Execution,
}

/// Configuration for a single memory level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLevelConfig {
    /// Level name, unique within one CMS instance (e.g. "char", "session")
    pub name: String,
    /// Number of global steps between consolidation points (>= 1)
    #[serde(default = "default_update_freq")]
    pub update_freq: u64,
    /// Forgetting weight applied to stale, low-surprise entries
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f32,
    /// Frozen levels hold static knowledge and are never mutated
    #[serde(default)]
    pub frozen: bool,
    /// Maximum entry count before least-recently-updated eviction
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Embedding dimensionality for this level
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Encoding strategy
    #[serde(default)]
    pub encoder: EncoderKind,
    /// N-gram width for the `char_ngram` encoder
    #[serde(default = "default_ngram")]
    pub ngram: usize,
    /// Context fields mixed in by the `context_tagged` encoder
    #[serde(default)]
    pub context_keys: Vec<String>,
}

impl MemoryLevelConfig {
    /// Create a config with the given name and update frequency,
    /// defaults elsewhere.
    pub fn new(name: impl Into<String>, update_freq: u64) -> Self {
        Self {
            name: name.into(),
            update_freq,
            decay_rate: default_decay_rate(),
            frozen: false,
            capacity: default_capacity(),
            dimension: default_dimension(),
            encoder: EncoderKind::default(),
            ngram: default_ngram(),
            context_keys: Vec::new(),
        }
    }

    /// Create a frozen level config. Frozen levels ignore `update_freq`
    /// for scheduling purposes but still validate it.
    pub fn frozen(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            update_freq: default_update_freq(),
            decay_rate: 0.0,
            frozen: true,
            capacity: default_capacity(),
            dimension: default_dimension(),
            encoder: EncoderKind::default(),
            ngram: default_ngram(),
            context_keys: Vec::new(),
        }
    }

    /// Build the encoder this config describes
    pub fn build_encoder(&self) -> Encoder {
        match self.encoder {
            EncoderKind::CharNgram => Encoder::CharNgram {
                dimension: self.dimension,
                n: self.ngram,
            },
            EncoderKind::Token => Encoder::Token { dimension: self.dimension },
            EncoderKind::CodeStructure => Encoder::CodeStructure {
                dimension: self.dimension,
            },
            EncoderKind::ContextTagged => Encoder::ContextTagged {
                dimension: self.dimension,
                keys: self.context_keys.clone(),
            },
            EncoderKind::ChatTurn => Encoder::ChatTurn { dimension: self.dimension },
            EncoderKind::Execution => Encoder::Execution { dimension: self.dimension },
        }
    }

    /// Override the capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Override the decay rate
    pub fn with_decay_rate(mut self, decay_rate: f32) -> Self {
        self.decay_rate = decay_rate;
        self
    }

    /// Override the encoder kind
    pub fn with_encoder(mut self, encoder: EncoderKind) -> Self {
        self.encoder = encoder;
        self
    }

    /// Override the context keys used by the `context_tagged` encoder
    pub fn with_context_keys(mut self, keys: Vec<String>) -> Self {
        self.context_keys = keys;
        self
    }

    /// Validate invariants that the rest of the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ContinuumError::Config("level name is empty".to_string()));
        }
        if self.update_freq == 0 {
            return Err(ContinuumError::Config(format!(
                "level '{}': update_freq must be >= 1",
                self.name
            )));
        }
        if self.capacity == 0 {
            return Err(ContinuumError::Config(format!(
                "level '{}': capacity must be >= 1",
                self.name
            )));
        }
        if self.dimension == 0 {
            return Err(ContinuumError::Config(format!(
                "level '{}': dimension must be >= 1",
                self.name
            )));
        }
        if self.encoder == EncoderKind::CharNgram && self.ngram == 0 {
            return Err(ContinuumError::Config(format!(
                "level '{}': ngram must be >= 1",
                self.name
            )));
        }
        if !(0.0..=1.0).contains(&self.decay_rate) {
            return Err(ContinuumError::Config(format!(
                "level '{}': decay_rate must be within [0, 1], got {}",
                self.name, self.decay_rate
            )));
        }
        Ok(())
    }
}

fn default_update_freq() -> u64 {
    1
}

fn default_decay_rate() -> f32 {
    0.05
}

fn default_capacity() -> usize {
    10_000
}

fn default_dimension() -> usize {
    128
}

fn default_ngram() -> usize {
    3
}

/// Configuration for a full CMS instance: an ordered sequence of levels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CmsConfig {
    /// Levels in order of increasing temporal scope
    #[serde(default)]
    pub levels: Vec<MemoryLevelConfig>,
}

impl CmsConfig {
    /// Build a config from an ordered list of levels
    pub fn new(levels: Vec<MemoryLevelConfig>) -> Self {
        Self { levels }
    }

    /// Load a config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ContinuumError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every level and check name uniqueness
    pub fn validate(&self) -> Result<()> {
        if self.levels.is_empty() {
            return Err(ContinuumError::Config(
                "at least one level is required".to_string(),
            ));
        }
        for level in &self.levels {
            level.validate()?;
        }
        for (i, level) in self.levels.iter().enumerate() {
            if self.levels[..i].iter().any(|l| l.name == level.name) {
                return Err(ContinuumError::Config(format!(
                    "duplicate level name: {}",
                    level.name
                )));
            }
        }
        Ok(())
    }
}
