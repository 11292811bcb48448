//! Test utilities for continuum - shared fixtures
//!
//! Deterministic builders used by unit and integration tests so level
//! layouts and payloads stay consistent across test files.

use serde_json::{Value, json};

use crate::config::MemoryLevelConfig;
use crate::embedding::{Context, Encoder};
use crate::memory::cms::ContinuumMemorySystem;

/// A two-level CMS (char:1, token:10) used across tests
pub fn small_cms() -> ContinuumMemorySystem {
    let char_config = MemoryLevelConfig::new("char", 1);
    let token_config = MemoryLevelConfig::new("token", 10);
    let char_encoder = Encoder::CharNgram {
        dimension: char_config.dimension,
        n: 3,
    };
    let token_encoder = Encoder::Token {
        dimension: token_config.dimension,
    };
    ContinuumMemorySystem::new(vec![
        (char_config, char_encoder),
        (token_config, token_encoder),
    ])
    .expect("failed to build test CMS")
}

/// A payload carrying only text
pub fn text_payload(text: &str) -> Value {
    json!(text)
}

/// A context map built from string pairs
pub fn context(pairs: &[(&str, &str)]) -> Context {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
