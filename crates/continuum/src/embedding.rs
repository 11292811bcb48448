//! Deterministic embeddings and vector similarity
//!
//! Embeddings here are produced by feature hashing, not a learned model:
//! extracted textual features are hashed (xxh3) into a fixed number of
//! buckets, accumulated, and L2-normalized. Identical inputs always yield
//! bit-identical vectors, and encoding cost is bounded by payload size.

use std::collections::BTreeMap;

use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{ContinuumError, Result};

/// Free-form caller context passed alongside payloads (project id,
/// session id, role, etc.)
pub type Context = BTreeMap<String, String>;

/// Compute cosine similarity between two vectors, clamped to [-1, 1].
/// Mismatched lengths or zero-norm inputs yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Encoding strategy for one memory level.
///
/// The set of pattern kinds is closed: each level is constructed with
/// exactly one variant and keeps it for the lifetime of the instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoder {
    /// Character n-gram hashing, for the fastest code level
    CharNgram { dimension: usize, n: usize },
    /// Token and token-bigram hashing
    Token { dimension: usize },
    /// Identifier and structural-symbol hashing, for function-scale code
    CodeStructure { dimension: usize },
    /// Token hashing mixed with selected context fields, for
    /// project/platform-scale levels
    ContextTagged { dimension: usize, keys: Vec<String> },
    /// Conversational turn: role plus message tokens
    ChatTurn { dimension: usize },
    /// Automation execution record: scenario id, parameters, outcome
    Execution { dimension: usize },
}

impl Encoder {
    /// The fixed dimensionality of vectors this encoder produces
    pub fn dimension(&self) -> usize {
        match self {
            Self::CharNgram { dimension, .. }
            | Self::Token { dimension }
            | Self::CodeStructure { dimension }
            | Self::ContextTagged { dimension, .. }
            | Self::ChatTurn { dimension }
            | Self::Execution { dimension } => *dimension,
        }
    }

    /// The all-zero neutral embedding substituted on encoding failure
    pub fn neutral(&self) -> Vec<f32> {
        vec![0.0; self.dimension()]
    }

    /// Encode a payload into a fixed-length vector.
    ///
    /// Pure and deterministic: identical `(payload, context)` inputs
    /// always produce bit-identical output. Fails with
    /// [`ContinuumError::Encoding`] when the payload cannot be reduced to
    /// this encoder's feature shape.
    pub fn encode(&self, payload: &Value, context: &Context) -> Result<Vec<f32>> {
        let features = self.extract_features(payload, context)?;
        if features.is_empty() {
            return Err(ContinuumError::Encoding(
                "payload produced no features".to_string(),
            ));
        }
        Ok(hash_features(&features, self.dimension()))
    }

    fn extract_features(&self, payload: &Value, context: &Context) -> Result<Vec<String>> {
        match self {
            Self::CharNgram { n, .. } => {
                let text = payload_text(payload)?;
                Ok(char_ngrams(&text, *n))
            }
            Self::Token { .. } => {
                let text = payload_text(payload)?;
                Ok(token_features(&text))
            }
            Self::CodeStructure { .. } => {
                let text = payload_text(payload)?;
                Ok(structure_features(&text))
            }
            Self::ContextTagged { keys, .. } => {
                let text = payload_text(payload)?;
                let mut features = token_features(&text);
                for key in keys {
                    if let Some(value) = context.get(key) {
                        features.push(format!("ctx:{key}={value}"));
                    }
                }
                Ok(features)
            }
            Self::ChatTurn { .. } => {
                let text = field_text(payload, "text")
                    .or_else(|_| payload_text(payload))?;
                let mut features = token_features(&text);
                if let Some(role) = payload.get("role").and_then(Value::as_str) {
                    features.push(format!("role:{role}"));
                }
                Ok(features)
            }
            Self::Execution { .. } => {
                let scenario = payload
                    .get("scenario_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ContinuumError::Encoding(
                            "execution payload missing scenario_id".to_string(),
                        )
                    })?;
                let mut features = vec![format!("scenario:{scenario}")];
                if let Some(params) = payload.get("params").and_then(Value::as_object) {
                    for (key, value) in params {
                        features.push(format!("param:{key}={value}"));
                    }
                }
                if let Some(success) = payload.get("success").and_then(Value::as_bool) {
                    features.push(format!("outcome:{success}"));
                }
                if let Some(error) = payload.get("error").and_then(Value::as_str) {
                    features.extend(token_features(error));
                }
                Ok(features)
            }
        }
    }
}

/// Hash features into `dimension` buckets with sign splitting, then
/// L2-normalize. The sign bit halves hash-collision bias.
fn hash_features(features: &[String], dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension];
    for feature in features {
        let hash = xxh3_64(feature.as_bytes());
        let bucket = (hash % dimension as u64) as usize;
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
    l2_normalize(&mut vector);
    vector
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Extract text from a payload: either a bare string or an object with a
/// conventional text-bearing field.
fn payload_text(payload: &Value) -> Result<String> {
    match payload {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        Value::Object(map) => {
            for key in ["text", "content", "code"] {
                if let Some(Value::String(s)) = map.get(key) {
                    if !s.trim().is_empty() {
                        return Ok(s.clone());
                    }
                }
            }
            Err(ContinuumError::Encoding(
                "payload object has no text, content, or code field".to_string(),
            ))
        }
        _ => Err(ContinuumError::Encoding(format!(
            "payload cannot be reduced to text: {payload}"
        ))),
    }
}

fn field_text(payload: &Value, field: &str) -> Result<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
        .ok_or_else(|| ContinuumError::Encoding(format!("payload missing field: {field}")))
}

fn char_ngrams(text: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < n {
        return vec![format!("{n}g:{text}")];
    }
    chars
        .windows(n)
        .map(|w| format!("{}g:{}", n, w.iter().collect::<String>()))
        .collect()
}

/// Split text into lowercased word tokens, keeping underscores so
/// identifiers stay whole.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn token_features(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let mut features: Vec<String> = tokens.iter().map(|t| format!("tok:{t}")).collect();
    features.extend(
        tokens
            .windows(2)
            .map(|pair| format!("big:{} {}", pair[0], pair[1])),
    );
    features
}

fn structure_features(text: &str) -> Vec<String> {
    let mut features: Vec<String> = tokenize(text)
        .into_iter()
        .filter(|t| t.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_'))
        .map(|t| format!("id:{t}"))
        .collect();
    for c in text.chars() {
        if matches!(c, '{' | '}' | '(' | ')' | '[' | ']' | ';' | '=' | '.' | ':') {
            features.push(format!("sym:{c}"));
        }
    }
    features
}
