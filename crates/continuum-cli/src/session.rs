//! Drives one domain specialization from a recorded event log
//!
//! Event logs are JSON lines. Each line is either a `record` event or a
//! `feedback` event with domain-specific fields; blank lines and `#`
//! comments are skipped.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use clap::ValueEnum;
use serde::Deserialize;
use serde_json::Value;

use continuum::domains::{
    CodeFragment, CodeMemory, ConversationTurn, ConversationalMemory, ExecutionRecord,
    ScenarioMemory,
};
use continuum::embedding::Context;
use continuum::memory::types::{CmsStats, ScoredItem};

use crate::error::{CliError, CliResult};

/// Which specialization to drive
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Domain {
    Code,
    Chat,
    Scenario,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum CodeEvent {
    Record {
        text: String,
        language: Option<String>,
        path: Option<String>,
    },
    Feedback {
        observed: String,
        expected: String,
        accepted: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ChatEvent {
    Record {
        role: String,
        text: String,
        session_id: Option<String>,
    },
    Feedback {
        text: String,
        rating: u8,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ScenarioEvent {
    Record {
        scenario_id: String,
        #[serde(default)]
        params: BTreeMap<String, Value>,
        success: bool,
        #[serde(default)]
        duration_ms: u64,
        error: Option<String>,
    },
}

/// One in-memory specialization instance fed from an event log
pub enum DomainSession {
    Code(CodeMemory),
    Chat(ConversationalMemory),
    Scenario(ScenarioMemory),
}

impl DomainSession {
    /// Create a fresh session for the given domain
    pub fn new(domain: Domain) -> CliResult<Self> {
        Ok(match domain {
            Domain::Code => Self::Code(CodeMemory::new()?),
            Domain::Chat => Self::Chat(ConversationalMemory::new()?),
            Domain::Scenario => Self::Scenario(ScenarioMemory::new()?),
        })
    }

    /// Replay every event in a JSON-lines file, returning the number of
    /// events applied
    pub fn replay_file(&mut self, path: &Path) -> CliResult<usize> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut applied = 0;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.apply(trimmed)
                .map_err(|e| CliError(format!("line {}: {e}", lineno + 1)))?;
            applied += 1;
        }
        tracing::debug!(applied, path = %path.display(), "replayed event log");
        Ok(applied)
    }

    /// Apply a single JSON event
    pub fn apply(&mut self, line: &str) -> CliResult<()> {
        let ctx = Context::new();
        match self {
            Self::Code(memory) => match serde_json::from_str::<CodeEvent>(line)? {
                CodeEvent::Record { text, language, path } => {
                    let fragment = CodeFragment { text, language, path };
                    memory.record(&fragment, &ctx)?;
                }
                CodeEvent::Feedback { observed, expected, accepted } => {
                    memory.learn_from_feedback(&observed, &expected, accepted)?;
                }
            },
            Self::Chat(memory) => match serde_json::from_str::<ChatEvent>(line)? {
                ChatEvent::Record { role, text, session_id } => {
                    let turn = ConversationTurn { role, text, session_id };
                    memory.record(&turn, &ctx)?;
                }
                ChatEvent::Feedback { text, rating } => {
                    memory.learn_from_feedback(&text, rating)?;
                }
            },
            Self::Scenario(memory) => match serde_json::from_str::<ScenarioEvent>(line)? {
                ScenarioEvent::Record {
                    scenario_id,
                    params,
                    success,
                    duration_ms,
                    error,
                } => {
                    let record = ExecutionRecord {
                        scenario_id,
                        params,
                        success,
                        duration_ms,
                        error,
                    };
                    memory.record_execution(&record, &ctx)?;
                }
            },
        }
        Ok(())
    }

    /// Retrieve up to `k` merged results for a textual query
    pub fn retrieve(&mut self, query: &str, k: usize) -> Vec<ScoredItem> {
        let ctx = Context::new();
        match self {
            Self::Code(memory) => memory.retrieve(query, &ctx, k),
            Self::Chat(memory) => memory.retrieve(query, &ctx, k),
            Self::Scenario(memory) => {
                let probe = ExecutionRecord::success(query, BTreeMap::new());
                memory.similar_runs(&probe, &ctx, k)
            }
        }
    }

    /// Stats snapshot of the underlying CMS
    pub fn stats(&self) -> CmsStats {
        match self {
            Self::Code(memory) => memory.stats(),
            Self::Chat(memory) => memory.stats(),
            Self::Scenario(memory) => memory.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_replay_code_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# editor session").unwrap();
        writeln!(file, r#"{{"event":"record","text":"let mut buf = Vec::new();"}}"#).unwrap();
        writeln!(
            file,
            r#"{{"event":"feedback","observed":"buf.push(1)","expected":"buf.pop()","accepted":false}}"#
        )
        .unwrap();

        let mut session = DomainSession::new(Domain::Code).unwrap();
        let applied = session.replay_file(&path).unwrap();
        assert_eq!(applied, 2);
        assert_eq!(session.stats().global_step, 1);
    }

    #[test]
    fn test_replay_rejects_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"event\":\"unknown\"}\n").unwrap();

        let mut session = DomainSession::new(Domain::Chat).unwrap();
        let err = session.replay_file(&path).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_scenario_replay_and_query() {
        let mut session = DomainSession::new(Domain::Scenario).unwrap();
        session
            .apply(r#"{"event":"record","scenario_id":"sync","params":{"retries":2},"success":true}"#)
            .unwrap();

        let results = session.retrieve("sync", 1);
        assert_eq!(results.len(), 1);
    }
}
