//! Integration tests for the three domain specializations

use continuum::domains::{
    CodeFragment, CodeMemory, ConversationTurn, ConversationalMemory, ExecutionRecord,
    ScenarioMemory, TuningAction,
};
use continuum::embedding::Context;
use serde_json::{Value, json};
use std::collections::BTreeMap;

#[test]
fn code_cadence_gating_thirty_events() {
    let mut memory = CodeMemory::new().unwrap();
    let ctx = Context::new();
    for i in 0..30 {
        memory
            .record(&CodeFragment::new(format!("let value_{i} = {i};")), &ctx)
            .unwrap();
    }

    let stats = memory.stats();
    assert_eq!(stats.global_step, 30);
    assert_eq!(stats.levels["char"].encodes, 30);
    assert_eq!(
        stats.levels["token"].encodes, 3,
        "update_freq 10 over 30 events must mean exactly 3 token writes"
    );
}

#[test]
fn rejected_completion_loses_top_rank_for_its_prefix() {
    let mut memory = CodeMemory::new().unwrap();
    let ctx = Context::new();

    let rejected = "client.request(url).send_blocking()";
    let alternative = "client.request(url).send_async()";
    memory.record(&CodeFragment::new(rejected), &ctx).unwrap();
    memory.record(&CodeFragment::new(alternative), &ctx).unwrap();

    // Before feedback the rejected text is a perfectly good candidate
    let before = memory.retrieve("client.request(url).send_blocking()", &ctx, 2);
    assert_eq!(
        before[0].payload.get("text").and_then(Value::as_str),
        Some(rejected)
    );

    memory
        .learn_from_feedback("client.request(url)", rejected, false)
        .unwrap();

    let after = memory.retrieve("client.request(url)", &ctx, 2);
    assert!(!after.is_empty());
    assert_ne!(
        after[0].payload.get("text").and_then(Value::as_str),
        Some(rejected),
        "negative feedback must demote the rejected completion"
    );
}

#[test]
fn code_retrieval_tags_levels_and_bounds_scores() {
    let mut memory = CodeMemory::with_platform_knowledge(&[
        "wrap blocking io in spawn_blocking",
        "prefer &str parameters over String",
    ])
    .unwrap();
    let ctx = Context::new();
    memory
        .record(&CodeFragment::new("fn sum(xs: &[i32]) -> i32"), &ctx)
        .unwrap();

    let results = memory.retrieve("prefer &str parameters over String", &ctx, 5);
    assert!(!results.is_empty());
    for item in &results {
        assert!((0.0..=1.0).contains(&item.score));
        assert!((0.0..=1.0).contains(&item.similarity));
        assert!(!item.level.is_empty());
    }
    // The platform idiom identical to the query must surface
    assert!(results.iter().any(|r| r.level == "platform"));
}

#[test]
fn chat_feedback_and_session_scope() {
    let mut memory = ConversationalMemory::new().unwrap();
    let ctx = Context::new();

    memory
        .record(
            &ConversationTurn::new("user", "the api gateway times out under load")
                .with_session("s-1"),
            &ctx,
        )
        .unwrap();
    memory
        .record(
            &ConversationTurn::new("assistant", "raising the worker count fixed the timeouts")
                .with_session("s-1"),
            &ctx,
        )
        .unwrap();

    let surprise = memory
        .learn_from_feedback("raising the worker count fixed the timeouts", 5)
        .unwrap();
    assert_eq!(surprise, 0.0);

    let results = memory.retrieve("api gateway times out", &ctx, 3);
    assert!(!results.is_empty());
    assert_eq!(
        results[0].payload.get("text").and_then(Value::as_str),
        Some("the api gateway times out under load")
    );
}

#[test]
fn scenario_tuning_thresholds() {
    let mut memory = ScenarioMemory::new().unwrap();
    let ctx = Context::new();
    let good: BTreeMap<String, Value> =
        BTreeMap::from([("batch_size".to_string(), json!(500))]);
    let bad: BTreeMap<String, Value> = BTreeMap::from([("batch_size".to_string(), json!(50))]);

    // 2 successes / 8 failures: rate 0.2
    for _ in 0..2 {
        memory
            .record_execution(&ExecutionRecord::success("ingest", good.clone()), &ctx)
            .unwrap();
    }
    for _ in 0..8 {
        memory
            .record_execution(
                &ExecutionRecord::failure("ingest", bad.clone(), "backpressure"),
                &ctx,
            )
            .unwrap();
    }
    let decision = memory.tune("ingest", &bad);
    assert_eq!(decision.action, TuningAction::Replace);
    assert!(decision.confidence >= 0.8);
    assert_eq!(decision.params["batch_size"], json!(500));
    assert_eq!(decision.changed_keys, vec!["batch_size".to_string()]);

    // 8 successes / 2 failures: rate 0.8
    for _ in 0..8 {
        memory
            .record_execution(&ExecutionRecord::success("export", good.clone()), &ctx)
            .unwrap();
    }
    for _ in 0..2 {
        memory
            .record_execution(
                &ExecutionRecord::failure("export", bad.clone(), "io error"),
                &ctx,
            )
            .unwrap();
    }
    let decision = memory.tune("export", &bad);
    assert_eq!(decision.action, TuningAction::Keep);
    assert!((decision.confidence - 0.9).abs() < 0.001);
    assert!(decision.changed_keys.is_empty());
}

#[test]
fn scenario_similar_runs_round_trip() {
    let mut memory = ScenarioMemory::new().unwrap();
    let ctx = Context::new();
    let record = ExecutionRecord::success(
        "nightly-backup",
        BTreeMap::from([("timeout_secs".to_string(), json!(120))]),
    );
    memory.record_execution(&record, &ctx).unwrap();

    let results = memory.similar_runs(&record, &ctx, 1);
    assert_eq!(results.len(), 1);
    assert!(results[0].similarity >= 0.99);
}
