//! Integration tests for the core memory system

use continuum::config::{CmsConfig, MemoryLevelConfig};
use continuum::embedding::{Context, Encoder, cosine_similarity};
use continuum::memory::cms::ContinuumMemorySystem;
use continuum::memory::types::WriteOutcome;
use continuum::testing::{context, small_cms, text_payload};
use serde_json::json;

#[test]
fn step_advances_by_exactly_n() {
    let mut cms = small_cms();
    let ctx = Context::new();

    cms.store("char", "k1", text_payload("abc"), &ctx).unwrap();
    cms.retrieve_similar(&text_payload("abc"), &["char"], 1, &ctx);
    assert_eq!(cms.global_step(), 0, "only step() may move the clock");

    for _ in 0..40 {
        cms.step();
    }
    assert_eq!(cms.global_step(), 40);
}

#[test]
fn encode_is_deterministic_across_instances() {
    let cms_a = small_cms();
    let cms_b = small_cms();
    let ctx = context(&[("project_id", "p1")]);
    let payload = text_payload("fn handle(req: Request) -> Response");

    let a = cms_a.level("token").unwrap().encode(&payload, &ctx).unwrap();
    let b = cms_b.level("token").unwrap().encode(&payload, &ctx).unwrap();
    assert_eq!(a, b, "identical inputs must produce bit-identical vectors");
    assert!(cosine_similarity(&a, &b) >= 0.999);
}

#[test]
fn frozen_level_entry_count_is_constant() {
    let config = MemoryLevelConfig::frozen("platform");
    let encoder = Encoder::Token { dimension: config.dimension };
    let mut cms = ContinuumMemorySystem::new(vec![(config, encoder)]).unwrap();
    let ctx = Context::new();

    cms.level_mut("platform")
        .unwrap()
        .seed("seed-1", text_payload("static knowledge"), &ctx);
    cms.level_mut("platform")
        .unwrap()
        .seed("seed-2", text_payload("more static knowledge"), &ctx);

    for i in 0..50 {
        let outcome = cms
            .store("platform", format!("k{i}"), text_payload("attempt"), &ctx)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::RejectedFrozen);
        cms.step();
    }

    assert_eq!(cms.stats().levels["platform"].size, 2);
}

#[test]
fn end_to_end_top1_matches_identical_payload() {
    let mut cms = small_cms();
    let ctx = Context::new();

    cms.store("token", "k1", text_payload("parse the incoming request body"), &ctx)
        .unwrap();
    cms.store("token", "k2", text_payload("flush the write ahead log to disk"), &ctx)
        .unwrap();
    cms.store("token", "k3", text_payload("evict the coldest cache shard"), &ctx)
        .unwrap();

    let results = cms.retrieve_similar(
        &text_payload("flush the write ahead log to disk"),
        &["token"],
        3,
        &ctx,
    );
    let ranked = &results["token"];
    assert_eq!(ranked[0].0, "k2");
    assert!(ranked[0].1 >= 0.99);
}

#[test]
fn retrieval_accepts_superset_of_level_names() {
    let mut cms = small_cms();
    let ctx = Context::new();
    cms.store("char", "k1", text_payload("hello"), &ctx).unwrap();

    let results = cms.retrieve_similar(
        &text_payload("hello"),
        &["char", "token", "galaxy", "session"],
        2,
        &ctx,
    );
    assert!(results.contains_key("char"));
    assert!(!results.contains_key("galaxy"));
    assert!(!results.contains_key("session"));
}

#[test]
fn unknown_level_store_is_an_error() {
    let mut cms = small_cms();
    let ctx = Context::new();
    let err = cms
        .store("galaxy", "k1", text_payload("payload"), &ctx)
        .unwrap_err();
    assert!(err.to_string().contains("galaxy"));
}

#[test]
fn cms_builds_from_declarative_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layout.toml");
    std::fs::write(
        &path,
        r#"
[[levels]]
name = "fast"
update_freq = 1
encoder = "char_ngram"

[[levels]]
name = "slow"
update_freq = 50
encoder = "token"
"#,
    )
    .unwrap();

    let config = CmsConfig::from_file(&path).unwrap();
    let mut cms = ContinuumMemorySystem::from_config(&config).unwrap();
    assert_eq!(cms.level_names(), vec!["fast", "slow"]);

    let ctx = Context::new();
    cms.store("fast", "k1", json!("configured level"), &ctx).unwrap();
    let results = cms.retrieve_similar(&json!("configured level"), &["fast"], 1, &ctx);
    assert!(results["fast"][0].1 >= 0.99);
}

#[test]
fn stats_reflect_scripted_operations() {
    let mut cms = small_cms();
    let ctx = Context::new();

    cms.store("char", "k1", text_payload("first"), &ctx).unwrap();
    cms.store("char", "k2", text_payload("second"), &ctx).unwrap();
    cms.update_level("char", "k1", text_payload("first again"), &ctx, 0.4)
        .unwrap();
    cms.retrieve_similar(&text_payload("first"), &["char"], 2, &ctx);
    cms.step();

    let stats = cms.stats();
    assert_eq!(stats.global_step, 1);
    let char_stats = &stats.levels["char"];
    assert_eq!(char_stats.size, 2);
    assert_eq!(char_stats.encodes, 3);
    assert_eq!(char_stats.updates, 1);
    assert_eq!(char_stats.retrievals, 1);
    assert!((char_stats.avg_surprise - 0.4).abs() < 0.001);
}
