// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use curio_config::ReflectionConfig;
use curio_core::RetryPolicy;
use curio_reflect::{PreferenceRecord, PreferenceReflector, ReflectionRecord};
use curio_test_utils::{MockFailure, MockProvider};
use tempfile::TempDir;

fn reflector(dir: &TempDir, provider: &MockProvider, config: ReflectionConfig) -> PreferenceReflector {
    PreferenceReflector::open(dir.path(), Arc::new(provider.clone()), config)
        .unwrap()
        .with_model("utility")
        .with_retry(RetryPolicy::none())
}

#[tokio::test]
async fn preferences_accumulate_in_profile_and_journal() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule(
            "Message: answer in bullet points",
            r#"{"intent": "formatting", "requirements": "bullets", "preferences": {"format": "bullet points"}, "summary": "Wants bullets."}"#,
        )
        .await;
    provider
        .add_rule(
            "Message: keep it casual",
            r#"{"intent": "tone", "preferences": {"tone": "casual"}, "summary": "Casual tone."}"#,
        )
        .await;
    let r = reflector(&dir, &provider, ReflectionConfig::default());

    r.analyze_preference("answer in bullet points", "c1").await.unwrap();
    let analysis = r.analyze_preference("keep it casual", "c1").await.unwrap();
    assert_eq!(analysis.intent, "tone");

    let profile = r.profile("c1").await.unwrap();
    assert_eq!(profile.observations, 2);
    assert_eq!(profile.preferences["format"], "bullet points");
    assert_eq!(profile.preferences["tone"], "casual");

    let rows: Vec<PreferenceRecord> = r.preference_journal().entries().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].user_intent, "formatting");
    assert_eq!(rows[0].user_requirements, "bullets");
    assert!(dir.path().join("user_preference.csv").exists());
}

#[tokio::test]
async fn unparseable_analysis_writes_no_preferences() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::with_responses(vec!["I cannot tell.".into()]);
    let r = reflector(&dir, &provider, ReflectionConfig::default());

    let analysis = r.analyze_preference("hmm", "c1").await.unwrap();
    assert_eq!(analysis.intent, "unknown");

    let profile = r.profile("c1").await.unwrap();
    assert!(profile.preferences.is_empty());
    assert_eq!(profile.observations, 1);
}

#[tokio::test]
async fn reflection_runs_every_n_observations() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider.add_rule("Analyze this message", r#"{"intent": "ask"}"#).await;
    provider
        .add_rule(
            "suggest one concrete improvement",
            r#"{"improvement_strategy": "Lead with the direct answer.", "summary": "Answers were long."}"#,
        )
        .await;
    let config = ReflectionConfig {
        reflect_every: 2,
        ..ReflectionConfig::default()
    };
    let r = reflector(&dir, &provider, config);

    r.observe("c1", "first", "a1").await;
    assert!(r.profile("c1").await.unwrap().strategy_hints.is_empty());

    r.observe("c1", "second", "a2").await;
    let profile = r.profile("c1").await.unwrap();
    assert_eq!(profile.strategy_hints, vec!["Lead with the direct answer."]);
    assert!(profile.last_reflected_at.is_some());

    // Not due again until two more observations.
    r.observe("c1", "third", "a3").await;
    let rows: Vec<ReflectionRecord> = r.reflection_journal().entries().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_input, "second");
    assert_eq!(provider.prompts_containing("suggest one concrete improvement").await.len(), 1);
}

#[tokio::test]
async fn strategy_hints_stay_bounded() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider.add_rule("Analyze this message", "{}").await;
    for i in 0..4 {
        provider
            .add_rule(
                format!("User: turn{i}"),
                format!(r#"{{"improvement_strategy": "hint {i}"}}"#),
            )
            .await;
    }
    let config = ReflectionConfig {
        reflect_every: 1,
        max_strategy_hints: 2,
        ..ReflectionConfig::default()
    };
    let r = reflector(&dir, &provider, config);
    for i in 0..4 {
        r.observe("c1", &format!("turn{i}"), "ok").await;
    }
    let profile = r.profile("c1").await.unwrap();
    assert_eq!(profile.strategy_hints, vec!["hint 2", "hint 3"]);
}

#[tokio::test]
async fn failures_are_contained() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider.add_failure(MockFailure::Timeout).await;
    let r = reflector(&dir, &provider, ReflectionConfig::default());

    // Must not panic or propagate.
    r.observe("c1", "hello", "hi").await;
    assert!(r.analyze_preference("x", "c2").await.is_ok());
}

#[tokio::test]
async fn disabled_reflector_does_nothing() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    let config = ReflectionConfig {
        enabled: false,
        ..ReflectionConfig::default()
    };
    let r = reflector(&dir, &provider, config);
    r.observe("c1", "hello", "hi").await;
    assert!(provider.requests().await.is_empty());
    assert_eq!(r.profile("c1").await.unwrap().observations, 0);
}

#[tokio::test]
async fn conversations_have_separate_profiles() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule("Message: be formal", r#"{"preferences": {"tone": "formal"}}"#)
        .await;
    provider.add_rule("Analyze this message", "{}").await;
    let r = reflector(&dir, &provider, ReflectionConfig::default());
    r.analyze_preference("be formal", "a").await.unwrap();
    r.analyze_preference("hello", "b").await.unwrap();
    assert_eq!(r.profile("a").await.unwrap().preferences["tone"], "formal");
    assert!(r.profile("b").await.unwrap().preferences.is_empty());
}
