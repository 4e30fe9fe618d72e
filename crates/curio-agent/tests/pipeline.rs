// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Full turns through the assistant with scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use curio_agent::{AskRequest, AskSettings, Assistant};
use curio_config::{CurioConfig, StorageConfig};
use curio_core::CurioError;
use curio_reflect::PreferenceProfile;
use curio_test_utils::{HashingEmbedder, MockFailure, MockProvider, StaticClassifier};
use tempfile::TempDir;
use tracing_test::traced_test;

fn config(dir: &TempDir) -> CurioConfig {
    let mut config = CurioConfig::default();
    config.storage = StorageConfig::rooted_at(dir.path());
    config.llm.max_retries = 0;
    config.llm.retry_base_delay_ms = 0;
    config
}

async fn assistant(config: CurioConfig, provider: &MockProvider) -> Assistant {
    Assistant::open_with_classifier(
        config,
        Arc::new(provider.clone()),
        Arc::new(HashingEmbedder::new()),
        Arc::new(StaticClassifier::new("notes").with_rule("color", "preferences")),
    )
    .await
    .unwrap()
}

fn request(assistant: &Assistant, conversation_id: &str, text: &str) -> AskRequest {
    AskRequest {
        user_input: text.to_string(),
        conversation_id: conversation_id.to_string(),
        settings: assistant.default_settings(),
    }
}

fn extraction(content: &str) -> String {
    format!(r#"{{"worth_retaining": true, "topic": "notes", "content": "{content}", "confidence": 0.9}}"#)
}

#[tokio::test]
async fn empty_knowledge_base_still_answers() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule("What is the capital of France?", "Paris.")
        .await;
    let assistant = assistant(config(&dir), &provider).await;

    let mut req = request(&assistant, "c1", "What is the capital of France?");
    req.settings.await_curation = true;
    let response = assistant.ask(req).await.unwrap();

    assert_eq!(response.answer, "Paris.");
    assert!(response.passages.is_empty());
    assert!(response.updated_knowledge_file.is_none());
    assistant.shutdown().await;
}

#[tokio::test]
async fn stated_preference_is_learned_and_recalled() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider.add_rule("clear or unclear", "clear").await;
    provider.add_rule("yes or no", "no").await;
    provider
        .add_rule(
            "User: My favorite color is blue",
            extraction("The user's favorite color is blue."),
        )
        .await;
    provider
        .add_rule("(preferences) The user's favorite color is blue.", "Your favorite color is blue.")
        .await;
    provider
        .add_rule("My favorite color is blue", "Noted, blue it is.")
        .await;
    let assistant = assistant(config(&dir), &provider).await;

    let mut first = request(&assistant, "c1", "My favorite color is blue");
    first.settings.await_curation = true;
    let response = assistant.ask(first).await.unwrap();
    assert_eq!(response.answer, "Noted, blue it is.");
    let path = response
        .updated_knowledge_file
        .expect("the preference is written to a knowledge file");
    assert!(path.ends_with("preferences.toml"));

    let second = assistant
        .ask(request(&assistant, "c1", "What's my favorite color?"))
        .await
        .unwrap();
    assert!(second.answer.contains("blue"));
    assert_eq!(second.passages[0].topic, "preferences");
    assistant.shutdown().await;

    let file = assistant
        .knowledge()
        .store()
        .load("preferences")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.units.len(), 1);
    let source = file.units[0].source_exchange_ref.as_deref().unwrap();
    assert!(source.starts_with("c1@"), "awaited turns are referenced by timestamp: {source}");
}

#[tokio::test]
async fn recent_history_returns_last_ten_in_order() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    let mut config = config(&dir);
    config.reflection.enabled = false;
    let assistant = assistant(config, &provider).await;

    for i in 0..15 {
        let mut req = request(&assistant, "c1", &format!("question {i:02}"));
        req.settings = AskSettings {
            auto_update_knowledge: false,
            enable_context_analysis: false,
            ..req.settings
        };
        assistant.ask(req).await.unwrap();
    }

    let recent = assistant.log().recent("c1", 10).await.unwrap();
    let questions: Vec<_> = recent.iter().map(|e| e.user_input.as_str()).collect();
    let expected: Vec<_> = (5..15).map(|i| format!("question {i:02}")).collect();
    assert_eq!(questions, expected);
    assert!(provider.prompts_containing("worth keeping").await.is_empty());
    assistant.shutdown().await;
}

#[tokio::test]
async fn timed_out_turn_schedules_no_curation() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider.set_delay(Duration::from_millis(1500)).await;
    let mut config = config(&dir);
    config.retrieval.answer_timeout_secs = 1;
    let assistant = assistant(config, &provider).await;

    let err = assistant
        .ask(request(&assistant, "c1", "Tell me a long story"))
        .await
        .unwrap_err();
    assert!(matches!(err, CurioError::Timeout { .. }));
    assistant.shutdown().await;

    assert!(provider.prompts_containing("worth keeping").await.is_empty());
    assert!(assistant.log().recent("c1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_drains_queued_curation() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    let facts = [
        ("Standups are at nine", "Standups start at nine."),
        ("Refunds take thirty days", "Refunds take thirty days."),
        ("The office dog is Biscuit", "The office dog is named Biscuit."),
    ];
    for (question, fact) in facts {
        provider
            .add_rule(format!("User: {question}"), extraction(fact))
            .await;
    }
    let mut config = config(&dir);
    config.reflection.enabled = false;
    let assistant = assistant(config, &provider).await;

    for (question, _) in facts {
        let mut req = request(&assistant, "c1", question);
        req.settings.enable_context_analysis = false;
        assistant.ask(req).await.unwrap();
    }
    assistant.shutdown().await;

    let file = assistant
        .knowledge()
        .store()
        .load("notes")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.units.len(), 3);
    for unit in &file.units {
        let source = unit.source_exchange_ref.as_deref().unwrap();
        assert!(source.starts_with("c1#"), "logged turns are referenced by sequence: {source}");
    }
}

#[tokio::test]
async fn curation_failure_does_not_affect_answer() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider.add_response("Sure thing.").await;
    provider
        .add_failure(MockFailure::InvalidResponse)
        .await;
    let assistant = assistant(config(&dir), &provider).await;

    let mut req = request(&assistant, "c1", "Remember that I like tea");
    req.settings.await_curation = true;
    let response = assistant.ask(req).await.unwrap();
    assert_eq!(response.answer, "Sure thing.");
    assert!(response.updated_knowledge_file.is_none());
    assistant.shutdown().await;
}

#[tokio::test]
async fn background_refresh_indexes_new_knowledge() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule(
            "User: My favorite color is blue",
            extraction("The user's favorite color is blue."),
        )
        .await;
    let mut config = config(&dir);
    config.reflection.enabled = false;
    config.knowledge.sync_index_refresh = false;
    let assistant = assistant(config, &provider).await;

    let mut first = request(&assistant, "c1", "My favorite color is blue");
    first.settings.await_curation = true;
    first.settings.enable_context_analysis = false;
    let response = assistant.ask(first).await.unwrap();
    assert!(response.updated_knowledge_file.is_some());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while assistant.retrieval().current().is_none_or(|index| index.is_empty()) {
        assert!(tokio::time::Instant::now() < deadline, "index never picked up the new unit");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let mut second = request(&assistant, "c1", "What's my favorite color?");
    second.settings.enable_context_analysis = false;
    second.settings.auto_update_knowledge = false;
    let second = assistant.ask(second).await.unwrap();
    assert_eq!(second.passages[0].topic, "preferences");
    assistant.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn unwritable_log_still_answers() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider.add_rule("Is it Friday?", "It is.").await;
    let mut config = config(&dir);
    config.reflection.enabled = false;
    let log_dir = config.storage.log_dir.clone();
    let assistant = assistant(config, &provider).await;

    std::fs::remove_dir_all(&log_dir).unwrap();
    std::fs::write(&log_dir, "not a directory").unwrap();

    let mut req = request(&assistant, "c1", "Is it Friday?");
    req.settings.enable_context_analysis = false;
    req.settings.auto_update_knowledge = false;
    let response = assistant.ask(req).await.unwrap();

    assert_eq!(response.answer, "It is.");
    assert!(logs_contain("failed to log exchange"));
    assistant.shutdown().await;
}

#[tokio::test]
async fn stored_preferences_shape_the_answer_prompt() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    let mut config = config(&dir);
    config.reflection.enabled = false;
    let assistant = assistant(config, &provider).await;

    let mut profile = PreferenceProfile::new("c1");
    profile
        .preferences
        .insert("tone".to_string(), "casual".to_string());
    assistant.reflector().profiles().save(&profile).await.unwrap();

    let mut req = request(&assistant, "c1", "How do I boil an egg?");
    req.settings.enable_context_analysis = false;
    req.settings.auto_update_knowledge = false;
    assistant.ask(req).await.unwrap();

    let prompts = provider.prompts_containing("How do I boil an egg?").await;
    assert!(prompts.iter().any(|p| p.contains("Preferred tone: casual")));
    assistant.shutdown().await;
}
