// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end curation against a temp-dir store with scripted collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use curio_config::KnowledgeConfig;
use curio_core::types::{ProviderRequest, ProviderResponse};
use curio_core::{CurioError, IndexRefresher, PluginAdapter, ProviderAdapter, RetryPolicy};
use curio_knowledge::{KnowledgeFile, KnowledgeManager, KnowledgeStore, KnowledgeUnit};
use curio_test_utils::{HashingEmbedder, MockProvider, StaticClassifier};
use tempfile::TempDir;
use tokio::sync::Notify;

#[derive(Default)]
struct CountingRefresher {
    calls: AtomicUsize,
}

#[async_trait]
impl IndexRefresher for CountingRefresher {
    async fn refresh_index(&self) -> Result<(), CurioError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn extraction(content: &str) -> String {
    format!(r#"{{"worth_retaining": true, "topic": "notes", "content": "{content}", "confidence": 0.9}}"#)
}

fn manager(
    dir: &TempDir,
    provider: &MockProvider,
    classifier: StaticClassifier,
    config: KnowledgeConfig,
) -> KnowledgeManager {
    let store = KnowledgeStore::open(dir.path().join("knowledge_base")).unwrap();
    KnowledgeManager::new(
        Arc::new(store),
        Arc::new(provider.clone()),
        Arc::new(HashingEmbedder::new()),
        Arc::new(classifier),
        config,
    )
    .with_model("utility")
    .with_retry(RetryPolicy::none())
}

#[tokio::test]
async fn repeated_fact_is_stored_once() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule("User: My favorite color is blue", extraction("The user's favorite color is blue."))
        .await;
    let km = manager(&dir, &provider, StaticClassifier::new("preferences"), KnowledgeConfig::default());

    let first = km.update("My favorite color is blue", "Noted!").await.unwrap();
    let path = first.expect("first update writes a file");
    assert!(path.ends_with("preferences.toml"));

    let second = km.update("My favorite color is blue", "Got it.").await.unwrap();
    assert!(second.is_none(), "duplicate must not write");

    let file = km.store().load("preferences").await.unwrap().unwrap();
    assert_eq!(file.units.len(), 1);
    assert_eq!(file.revision, 1);
}

#[tokio::test]
async fn close_statement_refines_existing_unit() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule("User: first", extraction("The user's favorite color is blue"))
        .await;
    provider
        .add_rule(
            "User: second",
            extraction("The user's favorite color is blue, specifically navy blue"),
        )
        .await;
    provider
        .add_rule("Merge these two statements", "The user's favorite color is navy blue.")
        .await;
    let config = KnowledgeConfig {
        refinement_threshold: 0.6,
        duplicate_threshold: 0.97,
        ..KnowledgeConfig::default()
    };
    let km = manager(&dir, &provider, StaticClassifier::new("preferences"), config);

    km.update("first", "ok").await.unwrap();
    let written = km.update("second", "ok").await.unwrap();
    assert!(written.is_some());

    let file = km.store().load("preferences").await.unwrap().unwrap();
    assert_eq!(file.units.len(), 1);
    assert_eq!(file.units[0].content, "The user's favorite color is navy blue.");
    assert_eq!(file.revision, 2);
}

#[tokio::test]
async fn refinement_that_matches_a_sibling_is_folded_away() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule("User: tea", extraction("the user prefers tea strongly"))
        .await;
    provider
        .add_rule(
            "Merge these two statements",
            "the user prefers tea with honey in the morning",
        )
        .await;
    let config = KnowledgeConfig {
        refinement_threshold: 0.6,
        duplicate_threshold: 0.97,
        ..KnowledgeConfig::default()
    };
    let km = manager(&dir, &provider, StaticClassifier::new("preferences"), config);
    seed(
        km.store(),
        "preferences",
        &[
            "the user prefers tea",
            "the user prefers tea with honey in the morning",
        ],
    )
    .await;

    assert!(km.update("tea", "ok").await.unwrap().is_some());

    let file = km.store().load("preferences").await.unwrap().unwrap();
    assert_eq!(file.units.len(), 1);
    assert_eq!(file.units[0].content, "the user prefers tea with honey in the morning");
}

#[tokio::test]
async fn low_confidence_extraction_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule(
            "User: maybe",
            r#"{"worth_retaining": true, "topic": "notes", "content": "The user might like jazz.", "confidence": 0.1}"#,
        )
        .await;
    let km = manager(&dir, &provider, StaticClassifier::new("music"), KnowledgeConfig::default());

    assert!(km.update("maybe", "ok").await.unwrap().is_none());
    assert!(km.store().snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn unsure_label_gives_way_to_extractor_topic() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule("User: deploys", extraction("Deploys happen on Tuesdays."))
        .await;
    let classifier = StaticClassifier::new("misc").with_confidence(0.2);
    let km = manager(&dir, &provider, classifier, KnowledgeConfig::default());

    let path = km.update("deploys", "ok").await.unwrap().unwrap();
    assert!(path.ends_with("notes.toml"));
}

#[tokio::test]
async fn declined_extraction_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule("User: hello", r#"{"worth_retaining": false}"#)
        .await;
    let refresher = Arc::new(CountingRefresher::default());
    let km = manager(&dir, &provider, StaticClassifier::new("general"), KnowledgeConfig::default())
        .with_index_refresher(refresher.clone());

    assert!(km.update("hello", "hi there").await.unwrap().is_none());
    assert!(km.store().snapshot().await.unwrap().is_empty());
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refresh_follows_each_write() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule("User: remember", extraction("Deploys happen on Tuesdays."))
        .await;
    let refresher = Arc::new(CountingRefresher::default());
    let km = manager(&dir, &provider, StaticClassifier::new("work"), KnowledgeConfig::default())
        .with_index_refresher(refresher.clone());

    km.update("remember", "ok").await.unwrap();
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

    // Duplicate: no write, no refresh.
    km.update("remember", "ok").await.unwrap();
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn similar_label_reuses_existing_topic() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule("User: borrow", extraction("A value has exactly one owner."))
        .await;
    provider
        .add_rule("User: move", extraction("Assignment moves non-Copy values."))
        .await;
    provider
        .add_rule("User: tomato", extraction("Tomatoes need full sun."))
        .await;
    let classifier = StaticClassifier::new("general")
        .with_rule("owner", "rust ownership rules")
        .with_rule("moves", "rust ownership")
        .with_rule("tomatoes", "gardening tips");
    let config = KnowledgeConfig {
        topic_similarity_floor: 0.7,
        ..KnowledgeConfig::default()
    };
    let km = manager(&dir, &provider, classifier.clone(), config);

    km.update("borrow", "ok").await.unwrap();
    km.update("move", "ok").await.unwrap();
    km.update("tomato", "ok").await.unwrap();

    let topics = km.store().topics().await.unwrap();
    assert_eq!(topics, vec!["gardening tips".to_string(), "rust ownership rules".to_string()]);
    let rust = km.store().load("rust ownership rules").await.unwrap().unwrap();
    assert_eq!(rust.units.len(), 2);

    let seen = classifier.existing_topics_seen().await;
    assert!(seen[0].is_empty());
    assert_eq!(seen[1], vec!["rust ownership rules".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_to_one_topic_lose_nothing() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    for i in 0..8 {
        provider
            .add_rule(
                format!("User: q{i:03}"),
                extraction(&format!("token{i}a token{i}b token{i}c")),
            )
            .await;
    }
    let km = Arc::new(manager(&dir, &provider, StaticClassifier::new("notes"), KnowledgeConfig::default()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let km = km.clone();
        handles.push(tokio::spawn(async move {
            km.update(&format!("q{i:03}"), "ok").await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let file = km.store().load("notes").await.unwrap().unwrap();
    assert_eq!(file.units.len(), 8);
    assert_eq!(file.revision, 8);
    for i in 0..8 {
        let expected = format!("token{i}a token{i}b token{i}c");
        assert!(file.units.iter().any(|u| u.content == expected), "missing {expected}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_updates_keep_one_unit() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider
        .add_rule("User: same", extraction("The office closes at six."))
        .await;
    let km = Arc::new(manager(&dir, &provider, StaticClassifier::new("office"), KnowledgeConfig::default()));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let km = km.clone();
            tokio::spawn(async move { km.update("same", "ok").await })
        })
        .collect();
    let mut written = 0;
    for h in handles {
        if h.await.unwrap().unwrap().is_some() {
            written += 1;
        }
    }

    assert_eq!(written, 1);
    let file = km.store().load("office").await.unwrap().unwrap();
    assert_eq!(file.units.len(), 1);
}

async fn seed(store: &KnowledgeStore, topic: &str, contents: &[&str]) {
    let guard = store.lock_topic(topic).await;
    let mut file = KnowledgeFile::new(topic);
    file.units = contents
        .iter()
        .map(|c| KnowledgeUnit::new(topic, *c, None))
        .collect();
    store.replace(&guard, None, file).await.unwrap();
}

#[tokio::test]
async fn organize_merges_same_theme_and_reports_empty_files() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider.add_rule("Topic: cooking", "Cooking").await;
    provider.add_rule("Topic: baking bread", "cooking.").await;
    provider.add_rule("Topic: misc", "Miscellany").await;
    let refresher = Arc::new(CountingRefresher::default());
    let km = manager(&dir, &provider, StaticClassifier::new("general"), KnowledgeConfig::default())
        .with_index_refresher(refresher.clone());

    let store = km.store().clone();
    seed(
        &store,
        "cooking",
        &[
            "Sear steak in a very hot cast iron pan.",
            "Rest meat for five minutes after cooking.",
            "Salt pasta water generously before boiling.",
        ],
    )
    .await;
    seed(
        &store,
        "baking bread",
        &[
            "Bread dough needs a long slow proof.",
            "Rest meat for five minutes after cooking.",
        ],
    )
    .await;
    seed(&store, "misc", &["tbd"]).await;

    let report = km.organize_knowledge_base().await.unwrap();
    assert_eq!(report.files_analyzed, 3);
    assert_eq!(report.themes_identified, 2);
    assert_eq!(report.merges.len(), 1);
    let merge = &report.merges[0];
    assert_eq!(merge.target_topic, "cooking");
    assert_eq!(merge.merged_topics, vec!["baking bread".to_string()]);
    assert_eq!(merge.units_before, 5);
    assert_eq!(merge.units_after, 4);
    assert_eq!(report.duplicate_units_removed, 1);
    assert_eq!(report.empty_files, vec![store.path_for("misc")]);
    assert_eq!(report.conflicts_skipped, 0);

    assert!(store.load("baking bread").await.unwrap().is_none());
    let cooking = store.load("cooking").await.unwrap().unwrap();
    assert_eq!(cooking.units.len(), 4);
    assert!(cooking.units.iter().all(|u| u.topic == "cooking"));
    // Empty files are reported, never deleted.
    assert!(store.load("misc").await.unwrap().is_some());
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn organize_on_tidy_base_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let provider = MockProvider::new();
    provider.add_rule("Topic: travel", "Travel").await;
    provider.add_rule("Topic: finance", "Personal finance").await;
    let refresher = Arc::new(CountingRefresher::default());
    let km = manager(&dir, &provider, StaticClassifier::new("general"), KnowledgeConfig::default())
        .with_index_refresher(refresher.clone());
    let store = km.store().clone();
    seed(&store, "travel", &["Window seats are preferred on long flights over the ocean."]).await;
    seed(&store, "finance", &["Retirement contributions are maxed out every January."]).await;

    let report = km.organize_knowledge_base().await.unwrap();
    assert_eq!(report.files_analyzed, 2);
    assert!(report.merges.is_empty());
    assert_eq!(report.duplicate_units_removed, 0);
    assert!(report.empty_files.is_empty());
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.load("travel").await.unwrap().unwrap().revision, 1);
}

/// Holds the first theme request until released.
struct GatedThemes {
    inner: MockProvider,
    gated: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl PluginAdapter for GatedThemes {
    fn name(&self) -> &str {
        "gated-themes"
    }
}

#[async_trait]
impl ProviderAdapter for GatedThemes {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, CurioError> {
        if request.prompt.contains("overall theme") && !self.gated.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.complete(request).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn organize_skips_group_updated_underneath() {
    let dir = TempDir::new().unwrap();
    let mock = MockProvider::new();
    mock.add_rule("User: braise", extraction("Braise short ribs low and slow for hours."))
        .await;
    mock.add_rule("Topic: cooking", "Cooking").await;
    mock.add_rule("Topic: baking bread", "cooking.").await;
    let provider = Arc::new(GatedThemes {
        inner: mock,
        gated: AtomicBool::new(false),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let store = Arc::new(KnowledgeStore::open(dir.path().join("knowledge_base")).unwrap());
    let km = Arc::new(
        KnowledgeManager::new(
            store.clone(),
            provider.clone(),
            Arc::new(HashingEmbedder::new()),
            Arc::new(StaticClassifier::new("cooking")),
            KnowledgeConfig::default(),
        )
        .with_model("utility")
        .with_retry(RetryPolicy::none()),
    );
    seed(&store, "cooking", &["Sear steak in a very hot cast iron pan."]).await;
    seed(&store, "baking bread", &["Bread dough needs a long slow proof."]).await;

    let organizer = km.clone();
    let organize = tokio::spawn(async move { organizer.organize_knowledge_base().await });
    provider.entered.notified().await;

    km.update("braise", "ok").await.unwrap().unwrap();
    provider.release.notify_one();

    let report = organize.await.unwrap().unwrap();
    assert_eq!(report.conflicts_skipped, 1);
    assert!(report.merges.is_empty());
    let cooking = store.load("cooking").await.unwrap().unwrap();
    assert_eq!(cooking.units.len(), 2);
    assert!(store.load("baking bread").await.unwrap().is_some());
}
