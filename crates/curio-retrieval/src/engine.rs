// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval-augmented answering over the knowledge base.
//!
//! Readers take a cheap `Arc` snapshot of the current index; a refresh
//! builds a new index off to the side and swaps it in when complete. At
//! most one build runs at a time.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::Utc;
use curio_config::RetrievalConfig;
use curio_core::traits::{EmbeddingAdapter, IndexRefresher, ProviderAdapter};
use curio_core::types::{EmbeddingInput, ProviderRequest};
use curio_core::{CurioError, RetryPolicy, with_retry};
use curio_knowledge::{KnowledgeStore, StoredFile};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::index::{IndexEntry, Passage, VectorIndex, content_hash, corpus_fingerprint};

/// Shared, immutable view of one index generation.
pub type IndexHandle = Arc<VectorIndex>;

const EMBED_BATCH: usize = 64;

/// The answer to one question plus the passages that informed it.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    /// LLM output, unmodified.
    pub answer: String,
    pub passages: Vec<Passage>,
}

pub struct RetrievalEngine {
    slot: Arc<IndexSlot>,
    provider: Arc<dyn ProviderAdapter>,
    config: RetrievalConfig,
    model: String,
    system_prompt: Option<String>,
    retry: RetryPolicy,
}

/// The published index and what it takes to rebuild it. Shared with
/// detached build tasks, which may outlive the request that started them.
struct IndexSlot {
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn EmbeddingAdapter>,
    index_path: PathBuf,
    current: ArcSwapOption<VectorIndex>,
    rebuild: Mutex<()>,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<KnowledgeStore>,
        provider: Arc<dyn ProviderAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        config: RetrievalConfig,
        index_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            slot: Arc::new(IndexSlot {
                store,
                embedder,
                index_path: index_path.into(),
                current: ArcSwapOption::empty(),
                rebuild: Mutex::new(()),
            }),
            provider,
            config,
            model: String::new(),
            system_prompt: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Model used to generate answers.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The index readers currently see, if one has been loaded.
    pub fn current(&self) -> Option<IndexHandle> {
        self.slot.current.load_full()
    }

    /// Returns the loaded index, loading or building it on first use.
    ///
    /// Repeat calls return the same handle without touching the store.
    /// A persisted index is reused when its fingerprint matches the corpus.
    pub async fn ensure_index(&self) -> Result<IndexHandle, CurioError> {
        self.slot.ensure(self.retry).await
    }

    /// Rebuilds the index if the knowledge base changed, then swaps it in.
    ///
    /// Unchanged units keep their embeddings. Readers holding the previous
    /// handle keep using it until they drop it.
    pub async fn refresh_index(&self) -> Result<IndexHandle, CurioError> {
        self.slot.refresh(self.retry).await
    }

    /// Top passages for `question`, bounded by the retrieval timeout.
    ///
    /// An unavailable index yields [`CurioError::IndexUnavailable`]. A first
    /// build that outlasts the timeout keeps running and is published when
    /// done.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Passage>, CurioError> {
        let timeout = self.config.retrieval_timeout();
        match tokio::time::timeout(timeout, self.lookup(question)).await {
            Ok(result) => result,
            Err(_) => Err(CurioError::Timeout { duration: timeout }),
        }
    }

    async fn lookup(&self, question: &str) -> Result<Vec<Passage>, CurioError> {
        let index = match self.current() {
            Some(index) => index,
            None => self.ensure_index_detached().await?,
        };
        if index.is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.slot.embedder.embed_one(question).await?;
        Ok(index.query(&vector, self.config.top_k, self.config.min_score))
    }

    async fn ensure_index_detached(&self) -> Result<IndexHandle, CurioError> {
        let slot = self.slot.clone();
        let retry = self.retry;
        tokio::spawn(async move { slot.ensure(retry).await })
            .await
            .map_err(|e| CurioError::IndexUnavailable(format!("index build task failed: {e}")))?
            .map_err(|e| CurioError::IndexUnavailable(e.to_string()))
    }

    /// Answers `question` with retrieved knowledge, conversational context,
    /// and strategy hints folded into a single prompt.
    ///
    /// Retrieval failures degrade to a direct LLM call with no passages.
    /// Only a generation failure is returned as an error.
    pub async fn ask(
        &self,
        question: &str,
        context: &str,
        hints: &[String],
    ) -> Result<AskOutcome, CurioError> {
        let passages = match self.retrieve(question).await {
            Ok(passages) => passages,
            Err(e) => {
                match &e {
                    CurioError::IndexUnavailable(_) => {
                        warn!(error = %e, "index unavailable, answering directly")
                    }
                    _ => warn!(error = %e, "retrieval failed, answering without passages"),
                }
                metrics::counter!("curio_retrieval_fail_soft_total").increment(1);
                Vec::new()
            }
        };
        debug!(passages = passages.len(), "retrieval complete");

        let prompt = build_answer_prompt(question, context, &passages, hints);
        let mut request = ProviderRequest::new(self.model.clone(), prompt);
        if let Some(system) = &self.system_prompt {
            request = request.with_system_prompt(system.clone());
        }
        let response = with_retry(self.retry, "answer", || {
            self.provider.complete(request.clone())
        })
        .await?;

        Ok(AskOutcome {
            answer: response.content,
            passages,
        })
    }
}

impl IndexSlot {
    async fn ensure(&self, retry: RetryPolicy) -> Result<IndexHandle, CurioError> {
        if let Some(index) = self.current.load_full() {
            return Ok(index);
        }
        let _rebuild = self.rebuild.lock().await;
        if let Some(index) = self.current.load_full() {
            return Ok(index);
        }

        let files = self.store.snapshot().await?;
        let fingerprint = corpus_fingerprint(&files);
        match VectorIndex::load(&self.index_path).await {
            Some(index)
                if index.fingerprint == fingerprint && index.embedder == self.embedder.name() =>
            {
                info!(entries = index.len(), "loaded persisted index");
                let index = Arc::new(index);
                self.current.store(Some(index.clone()));
                Ok(index)
            }
            stale => {
                let index = self.build(retry, fingerprint, &files, stale.as_ref()).await?;
                self.publish(index).await
            }
        }
    }

    async fn refresh(&self, retry: RetryPolicy) -> Result<IndexHandle, CurioError> {
        let _rebuild = self.rebuild.lock().await;
        let files = self.store.snapshot().await?;
        let fingerprint = corpus_fingerprint(&files);

        let previous = self.current.load_full();
        if let Some(index) = previous
            .as_ref()
            .filter(|i| i.fingerprint == fingerprint)
        {
            debug!("index already current");
            return Ok(index.clone());
        }

        let index = self
            .build(retry, fingerprint, &files, previous.as_deref())
            .await?;
        self.publish(index).await
    }

    async fn build(
        &self,
        retry: RetryPolicy,
        fingerprint: String,
        files: &[StoredFile],
        previous: Option<&VectorIndex>,
    ) -> Result<VectorIndex, CurioError> {
        let reusable = previous.filter(|p| p.embedder == self.embedder.name());

        let mut entries = Vec::new();
        let mut missing = Vec::new();
        for stored in files {
            for unit in &stored.file.units {
                let hash = content_hash(&unit.content);
                let embedding = reusable
                    .and_then(|p| p.embedding_for(&hash))
                    .map(<[f32]>::to_vec)
                    .unwrap_or_default();
                if embedding.is_empty() {
                    missing.push(entries.len());
                }
                entries.push(IndexEntry {
                    topic: stored.file.topic.clone(),
                    unit_id: unit.id.clone(),
                    path: stored.path.clone(),
                    content: unit.content.clone(),
                    content_hash: hash,
                    embedding,
                });
            }
        }

        for batch in missing.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|&i| entries[i].content.clone()).collect();
            let output = with_retry(retry, "embed_index", || {
                self.embedder.embed(EmbeddingInput {
                    texts: texts.clone(),
                })
            })
            .await?;
            if output.embeddings.len() != batch.len() {
                return Err(CurioError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    output.embeddings.len()
                )));
            }
            for (&i, embedding) in batch.iter().zip(output.embeddings) {
                entries[i].embedding = embedding;
            }
        }

        info!(
            entries = entries.len(),
            embedded = missing.len(),
            reused = entries.len() - missing.len(),
            "index built"
        );
        metrics::counter!("curio_index_rebuilds_total").increment(1);
        Ok(VectorIndex {
            fingerprint,
            embedder: self.embedder.name().to_string(),
            built_at: Utc::now(),
            entries,
        })
    }

    async fn publish(&self, index: VectorIndex) -> Result<IndexHandle, CurioError> {
        if let Err(e) = index.persist(&self.index_path).await {
            warn!(error = %e, "failed to persist index, continuing with in-memory copy");
        }
        let index = Arc::new(index);
        self.current.store(Some(index.clone()));
        Ok(index)
    }
}

#[async_trait]
impl IndexRefresher for RetrievalEngine {
    async fn refresh_index(&self) -> Result<(), CurioError> {
        RetrievalEngine::refresh_index(self).await.map(|_| ())
    }
}

/// Assembles the answer prompt. Empty sections are left out, so with no
/// passages, context, or hints the prompt is just the question.
pub fn build_answer_prompt(
    question: &str,
    context: &str,
    passages: &[Passage],
    hints: &[String],
) -> String {
    let mut prompt = String::new();
    if !passages.is_empty() {
        prompt.push_str("Use the following knowledge where it is relevant:\n");
        for (i, p) in passages.iter().enumerate() {
            prompt.push_str(&format!("[{}] ({}) {}\n", i + 1, p.topic, p.content));
        }
        prompt.push('\n');
    }
    if !context.trim().is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(context.trim_end());
        prompt.push_str("\n\n");
    }
    if !hints.is_empty() {
        prompt.push_str("When answering:\n");
        for hint in hints {
            prompt.push_str(&format!("- {hint}\n"));
        }
        prompt.push('\n');
    }
    if prompt.is_empty() {
        return question.to_string();
    }
    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(topic: &str, content: &str) -> Passage {
        Passage {
            topic: topic.into(),
            unit_id: "u".into(),
            path: PathBuf::from("x.toml"),
            content: content.into(),
            score: 0.9,
        }
    }

    #[test]
    fn bare_question_when_nothing_to_add() {
        assert_eq!(build_answer_prompt("Why?", "  ", &[], &[]), "Why?");
    }

    #[test]
    fn sections_appear_in_order() {
        let p = build_answer_prompt(
            "What's my favorite color?",
            "User: hi\nAssistant: hello\n",
            &[passage("preferences", "The user's favorite color is blue.")],
            &["Be brief.".to_string()],
        );
        let knowledge = p.find("[1] (preferences) The user's favorite color is blue.").unwrap();
        let context = p.find("Conversation so far:\nUser: hi").unwrap();
        let hints = p.find("- Be brief.").unwrap();
        let question = p.find("Question: What's my favorite color?").unwrap();
        assert!(knowledge < context && context < hints && hints < question);
    }
}
