// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The curation core: turns finished exchanges into deduplicated knowledge.
//!
//! `update` runs extract, classify, merge, persist, and refresh in that
//! order. Writers to one topic are serialized through the store's topic
//! lock, so concurrent updates behave like some sequential ordering.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use curio_config::KnowledgeConfig;
use curio_core::traits::{EmbeddingAdapter, IndexRefresher, ProviderAdapter, TopicClassifier};
use curio_core::types::{EmbeddingInput, ProviderRequest};
use curio_core::{CurioError, RetryPolicy, cosine_similarity, with_retry};
use tracing::{debug, info, warn};

use crate::extractor::{CandidateKnowledge, build_extraction_prompt, parse_extraction_response};
use crate::store::{KnowledgeFile, KnowledgeStore, KnowledgeUnit, topic_slug};

/// How a candidate landed in its topic file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Near-identical to an existing unit; nothing written.
    Duplicate,
    /// Folded into an existing unit.
    Refined,
    /// Added as a new unit.
    Appended,
}

impl MergeOutcome {
    fn as_str(self) -> &'static str {
        match self {
            MergeOutcome::Duplicate => "duplicate",
            MergeOutcome::Refined => "refined",
            MergeOutcome::Appended => "appended",
        }
    }
}

/// Extracts, classifies, and merges knowledge into the [`KnowledgeStore`].
pub struct KnowledgeManager {
    pub(crate) store: Arc<KnowledgeStore>,
    pub(crate) provider: Arc<dyn ProviderAdapter>,
    pub(crate) embedder: Arc<dyn EmbeddingAdapter>,
    classifier: Arc<dyn TopicClassifier>,
    refresher: Option<Arc<dyn IndexRefresher>>,
    pub(crate) config: KnowledgeConfig,
    pub(crate) model: String,
    pub(crate) retry: RetryPolicy,
}

impl KnowledgeManager {
    pub fn new(
        store: Arc<KnowledgeStore>,
        provider: Arc<dyn ProviderAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        classifier: Arc<dyn TopicClassifier>,
        config: KnowledgeConfig,
    ) -> Self {
        Self {
            store,
            provider,
            embedder,
            classifier,
            refresher: None,
            config,
            model: String::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Model used for extraction, merging, and theme detection.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Index to refresh after every successful write. With
    /// `sync_index_refresh` the update waits for it; otherwise it runs in
    /// the background.
    pub fn with_index_refresher(mut self, refresher: Arc<dyn IndexRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Curates one exchange. Returns the written file, or `None` when the
    /// exchange held nothing new.
    pub async fn update(
        &self,
        user_input: &str,
        model_response: &str,
    ) -> Result<Option<PathBuf>, CurioError> {
        self.update_with_source(user_input, model_response, None)
            .await
    }

    /// Like [`update`](Self::update), recording where the knowledge came from.
    pub async fn update_with_source(
        &self,
        user_input: &str,
        model_response: &str,
        source_ref: Option<String>,
    ) -> Result<Option<PathBuf>, CurioError> {
        let Some(candidate) = self.extract(user_input, model_response).await? else {
            debug!("no extractable knowledge in exchange");
            metrics::counter!("curio_knowledge_updates_total", "outcome" => "none").increment(1);
            return Ok(None);
        };
        if candidate.confidence < self.config.min_confidence {
            debug!(confidence = candidate.confidence, "extraction below confidence floor");
            metrics::counter!("curio_knowledge_updates_total", "outcome" => "low_confidence")
                .increment(1);
            return Ok(None);
        }

        let topic = self.choose_topic(&candidate).await?;
        let (outcome, path) = self.merge_into_topic(&topic, &candidate, source_ref).await?;
        metrics::counter!("curio_knowledge_updates_total", "outcome" => outcome.as_str())
            .increment(1);

        let Some(path) = path else {
            return Ok(None);
        };
        info!(topic = %topic, outcome = outcome.as_str(), path = %path.display(), "knowledge updated");
        self.request_refresh().await;
        Ok(Some(path))
    }

    async fn extract(
        &self,
        user_input: &str,
        model_response: &str,
    ) -> Result<Option<CandidateKnowledge>, CurioError> {
        let prompt = build_extraction_prompt(user_input, model_response);
        let reply = self.complete("extract_knowledge", prompt, 512).await?;
        Ok(parse_extraction_response(&reply))
    }

    /// Classifies the candidate, then snaps the label onto the most similar
    /// existing topic when one clears `topic_similarity_floor`.
    async fn choose_topic(&self, candidate: &CandidateKnowledge) -> Result<String, CurioError> {
        let existing = self.store.topics().await?;
        let hint = candidate.topic_hint.clone();
        let proposed = match self.classifier.classify(&candidate.content, &existing).await {
            Ok(label) if label.confidence >= self.config.min_confidence => label.label,
            Ok(label) => {
                debug!(label = %label.label, confidence = label.confidence, "low-confidence topic label");
                hint.unwrap_or(label.label)
            }
            Err(e) => {
                warn!(error = %e, "topic classification failed, using extractor hint");
                hint.unwrap_or_else(|| "uncategorized".to_string())
            }
        };
        self.resolve_topic(&proposed, &existing).await
    }

    /// Maps a proposed label onto an existing topic or keeps it as new.
    pub async fn resolve_topic(
        &self,
        proposed: &str,
        existing: &[String],
    ) -> Result<String, CurioError> {
        let proposed_slug = topic_slug(proposed);
        if let Some(same) = existing.iter().find(|t| topic_slug(t) == proposed_slug) {
            return Ok(same.clone());
        }
        if existing.is_empty() {
            return Ok(proposed.trim().to_string());
        }

        let mut texts = vec![proposed.to_string()];
        texts.extend(existing.iter().cloned());
        let vectors = self.embed_all(texts).await?;
        let (query, candidates) = vectors.split_first().ok_or_else(|| {
            CurioError::InvalidResponse("embedding returned no results".into())
        })?;

        let best = candidates
            .iter()
            .zip(existing)
            .map(|(v, topic)| (topic, cosine_similarity(query, v)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((topic, sim)) if sim >= self.config.topic_similarity_floor => {
                debug!(proposed, reused = %topic, similarity = sim, "reusing existing topic");
                Ok(topic.clone())
            }
            _ => Ok(proposed.trim().to_string()),
        }
    }

    /// Dedupes, refines, or appends under the topic lock and writes the file.
    async fn merge_into_topic(
        &self,
        topic: &str,
        candidate: &CandidateKnowledge,
        source_ref: Option<String>,
    ) -> Result<(MergeOutcome, Option<PathBuf>), CurioError> {
        let guard = self.store.lock_topic(topic).await;
        let current = self.store.load(topic).await?;
        let expected_revision = current.as_ref().map(|f| f.revision);
        let mut file = current.unwrap_or_else(|| KnowledgeFile::new(topic));

        let mut texts = vec![candidate.content.clone()];
        texts.extend(file.units.iter().map(|u| u.content.clone()));
        let vectors = self.embed_all(texts).await?;
        let closest = vectors
            .split_first()
            .and_then(|(query, units)| {
                units
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i, cosine_similarity(query, v)))
                    .max_by(|a, b| a.1.total_cmp(&b.1))
            });

        let now = Utc::now();
        let outcome = match closest {
            Some((_, sim)) if sim >= self.config.duplicate_threshold => {
                debug!(topic, similarity = sim, "candidate duplicates an existing unit");
                return Ok((MergeOutcome::Duplicate, None));
            }
            Some((idx, sim)) if sim >= self.config.refinement_threshold => {
                debug!(topic, similarity = sim, "candidate refines an existing unit");
                let merged = self
                    .merge_contents(&file.units[idx].content, &candidate.content)
                    .await;
                let siblings = vectors.get(1..).unwrap_or_default();
                if let Some(twin) = self.duplicate_sibling(&merged, idx, siblings).await? {
                    debug!(topic, twin, "refined unit duplicates a sibling, folding it away");
                    file.units.remove(idx);
                } else {
                    let unit = &mut file.units[idx];
                    unit.content = merged;
                    unit.updated_at = now;
                    if source_ref.is_some() {
                        unit.source_exchange_ref = source_ref;
                    }
                }
                MergeOutcome::Refined
            }
            _ => {
                file.units
                    .push(KnowledgeUnit::new(&file.topic, candidate.content.clone(), source_ref));
                MergeOutcome::Appended
            }
        };

        file.updated_at = now;
        let (path, _) = self.store.replace(&guard, expected_revision, file).await?;
        Ok((outcome, Some(path)))
    }

    /// Index of a unit other than `refined` that `merged` now duplicates.
    async fn duplicate_sibling(
        &self,
        merged: &str,
        refined: usize,
        unit_vectors: &[Vec<f32>],
    ) -> Result<Option<usize>, CurioError> {
        if unit_vectors.len() < 2 {
            return Ok(None);
        }
        let merged_vector = self.embed_all(vec![merged.to_string()]).await?;
        let Some(merged_vector) = merged_vector.first() else {
            return Ok(None);
        };
        Ok(unit_vectors
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != refined)
            .find(|(_, v)| cosine_similarity(merged_vector, v) >= self.config.duplicate_threshold)
            .map(|(i, _)| i))
    }

    /// Combines an existing unit with its refinement.
    ///
    /// Uses the LLM when it answers; otherwise keeps whichever statement
    /// contains the other, or both.
    pub(crate) async fn merge_contents(&self, old: &str, new: &str) -> String {
        let prompt = format!(
            "Merge these two statements about the same thing into one concise statement. \
             Keep every distinct detail; where they conflict, the newer statement wins.\n\n\
             Older: {old}\nNewer: {new}\n\nMerged statement only:"
        );
        match self.complete("merge_knowledge", prompt, 512).await {
            Ok(merged) if !merged.trim().is_empty() => merged.trim().to_string(),
            Ok(_) => fallback_merge(old, new),
            Err(e) => {
                warn!(error = %e, "merge call failed, combining statements directly");
                fallback_merge(old, new)
            }
        }
    }

    pub(crate) async fn request_refresh(&self) {
        let Some(refresher) = self.refresher.clone() else {
            return;
        };
        if self.config.sync_index_refresh {
            if let Err(e) = refresher.refresh_index().await {
                warn!(error = %e, "index refresh after knowledge update failed");
            }
        } else {
            tokio::spawn(async move {
                if let Err(e) = refresher.refresh_index().await {
                    warn!(error = %e, "background index refresh failed");
                }
            });
        }
    }

    pub(crate) async fn complete(
        &self,
        operation: &str,
        prompt: String,
        max_tokens: u32,
    ) -> Result<String, CurioError> {
        let response = with_retry(self.retry, operation, || {
            self.provider.complete(
                ProviderRequest::new(self.model.clone(), prompt.clone()).with_max_tokens(max_tokens),
            )
        })
        .await?;
        Ok(response.content)
    }

    pub(crate) async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, CurioError> {
        let expected = texts.len();
        let output = with_retry(self.retry, "embed", || {
            self.embedder.embed(EmbeddingInput {
                texts: texts.clone(),
            })
        })
        .await?;
        if output.embeddings.len() != expected {
            return Err(CurioError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                output.embeddings.len()
            )));
        }
        Ok(output.embeddings)
    }
}

fn fallback_merge(old: &str, new: &str) -> String {
    let (old, new) = (old.trim(), new.trim());
    if new.contains(old) {
        new.to_string()
    } else if old.contains(new) {
        old.to_string()
    } else {
        format!("{old}\n{new}")
    }
}
