// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-turn pipeline.
//!
//! A turn reads recent history, builds a bounded context, answers through
//! the retrieval engine, logs the exchange, and hands curation to the
//! background worker. Only a failure to produce an answer reaches the
//! caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use curio_config::CurioConfig;
use curio_context::InputProcessor;
use curio_convlog::ConversationLog;
use curio_core::traits::{EmbeddingAdapter, ProviderAdapter, TopicClassifier};
use curio_core::{CurioError, Exchange};
use curio_knowledge::{KnowledgeManager, KnowledgeStore, LlmTopicClassifier, OrganizeReport};
use curio_reflect::PreferenceReflector;
use curio_retrieval::{IndexHandle, Passage, RetrievalEngine};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::{CurationJob, CurationQueue};
use crate::worker::CurationWorker;

/// Per-request switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskSettings {
    pub auto_update_knowledge: bool,
    pub enable_context_analysis: bool,
    /// Upper bound, in characters, on the context sent with the question.
    pub max_context_length: usize,
    /// Wait for the knowledge update so the response can name the file.
    pub await_curation: bool,
}

impl AskSettings {
    pub fn from_config(config: &CurioConfig) -> Self {
        Self {
            auto_update_knowledge: config.knowledge.auto_update,
            enable_context_analysis: true,
            max_context_length: config.context.max_context_length,
            await_curation: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub user_input: String,
    pub conversation_id: String,
    pub settings: AskSettings,
}

#[derive(Debug, Clone)]
pub struct AskResponse {
    pub answer: String,
    pub passages: Vec<Passage>,
    /// Set only when the request awaited curation and a file was written.
    pub updated_knowledge_file: Option<PathBuf>,
}

pub struct Assistant {
    config: CurioConfig,
    log: ConversationLog,
    processor: InputProcessor,
    retrieval: Arc<RetrievalEngine>,
    knowledge: Arc<KnowledgeManager>,
    reflector: Arc<PreferenceReflector>,
    queue: Arc<CurationQueue>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Assistant {
    /// Wires every component from `config` and starts the curation worker.
    /// Topics are classified by the utility model.
    pub async fn open(
        config: CurioConfig,
        provider: Arc<dyn ProviderAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
    ) -> Result<Self, CurioError> {
        let classifier = LlmTopicClassifier::new(provider.clone(), &config.llm.utility_model)
            .with_retry(config.llm.retry_policy());
        Self::open_with_classifier(config, provider, embedder, Arc::new(classifier)).await
    }

    pub async fn open_with_classifier(
        config: CurioConfig,
        provider: Arc<dyn ProviderAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        classifier: Arc<dyn TopicClassifier>,
    ) -> Result<Self, CurioError> {
        let retry = config.llm.retry_policy();
        let utility = config.llm.utility_model.clone();
        let storage = &config.storage;

        let log = ConversationLog::open(&storage.log_dir).await?;
        let store = Arc::new(KnowledgeStore::open(&storage.knowledge_dir)?);

        let retrieval = Arc::new(
            RetrievalEngine::new(
                store.clone(),
                provider.clone(),
                embedder.clone(),
                config.retrieval.clone(),
                &storage.index_path,
            )
            .with_model(&config.llm.default_model)
            .with_system_prompt(config.agent.system_prompt.clone())
            .with_retry(retry),
        );

        let knowledge = KnowledgeManager::new(
            store,
            provider.clone(),
            embedder,
            classifier,
            config.knowledge.clone(),
        )
        .with_model(&utility)
        .with_retry(retry)
        .with_index_refresher(retrieval.clone());
        let knowledge = Arc::new(knowledge);

        let reflector = Arc::new(
            PreferenceReflector::open(
                &storage.user_data_dir,
                provider.clone(),
                config.reflection.clone(),
            )?
            .with_model(&utility)
            .with_retry(retry),
        );

        let processor = InputProcessor::new(provider, log.clone(), config.context.clone())
            .with_profiles(reflector.profiles())
            .with_model(&utility)
            .with_retry(retry);

        let queue = Arc::new(CurationQueue::new(&config.curation));
        let cancel = CancellationToken::new();
        let worker = CurationWorker::new(
            queue.clone(),
            knowledge.clone(),
            reflector.clone(),
            config.curation.max_concurrent_jobs,
        );
        let handle = tokio::spawn(worker.run(cancel.clone()));

        info!(
            agent_name = %config.agent.name,
            knowledge_dir = %config.storage.knowledge_dir.display(),
            "assistant ready"
        );
        Ok(Self {
            config,
            log,
            processor,
            retrieval,
            knowledge,
            reflector,
            queue,
            cancel,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &CurioConfig {
        &self.config
    }

    pub fn default_settings(&self) -> AskSettings {
        AskSettings::from_config(&self.config)
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeManager> {
        &self.knowledge
    }

    pub fn retrieval(&self) -> &Arc<RetrievalEngine> {
        &self.retrieval
    }

    pub fn reflector(&self) -> &Arc<PreferenceReflector> {
        &self.reflector
    }

    /// Answers one question.
    ///
    /// A turn that exceeds `retrieval.answer_timeout_secs` returns
    /// [`CurioError::Timeout`] and schedules no curation.
    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse, CurioError> {
        let AskRequest {
            user_input,
            conversation_id,
            settings,
        } = request;

        let (query, context, hints) = if settings.enable_context_analysis {
            let processed = self
                .processor
                .process(&user_input, &conversation_id, settings.max_context_length)
                .await;
            (
                processed.effective_query,
                processed.context.render(),
                processed.strategy_hints,
            )
        } else {
            let hints = self.strategy_hints(&conversation_id).await;
            (user_input.clone(), String::new(), hints)
        };

        let timeout = self.config.retrieval.answer_timeout();
        let outcome =
            match tokio::time::timeout(timeout, self.retrieval.ask(&query, &context, &hints)).await
            {
                Ok(outcome) => outcome?,
                Err(_) => {
                    warn!(
                        conversation_id = %conversation_id,
                        timeout_secs = timeout.as_secs(),
                        "turn timed out, no curation scheduled"
                    );
                    return Err(CurioError::Timeout { duration: timeout });
                }
            };

        let exchange = Exchange::now(&conversation_id, &user_input, &outcome.answer, &context);
        let observe = self.reflector.is_enabled();
        let updated_knowledge_file = if settings.await_curation && settings.auto_update_knowledge
        {
            let (tx, rx) = oneshot::channel();
            let job = self.job(&exchange, timestamp_ref(&exchange), true, observe, Some(tx));
            let updated = if self.schedule(job).await {
                rx.await.ok().flatten()
            } else {
                None
            };
            self.record(&exchange, updated.as_deref()).await;
            updated
        } else {
            let source_ref = match self.record(&exchange, None).await {
                Some(seq) => format!("{}#{seq}", exchange.conversation_id),
                None => timestamp_ref(&exchange),
            };
            if settings.auto_update_knowledge || observe {
                let job = self.job(
                    &exchange,
                    source_ref,
                    settings.auto_update_knowledge,
                    observe,
                    None,
                );
                self.schedule(job).await;
            }
            None
        };

        debug!(
            conversation_id = %conversation_id,
            passages = outcome.passages.len(),
            context_chars = context.chars().count(),
            "turn complete"
        );
        Ok(AskResponse {
            answer: outcome.answer,
            passages: outcome.passages,
            updated_knowledge_file,
        })
    }

    /// Merges related knowledge files. See
    /// [`KnowledgeManager::organize_knowledge_base`].
    pub async fn organize_knowledge_base(&self) -> Result<OrganizeReport, CurioError> {
        self.knowledge.organize_knowledge_base().await
    }

    /// Brings the index up to date with the knowledge base.
    pub async fn refresh_index(&self) -> Result<IndexHandle, CurioError> {
        self.retrieval.refresh_index().await
    }

    /// Token that stops the curation worker when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops accepting curation jobs and waits for queued ones to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "curation worker ended abnormally");
        }
    }

    async fn strategy_hints(&self, conversation_id: &str) -> Vec<String> {
        match self.reflector.profile(conversation_id).await {
            Ok(profile) => profile.answer_guidance(),
            Err(e) => {
                warn!(conversation_id, error = %e, "cannot read preference profile");
                Vec::new()
            }
        }
    }

    /// Appends the exchange to the log. Failures are warnings.
    async fn record(&self, exchange: &Exchange, knowledge_file: Option<&Path>) -> Option<u64> {
        match self.log.append_entry(exchange, knowledge_file).await {
            Ok(seq) => Some(seq),
            Err(e) => {
                warn!(
                    conversation_id = %exchange.conversation_id,
                    error = %e,
                    "failed to log exchange"
                );
                None
            }
        }
    }

    fn job(
        &self,
        exchange: &Exchange,
        source_ref: String,
        update_knowledge: bool,
        observe: bool,
        reply: Option<oneshot::Sender<Option<PathBuf>>>,
    ) -> CurationJob {
        CurationJob {
            conversation_id: exchange.conversation_id.clone(),
            user_input: exchange.user_input.clone(),
            model_response: exchange.model_response.clone(),
            source_ref,
            update_knowledge,
            observe,
            reply,
        }
    }

    async fn schedule(&self, job: CurationJob) -> bool {
        let conversation_id = job.conversation_id.clone();
        match self.queue.push(job).await {
            Ok(()) => true,
            Err(reason) => {
                warn!(conversation_id = %conversation_id, ?reason, "curation job not scheduled");
                false
            }
        }
    }
}

fn timestamp_ref(exchange: &Exchange) -> String {
    format!(
        "{}@{}",
        exchange.conversation_id,
        exchange.timestamp.to_rfc3339()
    )
}
