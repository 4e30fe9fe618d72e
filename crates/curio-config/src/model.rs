// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Curio assistant.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;
use std::time::Duration;

use curio_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Top-level Curio configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. Every section is optional and defaults to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CurioConfig {
    /// Assistant identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Hosted LLM and embedding endpoint.
    #[serde(default)]
    pub llm: LlmConfig,

    /// On-disk locations for knowledge, logs, profiles, and the index.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Conversational context assembly.
    #[serde(default)]
    pub context: ContextConfig,

    /// Knowledge curation thresholds.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Passage retrieval and answer generation.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Background curation queue.
    #[serde(default)]
    pub curation: CurationConfig,

    /// Preference analysis and self-reflection.
    #[serde(default)]
    pub reflection: ReflectionConfig,
}

/// Assistant identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// System prompt prepended to every answer request.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            system_prompt: None,
        }
    }
}

fn default_agent_name() -> String {
    "curio".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// OpenAI-compatible LLM endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Base URL of the API, without the `/chat/completions` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Can also be set via `CURIO_LLM_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used to generate answers.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Cheaper model used for clarity checks, extraction, and reflection.
    #[serde(default = "default_utility_model")]
    pub utility_model: String,

    /// Model used for embeddings.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt on transient upstream failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubled on each retry.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl LlmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            default_model: default_model(),
            utility_model: default_utility_model(),
            embedding_model: default_embedding_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_utility_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

/// Storage location configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root of the knowledge base; one file per topic.
    #[serde(default = "default_knowledge_dir")]
    pub knowledge_dir: PathBuf,

    /// Directory for day-partitioned conversation logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Directory for preference profiles and reflection journals.
    #[serde(default = "default_user_data_dir")]
    pub user_data_dir: PathBuf,

    /// Persisted vector index file.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
}

impl StorageConfig {
    /// All paths rooted under `dir`, with the default layout.
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            knowledge_dir: dir.join("knowledge_base"),
            log_dir: dir.join("log"),
            user_data_dir: dir.join("user_data"),
            index_path: dir.join("index").join("vectors.json"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::rooted_at("data")
    }
}

fn default_knowledge_dir() -> PathBuf {
    StorageConfig::default().knowledge_dir
}

fn default_log_dir() -> PathBuf {
    StorageConfig::default().log_dir
}

fn default_user_data_dir() -> PathBuf {
    StorageConfig::default().user_data_dir
}

fn default_index_path() -> PathBuf {
    StorageConfig::default().index_path
}

/// Context assembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Upper bound, in characters, on the rendered context payload.
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,

    /// How many recent exchanges are considered when building context.
    #[serde(default = "default_max_conversation_history")]
    pub max_conversation_history: usize,

    /// Upper bound, in characters, on a history synopsis.
    #[serde(default = "default_synopsis_max_chars")]
    pub synopsis_max_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_length: default_max_context_length(),
            max_conversation_history: default_max_conversation_history(),
            synopsis_max_chars: default_synopsis_max_chars(),
        }
    }
}

fn default_max_context_length() -> usize {
    10_000
}

fn default_max_conversation_history() -> usize {
    5
}

fn default_synopsis_max_chars() -> usize {
    1_000
}

/// Knowledge curation configuration.
///
/// All similarity values are cosine similarities between embeddings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KnowledgeConfig {
    /// Curate knowledge from exchanges unless the request opts out.
    #[serde(default = "default_true")]
    pub auto_update: bool,

    /// At or above this, a candidate duplicates an existing unit and is dropped.
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f32,

    /// At or above this (and below duplicate), a candidate refines an existing unit.
    #[serde(default = "default_refinement_threshold")]
    pub refinement_threshold: f32,

    /// Extractions below this confidence are discarded. A topic label below
    /// it gives way to the extractor's own topic.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Minimum similarity for a proposed topic to reuse an existing one.
    #[serde(default = "default_topic_similarity_floor")]
    pub topic_similarity_floor: f32,

    /// Minimum theme similarity for two files to be merged by organize.
    #[serde(default = "default_organize_merge_threshold")]
    pub organize_merge_threshold: f32,

    /// Characters of file content shown to the theme classifier.
    #[serde(default = "default_theme_sample_chars")]
    pub theme_sample_chars: usize,

    /// Files with less content than this are reported as empty by organize.
    #[serde(default = "default_min_file_chars")]
    pub min_file_chars: usize,

    /// Wait for the index refresh before `update` returns.
    #[serde(default = "default_true")]
    pub sync_index_refresh: bool,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            auto_update: true,
            duplicate_threshold: default_duplicate_threshold(),
            refinement_threshold: default_refinement_threshold(),
            min_confidence: default_min_confidence(),
            topic_similarity_floor: default_topic_similarity_floor(),
            organize_merge_threshold: default_organize_merge_threshold(),
            theme_sample_chars: default_theme_sample_chars(),
            min_file_chars: default_min_file_chars(),
            sync_index_refresh: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_min_confidence() -> f32 {
    0.4
}

fn default_duplicate_threshold() -> f32 {
    0.92
}

fn default_refinement_threshold() -> f32 {
    0.75
}

fn default_topic_similarity_floor() -> f32 {
    0.80
}

fn default_organize_merge_threshold() -> f32 {
    0.85
}

fn default_theme_sample_chars() -> usize {
    2_000
}

fn default_min_file_chars() -> usize {
    50
}

/// Retrieval configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Passages injected into each answer prompt.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Passages scoring below this are ignored.
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Upper bound on the embed-and-search step before falling back to no passages.
    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,

    /// Upper bound on answer generation for a single turn.
    #[serde(default = "default_answer_timeout_secs")]
    pub answer_timeout_secs: u64,
}

impl RetrievalConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_secs(self.answer_timeout_secs)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
            answer_timeout_secs: default_answer_timeout_secs(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

fn default_min_score() -> f32 {
    0.1
}

fn default_retrieval_timeout_ms() -> u64 {
    5_000
}

fn default_answer_timeout_secs() -> u64 {
    120
}

/// What the curation queue does when full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// The producer waits for space.
    #[default]
    Block,
    /// The oldest queued job is evicted to make room.
    DropOldest,
}

/// Background curation queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CurationConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Jobs processed concurrently; same-topic writes are still serialized.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

fn default_queue_capacity() -> usize {
    64
}

fn default_max_concurrent_jobs() -> usize {
    4
}

/// Preference analysis configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReflectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Run self-reflection every N observed exchanges per conversation.
    #[serde(default = "default_reflect_every")]
    pub reflect_every: u64,

    /// Strategy hints kept per profile; the oldest are dropped first.
    #[serde(default = "default_max_strategy_hints")]
    pub max_strategy_hints: usize,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reflect_every: default_reflect_every(),
            max_strategy_hints: default_max_strategy_hints(),
        }
    }
}

fn default_reflect_every() -> u64 {
    5
}

fn default_max_strategy_hints() -> usize {
    5
}
