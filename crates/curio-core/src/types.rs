// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the Curio crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed question/answer turn.
///
/// Immutable once logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub model_response: String,
    /// The rendered context payload that accompanied the question.
    pub context_used: String,
}

impl Exchange {
    /// Builds an exchange stamped with the current time.
    pub fn now(
        conversation_id: impl Into<String>,
        user_input: impl Into<String>,
        model_response: impl Into<String>,
        context_used: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            timestamp: Utc::now(),
            user_input: user_input.into(),
            model_response: model_response.into(),
            context_used: context_used.into(),
        }
    }
}

/// A text completion request to an LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Model identifier. Empty means the provider's default model.
    pub model: String,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    /// Ask the provider to stream; the adapter still returns the collected text.
    pub stream: bool,
}

impl ProviderRequest {
    /// A non-streaming request for `prompt` against `model`.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            prompt: prompt.into(),
            max_tokens: 1024,
            stream: false,
        }
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A completed response from an LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Input for an embedding adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding adapter, one vector per input text.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

/// A topic assignment produced by a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicLabel {
    pub label: String,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-magnitude input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}
