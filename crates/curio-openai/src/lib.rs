// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible adapters for Curio.
//!
//! [`OpenAiProvider`] implements [`ProviderAdapter`] over
//! `/chat/completions` and [`OpenAiEmbedder`] implements
//! [`EmbeddingAdapter`] over `/embeddings`. Any server speaking the same
//! wire format (vLLM, llama.cpp, Ollama's compatibility layer) works by
//! pointing `llm.base_url` at it.
//!
//! API key resolution order: `llm.api_key` -> `OPENAI_API_KEY` -> error.

pub mod client;
pub mod sse;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use curio_config::LlmConfig;
use curio_core::CurioError;
use curio_core::traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter};
use curio_core::types::{
    EmbeddingInput, EmbeddingOutput, ProviderRequest, ProviderResponse, TokenUsage,
};
use tracing::debug;

use crate::client::OpenAiClient;
use crate::types::{ChatMessage, ChatRequest, EmbeddingRequest};

/// Chat completion provider.
pub struct OpenAiProvider {
    client: OpenAiClient,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(client: OpenAiClient, default_model: impl Into<String>) -> Self {
        Self {
            client,
            default_model: default_model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, CurioError> {
        Ok(Self::new(client_from_config(config)?, &config.default_model))
    }

    fn to_chat_request(&self, request: &ProviderRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(&request.prompt));

        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };
        ChatRequest {
            model,
            messages,
            max_tokens: Some(request.max_tokens),
            stream: request.stream,
        }
    }
}

impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, CurioError> {
        let chat = self.to_chat_request(&request);
        let response = self.client.chat(&chat).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CurioError::InvalidResponse("response contained no choices".into()))?;
        let usage = response.usage.unwrap_or_default();
        debug!(
            model = %chat.model,
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "completion received"
        );

        Ok(ProviderResponse {
            id: response.id,
            content: choice.message.content.unwrap_or_default(),
            model: if response.model.is_empty() {
                chat.model
            } else {
                response.model
            },
            stop_reason: choice.finish_reason,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

/// Embedding provider.
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, CurioError> {
        Ok(Self::new(client_from_config(config)?, &config.embedding_model))
    }
}

impl PluginAdapter for OpenAiEmbedder {
    /// The model name, so a persisted index built with another model is
    /// never reused.
    fn name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, CurioError> {
        if input.texts.is_empty() {
            return Ok(EmbeddingOutput {
                embeddings: Vec::new(),
                dimensions: 0,
            });
        }
        let expected = input.texts.len();
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: input.texts,
        };
        let mut response = self.client.embeddings(&request).await?;
        if response.data.len() != expected {
            return Err(CurioError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                response.data.len()
            )));
        }
        response.data.sort_by_key(|d| d.index);

        let embeddings: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        let dimensions = embeddings.first().map_or(0, Vec::len);
        Ok(EmbeddingOutput {
            embeddings,
            dimensions,
        })
    }
}

fn client_from_config(config: &LlmConfig) -> Result<OpenAiClient, CurioError> {
    let api_key = resolve_api_key(&config.api_key)?;
    OpenAiClient::new(
        &config.base_url,
        Some(&api_key),
        Duration::from_secs(config.request_timeout_secs),
    )
}

fn resolve_api_key(config_key: &Option<String>) -> Result<String, CurioError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }
    std::env::var("OPENAI_API_KEY").map_err(|_| {
        CurioError::Config(
            "API key not found. Set llm.api_key in config or the OPENAI_API_KEY environment variable.".into(),
        )
    })
}
