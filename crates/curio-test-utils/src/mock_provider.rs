// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with scripted responses and
//! records every request so tests can assert on the prompts that were sent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use curio_core::traits::{PluginAdapter, ProviderAdapter};
use curio_core::types::{ProviderRequest, ProviderResponse, TokenUsage};
use curio_core::CurioError;

/// A failure the mock should produce instead of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    RateLimited,
    Timeout,
    InvalidResponse,
}

impl MockFailure {
    fn into_error(self) -> CurioError {
        match self {
            MockFailure::RateLimited => CurioError::RateLimited { retry_after: None },
            MockFailure::Timeout => CurioError::Timeout {
                duration: Duration::from_secs(30),
            },
            MockFailure::InvalidResponse => CurioError::InvalidResponse("mock failure".into()),
        }
    }
}

#[derive(Default)]
struct Script {
    /// Checked first: the first rule whose needle occurs in the prompt wins.
    rules: Vec<(String, String)>,
    /// Popped in order when no rule matches.
    queue: VecDeque<Result<String, MockFailure>>,
    requests: Vec<ProviderRequest>,
    delay: Option<Duration>,
}

/// A mock LLM provider that returns pre-configured responses.
///
/// Prompt rules take priority, then the FIFO queue. When both are exhausted
/// a default "mock response" text is returned.
#[derive(Clone, Default)]
pub struct MockProvider {
    script: Arc<Mutex<Script>>,
}

impl MockProvider {
    /// Create a new mock provider with an empty response queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock provider pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let script = Script {
            queue: responses.into_iter().map(Ok).collect(),
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    /// Add a response to the end of the queue.
    pub async fn add_response(&self, text: impl Into<String>) {
        self.script.lock().await.queue.push_back(Ok(text.into()));
    }

    /// Queue a failure; it is returned in FIFO order like any response.
    pub async fn add_failure(&self, failure: MockFailure) {
        self.script.lock().await.queue.push_back(Err(failure));
    }

    /// Answer any prompt containing `needle` with `reply`.
    pub async fn add_rule(&self, needle: impl Into<String>, reply: impl Into<String>) {
        self.script
            .lock()
            .await
            .rules
            .push((needle.into(), reply.into()));
    }

    /// Sleep this long before every response.
    pub async fn set_delay(&self, delay: Duration) {
        self.script.lock().await.delay = Some(delay);
    }

    /// All requests received so far, in order.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.script.lock().await.requests.clone()
    }

    /// Prompts received so far that contain `needle`.
    pub async fn prompts_containing(&self, needle: &str) -> Vec<String> {
        self.script
            .lock()
            .await
            .requests
            .iter()
            .filter(|r| r.prompt.contains(needle))
            .map(|r| r.prompt.clone())
            .collect()
    }

    async fn next_response(&self, request: &ProviderRequest) -> (Result<String, MockFailure>, Option<Duration>) {
        let mut script = self.script.lock().await;
        script.requests.push(request.clone());
        let delay = script.delay;

        if let Some((_, reply)) = script
            .rules
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
        {
            return (Ok(reply.clone()), delay);
        }

        let next = script
            .queue
            .pop_front()
            .unwrap_or_else(|| Ok("mock response".to_string()));
        (next, delay)
    }
}

impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, CurioError> {
        let (next, delay) = self.next_response(&request).await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let text = next.map_err(MockFailure::into_error)?;
        Ok(ProviderResponse {
            id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
            content: text,
            model: request.model,
            stop_reason: Some("stop".to_string()),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        })
    }
}
