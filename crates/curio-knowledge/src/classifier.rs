// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-backed topic classifier.

use std::sync::Arc;

use async_trait::async_trait;
use curio_core::traits::{ProviderAdapter, TopicClassifier};
use curio_core::types::{ProviderRequest, TopicLabel};
use curio_core::{CurioError, RetryPolicy, with_retry};
use serde::Deserialize;
use tracing::debug;

use crate::extractor::json_object_slice;

#[derive(Debug, Deserialize)]
struct ClassifyReply {
    topic: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Classifies text by asking the utility model.
pub struct LlmTopicClassifier {
    provider: Arc<dyn ProviderAdapter>,
    model: String,
    retry: RetryPolicy,
}

impl LlmTopicClassifier {
    pub fn new(provider: Arc<dyn ProviderAdapter>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl TopicClassifier for LlmTopicClassifier {
    async fn classify(
        &self,
        text: &str,
        existing_topics: &[String],
    ) -> Result<TopicLabel, CurioError> {
        let topics = if existing_topics.is_empty() {
            "(none yet)".to_string()
        } else {
            existing_topics
                .iter()
                .map(|t| format!("- {t}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let prompt = format!(
            r#"Assign a topic label to the knowledge below. Topics group related knowledge into one file.

Existing topics:
{topics}

Reuse an existing topic when the knowledge fits it. Otherwise propose a new short label, optionally in "primary/secondary" form.

Knowledge:
{text}

Reply with JSON: {{"topic": "<label>", "confidence": <0..1>}}"#
        );

        let response = with_retry(self.retry, "classify_topic", || {
            self.provider
                .complete(ProviderRequest::new(self.model.clone(), prompt.clone()).with_max_tokens(64))
        })
        .await?;

        let label = parse_classification(&response.content);
        debug!(topic = %label.label, confidence = label.confidence, "topic classified");
        Ok(label)
    }
}

/// Reads `{"topic": ..}`; falls back to the first non-empty line as a
/// low-confidence label.
pub fn parse_classification(response: &str) -> TopicLabel {
    if let Some(reply) = json_object_slice(response)
        .and_then(|json| serde_json::from_str::<ClassifyReply>(json).ok())
        .filter(|r| !r.topic.trim().is_empty())
    {
        return TopicLabel {
            label: reply.topic.trim().to_string(),
            confidence: reply.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        };
    }

    let line = response
        .lines()
        .map(|l| l.trim().trim_matches(|c| c == '"' || c == '`' || c == '*'))
        .find(|l| !l.is_empty() && !l.starts_with('{'))
        .unwrap_or("uncategorized");
    TopicLabel {
        label: line.to_string(),
        confidence: 0.3,
    }
}
