// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword-driven topic classifier stub.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use curio_core::traits::TopicClassifier;
use curio_core::types::TopicLabel;
use curio_core::CurioError;

/// Returns the label of the first keyword found in the text, or a fallback.
#[derive(Clone)]
pub struct StaticClassifier {
    fallback: String,
    rules: Vec<(String, String)>,
    confidence: f32,
    seen: Arc<Mutex<Vec<Vec<String>>>>,
}

impl StaticClassifier {
    /// Classify everything as `fallback`.
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            fallback: fallback.into(),
            rules: Vec::new(),
            confidence: 0.9,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Text containing `keyword` (case-insensitive) is labelled `label`.
    pub fn with_rule(mut self, keyword: impl Into<String>, label: impl Into<String>) -> Self {
        self.rules
            .push((keyword.into().to_lowercase(), label.into()));
        self
    }

    /// Confidence reported with every label.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// The `existing_topics` argument of every call so far.
    pub async fn existing_topics_seen(&self) -> Vec<Vec<String>> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl TopicClassifier for StaticClassifier {
    async fn classify(
        &self,
        text: &str,
        existing_topics: &[String],
    ) -> Result<TopicLabel, CurioError> {
        self.seen.lock().await.push(existing_topics.to_vec());
        let lower = text.to_lowercase();
        let label = self
            .rules
            .iter()
            .find(|(keyword, _)| lower.contains(keyword.as_str()))
            .map(|(_, label)| label.clone())
            .unwrap_or_else(|| self.fallback.clone());
        Ok(TopicLabel {
            label,
            confidence: self.confidence,
        })
    }
}
