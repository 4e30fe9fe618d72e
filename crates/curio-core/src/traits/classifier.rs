// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic classifier capability.

use async_trait::async_trait;

use crate::error::CurioError;
use crate::types::TopicLabel;

/// Assigns a topic label to a piece of candidate knowledge.
///
/// `existing_topics` lists the labels already present in the knowledge
/// store so implementations can prefer reusing one.
#[async_trait]
pub trait TopicClassifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        existing_topics: &[String],
    ) -> Result<TopicLabel, CurioError>;
}
