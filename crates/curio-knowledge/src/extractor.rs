// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based extraction of candidate knowledge from a finished exchange.
//!
//! Most exchanges teach nothing durable; extraction returning `None` is the
//! normal outcome, not an error.

use serde::Deserialize;
use tracing::{debug, warn};

/// Knowledge pulled out of an exchange, not yet placed in a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateKnowledge {
    pub content: String,
    /// The extractor's own guess, used if classification fails.
    pub topic_hint: Option<String>,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
struct ExtractionReply {
    #[serde(default)]
    worth_retaining: bool,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Build the extraction prompt for one exchange.
pub fn build_extraction_prompt(user_input: &str, model_response: &str) -> String {
    format!(
        r#"Decide whether this exchange contains knowledge worth keeping for future conversations: facts the user stated about themselves or their preferences, or reusable domain information from the answer.

Reply with a single JSON object:
- "worth_retaining": true or false
- "topic": a short topic label such as "preferences" or "rust/ownership"
- "content": the knowledge as one or more standalone statements
- "confidence": a number between 0 and 1

If nothing is worth keeping, reply {{"worth_retaining": false}}.

User: {user_input}
Assistant: {model_response}

JSON only:"#
    )
}

/// Parse the extraction reply.
///
/// Tolerates markdown fences and prose around the JSON object. Anything
/// unparseable, or a reply declining to retain, yields `None`.
pub fn parse_extraction_response(response: &str) -> Option<CandidateKnowledge> {
    let json = json_object_slice(response)?;
    let reply: ExtractionReply = match serde_json::from_str(json) {
        Ok(reply) => reply,
        Err(e) => {
            warn!("failed to parse extraction response: {e}");
            debug!("raw response: {response}");
            return None;
        }
    };

    let content = reply.content.trim();
    if !reply.worth_retaining || content.is_empty() {
        return None;
    }

    Some(CandidateKnowledge {
        content: content.to_string(),
        topic_hint: reply
            .topic
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        confidence: reply.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
    })
}

/// The outermost `{...}` span of `text`, if any.
pub(crate) fn json_object_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
