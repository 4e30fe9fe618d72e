// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decides how much conversational context a new message needs.

use std::sync::Arc;

use curio_config::ContextConfig;
use curio_convlog::ConversationLog;
use curio_core::traits::ProviderAdapter;
use curio_core::types::ProviderRequest;
use curio_core::{CurioError, Exchange, RetryPolicy, with_retry};
use curio_reflect::ProfileStore;
use tracing::{debug, warn};

use crate::judge::{
    Clarity, clarity_prompt, necessity_prompt, parse_clarity, parse_necessity, synopsis_prompt,
};
use crate::payload::ContextPayload;

/// A message ready for retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedInput {
    /// The question to retrieve and answer against.
    pub effective_query: String,
    /// Bounded history; renders to at most the requested length.
    pub context: ContextPayload,
    /// Answering guidance from the conversation's preference profile:
    /// stated preferences, then strategy hints. Not counted against the
    /// context bound.
    pub strategy_hints: Vec<String>,
    pub clarity: Clarity,
    pub context_needed: bool,
}

pub struct InputProcessor {
    provider: Arc<dyn ProviderAdapter>,
    log: ConversationLog,
    profiles: Option<ProfileStore>,
    config: ContextConfig,
    model: String,
    retry: RetryPolicy,
}

impl InputProcessor {
    pub fn new(provider: Arc<dyn ProviderAdapter>, log: ConversationLog, config: ContextConfig) -> Self {
        Self {
            provider,
            log,
            profiles: None,
            config,
            model: String::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Read preferences and strategy hints from these profiles.
    pub fn with_profiles(mut self, profiles: ProfileStore) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Model used for the judgments and synopsis.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builds the query and bounded context for `user_input`.
    ///
    /// With no history nothing is asked of the LLM: the payload is empty
    /// and the query is the input. Otherwise an unclear message gets a
    /// synopsis of recent history, and the necessity judgment picks the
    /// recent exchanges or the synopsis. Judgment failures lean toward
    /// including context.
    pub async fn process(
        &self,
        user_input: &str,
        conversation_id: &str,
        max_context_length: usize,
    ) -> ProcessedInput {
        let strategy_hints = self.strategy_hints(conversation_id).await;
        let recent = match self
            .log
            .recent(conversation_id, self.config.max_conversation_history)
            .await
        {
            Ok(recent) => recent,
            Err(e) => {
                warn!(conversation_id, error = %e, "cannot read conversation history, continuing without it");
                Vec::new()
            }
        };

        if recent.is_empty() {
            return ProcessedInput {
                effective_query: user_input.to_string(),
                context: ContextPayload::default(),
                strategy_hints,
                clarity: Clarity::Clear,
                context_needed: false,
            };
        }

        let clarity = self.judge_clarity(user_input).await;
        let synopsis = match clarity {
            Clarity::Clear => None,
            Clarity::Unclear => Some(self.summarize(&recent).await),
        };
        let judged_history = match &synopsis {
            Some(s) => s.clone(),
            None => ContextPayload {
                synopsis: None,
                exchanges: recent.clone(),
            }
            .render(),
        };
        let context_needed = self.judge_necessity(user_input, &judged_history).await;

        let mut context = if context_needed {
            ContextPayload {
                synopsis: None,
                exchanges: recent,
            }
        } else {
            ContextPayload {
                synopsis,
                exchanges: Vec::new(),
            }
        };
        context.truncate_to(max_context_length);

        debug!(
            conversation_id,
            ?clarity,
            context_needed,
            exchanges = context.exchanges.len(),
            chars = context.len(),
            "input processed"
        );
        ProcessedInput {
            effective_query: user_input.to_string(),
            context,
            strategy_hints,
            clarity,
            context_needed,
        }
    }

    async fn strategy_hints(&self, conversation_id: &str) -> Vec<String> {
        let Some(profiles) = &self.profiles else {
            return Vec::new();
        };
        match profiles.load(conversation_id).await {
            Ok(profile) => profile.answer_guidance(),
            Err(e) => {
                warn!(conversation_id, error = %e, "cannot read preference profile");
                Vec::new()
            }
        }
    }

    async fn judge_clarity(&self, user_input: &str) -> Clarity {
        let prompt = clarity_prompt(user_input);
        match self.complete("judge_clarity", prompt, 8).await {
            Ok(reply) => parse_clarity(&reply),
            Err(e) => {
                warn!(error = %e, "clarity judgment failed, treating input as unclear");
                Clarity::Unclear
            }
        }
    }

    async fn judge_necessity(&self, user_input: &str, history: &str) -> bool {
        let prompt = necessity_prompt(history, user_input);
        match self.complete("judge_context_need", prompt, 8).await {
            Ok(reply) => parse_necessity(&reply),
            Err(e) => {
                warn!(error = %e, "context judgment failed, including context");
                true
            }
        }
    }

    /// LLM synopsis of `recent`, bounded by `synopsis_max_chars`. Falls
    /// back to the most recent user questions.
    async fn summarize(&self, recent: &[Exchange]) -> String {
        let history = ContextPayload {
            synopsis: None,
            exchanges: recent.to_vec(),
        }
        .render();
        let prompt = synopsis_prompt(&history);
        let synopsis = match self.complete("summarize_history", prompt, 512).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => fallback_synopsis(recent),
            Err(e) => {
                warn!(error = %e, "history summary failed, using recent questions");
                fallback_synopsis(recent)
            }
        };
        clip_chars(&synopsis, self.config.synopsis_max_chars)
    }

    async fn complete(
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
}

fn fallback_synopsis(recent: &[Exchange]) -> String {
    let questions: Vec<&str> = recent.iter().rev().map(|e| e.user_input.trim()).collect();
    format!("Recent questions: {}", questions.join(" | "))
}

fn clip_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_lists_newest_question_first() {
        let recent = vec![
            Exchange::now("c", "first?", "a", ""),
            Exchange::now("c", " second? ", "b", ""),
        ];
        assert_eq!(fallback_synopsis(&recent), "Recent questions: second? | first?");
    }

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip_chars("héllo", 2), "hé");
        assert_eq!(clip_chars("hi", 10), "hi");
    }
}
