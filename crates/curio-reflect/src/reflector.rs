// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Preference analysis and periodic self-reflection.
//!
//! Both run on the curation worker after the answer is delivered. Their
//! failures are logged by the caller and never reach the user.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use curio_config::ReflectionConfig;
use curio_core::traits::ProviderAdapter;
use curio_core::types::ProviderRequest;
use curio_core::{CurioError, RetryPolicy, with_retry};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::journal::{Journal, PreferenceRecord, ReflectionRecord};
use crate::profile::{PreferenceProfile, ProfileStore};

fn preference_prompt(user_input: &str) -> String {
    format!(
        r#"Analyze this message from a user to an assistant.

Message: {user_input}

Reply with a JSON object:
{{"intent": "<what the user wants>", "requirements": "<constraints on the answer>", "preferences": {{"<name>": "<value>"}}, "summary": "<one sentence>"}}

Only list preferences the user clearly expressed, such as tone, format, or language. Use {{}} when there are none."#
    )
}

fn reflection_prompt(hints: &str, user_input: &str, model_response: &str) -> String {
    format!(
        r#"Review how the assistant handled this exchange and suggest one concrete improvement for future answers in this conversation.

Current guidance:
{hints}

User: {user_input}
Assistant: {model_response}

Reply with a JSON object: {{"improvement_strategy": "<one instruction>", "summary": "<one sentence>"}}"#
    )
}

/// Result of analyzing one user message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PreferenceAnalysis {
    #[serde(default = "unknown")]
    pub intent: String,
    #[serde(default)]
    pub requirements: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    #[serde(default)]
    pub summary: String,
}

impl Default for PreferenceAnalysis {
    fn default() -> Self {
        Self {
            intent: unknown(),
            requirements: String::new(),
            preferences: BTreeMap::new(),
            summary: String::new(),
        }
    }
}

fn unknown() -> String {
    "unknown".to_string()
}

/// Result of one self-reflection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reflection {
    pub improvement_strategy: String,
    #[serde(default)]
    pub summary: String,
}

pub struct PreferenceReflector {
    provider: Arc<dyn ProviderAdapter>,
    model: String,
    retry: RetryPolicy,
    profiles: ProfileStore,
    preference_journal: Journal,
    reflection_journal: Journal,
    config: ReflectionConfig,
}

impl PreferenceReflector {
    /// Opens the profile store and journals under `user_data_dir`.
    pub fn open(
        user_data_dir: &Path,
        provider: Arc<dyn ProviderAdapter>,
        config: ReflectionConfig,
    ) -> Result<Self, CurioError> {
        Ok(Self {
            provider,
            model: String::new(),
            retry: RetryPolicy::default(),
            profiles: ProfileStore::open(user_data_dir.join("profiles"))?,
            preference_journal: Journal::new(user_data_dir.join("user_preference.csv")),
            reflection_journal: Journal::new(user_data_dir.join("self_reflection.csv")),
            config,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Read access to profiles for context assembly.
    pub fn profiles(&self) -> ProfileStore {
        self.profiles.clone()
    }

    pub fn preference_journal(&self) -> &Journal {
        &self.preference_journal
    }

    pub fn reflection_journal(&self) -> &Journal {
        &self.reflection_journal
    }

    pub async fn profile(&self, conversation_id: &str) -> Result<PreferenceProfile, CurioError> {
        self.profiles.load(conversation_id).await
    }

    /// Runs preference analysis and, when due, self-reflection.
    ///
    /// Errors are logged here; this is the entry point for background work.
    pub async fn observe(&self, conversation_id: &str, user_input: &str, model_response: &str) {
        if !self.config.enabled {
            return;
        }
        if let Err(e) = self.analyze_preference(user_input, conversation_id).await {
            warn!(conversation_id, error = %e, "preference analysis failed");
        }
        if let Err(e) = self
            .self_reflect(conversation_id, user_input, model_response)
            .await
        {
            warn!(conversation_id, error = %e, "self-reflection failed");
        }
    }

    /// Analyzes one user message and folds its preferences into the profile.
    ///
    /// An unparseable reply falls back to [`PreferenceAnalysis::default`];
    /// it is still journaled and counted, but contributes no preferences.
    pub async fn analyze_preference(
        &self,
        user_input: &str,
        conversation_id: &str,
    ) -> Result<PreferenceAnalysis, CurioError> {
        let prompt = preference_prompt(user_input);
        let reply = self.complete("analyze_preference", prompt).await?;
        let parsed = parse_json::<PreferenceAnalysis>(&reply);
        if parsed.is_none() {
            debug!(conversation_id, "preference reply unparseable, using defaults");
        }

        let _lock = self.profiles.lock(conversation_id).await;
        let mut profile = self.profiles.load(conversation_id).await?;
        profile.observations += 1;
        if let Some(analysis) = &parsed {
            for (key, value) in &analysis.preferences {
                let (key, value) = (key.trim(), value.trim());
                if !key.is_empty() && !value.is_empty() {
                    profile
                        .preferences
                        .insert(key.to_string(), value.to_string());
                }
            }
        }
        self.profiles.save(&profile).await?;

        let analysis = parsed.unwrap_or_default();
        self.preference_journal
            .append(PreferenceRecord {
                timestamp: Utc::now(),
                conversation_id: conversation_id.to_string(),
                user_intent: analysis.intent.clone(),
                user_requirements: analysis.requirements.clone(),
                summary: analysis.summary.clone(),
            })
            .await?;
        debug!(conversation_id, observations = profile.observations, "preferences analyzed");
        Ok(analysis)
    }

    /// Adjusts the conversation's strategy hints once every
    /// `reflect_every` observations. Returns `None` when not yet due or
    /// when the reply cannot be used.
    pub async fn self_reflect(
        &self,
        conversation_id: &str,
        user_input: &str,
        model_response: &str,
    ) -> Result<Option<Reflection>, CurioError> {
        let _lock = self.profiles.lock(conversation_id).await;
        let mut profile = self.profiles.load(conversation_id).await?;
        let due = profile.observations > 0
            && profile.observations - profile.reflected_at_observation
                >= self.config.reflect_every.max(1);
        if !due {
            return Ok(None);
        }

        let hints = if profile.strategy_hints.is_empty() {
            "(none)".to_string()
        } else {
            profile
                .strategy_hints
                .iter()
                .map(|h| format!("- {h}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let prompt = reflection_prompt(&hints, user_input, model_response);
        let reply = self.complete("self_reflect", prompt).await?;

        let Some(reflection) = parse_json::<Reflection>(&reply)
            .filter(|r| !r.improvement_strategy.trim().is_empty())
        else {
            warn!(conversation_id, "self-reflection reply unusable");
            return Ok(None);
        };

        profile.push_hint(
            reflection.improvement_strategy.trim(),
            self.config.max_strategy_hints,
        );
        profile.reflected_at_observation = profile.observations;
        profile.last_reflected_at = Some(Utc::now());
        self.profiles.save(&profile).await?;

        self.reflection_journal
            .append(ReflectionRecord {
                timestamp: Utc::now(),
                conversation_id: conversation_id.to_string(),
                user_input: user_input.to_string(),
                improvement_strategy: reflection.improvement_strategy.clone(),
                summary: reflection.summary.clone(),
            })
            .await?;
        info!(conversation_id, hints = profile.strategy_hints.len(), "strategy updated");
        Ok(Some(reflection))
    }

    async fn complete(&self, operation: &str, prompt: String) -> Result<String, CurioError> {
        let response = with_retry(self.retry, operation, || {
            self.provider.complete(
                ProviderRequest::new(self.model.clone(), prompt.clone()).with_max_tokens(256),
            )
        })
        .await?;
        Ok(response.content)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(reply: &str) -> Option<T> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}
