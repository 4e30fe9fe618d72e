// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use std::path::Path;

use crate::diagnostic::ConfigError;
use crate::model::CurioConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of stopping at the first.
pub fn validate_config(config: &CurioConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |key: &str, message: String| {
        errors.push(ConfigError::Validation {
            key: key.to_string(),
            message,
        })
    };

    let k = &config.knowledge;
    for (key, value) in [
        ("knowledge.duplicate_threshold", k.duplicate_threshold),
        ("knowledge.refinement_threshold", k.refinement_threshold),
        ("knowledge.min_confidence", k.min_confidence),
        ("knowledge.topic_similarity_floor", k.topic_similarity_floor),
        ("knowledge.organize_merge_threshold", k.organize_merge_threshold),
        ("retrieval.min_score", config.retrieval.min_score),
    ] {
        if !(0.0..=1.0).contains(&value) {
            fail(key, format!("must be between 0 and 1, got {value}"));
        }
    }

    if k.refinement_threshold > k.duplicate_threshold {
        fail(
            "knowledge.refinement_threshold",
            format!(
                "must not exceed knowledge.duplicate_threshold ({} > {})",
                k.refinement_threshold, k.duplicate_threshold
            ),
        );
    }

    for (key, value) in [
        ("context.max_context_length", config.context.max_context_length),
        ("context.synopsis_max_chars", config.context.synopsis_max_chars),
        ("retrieval.top_k", config.retrieval.top_k),
        ("curation.queue_capacity", config.curation.queue_capacity),
        ("curation.max_concurrent_jobs", config.curation.max_concurrent_jobs),
        ("knowledge.theme_sample_chars", k.theme_sample_chars),
    ] {
        if value == 0 {
            fail(key, "must be greater than zero".to_string());
        }
    }

    if config.retrieval.retrieval_timeout_ms == 0 {
        fail("retrieval.retrieval_timeout_ms", "must be greater than zero".to_string());
    }
    if config.retrieval.answer_timeout_secs == 0 {
        fail("retrieval.answer_timeout_secs", "must be greater than zero".to_string());
    }
    if config.reflection.reflect_every == 0 {
        fail("reflection.reflect_every", "must be greater than zero".to_string());
    }

    let s = &config.storage;
    for (key, path) in [
        ("storage.knowledge_dir", &s.knowledge_dir),
        ("storage.log_dir", &s.log_dir),
        ("storage.user_data_dir", &s.user_data_dir),
        ("storage.index_path", &s.index_path),
    ] {
        if is_blank(path) {
            fail(key, "must not be empty".to_string());
        }
    }

    if config.llm.base_url.trim().is_empty() {
        fail("llm.base_url", "must not be empty".to_string());
    }
    if config.llm.default_model.trim().is_empty() {
        fail("llm.default_model", "must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error_for(errors: &[ConfigError], key: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { key: k, .. } if k == key))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&CurioConfig::default()).is_ok());
    }

    #[test]
    fn out_of_range_threshold_fails() {
        let mut config = CurioConfig::default();
        config.knowledge.duplicate_threshold = 1.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "knowledge.duplicate_threshold"));
    }

    #[test]
    fn refinement_above_duplicate_fails() {
        let mut config = CurioConfig::default();
        config.knowledge.refinement_threshold = 0.95;
        config.knowledge.duplicate_threshold = 0.9;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "knowledge.refinement_threshold"));
    }

    #[test]
    fn zero_sizes_fail() {
        let mut config = CurioConfig::default();
        config.context.max_context_length = 0;
        config.curation.queue_capacity = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "context.max_context_length"));
        assert!(has_error_for(&errors, "curation.queue_capacity"));
    }

    #[test]
    fn empty_path_fails() {
        let mut config = CurioConfig::default();
        config.storage.log_dir = "".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "storage.log_dir"));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = CurioConfig::default();
        config.retrieval.top_k = 0;
        config.retrieval.min_score = -0.5;
        config.llm.base_url = " ".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
