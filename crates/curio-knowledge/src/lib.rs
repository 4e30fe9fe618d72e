// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Knowledge curation for the Curio assistant.
//!
//! Turns finished exchanges into topic-organized, deduplicated knowledge
//! files that the retrieval engine indexes:
//! - [`extractor`] pulls candidate knowledge out of an exchange
//! - [`classifier`] assigns a topic label via the LLM
//! - [`manager`] dedupes, refines, or appends under a per-topic lock
//! - [`organize`] consolidates files whose themes collide
//! - [`store`] persists one TOML document per topic

pub mod classifier;
pub mod extractor;
pub mod manager;
pub mod organize;
pub mod store;

pub use classifier::LlmTopicClassifier;
pub use extractor::CandidateKnowledge;
pub use manager::{KnowledgeManager, MergeOutcome};
pub use organize::{MergeRecord, OrganizeReport};
pub use store::{KnowledgeFile, KnowledgeStore, KnowledgeUnit, StoredFile, TopicGuard, topic_slug};
