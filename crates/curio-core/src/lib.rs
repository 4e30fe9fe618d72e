// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Curio assistant.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Curio workspace. The LLM, embedding, and
//! classifier collaborators all implement traits defined here.

pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

pub use error::CurioError;
pub use retry::{RetryPolicy, with_retry};
pub use types::{
    EmbeddingInput, EmbeddingOutput, Exchange, ProviderRequest, ProviderResponse, TokenUsage,
    TopicLabel, cosine_similarity,
};

pub use traits::{
    EmbeddingAdapter, IndexRefresher, PluginAdapter, ProviderAdapter, TopicClassifier,
};
