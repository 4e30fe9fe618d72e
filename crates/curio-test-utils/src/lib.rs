// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Curio integration tests.
//!
//! Provides mock collaborators for fast, deterministic, CI-runnable tests
//! without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Scripted LLM provider that records every request
//! - [`HashingEmbedder`] - Deterministic bag-of-words embedder
//! - [`StaticClassifier`] - Keyword-driven topic classifier

pub mod classifier;
pub mod embedder;
pub mod mock_provider;

pub use classifier::StaticClassifier;
pub use embedder::HashingEmbedder;
pub use mock_provider::{MockFailure, MockProvider};
