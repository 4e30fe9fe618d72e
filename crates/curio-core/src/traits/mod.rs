// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! External collaborators extend the [`PluginAdapter`] base trait. The async
//! traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod classifier;
pub mod embedding;
pub mod index;
pub mod provider;

pub use adapter::PluginAdapter;
pub use classifier::TopicClassifier;
pub use embedding::EmbeddingAdapter;
pub use index::IndexRefresher;
pub use provider::ProviderAdapter;
