// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index and retrieval-augmented answering for the Curio assistant.

pub mod engine;
pub mod index;

pub use engine::{AskOutcome, IndexHandle, RetrievalEngine, build_answer_prompt};
pub use index::{IndexEntry, Passage, VectorIndex, content_hash, corpus_fingerprint};
