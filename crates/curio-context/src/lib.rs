// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Input processing for the Curio assistant: clarity and necessity
//! judgments over recent history, producing a context payload that never
//! exceeds the requested length.

pub mod judge;
pub mod payload;
pub mod processor;

pub use judge::Clarity;
pub use payload::ContextPayload;
pub use processor::{InputProcessor, ProcessedInput};
