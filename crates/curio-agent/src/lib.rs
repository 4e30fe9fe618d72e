// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn pipeline for the Curio assistant.
//!
//! [`Assistant`] answers a question and then queues the exchange for
//! background curation:
//! - knowledge extraction and merge,
//! - preference analysis and self-reflection.
//!
//! The [`CurationWorker`] drains the queue on shutdown.

pub mod assistant;
pub mod queue;
pub mod shutdown;
pub mod worker;

pub use assistant::{AskRequest, AskResponse, AskSettings, Assistant};
pub use queue::{CurationJob, CurationQueue, Rejected};
pub use shutdown::install_signal_handler;
pub use worker::CurationWorker;
