// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Preference signals and answering strategy for the Curio assistant.
//!
//! A low-priority feed: profiles shape future answers through strategy
//! hints, but nothing here sits on the answer path.

pub mod journal;
pub mod profile;
pub mod reflector;

pub use journal::{Journal, PreferenceRecord, ReflectionRecord};
pub use profile::{PreferenceProfile, ProfileStore};
pub use reflector::{PreferenceAnalysis, PreferenceReflector, Reflection};
