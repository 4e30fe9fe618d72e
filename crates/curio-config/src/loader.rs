// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./curio.toml` > `~/.config/curio/curio.toml` > `/etc/curio/curio.toml`
//! with environment variable overrides via `CURIO_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CurioConfig;

/// Top-level sections, used to map `CURIO_SECTION_KEY` to `section.key`.
const SECTIONS: &[&str] = &[
    "agent",
    "llm",
    "storage",
    "context",
    "knowledge",
    "retrieval",
    "curation",
    "reflection",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/curio/curio.toml` (system-wide)
/// 3. `~/.config/curio/curio.toml` (user XDG config)
/// 4. `./curio.toml` (local directory)
/// 5. `CURIO_*` environment variables
pub fn load_config() -> Result<CurioConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config content.
pub fn load_config_from_str(toml_content: &str) -> Result<CurioConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CurioConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CurioConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CurioConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CurioConfig::default()))
        .merge(Toml::file("/etc/curio/curio.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("curio/curio.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("curio.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `CURIO_LLM_API_KEY` to `llm.api_key`.
///
/// Only the leading section name is split off, so keys that themselves
/// contain underscores stay intact.
fn env_provider() -> Env {
    Env::prefixed("CURIO_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
