// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation preference profiles stored as JSON documents.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use curio_core::CurioError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

/// What the assistant has learned about how a conversation's user likes
/// to be answered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceProfile {
    pub conversation_id: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    /// Answering guidance from self-reflection, oldest first.
    #[serde(default)]
    pub strategy_hints: Vec<String>,
    /// Exchanges analyzed so far.
    #[serde(default)]
    pub observations: u64,
    /// `observations` at the last self-reflection.
    #[serde(default)]
    pub reflected_at_observation: u64,
    #[serde(default)]
    pub last_reflected_at: Option<DateTime<Utc>>,
}

impl PreferenceProfile {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            ..Self::default()
        }
    }

    /// Guidance for answering in this conversation: stated preferences
    /// first, then strategy hints.
    pub fn answer_guidance(&self) -> Vec<String> {
        self.preferences
            .iter()
            .map(|(key, value)| format!("Preferred {key}: {value}"))
            .chain(self.strategy_hints.iter().cloned())
            .collect()
    }

    /// Appends a hint, keeping at most `max` and dropping the oldest.
    /// A hint already present moves to the newest position.
    pub fn push_hint(&mut self, hint: impl Into<String>, max: usize) {
        let hint = hint.into();
        self.strategy_hints.retain(|h| *h != hint);
        self.strategy_hints.push(hint);
        let excess = self.strategy_hints.len().saturating_sub(max);
        self.strategy_hints.drain(..excess);
    }
}

/// Profile documents under `<user_data_dir>/profiles/`.
///
/// Cloning is cheap; clones share the per-conversation locks.
#[derive(Clone)]
pub struct ProfileStore {
    dir: Arc<PathBuf>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ProfileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CurioError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CurioError::store_write(&dir, e))?;
        Ok(Self {
            dir: Arc::new(dir),
            locks: Arc::new(DashMap::new()),
        })
    }

    pub fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", file_stem(conversation_id)))
    }

    /// Serializes read-modify-write cycles on one conversation's profile.
    pub(crate) async fn lock(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// The stored profile, or a fresh one. A corrupt document is replaced
    /// by a fresh profile with a warning.
    pub async fn load(&self, conversation_id: &str) -> Result<PreferenceProfile, CurioError> {
        let path = self.path_for(conversation_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PreferenceProfile::new(conversation_id));
            }
            Err(e) => return Err(CurioError::storage(e)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(profile) => Ok(profile),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt preference profile, starting fresh");
                Ok(PreferenceProfile::new(conversation_id))
            }
        }
    }

    pub async fn save(&self, profile: &PreferenceProfile) -> Result<(), CurioError> {
        let path = self.path_for(&profile.conversation_id);
        let body =
            serde_json::to_vec_pretty(profile).map_err(|e| CurioError::store_write(&path, e))?;
        tokio::task::spawn_blocking(move || write_atomic(&path, &body))
            .await
            .map_err(|e| CurioError::Internal(format!("profile write task failed: {e}")))?
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<(), CurioError> {
    let dir = path
        .parent()
        .ok_or_else(|| CurioError::Internal(format!("{} has no parent", path.display())))?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| CurioError::store_write(path, e))?;
    tmp.write_all(body)
        .map_err(|e| CurioError::store_write(path, e))?;
    tmp.persist(path)
        .map_err(|e| CurioError::store_write(path, e.error))?;
    Ok(())
}

/// File-name-safe, collision-free form of a conversation id.
fn file_stem(conversation_id: &str) -> String {
    if conversation_id.is_empty() {
        return "~".to_string();
    }
    let mut stem = String::with_capacity(conversation_id.len());
    for b in conversation_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            stem.push(char::from(b));
        } else {
            stem.push_str(&format!("~{b:02x}"));
        }
    }
    stem
}
