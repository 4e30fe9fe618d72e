// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flat vector index over knowledge units, persisted as JSON.
//!
//! The index is derived data: it can always be rebuilt from the knowledge
//! store. A corpus fingerprint decides whether a persisted index is still
//! current.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use curio_core::{CurioError, cosine_similarity};
use curio_knowledge::StoredFile;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// One indexed knowledge unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub topic: String,
    pub unit_id: String,
    pub path: PathBuf,
    pub content: String,
    /// SHA-256 of `content`; lets a rebuild reuse the embedding.
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// A retrieved passage with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub topic: String,
    pub unit_id: String,
    pub path: PathBuf,
    pub content: String,
    pub score: f32,
}

/// An immutable snapshot of the index. Rebuilds produce a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    /// Fingerprint of the corpus this index was built from.
    pub fingerprint: String,
    /// Name of the embedding adapter that produced the vectors.
    pub embedder: String,
    pub built_at: DateTime<Utc>,
    pub entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` best entries scoring at least `min_score`, best first.
    ///
    /// Entries whose dimensions differ from the query are skipped.
    pub fn query(&self, vector: &[f32], k: usize, min_score: f32) -> Vec<Passage> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .filter(|e| e.embedding.len() == vector.len())
            .map(|e| (cosine_similarity(vector, &e.embedding), e))
            .filter(|(score, _)| *score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(score, e)| Passage {
                topic: e.topic.clone(),
                unit_id: e.unit_id.clone(),
                path: e.path.clone(),
                content: e.content.clone(),
                score,
            })
            .collect()
    }

    /// Embedding previously computed for identical content, if any.
    pub fn embedding_for(&self, content_hash: &str) -> Option<&[f32]> {
        self.entries
            .iter()
            .find(|e| e.content_hash == content_hash)
            .map(|e| e.embedding.as_slice())
    }

    /// Reads a persisted index. A missing or unreadable file yields `None`.
    pub async fn load(path: &Path) -> Option<VectorIndex> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read persisted index");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "persisted index is corrupt, ignoring");
                None
            }
        }
    }

    /// Writes the index next to `path` and renames it into place.
    pub async fn persist(&self, path: &Path) -> Result<(), CurioError> {
        let body = serde_json::to_vec(self).map_err(|e| CurioError::store_write(path, e))?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&target, &body))
            .await
            .map_err(|e| CurioError::Internal(format!("index write task failed: {e}")))??;
        debug!(path = %path.display(), entries = self.entries.len(), "index persisted");
        Ok(())
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<(), CurioError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| CurioError::store_write(path, e))?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| CurioError::store_write(path, e))?;
    tmp.write_all(body)
        .map_err(|e| CurioError::store_write(path, e))?;
    tmp.persist(path)
        .map_err(|e| CurioError::store_write(path, e.error))?;
    Ok(())
}

/// Hex SHA-256 of a unit's content.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Fingerprint of everything an index is derived from.
///
/// Changes whenever a file is added, removed, or rewritten.
pub fn corpus_fingerprint(files: &[StoredFile]) -> String {
    let mut hasher = Sha256::new();
    for stored in files {
        hasher.update(stored.file.topic.as_bytes());
        hasher.update([0]);
        hasher.update(stored.file.revision.to_le_bytes());
        for unit in &stored.file.units {
            hasher.update(unit.id.as_bytes());
            hasher.update([0]);
            hasher.update(unit.content.as_bytes());
            hasher.update([0]);
        }
    }
    hex::encode(hasher.finalize())
}
