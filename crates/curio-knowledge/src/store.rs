// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic-keyed knowledge file store.
//!
//! Each topic lives in one human-readable TOML document under the knowledge
//! root. Whole files are replaced atomically (write temp, then rename) and
//! only through [`KnowledgeStore::replace`], which checks the revision the
//! caller last read.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use curio_core::CurioError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

const FILE_EXTENSION: &str = "toml";
const MAX_SLUG_LEN: usize = 64;

/// A single curated fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeUnit {
    pub id: String,
    pub topic: String,
    pub content: String,
    /// `<conversation_id>#<seq>` or `<conversation_id>@<timestamp>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_exchange_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeUnit {
    pub fn new(topic: &str, content: impl Into<String>, source: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            content: content.into(),
            source_exchange_ref: source,
            created_at: now,
            updated_at: now,
        }
    }
}

/// All units sharing one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeFile {
    pub topic: String,
    /// Bumped on every replace; zero means never written.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub units: Vec<KnowledgeUnit>,
}

impl KnowledgeFile {
    pub fn new(topic: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            topic: topic.into(),
            revision: 0,
            created_at: now,
            updated_at: now,
            units: Vec::new(),
        }
    }

    /// Characters of unit content, the measure used for "empty" files.
    pub fn content_chars(&self) -> usize {
        self.units.iter().map(|u| u.content.chars().count()).sum()
    }

    /// Unit contents joined as plain text, for theme sampling and indexing.
    pub fn text(&self) -> String {
        self.units
            .iter()
            .map(|u| u.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A file as read from disk.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub file: KnowledgeFile,
}

/// Proof that the caller holds the writer lock for one topic.
pub struct TopicGuard {
    slug: String,
    _guard: OwnedMutexGuard<()>,
}

impl TopicGuard {
    pub fn slug(&self) -> &str {
        &self.slug
    }
}

/// File-backed arena of [`KnowledgeFile`]s keyed by topic slug.
pub struct KnowledgeStore {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KnowledgeStore {
    /// Opens the store, creating the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CurioError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| CurioError::store_write(&root, e))?;
        Ok(Self {
            root,
            locks: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the file for `topic` lives.
    pub fn path_for(&self, topic: &str) -> PathBuf {
        self.root
            .join(format!("{}.{FILE_EXTENSION}", topic_slug(topic)))
    }

    /// Waits for exclusive write access to `topic`.
    pub async fn lock_topic(&self, topic: &str) -> TopicGuard {
        let slug = topic_slug(topic);
        let lock = self
            .locks
            .entry(slug.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        TopicGuard {
            slug,
            _guard: lock.lock_owned().await,
        }
    }

    /// Reads the file for `topic`, if one exists.
    pub async fn load(&self, topic: &str) -> Result<Option<KnowledgeFile>, CurioError> {
        read_file(&self.path_for(topic)).await
    }

    /// Every readable knowledge file, ordered by path.
    ///
    /// Files that fail to parse are skipped with a warning.
    pub async fn snapshot(&self) -> Result<Vec<StoredFile>, CurioError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(CurioError::storage)?;
        while let Some(entry) = entries.next_entry().await.map_err(CurioError::storage)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == FILE_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            match read_file(&path).await {
                Ok(Some(file)) => files.push(StoredFile { path, file }),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable knowledge file"),
            }
        }
        Ok(files)
    }

    /// Topic labels of every stored file.
    pub async fn topics(&self) -> Result<Vec<String>, CurioError> {
        Ok(self
            .snapshot()
            .await?
            .into_iter()
            .map(|s| s.file.topic)
            .collect())
    }

    /// Compare-and-swap replace of a whole topic file.
    ///
    /// `expected_revision` is the revision the caller read (`None` if the
    /// file did not exist). On success the stored file carries the next
    /// revision and is returned along with its path.
    pub async fn replace(
        &self,
        guard: &TopicGuard,
        expected_revision: Option<u64>,
        mut file: KnowledgeFile,
    ) -> Result<(PathBuf, KnowledgeFile), CurioError> {
        self.check_guard(guard, &file.topic)?;
        let path = self.path_for(&file.topic);
        let found = read_file(&path).await?.map(|f| f.revision);
        if found != expected_revision {
            return Err(CurioError::MergeConflict {
                topic: file.topic,
                expected: expected_revision.unwrap_or(0),
                found: found.unwrap_or(0),
            });
        }

        file.revision = found.unwrap_or(0) + 1;
        let body = toml::to_string_pretty(&file)
            .map_err(|e| CurioError::store_write(&path, e))?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &body))
            .await
            .map_err(|e| CurioError::Internal(format!("knowledge write task failed: {e}")))??;

        debug!(topic = %file.topic, revision = file.revision, units = file.units.len(), "knowledge file written");
        Ok((path, file))
    }

    /// Removes a topic file after its units were consolidated elsewhere.
    pub async fn remove(
        &self,
        guard: &TopicGuard,
        topic: &str,
        expected_revision: u64,
    ) -> Result<(), CurioError> {
        self.check_guard(guard, topic)?;
        let path = self.path_for(topic);
        let found = read_file(&path).await?.map(|f| f.revision).unwrap_or(0);
        if found != expected_revision {
            return Err(CurioError::MergeConflict {
                topic: topic.to_string(),
                expected: expected_revision,
                found,
            });
        }
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| CurioError::store_write(&path, e))
    }

    fn check_guard(&self, guard: &TopicGuard, topic: &str) -> Result<(), CurioError> {
        if guard.slug != topic_slug(topic) {
            return Err(CurioError::Internal(format!(
                "write to `{topic}` attempted while holding lock for `{}`",
                guard.slug
            )));
        }
        Ok(())
    }
}

async fn read_file(path: &Path) -> Result<Option<KnowledgeFile>, CurioError> {
    let body = match tokio::fs::read_to_string(path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CurioError::storage(e)),
    };
    toml::from_str(&body).map(Some).map_err(CurioError::storage)
}

fn write_atomic(path: &Path, body: &str) -> Result<(), CurioError> {
    let dir = path
        .parent()
        .ok_or_else(|| CurioError::Internal(format!("{} has no parent", path.display())))?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| CurioError::store_write(path, e))?;
    tmp.write_all(body.as_bytes())
        .map_err(|e| CurioError::store_write(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CurioError::store_write(path, e))?;
    tmp.persist(path)
        .map_err(|e| CurioError::store_write(path, e.error))?;
    Ok(())
}

/// File-name-safe form of a topic label.
///
/// Lowercases alphanumerics and collapses every other run of characters to
/// a single `-`, so `Work/Projects` becomes `work-projects`.
pub fn topic_slug(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    for c in topic.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_end_matches('-').chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "uncategorized".to_string()
    } else {
        slug.to_string()
    }
}
