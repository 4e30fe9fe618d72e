// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only CSV journals of preference and reflection analyses.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use curio_core::CurioError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

/// Row of `user_preference.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    pub user_intent: String,
    pub user_requirements: String,
    pub summary: String,
}

/// Row of `self_reflection.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    pub user_input: String,
    pub improvement_strategy: String,
    pub summary: String,
}

/// One CSV file with a header row, appended to under a lock.
#[derive(Clone)]
pub struct Journal {
    path: Arc<PathBuf>,
    write: Arc<Mutex<()>>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            write: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append<T>(&self, record: T) -> Result<(), CurioError>
    where
        T: Serialize + Send + 'static,
    {
        let _write = self.write.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_row(&path, &record))
            .await
            .map_err(|e| CurioError::Internal(format!("journal write task failed: {e}")))?
    }

    /// Every decodable row, oldest first.
    pub async fn entries<T>(&self) -> Result<Vec<T>, CurioError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_rows(&path))
            .await
            .map_err(|e| CurioError::Internal(format!("journal read task failed: {e}")))?
    }
}

fn append_row<T: Serialize>(path: &Path, record: &T) -> Result<(), CurioError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| CurioError::store_write(path, e))?;
    }
    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CurioError::store_write(path, e))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer
        .serialize(record)
        .map_err(|e| CurioError::store_write(path, e))?;
    writer
        .flush()
        .map_err(|e| CurioError::store_write(path, e))
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CurioError> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => match e.kind() {
            csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            _ => return Err(CurioError::storage(e)),
        },
    };
    Ok(reader
        .deserialize::<T>()
        .filter_map(|row| match row {
            Ok(row) => Some(row),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed journal row");
                None
            }
        })
        .collect())
}
