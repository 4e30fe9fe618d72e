// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only conversation log, partitioned by calendar day.
//!
//! Each day gets one CSV file named `YYYY-MM-DD.csv` under the log
//! directory. Rows carry a process-wide monotonically increasing sequence
//! number that survives restarts.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use curio_core::{CurioError, Exchange};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const PARTITION_FORMAT: &str = "%Y-%m-%d";

/// One row of the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LogRecord {
    seq: u64,
    timestamp: DateTime<Utc>,
    conversation_id: String,
    user_input: String,
    model_response: String,
    context_used: String,
    knowledge_updated: bool,
    knowledge_file: String,
}

/// A logged exchange with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: u64,
    pub exchange: Exchange,
    /// Knowledge file written from this exchange, when known at log time.
    pub knowledge_file: Option<String>,
}

impl From<LogRecord> for LogEntry {
    fn from(r: LogRecord) -> Self {
        LogEntry {
            seq: r.seq,
            exchange: Exchange {
                conversation_id: r.conversation_id,
                timestamp: r.timestamp,
                user_input: r.user_input,
                model_response: r.model_response,
                context_used: r.context_used,
            },
            knowledge_file: (!r.knowledge_file.is_empty()).then_some(r.knowledge_file),
        }
    }
}

/// Durable, day-partitioned record of question/answer exchanges.
///
/// Appends are serialized, so for any conversation rows land in the order
/// their `append` calls complete.
#[derive(Clone)]
pub struct ConversationLog {
    dir: Arc<PathBuf>,
    next_seq: Arc<Mutex<u64>>,
}

impl ConversationLog {
    /// Opens (creating if needed) the log directory and resumes numbering
    /// after the highest sequence already on disk.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CurioError> {
        let dir = dir.into();
        let scan_dir = dir.clone();
        let last_seq = tokio::task::spawn_blocking(move || -> Result<u64, CurioError> {
            fs::create_dir_all(&scan_dir).map_err(|e| CurioError::store_write(&scan_dir, e))?;
            let mut max = 0;
            for (_, path) in partitions(&scan_dir)? {
                for record in read_partition(&path) {
                    max = max.max(record.seq);
                }
            }
            Ok(max)
        })
        .await
        .map_err(|e| CurioError::Internal(format!("log scan task failed: {e}")))??;

        debug!(dir = %dir.display(), last_seq, "conversation log opened");
        Ok(Self {
            dir: Arc::new(dir),
            next_seq: Arc::new(Mutex::new(last_seq + 1)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends an exchange and returns its sequence number.
    pub async fn append(&self, exchange: &Exchange) -> Result<u64, CurioError> {
        self.append_entry(exchange, None).await
    }

    /// Appends an exchange together with the knowledge file it produced.
    ///
    /// The partition is chosen from the exchange timestamp, so the first
    /// append after midnight (UTC) starts a new file.
    pub async fn append_entry(
        &self,
        exchange: &Exchange,
        knowledge_file: Option<&Path>,
    ) -> Result<u64, CurioError> {
        let mut next_seq = self.next_seq.lock().await;
        let seq = *next_seq;
        let record = LogRecord {
            seq,
            timestamp: exchange.timestamp,
            conversation_id: exchange.conversation_id.clone(),
            user_input: exchange.user_input.clone(),
            model_response: exchange.model_response.clone(),
            context_used: exchange.context_used.clone(),
            knowledge_updated: knowledge_file.is_some(),
            knowledge_file: knowledge_file
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        };
        let path = self.partition_path(exchange.timestamp.date_naive());

        tokio::task::spawn_blocking(move || write_record(&path, &record))
            .await
            .map_err(|e| CurioError::Internal(format!("log write task failed: {e}")))??;

        *next_seq += 1;
        debug!(seq, conversation_id = %exchange.conversation_id, "exchange logged");
        Ok(seq)
    }

    /// The most recent exchanges for a conversation, oldest first.
    pub async fn recent(
        &self,
        conversation_id: &str,
        max_entries: usize,
    ) -> Result<Vec<Exchange>, CurioError> {
        Ok(self
            .recent_entries(conversation_id, max_entries)
            .await?
            .into_iter()
            .map(|e| e.exchange)
            .collect())
    }

    /// Like [`recent`](Self::recent) but keeps sequence numbers and file references.
    pub async fn recent_entries(
        &self,
        conversation_id: &str,
        max_entries: usize,
    ) -> Result<Vec<LogEntry>, CurioError> {
        if max_entries == 0 {
            return Ok(Vec::new());
        }
        let dir = self.dir.clone();
        let conversation_id = conversation_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<LogEntry>, CurioError> {
            let mut newest_first = partitions(&dir)?;
            newest_first.reverse();

            let mut found: Vec<LogRecord> = Vec::new();
            for (_, path) in newest_first {
                let mut matching: Vec<LogRecord> = read_partition(&path)
                    .into_iter()
                    .filter(|r| r.conversation_id == conversation_id)
                    .collect();
                matching.append(&mut found);
                found = matching;
                if found.len() >= max_entries {
                    break;
                }
            }

            found.sort_by_key(|r| r.seq);
            let skip = found.len().saturating_sub(max_entries);
            Ok(found.into_iter().skip(skip).map(LogEntry::from).collect())
        })
        .await
        .map_err(|e| CurioError::Internal(format!("log read task failed: {e}")))?
    }

    fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.csv", date.format(PARTITION_FORMAT)))
    }
}

/// Partition files in date order, oldest first.
fn partitions(dir: &Path) -> Result<Vec<(NaiveDate, PathBuf)>, CurioError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CurioError::storage(e)),
    };

    let mut found: Vec<(NaiveDate, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let stem = path.file_stem()?.to_str()?;
            if path.extension()? != "csv" {
                return None;
            }
            let date = NaiveDate::parse_from_str(stem, PARTITION_FORMAT).ok()?;
            Some((date, path))
        })
        .collect();
    found.sort();
    Ok(found)
}

/// All decodable rows of one partition. Undecodable rows are skipped.
fn read_partition(path: &Path) -> Vec<LogRecord> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(r) => r,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable log partition");
            return Vec::new();
        }
    };

    reader
        .deserialize::<LogRecord>()
        .enumerate()
        .filter_map(|(row, result)| match result {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), row, error = %e, "skipping malformed log row");
                None
            }
        })
        .collect()
}

fn write_record(path: &Path, record: &LogRecord) -> Result<(), CurioError> {
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
    let file = writer
        .into_inner()
        .map_err(|e| CurioError::store_write(path, e.into_error()))?;
    file.sync_data()
        .map_err(|e| CurioError::store_write(path, e))
}
