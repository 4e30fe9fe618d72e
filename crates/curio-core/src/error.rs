// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Curio assistant.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Curio crates.
#[derive(Debug, Error)]
pub enum CurioError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage read errors (missing directory, unreadable file, decode failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A knowledge file, index, or log write failed.
    #[error("failed to write {}: {source}", path.display())]
    StoreWrite {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM or embedding provider errors (transport failure, server error).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The upstream provider rejected the call for rate limiting.
    #[error("rate limited by upstream provider")]
    RateLimited { retry_after: Option<Duration> },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The upstream returned something that could not be interpreted.
    #[error("invalid response from upstream: {0}")]
    InvalidResponse(String),

    /// No queryable vector index exists and one could not be built.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// A compare-and-swap replace found a newer revision than expected.
    #[error("merge conflict on topic `{topic}`: expected revision {expected}, found {found}")]
    MergeConflict {
        topic: String,
        expected: u64,
        found: u64,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CurioError {
    /// Whether this error is a transient upstream failure worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CurioError::RateLimited { .. } | CurioError::Timeout { .. } | CurioError::Provider { .. }
        )
    }

    /// Wraps an I/O or codec error raised while reading stored state.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CurioError::Storage {
            source: Box::new(err),
        }
    }

    /// Wraps an error raised while writing to `path`.
    pub fn store_write(
        path: impl Into<PathBuf>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CurioError::StoreWrite {
            path: path.into(),
            source: Box::new(err),
        }
    }
}
