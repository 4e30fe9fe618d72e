// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hook used by knowledge writers to request a vector index refresh.

use async_trait::async_trait;

use crate::error::CurioError;

/// Something that can bring a derived index up to date with the knowledge store.
#[async_trait]
pub trait IndexRefresher: Send + Sync {
    /// Rebuilds or incrementally updates the index. Returns once the new
    /// index is visible to readers.
    async fn refresh_index(&self) -> Result<(), CurioError>;
}
