// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for hosted LLM text completion.

use async_trait::async_trait;

use crate::error::CurioError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse};

/// Stateless request/response text completion.
///
/// Implementations map upstream failures onto [`CurioError::RateLimited`],
/// [`CurioError::Timeout`], and [`CurioError::InvalidResponse`].
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response text.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, CurioError>;
}
