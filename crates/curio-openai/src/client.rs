// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible APIs.
//!
//! Maps HTTP failures onto [`CurioError`] so callers can tell transient
//! upstream trouble (429, 5xx, timeouts) from permanent rejections.
//! Retrying is left to the caller's retry policy.

use std::time::Duration;

use curio_core::CurioError;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use tracing::debug;

use crate::sse;
use crate::types::{
    ApiErrorResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
};

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClient {
    /// Creates a client for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// `api_key` may be `None` for local servers that do not authenticate.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, CurioError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| CurioError::Config(format!("invalid API key header value: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CurioError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /chat/completions`. A streaming request is collected into a
    /// single response.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, CurioError> {
        let response = self.post("/chat/completions", request).await?;
        if request.stream {
            return sse::collect_chat_stream(response).await;
        }
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body)
            .map_err(|e| CurioError::InvalidResponse(format!("failed to parse chat response: {e}")))
    }

    /// `POST /embeddings`.
    pub async fn embeddings(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse, CurioError> {
        let response = self.post("/embeddings", request).await?;
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| {
            CurioError::InvalidResponse(format!("failed to parse embeddings response: {e}"))
        })
    }

    async fn post<T: serde::Serialize>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<reqwest::Response, CurioError> {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        debug!(status = %status, endpoint, "response received");
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body, retry_after))
    }

    pub(crate) fn transport_error(&self, e: reqwest::Error) -> CurioError {
        if e.is_timeout() {
            CurioError::Timeout {
                duration: self.timeout,
            }
        } else {
            CurioError::Provider {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }
}

/// Maps a non-success status onto the error taxonomy.
fn status_error(status: StatusCode, body: &str, retry_after: Option<Duration>) -> CurioError {
    let detail = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status.as_u16() {
        429 => CurioError::RateLimited { retry_after },
        401 | 403 => CurioError::Config(format!("API rejected credentials ({status}): {detail}")),
        500..=599 => CurioError::Provider {
            message: format!("API returned {status}: {detail}"),
            source: None,
        },
        _ => CurioError::InvalidResponse(format!("API returned {status}: {detail}")),
    }
}
