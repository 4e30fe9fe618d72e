// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collects a streamed chat completion into a single response.

use curio_core::CurioError;
use eventsource_stream::Eventsource;
use futures::stream::StreamExt;

use crate::types::{ChatChunk, ChatResponse, Choice, ResponseMessage, Usage};

/// Marker the server sends after the last chunk.
const DONE: &str = "[DONE]";

/// Reads `data:` events until `[DONE]` (or end of body), concatenating
/// `choices[0].delta.content`.
pub async fn collect_chat_stream(response: reqwest::Response) -> Result<ChatResponse, CurioError> {
    let mut events = response.bytes_stream().eventsource();

    let mut id = String::new();
    let mut model = String::new();
    let mut content = String::new();
    let mut finish_reason = None;
    let mut usage: Option<Usage> = None;

    while let Some(event) = events.next().await {
        let event = event.map_err(|e| CurioError::Provider {
            message: format!("stream interrupted: {e}"),
            source: None,
        })?;
        let data = event.data.trim();
        if data == DONE {
            break;
        }
        if data.is_empty() {
            continue;
        }

        let chunk: ChatChunk = serde_json::from_str(data).map_err(|e| {
            CurioError::InvalidResponse(format!("failed to parse stream chunk: {e}"))
        })?;
        if id.is_empty() {
            id = chunk.id;
        }
        if model.is_empty() {
            model = chunk.model;
        }
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(text) = choice.delta.content {
                content.push_str(&text);
            }
            if choice.finish_reason.is_some() {
                finish_reason = choice.finish_reason;
            }
        }
    }

    Ok(ChatResponse {
        id,
        model,
        choices: vec![Choice {
            message: ResponseMessage {
                content: Some(content),
            },
            finish_reason,
        }],
        usage,
    })
}
