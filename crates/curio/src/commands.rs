// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot subcommands: `ask`, `organize`, `reindex`, `config show`.

use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use curio_agent::{AskRequest, Assistant, install_signal_handler};
use curio_config::CurioConfig;
use curio_core::CurioError;
use curio_openai::{OpenAiEmbedder, OpenAiProvider};
use tracing::info;

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to answer.
    pub question: String,

    /// Conversation the question belongs to.
    #[arg(long, default_value = "cli")]
    pub conversation: String,

    /// Do not learn from this exchange.
    #[arg(long)]
    pub no_update: bool,

    /// Skip context analysis and send the question alone.
    #[arg(long)]
    pub no_context: bool,

    /// Maximum characters of conversation context.
    #[arg(long)]
    pub max_context: Option<usize>,

    /// Wait for curation and report the knowledge file written.
    #[arg(long)]
    pub wait: bool,
}

/// Builds the assistant against the configured OpenAI-compatible endpoint.
pub async fn open_assistant(config: CurioConfig) -> Result<Assistant, CurioError> {
    let provider = Arc::new(OpenAiProvider::from_config(&config.llm)?);
    let embedder = Arc::new(OpenAiEmbedder::from_config(&config.llm)?);
    Assistant::open(config, provider, embedder).await
}

pub async fn run_ask(config: CurioConfig, args: AskArgs) -> Result<(), CurioError> {
    let assistant = open_assistant(config).await?;
    let signal = install_signal_handler();

    let mut settings = assistant.default_settings();
    settings.auto_update_knowledge &= !args.no_update;
    settings.enable_context_analysis = !args.no_context;
    settings.await_curation = args.wait;
    if let Some(max) = args.max_context {
        settings.max_context_length = max;
    }
    let request = AskRequest {
        user_input: args.question,
        conversation_id: args.conversation,
        settings,
    };

    let result = tokio::select! {
        result = assistant.ask(request) => result,
        _ = signal.cancelled() => Err(CurioError::Internal("interrupted".into())),
    };
    match result {
        Ok(response) => {
            println!("{}", response.answer);
            if let Some(path) = response.updated_knowledge_file {
                eprintln!("{}", format!("knowledge updated: {}", path.display()).dimmed());
            }
        }
        Err(e) => {
            assistant.shutdown().await;
            return Err(e);
        }
    }

    // Let queued curation finish before the process exits.
    assistant.shutdown().await;
    Ok(())
}

pub async fn run_organize(config: CurioConfig) -> Result<(), CurioError> {
    let assistant = open_assistant(config).await?;
    let report = assistant.organize_knowledge_base().await;
    assistant.shutdown().await;

    let report = report?;
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| CurioError::Internal(format!("failed to serialize report: {e}")))?;
    println!("{json}");
    Ok(())
}

pub async fn run_reindex(config: CurioConfig) -> Result<(), CurioError> {
    let assistant = open_assistant(config).await?;
    let index = assistant.refresh_index().await;
    assistant.shutdown().await;

    let index = index?;
    info!(entries = index.len(), "index refreshed");
    println!("index current: {} passages", index.len());
    Ok(())
}

/// Prints the effective configuration with the API key masked.
pub fn show_config(config: &CurioConfig) -> Result<(), CurioError> {
    println!("{}", render_config(config)?);
    Ok(())
}

fn render_config(config: &CurioConfig) -> Result<String, CurioError> {
    let mut shown = config.clone();
    if shown.llm.api_key.is_some() {
        shown.llm.api_key = Some("********".to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| CurioError::Internal(format!("failed to render config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_masked() {
        let mut config = CurioConfig::default();
        config.llm.api_key = Some("sk-secret".into());
        let rendered = render_config(&config).unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[llm]"));
    }
}
