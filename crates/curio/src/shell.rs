// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `curio chat` command implementation.
//!
//! Interactive REPL with a colored prompt and readline history. Every
//! line is one turn in the same conversation; curation runs in the
//! background and is drained on exit.

use colored::Colorize;
use curio_agent::{AskRequest, install_signal_handler};
use curio_config::CurioConfig;
use curio_core::CurioError;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::info;

use crate::commands::open_assistant;

pub async fn run_chat(config: CurioConfig, conversation: Option<String>) -> Result<(), CurioError> {
    let name = config.agent.name.clone();
    let assistant = open_assistant(config).await?;
    let signal = install_signal_handler();
    let conversation_id =
        conversation.unwrap_or_else(|| format!("chat-{}", uuid::Uuid::new_v4()));
    info!(conversation_id = %conversation_id, "chat session started");

    let mut rl = DefaultEditor::new()
        .map_err(|e| CurioError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", format!("{name} chat").bold().green());
    println!("Conversation {}", conversation_id.cyan());
    println!("Type {} to exit.\n", "/quit".yellow());

    let prompt = format!("{}> ", name.green());
    while !signal.is_cancelled() {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed == "/quit" || trimmed == "/exit" {
                    break;
                }
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                let request = AskRequest {
                    user_input: trimmed.to_string(),
                    conversation_id: conversation_id.clone(),
                    settings: assistant.default_settings(),
                };
                let result = tokio::select! {
                    result = assistant.ask(request) => result,
                    _ = signal.cancelled() => break,
                };
                match result {
                    Ok(response) => println!("{}\n", response.answer),
                    Err(e) => eprintln!("{}: {e}", "error".red()),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    println!("{}", "finishing background curation...".dimmed());
    assistant.shutdown().await;
    println!("{}", "goodbye".dimmed());
    Ok(())
}
