// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Curio - a question-answering assistant that curates what it learns.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod shell;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use curio_config::{ConfigError, CurioConfig};

/// Curio - a question-answering assistant that curates what it learns.
#[derive(Parser, Debug)]
#[command(name = "curio", version, about, long_about = None)]
struct Cli {
    /// Load this config file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer one question.
    Ask(commands::AskArgs),
    /// Launch an interactive chat session.
    Chat {
        /// Conversation to continue; a new one is started by default.
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Merge related knowledge files and print the report as JSON.
    Organize,
    /// Bring the vector index up to date with the knowledge base.
    Reindex,
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate the configuration and exit.
    Check,
    /// Print the effective configuration as TOML.
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            curio_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Commands::Ask(args) => commands::run_ask(config, args).await,
        Commands::Chat { conversation } => shell::run_chat(config, conversation).await,
        Commands::Organize => commands::run_organize(config).await,
        Commands::Reindex => commands::run_reindex(config).await,
        Commands::Config { action } => match action {
            ConfigAction::Check => {
                println!("{}", "config OK".green());
                Ok(())
            }
            ConfigAction::Show => commands::show_config(&config),
        },
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<CurioConfig, Vec<ConfigError>> {
    match path {
        Some(path) => curio_config::load_and_validate_path(path),
        None => curio_config::load_and_validate(),
    }
}

/// Crates whose spans and events follow `agent.log_level`.
const LOG_TARGETS: &[&str] = &[
    "curio",
    "curio_agent",
    "curio_context",
    "curio_convlog",
    "curio_knowledge",
    "curio_openai",
    "curio_reflect",
    "curio_retrieval",
];

/// Initializes the tracing subscriber. `RUST_LOG` wins when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_directives(log_level: &str) -> String {
    let mut directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={log_level}"))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_flags_parse() {
        let cli = Cli::try_parse_from([
            "curio",
            "ask",
            "What's my favorite color?",
            "--conversation",
            "c1",
            "--no-update",
            "--max-context",
            "500",
            "--wait",
        ])
        .unwrap();
        let Commands::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(args.question, "What's my favorite color?");
        assert_eq!(args.conversation, "c1");
        assert!(args.no_update);
        assert!(!args.no_context);
        assert_eq!(args.max_context, Some(500));
        assert!(args.wait);
    }

    #[test]
    fn directives_cover_every_crate() {
        let d = default_directives("debug");
        assert!(d.starts_with("curio=debug,curio_agent=debug"));
        assert!(d.ends_with(",warn"));
    }

    #[test]
    #[serial_test::serial]
    fn binary_loads_config_defaults() {
        let config = curio_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.agent.name, "curio");
    }
}
