//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `serve` (default) -- answer messages read as JSON lines on stdin
//! - `command <text>...` -- run owner commands against the persisted state
//! - `stats` -- print response statistics
//! - `config show|path` -- inspect process settings
//! - `version` -- print build/version info

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Personal away-message autoresponder.
#[derive(Parser, Debug)]
#[command(
    name = "autoresponder",
    version = env!("CARGO_PKG_VERSION"),
    about = "Autoresponder: schedules, per-chat frequency caps and templates for away messages"
)]
pub struct Cli {
    /// Settings file (default: $AUTORESPONDER_CONFIG_PATH or the platform config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Read messages from stdin and write replies to stdout (default).
    Serve,

    /// Run one or more owner commands in order, e.g. `command "/reset" "/confirmreset"`.
    Command {
        /// Command lines, each starting with '/'.
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Print response statistics.
    Stats {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Inspect process settings.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Print the loaded settings as JSON.
    Show,

    /// Print the resolved settings file path.
    Path,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

use crate::autoreply::ResponseEngine;
use crate::channels::stdio::pump_messages;
use crate::channels::{MessageHandler, StdioTransport, Transport};
use crate::commands;
use crate::config::{self, Settings};
use crate::logging;
use crate::messages::{delivery_loop, Dispatcher};
use crate::responder::Responder;
use crate::store::{JsonFileStore, StateStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Parse settings, initialize logging and run the selected subcommand.
pub async fn run(cli: Cli) -> CliResult {
    let config_path = cli.config.clone().unwrap_or_else(config::get_config_path);
    let command = cli.command.unwrap_or(Command::Serve);

    match command {
        Command::Version => {
            handle_version();
            return Ok(());
        }
        Command::Config(ConfigCommand::Path) => {
            handle_config_path(&config_path);
            return Ok(());
        }
        _ => {}
    }

    let settings = config::load_settings(&config_path)?;
    logging::init_logging(&settings.log)?;

    match command {
        Command::Serve => handle_serve(&settings).await,
        Command::Command { text } => handle_command(&settings, &text),
        Command::Stats { json } => handle_stats(&settings, json),
        Command::Config(ConfigCommand::Show) => handle_config_show(&settings),
        Command::Config(ConfigCommand::Path) | Command::Version => Ok(()),
    }
}

fn open_engine(settings: &Settings) -> Result<Arc<ResponseEngine>, Box<dyn std::error::Error>> {
    let state_dir = settings.resolve_state_dir();
    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::open(&state_dir)?);
    let engine = ResponseEngine::open(store, settings.engine_options())?;
    Ok(Arc::new(engine))
}

/// Run the `serve` subcommand.
///
/// Stops when stdin closes and every queued reply has been sent, or on
/// Ctrl-C.
pub async fn handle_serve(settings: &Settings) -> CliResult {
    let engine = open_engine(settings)?;
    let dispatcher = Arc::new(Dispatcher::new());
    let transport: Arc<dyn Transport> = Arc::new(StdioTransport::new());
    let responder: Arc<dyn MessageHandler> = Arc::new(Responder::new(
        engine.clone(),
        dispatcher.clone(),
        transport.clone(),
    ));
    let shutdown = CancellationToken::new();

    let worker = tokio::spawn(delivery_loop(
        dispatcher.clone(),
        engine,
        transport,
        shutdown.clone(),
    ));

    tracing::info!(
        state_dir = %settings.resolve_state_dir().display(),
        "autoresponder serving on stdio"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = pump_messages(stdin, responder, shutdown.clone()) => {
            let accepted = result?;
            tracing::info!(accepted, "input closed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(
                dropped = dispatcher.pending(),
                "interrupt received, shutting down"
            );
            shutdown.cancel();
        }
    }

    if !shutdown.is_cancelled() {
        tokio::select! {
            _ = wait_for_drain(&dispatcher) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!(
                    dropped = dispatcher.pending(),
                    "interrupt received, dropping queued replies"
                );
            }
        }
        shutdown.cancel();
    }

    worker.await?;
    Ok(())
}

async fn wait_for_drain(dispatcher: &Dispatcher) {
    while dispatcher.pending() > 0 {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    // let the last popped batch finish sending
    tokio::time::sleep(Duration::from_millis(200)).await;
}

/// Run the `command <text>...` subcommand.
pub fn handle_command(settings: &Settings, lines: &[String]) -> CliResult {
    let engine = open_engine(settings)?;
    let mut failed = false;
    for line in lines {
        let outcome = commands::handle(&engine, line, Utc::now());
        println!("{}", outcome.reply);
        failed |= !outcome.ok;
    }
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Run the `stats` subcommand.
pub fn handle_stats(settings: &Settings, json: bool) -> CliResult {
    let engine = open_engine(settings)?;
    let summary = engine.stats(Utc::now());
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", commands::format_stats(&summary));
    }
    Ok(())
}

/// Run the `config show` subcommand.
pub fn handle_config_show(settings: &Settings) -> CliResult {
    let mut value = serde_json::to_value(settings)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "resolvedStateDir".to_string(),
            serde_json::Value::String(settings.resolve_state_dir().display().to_string()),
        );
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path(path: &std::path::Path) {
    println!("{}", path.display());
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("autoresponder {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("AUTORESPONDER_BUILD_DATE"));
    println!("  Git commit: {}", env!("AUTORESPONDER_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_no_args_defaults_to_none() {
        let cli = Cli::try_parse_from(["autoresponder"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_serve_subcommand() {
        let cli = Cli::try_parse_from(["autoresponder", "serve"]).unwrap();
        assert_eq!(cli.command, Some(Command::Serve));
    }

    #[test]
    fn test_cli_command_collects_lines() {
        let cli =
            Cli::try_parse_from(["autoresponder", "command", "/reset", "/confirmreset"]).unwrap();
        match cli.command {
            Some(Command::Command { ref text }) => {
                assert_eq!(text, &vec!["/reset".to_string(), "/confirmreset".to_string()]);
            }
            other => panic!("Expected Command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_command_requires_text() {
        assert!(Cli::try_parse_from(["autoresponder", "command"]).is_err());
    }

    #[test]
    fn test_cli_stats_json_flag() {
        let cli = Cli::try_parse_from(["autoresponder", "stats", "--json"]).unwrap();
        assert_eq!(cli.command, Some(Command::Stats { json: true }));
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli =
            Cli::try_parse_from(["autoresponder", "config", "show", "--config", "/tmp/a.json5"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.json5")));
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Show)));
    }

    #[test]
    fn test_cli_config_path() {
        let cli = Cli::try_parse_from(["autoresponder", "config", "path"]).unwrap();
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Path)));
    }

    #[test]
    fn test_cli_version_subcommand() {
        let cli = Cli::try_parse_from(["autoresponder", "version"]).unwrap();
        assert_eq!(cli.command, Some(Command::Version));
    }

    #[test]
    fn test_cli_unknown_subcommand_fails() {
        assert!(Cli::try_parse_from(["autoresponder", "start"]).is_err());
    }
}
