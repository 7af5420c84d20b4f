//! dispatchator: claims ready tickets and keeps one coding agent per ticket
//! running in a tmux session.
//!
//! ## Subcommands
//!
//! - `run` (default): start the reconciliation loop and the operator TUI
//! - `check`: resolve config, credentials and agent CLIs, print them, exit

mod app;
mod logging;
mod tui;

use app::{Resolved, Runtime};
use clap::{Parser, Subcommand};
use dispatch_core::DispatchConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dispatchator")]
#[command(about = "Dispatch tracker tickets to coding agents in tmux")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./dispatchator.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatch loop with the operator console
    Run,

    /// Validate configuration and credentials without starting anything
    Check,
}

fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);
    let _logging_guard = logging::init(matches!(command, Commands::Check));

    let resolved = DispatchConfig::load(cli.config.as_deref()).and_then(Resolved::from_config);
    let resolved = match resolved {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            eprintln!("dispatchator: {e}");
            std::process::exit(1);
        }
    };

    match command {
        Commands::Check => {
            for line in resolved.describe() {
                println!("{line}");
            }
        }
        Commands::Run => {
            let runtime = match Runtime::start(resolved) {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!(error = %e, "Startup failed");
                    eprintln!("dispatchator: {e}");
                    std::process::exit(1);
                }
            };
            let result = tui::run(&runtime);
            runtime.shutdown();
            if let Err(err) = result {
                eprintln!("Error: {err:?}");
                std::process::exit(1);
            }
        }
    }
}
