//! dispatch-hook: lets an agent process report back to dispatchator.
//!
//! Called from inside an agent's tmux window, where the console has set
//! `DISPATCH_AGENT_ID` and `DISPATCH_MARKER_DIR`. Each subcommand writes or
//! removes one marker file; the console's watcher picks the change up.
//!
//! ## Subcommands
//!
//! - `state <STATUS>`: hook status (`working`, `waiting`, `idle`, `done`, ...)
//! - `title <TITLE>`: pane title shown in the console
//! - `kill`: ask the console to kill and respawn this agent
//! - `clear`: remove every marker for this agent

mod logging;

use clap::{Parser, Subcommand};
use dispatch_core::{markers::parse_marker_name, DispatchError, MarkerDir, MarkerKind, Result};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dispatch-hook")]
#[command(about = "Report agent status to dispatchator")]
#[command(version)]
struct Cli {
    /// Work item id of the calling agent
    #[arg(long, global = true, env = "DISPATCH_AGENT_ID")]
    agent_id: Option<String>,

    /// Marker directory watched by the console
    #[arg(long, global = true, env = "DISPATCH_MARKER_DIR", value_name = "PATH")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the agent's hook status
    State {
        #[arg(value_name = "STATUS")]
        status: String,
    },

    /// Write the agent's window title
    Title {
        #[arg(value_name = "TITLE", num_args = 1.., trailing_var_arg = true)]
        title: Vec<String>,
    },

    /// Request a kill and respawn
    Kill,

    /// Remove all markers for the agent
    Clear,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "dispatch-hook failed");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let agent_id = cli
        .agent_id
        .ok_or_else(|| {
            DispatchError::ConfigInvalid("DISPATCH_AGENT_ID is not set (pass --agent-id)".to_string())
        })?;
    validate_agent_id(&agent_id)?;
    let dir = cli
        .dir
        .unwrap_or_else(|| PathBuf::from(dispatch_core::DEFAULT_MARKER_DIR));
    let markers = MarkerDir::new(dir);
    apply(&markers, &agent_id, cli.command)
}

fn apply(markers: &MarkerDir, agent_id: &str, command: Commands) -> Result<()> {
    match command {
        Commands::State { status } => {
            let status = status.trim().to_lowercase();
            if status.is_empty() {
                return Err(DispatchError::ConfigInvalid("status must not be empty".to_string()));
            }
            markers.write(agent_id, MarkerKind::Status, &status)?;
            tracing::debug!(agent_id, status = %status, "Status marker written");
        }
        Commands::Title { title } => {
            let title = title.join(" ");
            let title = title.trim();
            if title.is_empty() {
                return Err(DispatchError::ConfigInvalid("title must not be empty".to_string()));
            }
            markers.write(agent_id, MarkerKind::Title, title)?;
            tracing::debug!(agent_id, title, "Title marker written");
        }
        Commands::Kill => {
            markers.write(agent_id, MarkerKind::Kill, "")?;
            tracing::info!(agent_id, "Kill requested");
        }
        Commands::Clear => {
            markers.clear_agent(agent_id);
            tracing::debug!(agent_id, "Markers cleared");
        }
    }
    Ok(())
}

/// The id becomes a file name, so it must round-trip through the marker pattern.
fn validate_agent_id(agent_id: &str) -> Result<()> {
    let file_name = format!("{agent_id}.{}", MarkerKind::Status.suffix());
    match parse_marker_name(&file_name) {
        Some((parsed, _)) if parsed == agent_id => Ok(()),
        _ => Err(DispatchError::ConfigInvalid(format!(
            "'{agent_id}' is not a valid agent id"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn state_is_normalized_before_writing() {
        let temp_dir = tempdir().unwrap();
        let markers = MarkerDir::new(temp_dir.path());
        apply(
            &markers,
            "KAN-7",
            Commands::State {
                status: " Waiting ".to_string(),
            },
        )
        .unwrap();
        assert_eq!(markers.read_agent("KAN-7").status.as_deref(), Some("waiting"));
    }

    #[test]
    fn title_words_are_joined() {
        let temp_dir = tempdir().unwrap();
        let markers = MarkerDir::new(temp_dir.path());
        let title = ["Running", "tests"].map(str::to_string).to_vec();
        apply(&markers, "KAN-7", Commands::Title { title }).unwrap();
        assert_eq!(
            markers.read_agent("KAN-7").title.as_deref(),
            Some("Running tests")
        );
    }

    #[test]
    fn kill_then_clear() {
        let temp_dir = tempdir().unwrap();
        let markers = MarkerDir::new(temp_dir.path());
        apply(&markers, "KAN-7", Commands::Kill).unwrap();
        assert!(markers.marker_path("KAN-7", MarkerKind::Kill).exists());
        apply(&markers, "KAN-7", Commands::Clear).unwrap();
        assert!(!markers.marker_path("KAN-7", MarkerKind::Kill).exists());
    }

    #[test]
    fn rejects_path_like_ids() {
        assert!(validate_agent_id("KAN-7").is_ok());
        assert!(validate_agent_id("../KAN-7").is_err());
        assert!(validate_agent_id(".hidden").is_err());
        assert!(validate_agent_id("").is_err());
    }
}
