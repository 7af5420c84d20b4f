//! tmux-backed [`Launcher`] and [`WindowSource`].
//!
//! Every call is a structured `tmux` argument list. A missing binary, a
//! missing session or a non-zero exit all read as "nothing there".

use crate::error::{DispatchError, Result};
use crate::launcher::{Launcher, WindowSource};
use crate::provider::{ProviderRegistry, SpawnRequest};
use crate::types::WorkItem;
use crate::window::{parse_window_list, AgentIdRule, WindowEntry, AGENT_ID_OPTION, WINDOW_LIST_FORMAT};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Command;

pub const AGENT_ID_ENV: &str = "DISPATCH_AGENT_ID";
pub const MARKER_DIR_ENV: &str = "DISPATCH_MARKER_DIR";

#[derive(Debug, Clone)]
pub struct TmuxLauncher {
    session: String,
    rule: AgentIdRule,
    providers: ProviderRegistry,
    working_dir: PathBuf,
    projects: BTreeMap<String, PathBuf>,
    marker_dir: PathBuf,
}

impl TmuxLauncher {
    pub fn new(
        session: impl Into<String>,
        rule: AgentIdRule,
        providers: ProviderRegistry,
        working_dir: PathBuf,
        marker_dir: PathBuf,
    ) -> Self {
        Self {
            session: session.into(),
            rule,
            providers,
            working_dir,
            projects: BTreeMap::new(),
            marker_dir,
        }
    }

    pub fn with_projects(mut self, projects: BTreeMap<String, PathBuf>) -> Self {
        self.projects = projects;
        self
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn has_session(&self) -> bool {
        run_tmux(["has-session", "-t", self.session.as_str()]).is_some()
    }

    fn window_target(&self, agent_id: &str) -> String {
        // `=` forces an exact name match instead of tmux's prefix matching.
        format!("{}:={}", self.session, agent_id)
    }

    fn project_dir(&self, item: &WorkItem) -> Option<PathBuf> {
        let project = item.profile.project.as_deref()?;
        let dir = self
            .projects
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(project))
            .map(|(_, dir)| dir.clone());
        if dir.is_none() {
            tracing::warn!(agent_id = %item.id, project, "Unknown project routing key");
        }
        dir
    }

    /// Full `tmux new-window` argument list for an item.
    pub fn new_window_args(&self, item: &WorkItem) -> Result<Vec<String>> {
        let request = SpawnRequest::for_item(item, &self.working_dir, self.project_dir(item));
        let command = self.providers.command_for(item, &request)?;

        let mut args = vec![
            "new-window".to_string(),
            "-d".to_string(),
            "-t".to_string(),
            format!("{}:", self.session),
            "-n".to_string(),
            item.id.clone(),
            "-c".to_string(),
            self.working_dir.display().to_string(),
            "-e".to_string(),
            format!("{AGENT_ID_ENV}={}", item.id),
            "-e".to_string(),
            format!("{MARKER_DIR_ENV}={}", self.marker_dir.display()),
        ];
        args.extend(command);
        Ok(args)
    }
}

impl WindowSource for TmuxLauncher {
    fn list_windows(&self) -> Vec<WindowEntry> {
        run_tmux(["list-windows", "-t", self.session.as_str(), "-F", WINDOW_LIST_FORMAT])
            .map(|output| parse_window_list(&output, &self.rule))
            .unwrap_or_default()
    }

    fn active_window(&self) -> Option<String> {
        let format = format!("#{{window_name}}\t#{{{AGENT_ID_OPTION}}}");
        let output = run_tmux([
            "display-message",
            "-p",
            "-t",
            self.session.as_str(),
            format.as_str(),
        ])?;
        let line = output.lines().next()?;
        let mut parts = line.splitn(2, '\t');
        let name = parts.next().unwrap_or_default();
        let tag = parts.next().map(str::trim).filter(|value| !value.is_empty());
        self.rule.derive(name, tag)
    }
}

impl Launcher for TmuxLauncher {
    fn spawn(&self, item: &WorkItem) -> Result<Option<String>> {
        if !self.has_session() {
            tracing::debug!(session = %self.session, "Agent session not ready");
            return Ok(None);
        }
        if self.list_windows().iter().any(|entry| entry.agent_id.as_deref() == Some(item.id.as_str())) {
            return Ok(Some(item.id.clone()));
        }

        let args = self.new_window_args(item)?;
        tracing::info!(agent_id = %item.id, command = ?&args[12..], "Spawning agent window");
        let output = Command::new("tmux")
            .args(&args)
            .output()
            .map_err(|source| DispatchError::Io {
                context: "running tmux new-window".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(DispatchError::CommandFailed {
                command: "tmux new-window".to_string(),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let target = self.window_target(&item.id);
        if run_tmux(["set-option", "-w", "-t", target.as_str(), AGENT_ID_OPTION, item.id.as_str()])
            .is_none()
        {
            tracing::warn!(agent_id = %item.id, "Could not tag agent window");
        }
        Ok(Some(item.id.clone()))
    }

    fn kill(&self, agent_id: &str) -> bool {
        let target = self.window_target(agent_id);
        run_tmux(["kill-window", "-t", target.as_str()]).is_some()
    }

    fn kill_window(&self, index: u32) -> bool {
        let target = format!("{}:{}", self.session, index);
        run_tmux(["kill-window", "-t", target.as_str()]).is_some()
    }

    fn focus(&self, agent_id: &str) {
        let target = self.window_target(agent_id);
        if run_tmux(["select-window", "-t", target.as_str()]).is_none() {
            tracing::debug!(agent_id, "select-window failed");
        }
    }

    fn set_title(&self, agent_id: &str, title: &str) {
        let target = self.window_target(agent_id);
        if run_tmux(["select-pane", "-t", target.as_str(), "-T", title]).is_none() {
            tracing::debug!(agent_id, "select-pane -T failed");
        }
    }
}

/// Runs tmux and returns stdout on success, `None` on any failure.
fn run_tmux<I, S>(args: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    match Command::new("tmux").args(args).output() {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).to_string())
        }
        Ok(_) | Err(_) => None,
    }
}
