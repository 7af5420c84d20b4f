//! Mirrored multiplexer window state.
//!
//! A [`WindowSnapshot`] is an immutable point-in-time view of one tmux session.
//! Consecutive snapshots are diffed by [`crate::normalize::diff_windows`].

use crate::error::{DispatchError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Window option the launcher tags agent windows with.
pub const AGENT_ID_OPTION: &str = "@dispatch_agent_id";

/// `list-windows -F` format. The pane title goes last because it may contain tabs.
pub const WINDOW_LIST_FORMAT: &str =
    "#{window_index}\t#{window_name}\t#{@dispatch_agent_id}\t#{pane_title}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEntry {
    pub index: u32,
    pub name: String,
    /// `None` for non-agent windows such as the session's shell.
    pub agent_id: Option<String>,
    pub pane_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub captured_at: DateTime<Utc>,
    pub active_agent_id: Option<String>,
    pub entries: Vec<WindowEntry>,
    /// Pane title per agent id.
    pub titles: BTreeMap<String, String>,
    /// The designated shell window. Defaults to the lowest index; the poller
    /// pins it to the first one seen for the lifetime of the session.
    pub base_index: Option<u32>,
}

impl WindowSnapshot {
    pub fn empty(captured_at: DateTime<Utc>) -> Self {
        Self {
            captured_at,
            active_agent_id: None,
            entries: Vec::new(),
            titles: BTreeMap::new(),
            base_index: None,
        }
    }

    pub fn from_entries(
        captured_at: DateTime<Utc>,
        mut entries: Vec<WindowEntry>,
        active_agent_id: Option<String>,
    ) -> Self {
        entries.sort_by_key(|entry| entry.index);
        let titles = entries
            .iter()
            .filter_map(|entry| {
                entry
                    .agent_id
                    .as_ref()
                    .map(|id| (id.clone(), entry.pane_title.clone()))
            })
            .collect();
        let base_index = entries.first().map(|entry| entry.index);
        Self {
            captured_at,
            active_agent_id,
            entries,
            titles,
            base_index,
        }
    }

    pub fn agent_ids(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|entry| entry.agent_id.clone())
            .collect()
    }

    pub fn contains_agent(&self, agent_id: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.agent_id.as_deref() == Some(agent_id))
    }

    /// Drops an agent's window from this view after the engine killed it, so
    /// the next scheduling pass does not mistake it for a live window.
    pub fn forget_agent(&mut self, agent_id: &str) {
        self.entries
            .retain(|entry| entry.agent_id.as_deref() != Some(agent_id));
        self.titles.remove(agent_id);
        if self.active_agent_id.as_deref() == Some(agent_id) {
            self.active_agent_id = None;
        }
    }

    pub fn forget_index(&mut self, index: u32) {
        self.entries.retain(|entry| entry.index != index);
    }
}

/// Derives an agent id from a window: the side-channel tag wins, otherwise the
/// window name when it matches the ticket key pattern.
#[derive(Debug, Clone)]
pub struct AgentIdRule {
    pattern: Regex,
}

impl AgentIdRule {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|err| {
            DispatchError::ConfigInvalid(format!("agent id pattern '{pattern}': {err}"))
        })?;
        Ok(Self { pattern })
    }

    pub fn derive(&self, name: &str, tag: Option<&str>) -> Option<String> {
        if let Some(tag) = tag.map(str::trim).filter(|tag| !tag.is_empty()) {
            return Some(tag.to_string());
        }
        let name = name.trim();
        self.pattern.is_match(name).then(|| name.to_string())
    }
}

impl Default for AgentIdRule {
    fn default() -> Self {
        Self {
            pattern: crate::patterns::RE_TICKET_KEY.clone(),
        }
    }
}

pub fn parse_window_list(output: &str, rule: &AgentIdRule) -> Vec<WindowEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(4, '\t');
            let index = parts.next()?.trim().parse::<u32>().ok()?;
            let name = parts.next().unwrap_or_default().trim().to_string();
            let tag = parts.next().map(str::trim).filter(|value| !value.is_empty());
            let pane_title = parts.next().unwrap_or_default().trim().to_string();
            Some(WindowEntry {
                index,
                agent_id: rule.derive(&name, tag),
                name,
                pane_title,
            })
        })
        .collect()
}
