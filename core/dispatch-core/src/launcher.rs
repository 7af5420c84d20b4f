//! Seams to the terminal multiplexer.
//!
//! [`WindowSource`] is the read side sampled by the window poller;
//! [`Launcher`] is the write side driven by the launcher worker. Both must
//! treat every external failure as best-effort: listings come back empty and
//! kills of already-gone windows report `false`.

use crate::error::Result;
use crate::types::WorkItem;
use crate::window::{WindowEntry, WindowSnapshot};
use chrono::Utc;
use std::sync::Arc;

pub trait WindowSource: Send + Sync {
    /// Windows of the agent session; empty when the session does not exist.
    fn list_windows(&self) -> Vec<WindowEntry>;

    /// Agent id of the session's current window, if it is an agent window.
    fn active_window(&self) -> Option<String>;

    fn snapshot(&self) -> WindowSnapshot {
        let captured_at = Utc::now();
        let entries = self.list_windows();
        if entries.is_empty() {
            return WindowSnapshot::empty(captured_at);
        }
        WindowSnapshot::from_entries(captured_at, entries, self.active_window())
    }
}

impl<T: WindowSource + ?Sized> WindowSource for Arc<T> {
    fn list_windows(&self) -> Vec<WindowEntry> {
        (**self).list_windows()
    }

    fn active_window(&self) -> Option<String> {
        (**self).active_window()
    }

    fn snapshot(&self) -> WindowSnapshot {
        (**self).snapshot()
    }
}

pub trait Launcher: Send + Sync {
    /// Starts an agent window for `item`. `Ok(None)` means the session is not
    /// ready yet; an already-running window returns its id without spawning.
    fn spawn(&self, item: &WorkItem) -> Result<Option<String>>;

    fn kill(&self, agent_id: &str) -> bool;

    fn kill_window(&self, index: u32) -> bool;

    fn focus(&self, agent_id: &str);

    fn set_title(&self, agent_id: &str, title: &str);
}

impl<T: Launcher + ?Sized> Launcher for Arc<T> {
    fn spawn(&self, item: &WorkItem) -> Result<Option<String>> {
        (**self).spawn(item)
    }

    fn kill(&self, agent_id: &str) -> bool {
        (**self).kill(agent_id)
    }

    fn kill_window(&self, index: u32) -> bool {
        (**self).kill_window(index)
    }

    fn focus(&self, agent_id: &str) {
        (**self).focus(agent_id)
    }

    fn set_title(&self, agent_id: &str, title: &str) {
        (**self).set_title(agent_id, title)
    }
}
