//! Orphan and crash reaper.
//!
//! Closes the loop on external state the engine did not cause. Crash recovery
//! is plain detach: the item goes back to the queue and the scheduler claims
//! it again like any other.

use crate::event::{DomainEvent, Effect};
use crate::markers::{MarkerDir, MarkerKind};
use crate::normalize::StaleTracker;
use crate::store::Store;
use crate::window::WindowSnapshot;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct Reaper {
    stale: StaleTracker,
}

impl Reaper {
    pub fn new(stale_cycles: u32) -> Self {
        Self {
            stale: StaleTracker::new(stale_cycles),
        }
    }

    /// Windows nobody owns are killed outright.
    pub fn orphan(&self, store: &mut Store, windows: &mut WindowSnapshot, index: u32) -> Effect {
        store.log("tmux", format!("🧹 window {index}: orphan, killing"));
        windows.forget_index(index);
        Effect::KillWindow(index)
    }

    /// Feeds one window snapshot into stale detection and returns a
    /// `StaleAgent` for every agent that has now been missing long enough.
    /// Agents whose spawn is still in flight are not counted.
    pub fn reap_stale(
        &mut self,
        store: &Store,
        snapshot: &WindowSnapshot,
        pending: &BTreeSet<String>,
    ) -> Vec<DomainEvent> {
        let watched: BTreeSet<String> = store
            .attached_ids()
            .into_iter()
            .filter(|id| !pending.contains(id))
            .collect();
        let stale = self.stale.observe(&watched, &snapshot.agent_ids());
        for event in &stale {
            if let DomainEvent::StaleAgent(id) = event {
                self.stale.forget(id);
            }
        }
        stale
    }

    /// Handles a kill marker. Acts only if this call consumed the file, so a
    /// duplicate watcher event does nothing.
    pub fn kill_requested(
        &mut self,
        store: &mut Store,
        markers: &MarkerDir,
        windows: &mut WindowSnapshot,
        id: &str,
    ) -> Vec<Effect> {
        if !markers.consume(id, MarkerKind::Kill) {
            return Vec::new();
        }
        self.kill(store, windows, id, "killed, will re-spawn")
    }

    /// Detaches and terminates without waiting for the window to disappear.
    pub fn kill(
        &mut self,
        store: &mut Store,
        windows: &mut WindowSnapshot,
        id: &str,
        reason: &str,
    ) -> Vec<Effect> {
        let attached = store.detach_agent(id);
        let live = windows.contains_agent(id);
        self.stale.forget(id);
        if !attached && !live {
            return Vec::new();
        }
        store.log("agent", format!("💀 {id}: {reason}"));
        windows.forget_agent(id);
        vec![Effect::Kill(id.to_string())]
    }

    /// Removes a work item for good: detach, drop markers, close the window.
    pub fn retire(
        &mut self,
        store: &mut Store,
        markers: &MarkerDir,
        windows: &mut WindowSnapshot,
        id: &str,
        reason: &str,
    ) -> Vec<Effect> {
        let live = windows.contains_agent(id) || store.is_attached(id);
        let removed = store.remove_work_item(id);
        markers.clear_agent(id);
        self.stale.forget(id);

        let mut effects = Vec::new();
        if live {
            windows.forget_agent(id);
            effects.push(Effect::Kill(id.to_string()));
        }
        if removed || live {
            store.log("work-item", format!("✅ {id}: {reason}"));
        }
        effects
    }
}
