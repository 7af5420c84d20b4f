//! Slot allocator.
//!
//! Decides one step at a time; the engine applies each decision and asks
//! again until nothing is left to do. Reconnects always come first and never
//! consume a claim. Claims follow tracker rank strictly.

use crate::store::Store;
use crate::types::WorkItem;
use crate::window::WindowSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A live window already exists for this unattached item.
    Reconnect(String),
    /// Optimistically attach and spawn.
    Claim(WorkItem),
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    paused: bool,
}

impl Scheduler {
    /// Stops claiming until the next window poll. Set when the launcher
    /// reported the session missing or a spawn failed.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn next_decision(&self, store: &Store, live: &WindowSnapshot) -> Option<Decision> {
        if let Some(item) = store.unattached().find(|item| live.contains_agent(&item.id)) {
            return Some(Decision::Reconnect(item.id.clone()));
        }

        if self.paused || store.slots() <= 0 {
            return None;
        }
        let settled = store.settled_parents();
        store
            .queued()
            .into_iter()
            .find(|item| !settled.contains(&item.id))
            .map(|item| Decision::Claim(item.clone()))
    }
}
