//! Console read-model.
//!
//! Holds the latest [`StoreSnapshot`] plus selection state and turns key
//! presses into [`Intent`]s for the engine. Out-of-range selections and
//! actions without a target are ignored.

use crate::event::Intent;
use crate::store::StoreSnapshot;
use crate::types::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    Kill,
    Done,
}

impl ConsoleAction {
    pub const ALL: [ConsoleAction; 2] = [ConsoleAction::Kill, ConsoleAction::Done];

    pub fn label(&self) -> &'static str {
        match self {
            ConsoleAction::Kill => "kill",
            ConsoleAction::Done => "done",
        }
    }
}

#[derive(Debug, Default)]
pub struct Console {
    snapshot: StoreSnapshot,
    selected: usize,
    show_actions: bool,
    action_index: usize,
}

impl Console {
    pub fn new(snapshot: StoreSnapshot) -> Self {
        let mut console = Self::default();
        console.update(snapshot);
        console
    }

    /// Swaps in a newer snapshot, keeping the same item selected when it survives.
    pub fn update(&mut self, snapshot: StoreSnapshot) {
        let selected_id = self.selected_item().map(|item| item.id.clone());
        self.snapshot = snapshot;
        if let Some(position) = selected_id.and_then(|id| {
            self.snapshot
                .work_items
                .iter()
                .position(|item| item.id == id)
        }) {
            self.selected = position;
        }
        let len = self.snapshot.work_items.len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
        if len == 0 {
            self.show_actions = false;
        }
    }

    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.snapshot
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_item(&self) -> Option<&WorkItem> {
        self.snapshot.work_items.get(self.selected)
    }

    pub fn select_next(&mut self) {
        let len = self.snapshot.work_items.len();
        if len == 0 {
            return;
        }
        self.selected = (self.selected + 1) % len;
    }

    pub fn select_prev(&mut self) {
        let len = self.snapshot.work_items.len();
        if len == 0 {
            return;
        }
        self.selected = (self.selected + len - 1) % len;
    }

    pub fn focus_selected(&self) -> Option<Intent> {
        let item = self.selected_item()?;
        self.snapshot
            .is_attached(&item.id)
            .then(|| Intent::Focus(item.id.clone()))
    }

    pub fn kill_selected(&self) -> Option<Intent> {
        let item = self.selected_item()?;
        self.snapshot
            .is_attached(&item.id)
            .then(|| Intent::Kill(item.id.clone()))
    }

    pub fn mark_selected_done(&self) -> Option<Intent> {
        self.selected_item().map(|item| Intent::Done(item.id.clone()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Action bar
    // ─────────────────────────────────────────────────────────────────────

    pub fn show_actions(&self) -> bool {
        self.show_actions
    }

    pub fn action_index(&self) -> usize {
        self.action_index
    }

    pub fn toggle_actions(&mut self) {
        if self.snapshot.work_items.is_empty() {
            return;
        }
        self.show_actions = !self.show_actions;
        self.action_index = 0;
    }

    pub fn next_action(&mut self) {
        self.action_index = (self.action_index + 1) % ConsoleAction::ALL.len();
    }

    pub fn prev_action(&mut self) {
        let len = ConsoleAction::ALL.len();
        self.action_index = (self.action_index + len - 1) % len;
    }

    /// Runs the highlighted action and closes the bar.
    pub fn execute_action(&mut self) -> Option<Intent> {
        if !self.show_actions {
            return None;
        }
        let intent = match ConsoleAction::ALL.get(self.action_index)? {
            ConsoleAction::Kill => self.kill_selected(),
            ConsoleAction::Done => self.mark_selected_done(),
        };
        if intent.is_some() {
            self.show_actions = false;
        }
        intent
    }

    // ─────────────────────────────────────────────────────────────────────
    // Header counts
    // ─────────────────────────────────────────────────────────────────────

    pub fn busy(&self) -> usize {
        self.snapshot.busy_count()
    }

    pub fn queued(&self) -> usize {
        self.snapshot.queued_count()
    }

    pub fn max_agents(&self) -> usize {
        self.snapshot.max_agents
    }
}
