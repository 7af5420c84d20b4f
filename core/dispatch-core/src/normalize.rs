//! Snapshot diffing: turns pairs of consecutive observations into
//! [`DomainEvent`]s.
//!
//! Each function here is pure. Emitted events carry no ordering promise; the
//! engine applies them against the latest snapshot, not against each other.

use crate::event::DomainEvent;
use crate::markers::{MarkerEvent, MarkerKind};
use crate::types::{hook_status, WorkItem};
use crate::window::WindowSnapshot;
use std::collections::{BTreeMap, BTreeSet};

/// Diffs two window snapshots by agent-id membership and title equality.
pub fn diff_windows(previous: &WindowSnapshot, current: &WindowSnapshot) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    let previous_ids = previous.agent_ids();
    let current_ids = current.agent_ids();

    for id in current_ids.difference(&previous_ids) {
        events.push(DomainEvent::WindowAdded(id.clone()));
    }
    for id in previous_ids.difference(&current_ids) {
        events.push(DomainEvent::WindowRemoved(id.clone()));
    }

    if previous.active_agent_id != current.active_agent_id {
        events.push(DomainEvent::ActiveChanged(current.active_agent_id.clone()));
    }

    for (id, title) in &current.titles {
        if title.is_empty() {
            continue;
        }
        if previous.titles.get(id) != Some(title) {
            events.push(DomainEvent::TitleChanged {
                agent_id: id.clone(),
                title: title.clone(),
            });
        }
    }

    events.extend(orphan_windows(current));
    events
}

/// Entries with no derivable agent id, excluding the base shell window.
/// Never every window: tmux ends a session when its last window closes.
pub fn orphan_windows(snapshot: &WindowSnapshot) -> Vec<DomainEvent> {
    let Some(base) = snapshot.base_index else {
        return Vec::new();
    };
    let mut orphans: Vec<u32> = snapshot
        .entries
        .iter()
        .filter(|entry| entry.agent_id.is_none() && entry.index != base)
        .map(|entry| entry.index)
        .collect();
    if orphans.len() == snapshot.entries.len() {
        orphans.remove(0);
    }
    orphans.into_iter().map(DomainEvent::OrphanWindow).collect()
}

/// Counts consecutive window snapshots an attached agent has been missing from.
///
/// An agent becomes stale once it is absent from `threshold` snapshots in a row
/// observed since it was attached, so two missing snapshots means both the
/// previous and the current listing lacked it. Each stale id is reported once;
/// reattaching resets the count.
#[derive(Debug, Clone)]
pub struct StaleTracker {
    threshold: u32,
    misses: BTreeMap<String, u32>,
}

impl Default for StaleTracker {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_STALE_CYCLES)
    }
}

impl StaleTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            misses: BTreeMap::new(),
        }
    }

    pub fn observe(
        &mut self,
        attached: &BTreeSet<String>,
        present: &BTreeSet<String>,
    ) -> Vec<DomainEvent> {
        self.misses.retain(|id, _| attached.contains(id));

        let mut stale = Vec::new();
        for id in attached {
            if present.contains(id) {
                self.misses.remove(id);
                continue;
            }
            let count = self.misses.entry(id.clone()).or_insert(0);
            *count = count.saturating_add(1);
            if *count == self.threshold {
                stale.push(DomainEvent::StaleAgent(id.clone()));
            }
        }
        stale
    }

    pub fn forget(&mut self, agent_id: &str) {
        self.misses.remove(agent_id);
    }

    pub fn misses(&self, agent_id: &str) -> u32 {
        self.misses.get(agent_id).copied().unwrap_or(0)
    }
}

/// Maps a raw marker observation onto the domain vocabulary.
pub fn marker_event(raw: &MarkerEvent) -> DomainEvent {
    match raw.kind {
        MarkerKind::Status => {
            let status = raw.content.to_lowercase();
            if status == hook_status::DONE {
                DomainEvent::AgentDone(raw.agent_id.clone())
            } else {
                DomainEvent::StatusChanged {
                    agent_id: raw.agent_id.clone(),
                    status,
                }
            }
        }
        MarkerKind::Title => DomainEvent::TitleSet {
            agent_id: raw.agent_id.clone(),
            title: raw.content.clone(),
        },
        MarkerKind::Kill => DomainEvent::KillRequested(raw.agent_id.clone()),
    }
}

/// Diffs two tracker polls.
///
/// Two independent completion rules live here: `ItemDone` fires when an
/// item's tracker status transitions to `done_status`; `ParentSignalled` fires
/// when a parent's comment count grows while it still has children listed.
pub fn diff_items(previous: &[WorkItem], current: &[WorkItem], done_status: &str) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    let previous_by_id: BTreeMap<&str, &WorkItem> =
        previous.iter().map(|item| (item.id.as_str(), item)).collect();
    let current_ids: BTreeSet<&str> = current.iter().map(|item| item.id.as_str()).collect();
    let parent_ids: BTreeSet<&str> = current
        .iter()
        .filter_map(|item| item.parent_id.as_deref())
        .collect();

    for item in current {
        let is_done = item.status.eq_ignore_ascii_case(done_status);
        match previous_by_id.get(item.id.as_str()) {
            None if is_done => events.push(DomainEvent::ItemDone(item.id.clone())),
            None => events.push(DomainEvent::ItemAdded(item.clone())),
            Some(prev) => {
                if is_done {
                    // Retired on the transition; later edits to a done item are ignored.
                    if !prev.status.eq_ignore_ascii_case(done_status) {
                        events.push(DomainEvent::ItemDone(item.id.clone()));
                    }
                    continue;
                }
                if *prev != item {
                    events.push(DomainEvent::ItemChanged(item.clone()));
                }
                if item.comment_count > prev.comment_count && parent_ids.contains(item.id.as_str()) {
                    events.push(DomainEvent::ParentSignalled(item.id.clone()));
                }
            }
        }
    }

    for item in previous {
        if !current_ids.contains(item.id.as_str()) {
            events.push(DomainEvent::ItemRemoved(item.id.clone()));
        }
    }
    events
}

/// Parents whose children have all left the ready status.
pub fn settled_parents(items: &[WorkItem], ready_status: &str) -> BTreeSet<String> {
    let mut children: BTreeMap<&str, Vec<&WorkItem>> = BTreeMap::new();
    for item in items {
        if let Some(parent) = item.parent_id.as_deref() {
            children.entry(parent).or_default().push(item);
        }
    }
    children
        .into_iter()
        .filter(|(_, kids)| !kids.iter().any(|kid| kid.status == ready_status))
        .map(|(parent, _)| parent.to_string())
        .collect()
}
