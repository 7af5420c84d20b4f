//! The reconciliation store: the only writer of truth.
//!
//! Every mutation goes through a named transition operation. Each operation is
//! total: irrelevant input (unknown id, already attached, already gone) is a
//! no-op that returns `false`. Operations that change state bump the version
//! and push a fresh [`StoreSnapshot`] to every subscriber.

use crate::logbook::{LogLine, Logbook};
use crate::markers::AgentMarkers;
use crate::normalize::settled_parents;
use crate::types::{hook_status, AgentProcess, WorkItem};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug)]
pub struct Store {
    work_items: Vec<WorkItem>,
    agents: BTreeMap<String, AgentProcess>,
    active_agent_id: Option<String>,
    max_agents: usize,
    ready_status: String,
    version: u64,
    logbook: Logbook,
    subscribers: Vec<Sender<StoreSnapshot>>,
}

impl Store {
    pub fn new(max_agents: usize, ready_status: impl Into<String>) -> Self {
        Self {
            work_items: Vec::new(),
            agents: BTreeMap::new(),
            active_agent_id: None,
            max_agents,
            ready_status: ready_status.into(),
            version: 0,
            logbook: Logbook::default(),
            subscribers: Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transition operations
    // ─────────────────────────────────────────────────────────────────────

    /// First write wins; later field changes arrive through [`Store::refresh_work_item`].
    pub fn add_work_item(&mut self, item: WorkItem) -> bool {
        if self.work_item(&item.id).is_some() {
            return false;
        }
        self.work_items.push(item);
        self.commit();
        true
    }

    /// Replaces the fields of a known item in place, keeping its rank position.
    pub fn refresh_work_item(&mut self, item: WorkItem) -> bool {
        let Some(existing) = self.work_items.iter_mut().find(|existing| existing.id == item.id) else {
            return false;
        };
        if *existing == item {
            return false;
        }
        *existing = item;
        self.commit();
        true
    }

    /// Reorders known items to match tracker rank; unknown ids are ignored and
    /// items missing from `order` keep their relative place at the end.
    pub fn reorder_work_items(&mut self, order: &[String]) -> bool {
        let rank: BTreeMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(position, id)| (id.as_str(), position))
            .collect();
        let before: Vec<String> = self.work_items.iter().map(|item| item.id.clone()).collect();
        self.work_items
            .sort_by_key(|item| rank.get(item.id.as_str()).copied().unwrap_or(usize::MAX));
        let changed = self
            .work_items
            .iter()
            .map(|item| &item.id)
            .ne(before.iter());
        if changed {
            self.commit();
        }
        changed
    }

    /// Detaches first so no agent ever outlives its work item.
    pub fn remove_work_item(&mut self, id: &str) -> bool {
        self.detach_agent(id);
        let before = self.work_items.len();
        self.work_items.retain(|item| item.id != id);
        if self.work_items.len() == before {
            return false;
        }
        self.commit();
        true
    }

    pub fn attach_agent(&mut self, id: &str) -> bool {
        self.attach_with(id, AgentProcess::new(id))
    }

    /// Reconnect path: restores status and title from the last marker files.
    /// A live window without a status marker reads as working.
    pub fn attach_restored(&mut self, id: &str, markers: &AgentMarkers) -> bool {
        let mut agent = AgentProcess::new(id);
        agent.hook_status = markers
            .status
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| hook_status::WORKING.to_string());
        agent.title = markers.title.clone().unwrap_or_default();
        self.attach_with(id, agent)
    }

    fn attach_with(&mut self, id: &str, agent: AgentProcess) -> bool {
        if self.agents.contains_key(id) || self.work_item(id).is_none() {
            return false;
        }
        self.agents.insert(id.to_string(), agent);
        self.commit();
        true
    }

    pub fn detach_agent(&mut self, id: &str) -> bool {
        if self.agents.remove(id).is_none() {
            return false;
        }
        if self.active_agent_id.as_deref() == Some(id) {
            self.active_agent_id = None;
        }
        self.commit();
        true
    }

    pub fn update_hook_status(&mut self, id: &str, status: &str) -> bool {
        let Some(agent) = self.agents.get_mut(id) else {
            return false;
        };
        if agent.hook_status == status {
            return false;
        }
        agent.hook_status = status.to_string();
        self.commit();
        true
    }

    pub fn update_agent_title(&mut self, id: &str, title: &str) -> bool {
        let Some(agent) = self.agents.get_mut(id) else {
            return false;
        };
        if agent.title == title {
            return false;
        }
        agent.title = title.to_string();
        self.commit();
        true
    }

    /// Unchecked here; the engine only passes attached ids and re-derives the
    /// pointer after every window poll.
    pub fn set_active_work_item(&mut self, id: Option<String>) -> bool {
        if self.active_agent_id == id {
            return false;
        }
        self.active_agent_id = id;
        self.commit();
        true
    }

    pub fn log(&mut self, source: &str, message: impl Into<String>) {
        self.logbook.push(source, message);
        self.commit();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub fn work_item(&self, id: &str) -> Option<&WorkItem> {
        self.work_items.iter().find(|item| item.id == id)
    }

    pub fn work_items(&self) -> &[WorkItem] {
        &self.work_items
    }

    pub fn agent(&self, id: &str) -> Option<&AgentProcess> {
        self.agents.get(id)
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn attached_ids(&self) -> BTreeSet<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn active_agent_id(&self) -> Option<&str> {
        self.active_agent_id.as_deref()
    }

    pub fn max_agents(&self) -> usize {
        self.max_agents
    }

    pub fn ready_status(&self) -> &str {
        &self.ready_status
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Agents whose status holds an execution slot.
    pub fn busy_count(&self) -> usize {
        self.agents.values().filter(|agent| agent.occupies_slot()).count()
    }

    /// `max_agents - busy`. Negative when externally resumed agents overshoot.
    pub fn slots(&self) -> i64 {
        self.max_agents as i64 - self.busy_count() as i64
    }

    /// Unattached items in the ready status, in tracker rank order.
    pub fn queued(&self) -> Vec<&WorkItem> {
        self.work_items
            .iter()
            .filter(|item| !self.agents.contains_key(&item.id) && item.status == self.ready_status)
            .collect()
    }

    /// Every item without an agent, regardless of tracker status.
    pub fn unattached(&self) -> impl Iterator<Item = &WorkItem> {
        self.work_items
            .iter()
            .filter(|item| !self.agents.contains_key(&item.id))
    }

    pub fn settled_parents(&self) -> BTreeSet<String> {
        settled_parents(&self.work_items, &self.ready_status)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            work_items: self.work_items.clone(),
            agents: self.agents.clone(),
            active_agent_id: self.active_agent_id.clone(),
            max_agents: self.max_agents,
            ready_status: self.ready_status.clone(),
            settled_parents: self.settled_parents(),
            logs: self.logbook.lines(),
            version: self.version,
        }
    }

    /// Receives a snapshot after every effective mutation, starting with the current one.
    pub fn subscribe(&mut self) -> Receiver<StoreSnapshot> {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(self.snapshot());
        self.subscribers.push(tx);
        rx
    }

    fn commit(&mut self) {
        self.version = self.version.wrapping_add(1);
        if self.subscribers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        self.subscribers
            .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
    }
}

/// Read-only view handed to the console.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreSnapshot {
    pub work_items: Vec<WorkItem>,
    pub agents: BTreeMap<String, AgentProcess>,
    pub active_agent_id: Option<String>,
    pub max_agents: usize,
    pub ready_status: String,
    pub settled_parents: BTreeSet<String>,
    pub logs: Vec<LogLine>,
    pub version: u64,
}

impl StoreSnapshot {
    /// The agent's hook status, or `done` for a parent whose children have all
    /// left the ready status.
    pub fn derived_status(&self, id: &str) -> Option<&str> {
        if let Some(agent) = self.agents.get(id) {
            return Some(agent.hook_status.as_str());
        }
        self.settled_parents
            .contains(id)
            .then_some(hook_status::DONE)
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn busy_count(&self) -> usize {
        self.agents.values().filter(|agent| agent.occupies_slot()).count()
    }

    pub fn queued_count(&self) -> usize {
        self.work_items
            .iter()
            .filter(|item| !self.agents.contains_key(&item.id) && item.status == self.ready_status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> WorkItem {
        WorkItem::new(id, format!("summary {id}"), "Agent-Ready")
    }

    fn store_with(ids: &[&str]) -> Store {
        let mut store = Store::new(2, "Agent-Ready");
        for id in ids {
            store.add_work_item(item(id));
        }
        store
    }

    #[test]
    fn add_is_first_write_wins() {
        let mut store = store_with(&["KAN-1"]);
        let mut dup = item("KAN-1");
        dup.summary = "other".to_string();
        assert!(!store.add_work_item(dup));
        assert_eq!(store.work_items().len(), 1);
        assert_eq!(store.work_item("KAN-1").unwrap().summary, "summary KAN-1");
    }

    #[test]
    fn attach_is_idempotent() {
        let mut store = store_with(&["KAN-1"]);
        assert!(store.attach_agent("KAN-1"));
        let once = store.snapshot();
        assert!(!store.attach_agent("KAN-1"));
        let twice = store.snapshot();
        assert_eq!(once.agents, twice.agents);
        assert_eq!(once.version, twice.version);
        assert_eq!(store.agent("KAN-1").unwrap().hook_status, "?");
    }

    #[test]
    fn attach_requires_a_work_item() {
        let mut store = store_with(&[]);
        assert!(!store.attach_agent("KAN-9"));
        assert!(store.attached_ids().is_empty());
    }

    #[test]
    fn detach_clears_active_pointer() {
        let mut store = store_with(&["KAN-1"]);
        store.attach_agent("KAN-1");
        store.set_active_work_item(Some("KAN-1".to_string()));
        assert!(store.detach_agent("KAN-1"));
        assert!(store.active_agent_id().is_none());
        assert!(!store.detach_agent("KAN-1"));
    }

    #[test]
    fn remove_detaches_first() {
        let mut store = store_with(&["KAN-1", "KAN-2"]);
        store.attach_agent("KAN-1");
        assert!(store.remove_work_item("KAN-1"));
        assert!(store.agent("KAN-1").is_none());
        assert!(!store.remove_work_item("KAN-1"));
        assert_eq!(store.work_items().len(), 1);
    }

    #[test]
    fn updates_on_absent_agent_are_noops() {
        let mut store = store_with(&["KAN-1"]);
        let version = store.version();
        assert!(!store.update_hook_status("KAN-1", "waiting"));
        assert!(!store.update_agent_title("KAN-1", "x"));
        assert_eq!(store.version(), version);
    }

    #[test]
    fn slots_count_only_busy_agents() {
        let mut store = store_with(&["KAN-1", "KAN-2", "KAN-3"]);
        store.attach_agent("KAN-1");
        store.attach_agent("KAN-2");
        assert_eq!(store.slots(), 0);
        store.update_hook_status("KAN-2", "idle");
        assert_eq!(store.slots(), 1);
        let queued: Vec<_> = store.queued().iter().map(|item| item.id.clone()).collect();
        assert_eq!(queued, vec!["KAN-3"]);
    }

    #[test]
    fn queued_requires_ready_status() {
        let mut store = store_with(&["KAN-1"]);
        let mut other = item("KAN-2");
        other.status = "In Review".to_string();
        store.add_work_item(other);
        assert_eq!(store.queued().len(), 1);
        assert_eq!(store.unattached().count(), 2);
    }

    #[test]
    fn restored_attach_uses_markers() {
        let mut store = store_with(&["KAN-1", "KAN-2"]);
        store.attach_restored(
            "KAN-1",
            &AgentMarkers {
                status: Some("Waiting".to_string()),
                title: Some("Need input".to_string()),
            },
        );
        store.attach_restored("KAN-2", &AgentMarkers::default());
        assert_eq!(store.agent("KAN-1").unwrap().hook_status, "waiting");
        assert_eq!(store.agent("KAN-1").unwrap().title, "Need input");
        assert_eq!(store.agent("KAN-2").unwrap().hook_status, "working");
    }

    #[test]
    fn refresh_keeps_rank_position() {
        let mut store = store_with(&["KAN-1", "KAN-2"]);
        let mut changed = item("KAN-1");
        changed.summary = "renamed".to_string();
        assert!(store.refresh_work_item(changed));
        assert_eq!(store.work_items()[0].summary, "renamed");
        assert!(!store.refresh_work_item(item("KAN-9")));
    }

    #[test]
    fn reorder_follows_tracker_rank() {
        let mut store = store_with(&["KAN-1", "KAN-2", "KAN-3"]);
        assert!(store.reorder_work_items(&["KAN-3".to_string(), "KAN-1".to_string()]));
        let ids: Vec<_> = store.work_items().iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["KAN-3", "KAN-1", "KAN-2"]);
        assert!(!store.reorder_work_items(&["KAN-3".to_string(), "KAN-1".to_string()]));
    }

    #[test]
    fn subscribers_receive_snapshots() {
        let mut store = store_with(&[]);
        let rx = store.subscribe();
        assert_eq!(rx.recv().unwrap().version, 0);
        store.add_work_item(item("KAN-1"));
        let snapshot = rx.recv().unwrap();
        assert_eq!(snapshot.work_items.len(), 1);
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn derived_status_reports_settled_parent() {
        let mut store = store_with(&["KAN-10"]);
        for id in ["KAN-11", "KAN-12"] {
            let mut child = item(id);
            child.parent_id = Some("KAN-10".to_string());
            child.status = "In Review".to_string();
            store.add_work_item(child);
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.derived_status("KAN-10"), Some("done"));
        assert_eq!(snapshot.derived_status("KAN-11"), None);
    }
}
