//! The reconciliation loop.
//!
//! One thread owns the [`Engine`] and with it the only [`Store`]. Pollers,
//! the marker watcher and the console send [`Input`]s; the engine applies
//! them one at a time to completion and hands [`Effect`]s to the launcher
//! worker. Launcher side effects are only ever observed back through the next
//! window poll or an `Input::SpawnFinished`.

use crate::error::{DispatchError, Result};
use crate::event::{DomainEvent, Effect, Input, Intent, SpawnOutcome};
use crate::launcher::Launcher;
use crate::markers::{MarkerDir, MarkerKind};
use crate::normalize::{diff_items, marker_event};
use crate::reaper::Reaper;
use crate::scheduler::{Decision, Scheduler};
use crate::store::{Store, StoreSnapshot};
use crate::types::{hook_status, AgentMode, WorkItem};
use crate::window::WindowSnapshot;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_agents: usize,
    pub ready_status: String,
    pub done_status: String,
    pub stale_cycles: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_agents: 2,
            ready_status: crate::config::DEFAULT_READY_STATUS.to_string(),
            done_status: crate::config::DEFAULT_DONE_STATUS.to_string(),
            stale_cycles: crate::config::DEFAULT_STALE_CYCLES,
        }
    }
}

pub struct Engine {
    store: Store,
    scheduler: Scheduler,
    reaper: Reaper,
    markers: MarkerDir,
    /// Latest window snapshot, minus windows the engine has since killed.
    windows: WindowSnapshot,
    /// Previous tracker poll, the baseline for item diffs.
    tracker_items: Vec<WorkItem>,
    /// Items finished locally, keyed to the tracker status they had. Kept out
    /// of the store until the tracker reports a different status.
    suppressed: BTreeMap<String, String>,
    pending_spawns: BTreeSet<String>,
    done_status: String,
    last_tracker_error: Option<String>,
}

impl Engine {
    /// Starts paused: nothing is claimed before the first window poll shows
    /// which agents are already running.
    pub fn new(settings: EngineSettings, markers: MarkerDir) -> Self {
        let mut scheduler = Scheduler::default();
        scheduler.pause();
        Self {
            store: Store::new(settings.max_agents, settings.ready_status),
            scheduler,
            reaper: Reaper::new(settings.stale_cycles),
            markers,
            windows: WindowSnapshot::empty(Utc::now()),
            tracker_items: Vec::new(),
            suppressed: BTreeMap::new(),
            pending_spawns: BTreeSet::new(),
            done_status: settings.done_status,
            last_tracker_error: None,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&mut self) -> Receiver<StoreSnapshot> {
        self.store.subscribe()
    }

    pub fn windows(&self) -> &WindowSnapshot {
        &self.windows
    }

    pub fn is_suppressed(&self, id: &str) -> bool {
        self.suppressed.contains_key(id)
    }

    pub fn pending_spawns(&self) -> &BTreeSet<String> {
        &self.pending_spawns
    }

    /// Applies one input and returns the effects it produced, in order.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let window_poll = matches!(input, Input::Windows { .. });
        let mut effects = match input {
            Input::Windows { snapshot, events } => self.on_windows(snapshot, events),
            Input::Tracker(items) => self.on_tracker(items),
            Input::TrackerFailed(message) => {
                self.on_tracker_failed(message);
                Vec::new()
            }
            Input::Marker(raw) => self.apply(marker_event(&raw)),
            Input::SpawnFinished {
                work_item_id,
                outcome,
            } => {
                self.on_spawn_finished(&work_item_id, outcome);
                Vec::new()
            }
            Input::Intent(intent) => self.on_intent(intent),
            Input::Shutdown => return Vec::new(),
        };
        effects.extend(self.schedule());
        if window_poll {
            self.sync_active();
        }
        effects
    }

    /// Consumes inputs until `Shutdown` or every sender hangs up.
    pub fn run(mut self, inputs: Receiver<Input>, effects: Sender<Effect>) {
        tracing::info!("Reconciliation loop started");
        for input in inputs.iter() {
            if matches!(input, Input::Shutdown) {
                break;
            }
            for effect in self.handle(input) {
                if effects.send(effect).is_err() {
                    tracing::warn!("Launcher worker gone; dropping effect");
                }
            }
        }
        tracing::info!("Reconciliation loop stopped");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sources
    // ─────────────────────────────────────────────────────────────────────

    fn on_windows(&mut self, snapshot: WindowSnapshot, events: Vec<DomainEvent>) -> Vec<Effect> {
        // A tmux session always has a window, so an empty listing means no session.
        if !snapshot.entries.is_empty() {
            self.scheduler.resume();
        }
        self.windows = snapshot;

        let mut effects = Vec::new();
        for event in events {
            effects.extend(self.apply(event));
        }
        let stale = self
            .reaper
            .reap_stale(&self.store, &self.windows, &self.pending_spawns);
        for event in stale {
            effects.extend(self.apply(event));
        }
        effects
    }

    /// Re-derives the active pointer from tmux's current window, so it only
    /// ever names an attached agent and follows reattaches.
    fn sync_active(&mut self) {
        let active = self
            .windows
            .active_agent_id
            .clone()
            .filter(|id| self.store.is_attached(id));
        self.store.set_active_work_item(active);
    }

    fn on_tracker(&mut self, items: Vec<WorkItem>) -> Vec<Effect> {
        if self.last_tracker_error.take().is_some() {
            self.store.log("tracker", "🔌 tracker reachable again");
        }
        let events = diff_items(&self.tracker_items, &items, &self.done_status);
        self.suppressed.retain(|id, status| {
            items
                .iter()
                .any(|item| &item.id == id && &item.status == status)
        });

        let order: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        self.tracker_items = items;

        let mut effects = Vec::new();
        for event in events {
            effects.extend(self.apply(event));
        }
        self.store.reorder_work_items(&order);
        effects
    }

    fn on_tracker_failed(&mut self, message: String) {
        if self.last_tracker_error.as_deref() == Some(message.as_str()) {
            return;
        }
        self.store.log("tracker", format!("⚠️ tracker poll failed: {message}"));
        self.last_tracker_error = Some(message);
    }

    fn on_spawn_finished(&mut self, id: &str, outcome: SpawnOutcome) {
        self.pending_spawns.remove(id);
        match outcome {
            SpawnOutcome::Spawned(window) => {
                tracing::debug!(agent_id = id, window = %window, "Spawn confirmed");
            }
            SpawnOutcome::NotReady => {
                if self.store.detach_agent(id) {
                    self.store.log("tmux", format!("⏸️ {id}: agent session not ready, re-queued"));
                }
                self.scheduler.pause();
            }
            SpawnOutcome::Failed(message) => {
                if self.store.detach_agent(id) {
                    self.store.log("tmux", format!("❌ {id}: spawn failed: {message}"));
                }
                self.scheduler.pause();
            }
        }
    }

    fn on_intent(&mut self, intent: Intent) -> Vec<Effect> {
        match intent {
            Intent::Focus(id) => {
                if !self.store.is_attached(&id) {
                    return Vec::new();
                }
                self.store.set_active_work_item(Some(id.clone()));
                vec![Effect::Focus(id)]
            }
            Intent::Kill(id) => {
                self.pending_spawns.remove(&id);
                self.reaper.kill(
                    &mut self.store,
                    &mut self.windows,
                    &id,
                    "killed by operator, will re-spawn",
                )
            }
            Intent::Done(id) => {
                if self.store.work_item(&id).is_none() {
                    return Vec::new();
                }
                self.finish(&id, "marked done")
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Domain events
    // ─────────────────────────────────────────────────────────────────────

    fn apply(&mut self, event: DomainEvent) -> Vec<Effect> {
        match event {
            DomainEvent::WindowAdded(id) => {
                if self.store.is_attached(&id) {
                    self.pending_spawns.remove(&id);
                    return Vec::new();
                }
                if self.store.work_item(&id).is_some() {
                    return self.reconnect(&id);
                }
                Vec::new()
            }
            DomainEvent::WindowRemoved(id) => {
                // Stale detection owns the detach; a removal alone is one missed poll.
                if !self.windows.contains_agent(&id) {
                    tracing::debug!(agent_id = %id, "Agent window disappeared");
                }
                Vec::new()
            }
            DomainEvent::ActiveChanged(id) => {
                let id = id.filter(|id| self.store.is_attached(id));
                self.store.set_active_work_item(id);
                Vec::new()
            }
            DomainEvent::TitleChanged { agent_id, title } => {
                self.store.update_agent_title(&agent_id, &title);
                Vec::new()
            }
            DomainEvent::OrphanWindow(index) => {
                vec![self.reaper.orphan(&mut self.store, &mut self.windows, index)]
            }
            DomainEvent::StaleAgent(id) => {
                if self.store.detach_agent(&id) {
                    self.store.log("agent", format!("💥 {id}: window lost, re-queued"));
                }
                Vec::new()
            }
            DomainEvent::StatusChanged { agent_id, status } => {
                self.store.update_hook_status(&agent_id, &status);
                Vec::new()
            }
            DomainEvent::TitleSet { agent_id, title } => {
                if self.store.update_agent_title(&agent_id, &title) {
                    return vec![Effect::SetTitle { agent_id, title }];
                }
                Vec::new()
            }
            DomainEvent::KillRequested(id) => {
                self.pending_spawns.remove(&id);
                self.reaper
                    .kill_requested(&mut self.store, &self.markers, &mut self.windows, &id)
            }
            DomainEvent::AgentDone(id) => {
                if !self.markers.consume(&id, MarkerKind::Status) {
                    return Vec::new();
                }
                self.finish(&id, "done")
            }
            DomainEvent::ItemAdded(item) | DomainEvent::ItemChanged(item) => {
                self.upsert(item);
                Vec::new()
            }
            DomainEvent::ItemRemoved(id) => {
                self.suppressed.remove(&id);
                self.pending_spawns.remove(&id);
                self.reaper.retire(
                    &mut self.store,
                    &self.markers,
                    &mut self.windows,
                    &id,
                    "no longer listed by tracker",
                )
            }
            DomainEvent::ItemDone(id) => {
                self.pending_spawns.remove(&id);
                self.reaper.retire(
                    &mut self.store,
                    &self.markers,
                    &mut self.windows,
                    &id,
                    "done in tracker",
                )
            }
            DomainEvent::ParentSignalled(id) => {
                self.store.log("work-item", format!("📨 {id}: child reported back"));
                Vec::new()
            }
        }
    }

    fn upsert(&mut self, item: WorkItem) {
        if self.suppressed.contains_key(&item.id) {
            return;
        }
        if self.store.work_item(&item.id).is_some() {
            self.store.refresh_work_item(item);
            return;
        }
        let message = if item.status == self.store.ready_status() {
            format!("🎫 {}: queued ({})", item.id, profile_label(&item))
        } else {
            format!("📋 {}: listed as {}", item.id, item.status)
        };
        if self.store.add_work_item(item) {
            self.store.log("work-item", message);
        }
    }

    /// Reattaches to a live window, restoring state from its marker files.
    fn reconnect(&mut self, id: &str) -> Vec<Effect> {
        let markers = self.markers.read_agent(id);
        let finished = markers
            .status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case(hook_status::DONE));
        if finished && self.markers.consume(id, MarkerKind::Status) {
            return self.finish(id, "done while detached");
        }
        if self.store.attach_restored(id, &markers) {
            self.store.log("agent", format!("🔄 {id}: reconnected"));
        }
        Vec::new()
    }

    /// Local completion: retire the item and keep it out until the tracker moves it.
    fn finish(&mut self, id: &str, reason: &str) -> Vec<Effect> {
        let status = self
            .tracker_items
            .iter()
            .chain(self.store.work_items())
            .find(|item| item.id == id)
            .map(|item| item.status.clone());
        self.pending_spawns.remove(id);
        let effects = self
            .reaper
            .retire(&mut self.store, &self.markers, &mut self.windows, id, reason);
        if let Some(status) = status {
            self.suppressed.insert(id.to_string(), status);
        }
        effects
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────────────

    fn schedule(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut budget = self.store.work_items().len() + 1;
        while budget > 0 {
            budget -= 1;
            let before = self.store.version();
            match self.scheduler.next_decision(&self.store, &self.windows) {
                None => break,
                Some(Decision::Reconnect(id)) => effects.extend(self.reconnect(&id)),
                Some(Decision::Claim(item)) => {
                    if !self.store.attach_agent(&item.id) {
                        break;
                    }
                    self.markers.clear_agent(&item.id);
                    self.pending_spawns.insert(item.id.clone());
                    self.store.log(
                        "agent",
                        format!(
                            "🚀 {}: spawning /workflow:{} ({})",
                            item.id,
                            item.profile.workflow,
                            profile_label(&item)
                        ),
                    );
                    effects.push(Effect::Spawn(item));
                }
            }
            if self.store.version() == before {
                break;
            }
        }
        effects
    }
}

fn profile_label(item: &WorkItem) -> String {
    let mut label = item.profile.model.as_str().to_string();
    if item.profile.thinking {
        label.push_str(" 🧠");
    }
    if item.profile.agent_mode == AgentMode::Plan {
        label.push_str(" 📋");
    }
    if let Some(provider) = item.profile.provider {
        label.push(' ');
        label.push_str(provider.as_str());
    }
    label
}

/// Runs effects in FIFO order. Exits once the engine drops its sender; a
/// spawn already started is allowed to finish.
pub fn spawn_launcher_worker(
    launcher: Arc<dyn Launcher>,
    effects: Receiver<Effect>,
    inputs: Sender<Input>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("launcher".to_string())
        .spawn(move || {
            for effect in effects.iter() {
                run_effect(launcher.as_ref(), effect, &inputs);
            }
            tracing::debug!("Launcher worker stopped");
        })
        .map_err(|source| DispatchError::Io {
            context: "starting launcher thread".to_string(),
            source,
        })
}

pub fn run_effect(launcher: &dyn Launcher, effect: Effect, inputs: &Sender<Input>) {
    match effect {
        Effect::Spawn(item) => {
            let outcome = match launcher.spawn(&item) {
                Ok(Some(window)) => SpawnOutcome::Spawned(window),
                Ok(None) => SpawnOutcome::NotReady,
                Err(err) => {
                    tracing::warn!(agent_id = %item.id, error = %err, "Spawn failed");
                    SpawnOutcome::Failed(err.to_string())
                }
            };
            let _ = inputs.send(Input::SpawnFinished {
                work_item_id: item.id,
                outcome,
            });
        }
        Effect::Kill(id) => {
            if !launcher.kill(&id) {
                tracing::debug!(agent_id = %id, "Kill: window already gone");
            }
        }
        Effect::KillWindow(index) => {
            if !launcher.kill_window(index) {
                tracing::debug!(index, "Kill: window already gone");
            }
        }
        Effect::Focus(id) => launcher.focus(&id),
        Effect::SetTitle { agent_id, title } => launcher.set_title(&agent_id, &title),
    }
}
