//! End-to-end reconciliation against an in-memory tmux session.

use dispatch_core::{
    run_effect, Engine, EngineSettings, Input, Launcher, MarkerDir, MarkerKind, Result,
    WindowEntry, WindowPoller, WindowSource, WorkItem,
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct FakeTmux {
    session: Mutex<bool>,
    windows: Mutex<Vec<WindowEntry>>,
    spawned: Mutex<Vec<String>>,
}

impl FakeTmux {
    fn with_session() -> Arc<Self> {
        let tmux = Self::default();
        *tmux.session.lock().unwrap() = true;
        tmux.windows.lock().unwrap().push(entry(0, "zsh", None));
        Arc::new(tmux)
    }

    fn open(&self, name: &str, agent_id: Option<&str>) -> u32 {
        let mut windows = self.windows.lock().unwrap();
        let index = windows.iter().map(|w| w.index + 1).max().unwrap_or(0);
        windows.push(entry(index, name, agent_id));
        index
    }

    /// Window vanishes without the engine asking, as when the agent crashes.
    fn crash(&self, agent_id: &str) {
        self.windows
            .lock()
            .unwrap()
            .retain(|w| w.agent_id.as_deref() != Some(agent_id));
    }

    fn has_window(&self, index: u32) -> bool {
        self.windows.lock().unwrap().iter().any(|w| w.index == index)
    }

    fn has_agent(&self, agent_id: &str) -> bool {
        self.windows
            .lock()
            .unwrap()
            .iter()
            .any(|w| w.agent_id.as_deref() == Some(agent_id))
    }

    fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }
}

fn entry(index: u32, name: &str, agent_id: Option<&str>) -> WindowEntry {
    WindowEntry {
        index,
        name: name.to_string(),
        agent_id: agent_id.map(str::to_string),
        pane_title: String::new(),
    }
}

impl WindowSource for FakeTmux {
    fn list_windows(&self) -> Vec<WindowEntry> {
        if !*self.session.lock().unwrap() {
            return Vec::new();
        }
        self.windows.lock().unwrap().clone()
    }

    fn active_window(&self) -> Option<String> {
        None
    }
}

impl Launcher for FakeTmux {
    fn spawn(&self, item: &WorkItem) -> Result<Option<String>> {
        if !*self.session.lock().unwrap() {
            return Ok(None);
        }
        if self.has_agent(&item.id) {
            return Ok(Some(item.id.clone()));
        }
        self.open(&item.id, Some(&item.id));
        self.spawned.lock().unwrap().push(item.id.clone());
        Ok(Some(item.id.clone()))
    }

    fn kill(&self, agent_id: &str) -> bool {
        let had = self.has_agent(agent_id);
        self.crash(agent_id);
        had
    }

    fn kill_window(&self, index: u32) -> bool {
        let mut windows = self.windows.lock().unwrap();
        let before = windows.len();
        windows.retain(|w| w.index != index);
        windows.len() != before
    }

    fn focus(&self, _agent_id: &str) {}

    fn set_title(&self, _agent_id: &str, _title: &str) {}
}

/// Engine plus fake session, with effects executed inline.
struct Harness {
    _dir: TempDir,
    markers: MarkerDir,
    tmux: Arc<FakeTmux>,
    poller: WindowPoller<Arc<FakeTmux>>,
    engine: Engine,
    tx: Sender<Input>,
    rx: Receiver<Input>,
}

impl Harness {
    fn new(max_agents: usize, tmux: Arc<FakeTmux>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let markers = MarkerDir::new(dir.path());
        let engine = Engine::new(
            EngineSettings {
                max_agents,
                ..EngineSettings::default()
            },
            markers.clone(),
        );
        let (tx, rx) = mpsc::channel();
        Self {
            _dir: dir,
            markers,
            poller: WindowPoller::new(Arc::clone(&tmux)),
            tmux,
            engine,
            tx,
            rx,
        }
    }

    fn send(&mut self, input: Input) {
        let mut pending = vec![input];
        while let Some(input) = pending.pop() {
            for effect in self.engine.handle(input) {
                run_effect(self.tmux.as_ref(), effect, &self.tx);
            }
            pending.extend(self.rx.try_iter());
        }
        self.assert_slots();
    }

    fn tick(&mut self) {
        let (snapshot, events) = self.poller.poll_once();
        self.send(Input::Windows { snapshot, events });
    }

    fn tracker(&mut self, items: &[WorkItem]) {
        self.send(Input::Tracker(items.to_vec()));
    }

    fn marker(&mut self, id: &str, kind: MarkerKind, content: &str) {
        let path = self.markers.write(id, kind, content).unwrap();
        if let Some(event) = self.markers.read_marker(&path) {
            self.send(Input::Marker(event));
        }
    }

    fn assert_slots(&self) {
        let snapshot = self.engine.snapshot();
        assert!(
            snapshot.busy_count() <= snapshot.max_agents,
            "busy {} exceeds max {}",
            snapshot.busy_count(),
            snapshot.max_agents
        );
        for id in snapshot.agents.keys() {
            assert!(
                snapshot.work_items.iter().any(|item| &item.id == id),
                "agent {id} has no work item"
            );
        }
    }
}

fn ready(id: &str) -> WorkItem {
    WorkItem::new(id, format!("summary {id}"), "Agent-Ready")
}

#[test]
fn third_item_waits_for_a_free_slot() {
    let mut h = Harness::new(2, FakeTmux::with_session());
    h.tick();
    h.tracker(&[ready("A"), ready("B"), ready("C")]);
    h.tick();
    assert_eq!(h.tmux.spawned(), vec!["A", "B"]);
    assert!(!h.engine.store().is_attached("C"));

    h.marker("A", MarkerKind::Status, "idle");
    assert_eq!(h.tmux.spawned(), vec!["A", "B", "C"]);
    assert_eq!(h.engine.snapshot().busy_count(), 2);
}

#[test]
fn third_item_claimed_when_tracker_drops_one() {
    let mut h = Harness::new(2, FakeTmux::with_session());
    h.tick();
    h.tracker(&[ready("A"), ready("B"), ready("C")]);
    h.tick();

    h.tracker(&[ready("A"), ready("C")]);
    assert!(h.engine.store().work_item("B").is_none());
    assert!(!h.tmux.has_agent("B"));
    assert_eq!(h.tmux.spawned(), vec!["A", "B", "C"]);
}

#[test]
fn reconnects_to_running_window_without_spawning() {
    let tmux = FakeTmux::with_session();
    tmux.open("A", Some("A"));
    let mut h = Harness::new(2, tmux);
    h.markers.write("A", MarkerKind::Status, "waiting").unwrap();

    h.tracker(&[ready("A")]);
    h.tick();
    assert!(h.tmux.spawned().is_empty());
    let agent = h.engine.store().agent("A").cloned().unwrap();
    assert_eq!(agent.hook_status, "waiting");
    assert!(h.markers.read_agent("A").status.is_some());
}

#[test]
fn reconnects_when_windows_arrive_before_tracker() {
    let tmux = FakeTmux::with_session();
    tmux.open("A", Some("A"));
    let mut h = Harness::new(2, tmux);

    h.tick();
    assert!(!h.engine.store().is_attached("A"));
    h.tracker(&[ready("A")]);
    assert!(h.tmux.spawned().is_empty());
    assert_eq!(h.engine.store().agent("A").unwrap().hook_status, "working");
}

#[test]
fn done_marker_retires_item_for_good() {
    let mut h = Harness::new(2, FakeTmux::with_session());
    h.tick();
    h.tracker(&[ready("A")]);
    h.tick();
    assert!(h.tmux.has_agent("A"));

    h.marker("A", MarkerKind::Status, "done");
    assert!(h.engine.store().work_item("A").is_none());
    assert!(!h.tmux.has_agent("A"));
    assert!(h.markers.read_agent("A").status.is_none());

    h.tracker(&[ready("A")]);
    h.tick();
    h.tick();
    assert!(h.engine.store().work_item("A").is_none());
    assert_eq!(h.tmux.spawned(), vec!["A"]);
}

#[test]
fn parent_with_settled_children_reads_done() {
    let mut h = Harness::new(2, FakeTmux::with_session());
    h.tick();
    let mut child = WorkItem::new("C1", "child", "In Review");
    child.parent_id = Some("P".to_string());
    h.tracker(&[ready("P"), child]);

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.derived_status("P"), Some("done"));
    assert!(h.tmux.spawned().is_empty());
}

#[test]
fn repeated_window_sightings_attach_once() {
    let tmux = FakeTmux::with_session();
    tmux.open("A", Some("A"));
    let mut h = Harness::new(2, tmux);
    h.tracker(&[ready("A")]);
    h.tick();
    h.tick();
    h.tracker(&[ready("A")]);
    h.marker("A", MarkerKind::Status, "working");
    h.marker("A", MarkerKind::Status, "working");

    assert_eq!(h.engine.store().attached_ids().len(), 1);
    assert_eq!(h.engine.snapshot().busy_count(), 1);
    assert!(h.tmux.spawned().is_empty());
}

#[test]
fn crashed_agent_is_respawned() {
    let mut h = Harness::new(1, FakeTmux::with_session());
    h.tick();
    h.tracker(&[ready("A"), ready("B")]);
    h.tick();

    h.tmux.crash("A");
    h.tick();
    assert!(h.engine.store().is_attached("A"));
    h.tick();
    assert_eq!(h.tmux.spawned(), vec!["A", "A"]);
    assert!(h.tmux.has_agent("A"));
    assert!(!h.engine.store().is_attached("B"));
}

#[test]
fn orphan_window_killed_in_one_cycle() {
    let tmux = FakeTmux::with_session();
    let stray = tmux.open("scratch", None);
    let mut h = Harness::new(2, tmux);
    h.tick();
    assert!(!h.tmux.has_window(stray));
    assert!(h.tmux.has_window(0));
}

#[test]
fn missing_session_defers_claims() {
    let tmux = Arc::new(FakeTmux::default());
    let mut h = Harness::new(2, Arc::clone(&tmux));
    h.tick();
    h.tracker(&[ready("A")]);
    assert!(tmux.spawned().is_empty());

    *tmux.session.lock().unwrap() = true;
    tmux.windows.lock().unwrap().push(entry(0, "zsh", None));
    h.tick();
    assert_eq!(tmux.spawned(), vec!["A"]);
}

#[test]
fn kill_marker_respawns_once() {
    let mut h = Harness::new(2, FakeTmux::with_session());
    h.tick();
    h.tracker(&[ready("A")]);
    h.tick();

    h.marker("A", MarkerKind::Kill, "");
    assert_eq!(h.tmux.spawned(), vec!["A", "A"]);
    assert!(h.markers.read_agent("A").status.is_none());
    h.tick();
    assert_eq!(h.engine.store().attached_ids().len(), 1);
}
