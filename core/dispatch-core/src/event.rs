//! The engine's vocabulary: everything that flows into and out of the
//! reconciliation loop.

use crate::markers::MarkerEvent;
use crate::types::WorkItem;
use crate::window::WindowSnapshot;

/// Normalized domain events. Within one cycle they carry no ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    // Window diffs
    WindowAdded(String),
    WindowRemoved(String),
    ActiveChanged(Option<String>),
    TitleChanged { agent_id: String, title: String },
    OrphanWindow(u32),
    StaleAgent(String),

    // Marker files
    StatusChanged { agent_id: String, status: String },
    TitleSet { agent_id: String, title: String },
    KillRequested(String),
    AgentDone(String),

    // Tracker diffs
    ItemAdded(WorkItem),
    ItemChanged(WorkItem),
    ItemRemoved(String),
    ItemDone(String),
    /// A parent's comment count grew; a child likely reported back.
    ParentSignalled(String),
}

/// Messages consumed by the engine thread.
#[derive(Debug, Clone)]
pub enum Input {
    Windows {
        snapshot: WindowSnapshot,
        events: Vec<DomainEvent>,
    },
    Tracker(Vec<WorkItem>),
    TrackerFailed(String),
    Marker(MarkerEvent),
    SpawnFinished {
        work_item_id: String,
        outcome: SpawnOutcome,
    },
    Intent(Intent),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    Spawned(String),
    /// Session absent; retry on a later cycle.
    NotReady,
    Failed(String),
}

/// Operator requests from the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Focus(String),
    Kill(String),
    Done(String),
}

/// Side effects the engine asks the launcher worker to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Spawn(WorkItem),
    Kill(String),
    KillWindow(u32),
    Focus(String),
    SetTitle { agent_id: String, title: String },
}
