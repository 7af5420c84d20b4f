//! # dispatch-core
//!
//! Reconciliation engine for dispatchator: keeps a set of coding-agent
//! windows in a tmux session in step with the tickets a tracker marks ready.
//!
//! ## Design Principles
//!
//! - **Single writer**: one engine thread owns the store; everything else
//!   sends it [`Input`]s and reads [`StoreSnapshot`]s.
//! - **Synchronous**: plain threads and channels, no async runtime.
//! - **Graceful degradation**: a missing session, tracker outage or a
//!   half-written marker never stops the loop.
//! - **Optimistic claims**: a slot is taken before the spawn finishes and
//!   given back if it fails.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dispatch_core::{Engine, EngineSettings, Input, MarkerDir};
//!
//! let mut engine = Engine::new(EngineSettings::default(), MarkerDir::new("ia/state/agents"));
//! let effects = engine.handle(Input::Tracker(items));
//! ```

pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod event;
pub mod labels;
pub mod launcher;
pub mod logbook;
pub mod markers;
pub mod normalize;
pub mod patterns;
pub mod poller;
pub mod provider;
pub mod reaper;
pub mod scheduler;
pub mod store;
pub mod tmux;
pub mod tracker;
pub mod types;
pub mod watcher;
pub mod window;

pub use config::*;
pub use console::{Console, ConsoleAction};
pub use engine::{run_effect, spawn_launcher_worker, Engine, EngineSettings};
pub use error::{DispatchError, Result};
pub use event::{DomainEvent, Effect, Input, Intent, SpawnOutcome};
pub use labels::{parse_profile, ProfileDefaults};
pub use launcher::{Launcher, WindowSource};
pub use logbook::{LogLine, Logbook, MAX_LOGS};
pub use markers::{AgentMarkers, MarkerDir, MarkerEvent, MarkerKind};
pub use poller::{spawn_window_poller, WindowPoller};
pub use provider::{
    provider_for, AgentProvider, ClaudeProvider, GeminiProvider, ProviderRegistry, SpawnRequest,
};
pub use reaper::Reaper;
pub use scheduler::{Decision, Scheduler};
pub use store::{Store, StoreSnapshot};
pub use tmux::TmuxLauncher;
pub use tracker::{spawn_tracker_poller, JiraCredentials, JiraSource, TicketSource};
pub use types::*;
pub use watcher::{watch_markers, MarkerWatcher};
pub use window::{AgentIdRule, WindowEntry, WindowSnapshot};
