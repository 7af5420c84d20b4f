//! Thread wiring for the reconciliation loop.

use dispatch_core::{
    spawn_launcher_worker, spawn_tracker_poller, spawn_window_poller, watch_markers,
    AgentIdRule, DispatchConfig, DispatchError, Engine, EngineSettings, Input, Intent,
    JiraCredentials, JiraSource, Launcher, MarkerDir, MarkerWatcher, ProviderKind,
    ProviderRegistry, Result, StoreSnapshot, TmuxLauncher, WindowPoller,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Everything startup resolves before a single thread is started. Any error
/// here is fatal.
pub struct Resolved {
    pub config: DispatchConfig,
    pub credentials: JiraCredentials,
    pub providers: ProviderRegistry,
    pub rule: AgentIdRule,
    pub markers: MarkerDir,
}

impl Resolved {
    pub fn from_config(config: DispatchConfig) -> Result<Self> {
        config.validate()?;
        let credentials = JiraCredentials::from_env(config.tracker.site.as_deref())?;
        let providers = ProviderRegistry::resolve(config.agents.default_provider, |kind| {
            config.agents.provider_paths.get(kind).to_string()
        })?;
        let rule = AgentIdRule::new(&config.multiplexer.agent_id_pattern)?;
        let markers = MarkerDir::new(config.marker_dir());
        Ok(Self {
            config,
            credentials,
            providers,
            rule,
            markers,
        })
    }

    /// Human-readable summary for `dispatchator check`.
    pub fn describe(&self) -> Vec<String> {
        let config = &self.config;
        let mut lines = vec![
            format!("tracker:     jira @ {}", self.credentials.site),
            format!("queries:     {}", config.tracker.queries.len()),
            format!(
                "statuses:    ready '{}', done '{}'",
                config.tracker.ready_status, config.tracker.done_status
            ),
            format!("max agents:  {}", config.agents.max_concurrent),
            format!("session:     {}", config.multiplexer.session),
            format!("working dir: {}", config.working_dir().display()),
            format!("markers:     {}", self.markers.path().display()),
        ];
        for kind in ProviderKind::ALL {
            let marker = if kind == self.providers.default_kind() {
                " (default)"
            } else {
                ""
            };
            let path = match self.providers.path(kind) {
                Some(path) => path.display().to_string(),
                None => "not found".to_string(),
            };
            lines.push(format!("{:<12} {path}{marker}", format!("{}:", kind.as_str())));
        }
        for (name, dir) in &config.projects {
            lines.push(format!("project:     {name} -> {}", dir.display()));
        }
        lines
    }
}

/// Handle to the running loop held by the TUI.
pub struct Runtime {
    inputs: Sender<Input>,
    snapshots: Receiver<StoreSnapshot>,
    stop: Arc<AtomicBool>,
    engine: Option<JoinHandle<()>>,
    threads: Vec<JoinHandle<()>>,
    watcher: Option<MarkerWatcher>,
}

impl Runtime {
    pub fn start(resolved: Resolved) -> Result<Self> {
        let Resolved {
            config,
            credentials,
            providers,
            rule,
            markers,
        } = resolved;

        markers.ensure()?;
        let launcher = Arc::new(
            TmuxLauncher::new(
                config.multiplexer.session.clone(),
                rule,
                providers,
                config.working_dir(),
                markers.path().to_path_buf(),
            )
            .with_projects(config.projects.clone()),
        );
        let source = JiraSource::new(credentials, &config.tracker, config.profile_defaults())?;

        let mut engine = Engine::new(
            EngineSettings {
                max_agents: config.agents.max_concurrent,
                ready_status: config.tracker.ready_status.clone(),
                done_status: config.tracker.done_status.clone(),
                stale_cycles: config.multiplexer.stale_cycles,
            },
            markers.clone(),
        );
        let snapshots = engine.subscribe();

        let (input_tx, input_rx) = mpsc::channel();
        let (effect_tx, effect_rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let watcher = watch_markers(markers, input_tx.clone())?;

        let engine_handle = thread::Builder::new()
            .name("engine".to_string())
            .spawn(move || engine.run(input_rx, effect_tx))
            .map_err(|source| DispatchError::Io {
                context: "starting engine thread".to_string(),
                source,
            })?;

        let worker_launcher: Arc<dyn Launcher> = launcher.clone();
        let threads = vec![
            spawn_launcher_worker(worker_launcher, effect_rx, input_tx.clone())?,
            spawn_window_poller(
                WindowPoller::new(launcher),
                Duration::from_millis(config.multiplexer.poll_interval_ms),
                input_tx.clone(),
                Arc::clone(&stop),
            )?,
            spawn_tracker_poller(
                source,
                Duration::from_millis(config.tracker.poll_interval_ms),
                input_tx.clone(),
                Arc::clone(&stop),
            )?,
        ];

        tracing::info!(
            session = %config.multiplexer.session,
            max_agents = config.agents.max_concurrent,
            "Dispatch loop running"
        );

        Ok(Self {
            inputs: input_tx,
            snapshots,
            stop,
            engine: Some(engine_handle),
            threads,
            watcher: Some(watcher),
        })
    }

    pub fn send(&self, intent: Intent) {
        if self.inputs.send(Input::Intent(intent)).is_err() {
            tracing::warn!("Engine stopped; dropping operator intent");
        }
    }

    /// Latest snapshot published since the last call, if any.
    pub fn latest_snapshot(&self) -> Option<StoreSnapshot> {
        self.snapshots.try_iter().last()
    }

    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.watcher.take();
        let _ = self.inputs.send(Input::Shutdown);
        if let Some(handle) = self.engine.take() {
            if handle.join().is_err() {
                tracing::error!("Engine thread panicked");
            }
        }
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                tracing::error!(thread = %name, "Thread panicked");
            }
        }
        tracing::info!("Dispatch loop shut down");
    }
}
