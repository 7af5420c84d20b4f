//! Configuration loading for the console.
//!
//! Reads `dispatchator.toml` from the working directory (or an explicit path).
//! A missing file yields defaults; a malformed one is a startup error.
//! Tracker credentials never live in the file, only in the environment.

use crate::error::{DispatchError, Result};
use crate::labels::ProfileDefaults;
use crate::types::{ModelTier, ProviderKind};
use crate::window::AgentIdRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "dispatchator.toml";
const LOG_DIR_RELATIVE_PATH: &str = ".dispatchator/logs";

pub const DEFAULT_SESSION: &str = "dispatch-agents";
pub const DEFAULT_READY_STATUS: &str = "Agent-Ready";
pub const DEFAULT_DONE_STATUS: &str = "Done";
pub const DEFAULT_TRACKER_POLL_MS: u64 = 10_000;
pub const DEFAULT_WINDOW_POLL_MS: u64 = 2_000;
pub const DEFAULT_STALE_CYCLES: u32 = 2;
pub const DEFAULT_MARKER_DIR: &str = "ia/state/agents";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub tracker: TrackerConfig,
    pub agents: AgentsConfig,
    pub multiplexer: MultiplexerConfig,
    pub markers: MarkersConfig,
    /// Project routing key → directory handed to the agent CLI.
    pub projects: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub provider: String,
    /// Jira site host (e.g. `acme.atlassian.net`). `JIRA_SITE` overrides it.
    pub site: Option<String>,
    pub queries: Vec<String>,
    pub ready_status: String,
    pub done_status: String,
    pub max_results: u32,
    pub fields: Vec<String>,
    pub poll_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            provider: "jira".to_string(),
            site: None,
            queries: vec![format!(
                "project = KAN AND status = \"{}\" ORDER BY rank ASC",
                DEFAULT_READY_STATUS
            )],
            ready_status: DEFAULT_READY_STATUS.to_string(),
            done_status: DEFAULT_DONE_STATUS.to_string(),
            max_results: 50,
            fields: ["summary", "labels", "status", "parent", "comment"]
                .iter()
                .map(|field| field.to_string())
                .collect(),
            poll_interval_ms: DEFAULT_TRACKER_POLL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub max_concurrent: usize,
    pub default_model: ModelTier,
    pub default_workflow: String,
    pub default_provider: ProviderKind,
    pub provider_paths: ProviderPaths,
    /// Directory agents start in. Defaults to the console's working directory.
    pub working_dir: Option<PathBuf>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            default_model: ModelTier::Small,
            default_workflow: "intent".to_string(),
            default_provider: ProviderKind::Claude,
            provider_paths: ProviderPaths::default(),
            working_dir: None,
        }
    }
}

/// CLI path per provider; `"auto"` resolves through `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderPaths {
    pub claude: String,
    pub gemini: String,
}

impl Default for ProviderPaths {
    fn default() -> Self {
        Self {
            claude: "auto".to_string(),
            gemini: "auto".to_string(),
        }
    }
}

impl ProviderPaths {
    pub fn get(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::Claude => &self.claude,
            ProviderKind::Gemini => &self.gemini,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    pub session: String,
    pub poll_interval_ms: u64,
    /// Window names matching this pattern are agent windows.
    pub agent_id_pattern: String,
    /// Consecutive snapshots an attached agent may be missing before it is stale.
    pub stale_cycles: u32,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            session: DEFAULT_SESSION.to_string(),
            poll_interval_ms: DEFAULT_WINDOW_POLL_MS,
            agent_id_pattern: crate::patterns::DEFAULT_AGENT_ID_PATTERN.to_string(),
            stale_cycles: DEFAULT_STALE_CYCLES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkersConfig {
    /// Relative paths resolve against the agents' working directory.
    pub dir: PathBuf,
}

impl Default for MarkersConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_MARKER_DIR),
        }
    }
}

impl DispatchConfig {
    /// Loads the config at `path`, or `./dispatchator.toml` when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path(),
        };

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }

        let content = fs_err::read_to_string(&config_path).map_err(|source| DispatchError::Io {
            context: format!("reading {}", config_path.display()),
            source,
        })?;
        Self::parse(&content, &config_path)
    }

    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str::<Self>(content).map_err(|err| DispatchError::ConfigMalformed {
            path: origin.to_path_buf(),
            details: err.to_string(),
        })
    }

    /// Checks settings the loop relies on. Run once before anything starts.
    pub fn validate(&self) -> Result<()> {
        if self.tracker.provider != "jira" {
            return Err(DispatchError::ConfigInvalid(format!(
                "unsupported tracker provider '{}'",
                self.tracker.provider
            )));
        }
        if self.tracker.queries.iter().all(|query| query.trim().is_empty()) {
            return Err(DispatchError::ConfigInvalid(
                "tracker.queries must contain at least one query".to_string(),
            ));
        }
        if self.agents.max_concurrent == 0 {
            return Err(DispatchError::ConfigInvalid(
                "agents.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.tracker.poll_interval_ms == 0 || self.multiplexer.poll_interval_ms == 0 {
            return Err(DispatchError::ConfigInvalid(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.multiplexer.stale_cycles == 0 {
            return Err(DispatchError::ConfigInvalid(
                "multiplexer.stale_cycles must be at least 1".to_string(),
            ));
        }
        if self.multiplexer.session.trim().is_empty() {
            return Err(DispatchError::ConfigInvalid(
                "multiplexer.session must not be empty".to_string(),
            ));
        }
        AgentIdRule::new(&self.multiplexer.agent_id_pattern)?;
        Ok(())
    }

    pub fn working_dir(&self) -> PathBuf {
        self.agents
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn marker_dir(&self) -> PathBuf {
        if self.markers.dir.is_absolute() {
            self.markers.dir.clone()
        } else {
            self.working_dir().join(&self.markers.dir)
        }
    }

    pub fn profile_defaults(&self) -> ProfileDefaults {
        ProfileDefaults {
            model: self.agents.default_model,
            workflow: self.agents.default_workflow.clone(),
        }
    }

    pub fn project_dir(&self, project: &str) -> Option<PathBuf> {
        self.projects
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(project))
            .map(|(_, dir)| dir.clone())
    }
}

pub fn default_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

/// Returns `~/.dispatchator/logs`.
pub fn log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOG_DIR_RELATIVE_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config =
            DispatchConfig::load(Some(&temp_dir.path().join("missing.toml"))).expect("load config");
        assert_eq!(config.agents.max_concurrent, 2);
        assert_eq!(config.multiplexer.session, DEFAULT_SESSION);
        assert_eq!(config.tracker.ready_status, "Agent-Ready");
        assert_eq!(config.multiplexer.poll_interval_ms, 2_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_parses_partial_file_and_keeps_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs_err::write(
            &path,
            r#"
[tracker]
site = "acme.atlassian.net"
queries = ['project = OPS AND status in ("Agent-Ready", "In Progress") ORDER BY rank ASC']
done_status = "Closed"

[agents]
max_concurrent = 4
default_model = "medium"
default_provider = "gemini"

[agents.provider_paths]
claude = "/opt/bin/claude"

[multiplexer]
session = "ops-agents"

[projects]
billing = "/srv/billing"
"#,
        )
        .expect("write config");

        let config = DispatchConfig::load(Some(&path)).expect("load config");
        assert_eq!(config.tracker.site.as_deref(), Some("acme.atlassian.net"));
        assert_eq!(config.tracker.done_status, "Closed");
        assert_eq!(config.tracker.ready_status, DEFAULT_READY_STATUS);
        assert_eq!(config.agents.max_concurrent, 4);
        assert_eq!(config.agents.default_model, ModelTier::Medium);
        assert_eq!(config.agents.default_provider, ProviderKind::Gemini);
        assert_eq!(config.agents.provider_paths.claude, "/opt/bin/claude");
        assert_eq!(config.agents.provider_paths.gemini, "auto");
        assert_eq!(config.multiplexer.session, "ops-agents");
        assert_eq!(config.multiplexer.stale_cycles, DEFAULT_STALE_CYCLES);
        assert_eq!(
            config.project_dir("Billing"),
            Some(PathBuf::from("/srv/billing"))
        );
    }

    #[test]
    fn example_config_parses_and_validates() {
        let content = include_str!("../../../dispatchator.example.toml");
        let config = DispatchConfig::parse(content, Path::new("dispatchator.example.toml"))
            .expect("parse example");
        assert!(config.validate().is_ok());
        let defaults = DispatchConfig::default();
        assert_eq!(config.tracker.queries, defaults.tracker.queries);
        assert_eq!(config.tracker.fields, defaults.tracker.fields);
        assert_eq!(config.agents.max_concurrent, defaults.agents.max_concurrent);
        assert_eq!(config.multiplexer.session, defaults.multiplexer.session);
        assert_eq!(config.markers.dir, defaults.markers.dir);
        assert_eq!(config.project_dir("billing"), Some(PathBuf::from("/srv/billing")));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs_err::write(&path, "[agents]\nmax_concurrent = \"many\"\n").expect("write config");
        let err = DispatchConfig::load(Some(&path)).expect_err("malformed");
        assert!(matches!(err, DispatchError::ConfigMalformed { .. }));
    }

    #[test]
    fn validate_rejects_zero_agents_and_bad_pattern() {
        let mut config = DispatchConfig::default();
        config.agents.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = DispatchConfig::default();
        config.multiplexer.agent_id_pattern = "([".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn relative_marker_dir_resolves_against_working_dir() {
        let mut config = DispatchConfig::default();
        config.agents.working_dir = Some(PathBuf::from("/work/repo"));
        assert_eq!(
            config.marker_dir(),
            PathBuf::from("/work/repo/ia/state/agents")
        );
    }
}
