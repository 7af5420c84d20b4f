//! Agent CLI providers.
//!
//! A provider knows where its CLI lives and how to turn a [`SpawnRequest`] into
//! an argument vector. Commands are always argv lists handed straight to
//! `tmux new-window`; nothing here builds a shell string.

use crate::error::{DispatchError, Result};
use crate::types::{AgentMode, ModelTier, ProviderKind, WorkItem};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const AUTO_PATH: &str = "auto";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub cwd: PathBuf,
    pub ticket_id: String,
    pub model: ModelTier,
    pub thinking: bool,
    pub agent_mode: AgentMode,
    pub workflow: String,
    /// Extra directory the agent may read and write (project routing).
    pub project_dir: Option<PathBuf>,
}

impl SpawnRequest {
    pub fn for_item(item: &WorkItem, cwd: &Path, project_dir: Option<PathBuf>) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            ticket_id: item.id.clone(),
            model: item.profile.model,
            thinking: item.profile.thinking,
            agent_mode: item.profile.agent_mode,
            workflow: item.profile.workflow.clone(),
            project_dir,
        }
    }
}

pub trait AgentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Executable looked up on `PATH` when the configured path is `auto`.
    fn binary_name(&self) -> &'static str;

    fn model_name(&self, tier: ModelTier) -> &'static str;

    fn resolve_path(&self, configured: &str) -> Result<PathBuf> {
        let configured = configured.trim();
        if !configured.is_empty() && configured != AUTO_PATH {
            return Ok(PathBuf::from(configured));
        }
        which::which(self.binary_name()).map_err(|err| DispatchError::ProviderNotFound {
            provider: self.kind().as_str().to_string(),
            details: format!(
                "{err}; set agents.provider_paths.{} in dispatchator.toml",
                self.kind().as_str()
            ),
        })
    }

    fn build_command(&self, path: &Path, request: &SpawnRequest) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeProvider;

impl AgentProvider for ClaudeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn binary_name(&self) -> &'static str {
        "claude"
    }

    fn model_name(&self, tier: ModelTier) -> &'static str {
        match tier {
            ModelTier::Small => "haiku",
            ModelTier::Medium => "sonnet",
            ModelTier::Strong => "opus",
        }
    }

    fn build_command(&self, path: &Path, request: &SpawnRequest) -> Vec<String> {
        let mut argv = vec![
            path.display().to_string(),
            "--model".to_string(),
            self.model_name(request.model).to_string(),
        ];
        if request.thinking {
            argv.push("--settings".to_string());
            argv.push(serde_json::json!({ "alwaysThinkingEnabled": true }).to_string());
        }
        if request.agent_mode != AgentMode::Default {
            argv.push("--permission-mode".to_string());
            argv.push(request.agent_mode.as_str().to_string());
        }
        if let Some(project_dir) = &request.project_dir {
            argv.push("--add-dir".to_string());
            argv.push(project_dir.display().to_string());
        }
        argv.push("--".to_string());
        argv.push(format!("/workflow:{} {}", request.workflow, request.ticket_id));
        argv
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiProvider;

impl AgentProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn binary_name(&self) -> &'static str {
        "gemini"
    }

    fn model_name(&self, tier: ModelTier) -> &'static str {
        match tier {
            ModelTier::Small => "gemini-2.5-flash",
            ModelTier::Medium | ModelTier::Strong => "gemini-2.5-pro",
        }
    }

    fn build_command(&self, path: &Path, request: &SpawnRequest) -> Vec<String> {
        let mut argv = vec![
            path.display().to_string(),
            "--model".to_string(),
            self.model_name(request.model).to_string(),
            "--approval-mode".to_string(),
            "yolo".to_string(),
        ];
        if let Some(project_dir) = &request.project_dir {
            argv.push("--include-directories".to_string());
            argv.push(project_dir.display().to_string());
        }
        argv.push("-i".to_string());
        argv.push(format!(
            "Read and execute .gemini/skills/workflow:{}/SKILL.md for work item {}",
            request.workflow, request.ticket_id
        ));
        argv
    }
}

pub fn provider_for(kind: ProviderKind) -> &'static dyn AgentProvider {
    match kind {
        ProviderKind::Claude => &ClaudeProvider,
        ProviderKind::Gemini => &GeminiProvider,
    }
}

/// Resolved CLI path per provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    default: ProviderKind,
    paths: BTreeMap<ProviderKind, PathBuf>,
}

impl ProviderRegistry {
    /// Resolves every provider. The default provider must resolve; the others
    /// are best-effort and items routed to a missing one fail at spawn.
    pub fn resolve(
        default: ProviderKind,
        configured: impl Fn(ProviderKind) -> String,
    ) -> Result<Self> {
        let mut paths = BTreeMap::new();
        for kind in ProviderKind::ALL {
            match provider_for(kind).resolve_path(&configured(kind)) {
                Ok(path) => {
                    tracing::debug!(provider = kind.as_str(), path = %path.display(), "Resolved agent CLI");
                    paths.insert(kind, path);
                }
                Err(err) if kind == default => return Err(err),
                Err(err) => {
                    tracing::warn!(provider = kind.as_str(), error = %err, "Agent CLI not available");
                }
            }
        }
        Ok(Self { default, paths })
    }

    pub fn with_paths(default: ProviderKind, paths: BTreeMap<ProviderKind, PathBuf>) -> Self {
        Self { default, paths }
    }

    pub fn default_kind(&self) -> ProviderKind {
        self.default
    }

    pub fn path(&self, kind: ProviderKind) -> Option<&Path> {
        self.paths.get(&kind).map(PathBuf::as_path)
    }

    /// Builds the argv for an item, honoring its provider override.
    pub fn command_for(&self, item: &WorkItem, request: &SpawnRequest) -> Result<Vec<String>> {
        let kind = item.profile.provider.unwrap_or(self.default);
        let path = self.path(kind).ok_or_else(|| DispatchError::ProviderNotFound {
            provider: kind.as_str().to_string(),
            details: "CLI path was not resolved at startup".to_string(),
        })?;
        Ok(provider_for(kind).build_command(path, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SpawnRequest {
        SpawnRequest {
            cwd: PathBuf::from("/work"),
            ticket_id: "KAN-7".to_string(),
            model: ModelTier::Strong,
            thinking: false,
            agent_mode: AgentMode::Default,
            workflow: "intent".to_string(),
            project_dir: None,
        }
    }

    #[test]
    fn claude_minimal_command() {
        let argv = ClaudeProvider.build_command(Path::new("/bin/claude"), &request());
        assert_eq!(
            argv,
            vec!["/bin/claude", "--model", "opus", "--", "/workflow:intent KAN-7"]
        );
    }

    #[test]
    fn claude_full_command_keeps_arguments_separate() {
        let mut request = request();
        request.thinking = true;
        request.agent_mode = AgentMode::Plan;
        request.project_dir = Some(PathBuf::from("/srv/my project"));
        let argv = ClaudeProvider.build_command(Path::new("claude"), &request);
        assert_eq!(
            argv,
            vec![
                "claude",
                "--model",
                "opus",
                "--settings",
                r#"{"alwaysThinkingEnabled":true}"#,
                "--permission-mode",
                "plan",
                "--add-dir",
                "/srv/my project",
                "--",
                "/workflow:intent KAN-7",
            ]
        );
    }

    #[test]
    fn gemini_command_uses_skill_prompt() {
        let mut request = request();
        request.model = ModelTier::Small;
        request.project_dir = Some(PathBuf::from("/srv/api"));
        let argv = GeminiProvider.build_command(Path::new("/bin/gemini"), &request);
        assert_eq!(argv[2], "gemini-2.5-flash");
        assert!(argv.contains(&"--include-directories".to_string()));
        assert_eq!(
            argv.last().map(String::as_str),
            Some("Read and execute .gemini/skills/workflow:intent/SKILL.md for work item KAN-7")
        );
    }

    #[test]
    fn explicit_path_skips_lookup() {
        let path = ClaudeProvider.resolve_path("/opt/claude").unwrap();
        assert_eq!(path, PathBuf::from("/opt/claude"));
    }

    #[test]
    fn registry_routes_provider_override() {
        let mut paths = BTreeMap::new();
        paths.insert(ProviderKind::Claude, PathBuf::from("/bin/claude"));
        let registry = ProviderRegistry::with_paths(ProviderKind::Claude, paths);

        let mut item = WorkItem::new("KAN-7", "x", "Agent-Ready");
        let argv = registry.command_for(&item, &request()).unwrap();
        assert_eq!(argv[0], "/bin/claude");

        item.profile.provider = Some(ProviderKind::Gemini);
        assert!(registry.command_for(&item, &request()).is_err());
    }
}
