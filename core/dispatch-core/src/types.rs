//! Core domain types: work items, execution profiles and attached agents.

use serde::{Deserialize, Serialize};

/// Canonical hook status strings written by agent processes.
///
/// The status itself stays free-form; anything outside this set is carried
/// through verbatim and counts as occupying a slot.
pub mod hook_status {
    pub const WORKING: &str = "working";
    pub const WAITING: &str = "waiting";
    pub const IDLE: &str = "idle";
    pub const DONE: &str = "done";
    /// Status of a freshly attached agent that has not reported yet.
    pub const UNKNOWN: &str = "?";

    /// Agents parked on the operator (waiting) or finished a turn (idle)
    /// release their execution slot.
    pub fn frees_slot(status: &str) -> bool {
        matches!(status, WAITING | IDLE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Small,
    Medium,
    Strong,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Small => "small",
            ModelTier::Medium => "medium",
            ModelTier::Strong => "strong",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "small" => Some(ModelTier::Small),
            "medium" => Some(ModelTier::Medium),
            "strong" => Some(ModelTier::Strong),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Default,
    Plan,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Default => "default",
            AgentMode::Plan => "plan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Claude,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Claude, ProviderKind::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "claude" => Some(ProviderKind::Claude),
            "gemini" => Some(ProviderKind::Gemini),
            _ => None,
        }
    }
}

/// How an agent for a work item should be launched. Derived from tracker labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub model: ModelTier,
    pub thinking: bool,
    pub agent_mode: AgentMode,
    pub workflow: String,
    /// Provider override; `None` uses the configured default provider.
    pub provider: Option<ProviderKind>,
    /// Project routing key, resolved to a directory through `[projects]`.
    pub project: Option<String>,
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self {
            model: ModelTier::default(),
            thinking: false,
            agent_mode: AgentMode::default(),
            workflow: "intent".to_string(),
            provider: None,
            project: None,
        }
    }
}

/// A ticket from the tracker. Identity is the ticket key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub summary: String,
    /// Lifecycle status name as reported by the tracker.
    pub status: String,
    pub parent_id: Option<String>,
    pub comment_count: u32,
    pub profile: ExecutionProfile,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, summary: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            status: status.into(),
            parent_id: None,
            comment_count: 0,
            profile: ExecutionProfile::default(),
        }
    }
}

/// An external agent process bound 1:1 to a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentProcess {
    pub work_item_id: String,
    pub hook_status: String,
    /// Mirrors the pane title of the agent's window.
    pub title: String,
}

impl AgentProcess {
    pub fn new(work_item_id: impl Into<String>) -> Self {
        Self {
            work_item_id: work_item_id.into(),
            hook_status: hook_status::UNKNOWN.to_string(),
            title: String::new(),
        }
    }

    pub fn occupies_slot(&self) -> bool {
        !hook_status::frees_slot(&self.hook_status)
    }
}
