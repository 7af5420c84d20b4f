//! Tracker label vocabulary → execution profile.
//!
//! Labels are the ad hoc feature flags operators put on tickets. This is the
//! parse boundary: everything past here sees a typed [`ExecutionProfile`].
//! Unknown labels are ignored.
//!
//! ```text
//! IA:MODEL:SMALL|MEDIUM|STRONG   model tier (first match wins)
//! IA:CAP:THINK                   extended thinking
//! IA:AGENT:PLAN                  plan permission mode
//! IA:WORKFLOW:<NAME>             workflow, lower-cased, '_' → '-'
//! IA:PROVIDER:CLAUDE|GEMINI      provider override
//! IA:PROJECT:<NAME>              project routing key
//! ```

use crate::types::{AgentMode, ExecutionProfile, ModelTier, ProviderKind};

const MODEL_PREFIX: &str = "IA:MODEL:";
const THINKING_LABEL: &str = "IA:CAP:THINK";
const PLAN_LABEL: &str = "IA:AGENT:PLAN";
const WORKFLOW_PREFIX: &str = "IA:WORKFLOW:";
const PROVIDER_PREFIX: &str = "IA:PROVIDER:";
const PROJECT_PREFIX: &str = "IA:PROJECT:";

/// Values used when a ticket carries no label for a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDefaults {
    pub model: ModelTier,
    pub workflow: String,
}

impl Default for ProfileDefaults {
    fn default() -> Self {
        Self {
            model: ModelTier::Small,
            workflow: "intent".to_string(),
        }
    }
}

pub fn parse_profile(labels: &[String], defaults: &ProfileDefaults) -> ExecutionProfile {
    ExecutionProfile {
        model: parse_model(labels).unwrap_or(defaults.model),
        thinking: labels.iter().any(|label| label == THINKING_LABEL),
        agent_mode: parse_agent_mode(labels),
        workflow: parse_workflow(labels).unwrap_or_else(|| defaults.workflow.clone()),
        provider: parse_provider(labels),
        project: parse_project(labels),
    }
}

fn parse_model(labels: &[String]) -> Option<ModelTier> {
    labels
        .iter()
        .filter_map(|label| label.strip_prefix(MODEL_PREFIX))
        .find_map(ModelTier::parse)
}

fn parse_agent_mode(labels: &[String]) -> AgentMode {
    if labels.iter().any(|label| label == PLAN_LABEL) {
        AgentMode::Plan
    } else {
        AgentMode::Default
    }
}

fn parse_workflow(labels: &[String]) -> Option<String> {
    labels
        .iter()
        .filter_map(|label| label.strip_prefix(WORKFLOW_PREFIX))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(|name| name.to_lowercase().replace('_', "-"))
}

fn parse_provider(labels: &[String]) -> Option<ProviderKind> {
    labels
        .iter()
        .filter_map(|label| label.strip_prefix(PROVIDER_PREFIX))
        .find_map(ProviderKind::parse)
}

fn parse_project(labels: &[String]) -> Option<String> {
    labels
        .iter()
        .filter_map(|label| label.strip_prefix(PROJECT_PREFIX))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_lowercase)
}
