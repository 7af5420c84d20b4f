//! Error types for dispatch-core operations.
//!
//! Only startup paths (config, credentials, provider resolution) surface these
//! to the operator. Once the reconciliation loop runs, every collaborator
//! failure is logged and treated as "no change this cycle".

use std::path::PathBuf;

/// All errors that can occur in dispatch-core operations.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Missing credential: {0} is not set")]
    MissingCredential(String),

    #[error("Agent CLI not found for provider {provider}: {details}")]
    ProviderNotFound { provider: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Marker directory watch failed: {0}")]
    Watch(#[from] notify::Error),

    // ─────────────────────────────────────────────────────────────────────
    // Collaborator Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Tracker request failed: {context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Tracker returned HTTP {status}: {body}")]
    TrackerStatus { status: u16, body: String },

    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },
}

/// Convenience type alias for Results using DispatchError.
pub type Result<T> = std::result::Result<T, DispatchError>;

impl From<DispatchError> for String {
    fn from(err: DispatchError) -> String {
        err.to_string()
    }
}
