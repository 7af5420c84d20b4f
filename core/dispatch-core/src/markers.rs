//! Marker files: the out-of-band channel agents use to report status.
//!
//! One directory, one file per agent and kind:
//!
//! ```text
//! <dir>/KAN-42.state        hook status (working, waiting, idle, done, ...)
//! <dir>/KAN-42.title        display title
//! <dir>/KAN-42.kill-agent   kill request (content ignored)
//! ```
//!
//! Agents write, the engine reads and deletes. Kill and done markers are
//! consumed at most once: [`MarkerDir::consume`] reports whether this call
//! removed the file, so a duplicate watcher event becomes a no-op.

use crate::error::{DispatchError, Result};
use crate::patterns::RE_MARKER_FILE;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkerKind {
    Status,
    Title,
    Kill,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 3] = [MarkerKind::Status, MarkerKind::Title, MarkerKind::Kill];

    pub fn suffix(&self) -> &'static str {
        match self {
            MarkerKind::Status => "state",
            MarkerKind::Title => "title",
            MarkerKind::Kill => "kill-agent",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "state" => Some(MarkerKind::Status),
            "title" => Some(MarkerKind::Title),
            "kill-agent" => Some(MarkerKind::Kill),
            _ => None,
        }
    }
}

/// A raw marker observation, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEvent {
    pub agent_id: String,
    pub kind: MarkerKind,
    pub content: String,
}

/// Last known marker state for one agent, used when reconnecting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentMarkers {
    pub status: Option<String>,
    pub title: Option<String>,
}

/// Splits a marker file name into agent id and kind.
pub fn parse_marker_name(file_name: &str) -> Option<(String, MarkerKind)> {
    let caps = RE_MARKER_FILE.captures(file_name)?;
    let kind = MarkerKind::from_suffix(caps.name("kind")?.as_str())?;
    Some((caps.name("id")?.as_str().to_string(), kind))
}

#[derive(Debug, Clone)]
pub struct MarkerDir {
    root: PathBuf,
}

impl MarkerDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> Result<()> {
        fs_err::create_dir_all(&self.root).map_err(|source| DispatchError::Io {
            context: format!("creating marker directory {}", self.root.display()),
            source,
        })
    }

    pub fn marker_path(&self, agent_id: &str, kind: MarkerKind) -> PathBuf {
        self.root.join(format!("{agent_id}.{}", kind.suffix()))
    }

    /// Reads one marker file into an event. Status and title markers need
    /// non-empty content; kill markers fire regardless.
    pub fn read_marker(&self, path: &Path) -> Option<MarkerEvent> {
        let file_name = path.file_name()?.to_str()?;
        let (agent_id, kind) = parse_marker_name(file_name)?;
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "Unreadable marker file");
                return None;
            }
        };
        if kind != MarkerKind::Kill && content.is_empty() {
            return None;
        }
        Some(MarkerEvent {
            agent_id,
            kind,
            content,
        })
    }

    pub fn read_agent(&self, agent_id: &str) -> AgentMarkers {
        let read = |kind| {
            self.read_marker(&self.marker_path(agent_id, kind))
                .map(|event| event.content)
        };
        AgentMarkers {
            status: read(MarkerKind::Status),
            title: read(MarkerKind::Title),
        }
    }

    /// Current status and title markers for every agent. Missing dir reads as empty.
    pub fn read_all(&self) -> BTreeMap<String, AgentMarkers> {
        let mut markers: BTreeMap<String, AgentMarkers> = BTreeMap::new();
        if !self.root.is_dir() {
            return markers;
        }
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let Some(event) = self.read_marker(entry.path()) else {
                continue;
            };
            let slot = markers.entry(event.agent_id).or_default();
            match event.kind {
                MarkerKind::Status => slot.status = Some(event.content),
                MarkerKind::Title => slot.title = Some(event.content),
                MarkerKind::Kill => {}
            }
        }
        markers
    }

    /// Deletes a marker. `true` only if this call removed an existing file.
    pub fn consume(&self, agent_id: &str, kind: MarkerKind) -> bool {
        let path = self.marker_path(agent_id, kind);
        match fs_err::remove_file(&path) {
            Ok(()) => true,
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to remove marker file");
                false
            }
        }
    }

    /// Removes every marker for an agent; missing files are fine.
    pub fn clear_agent(&self, agent_id: &str) {
        for kind in MarkerKind::ALL {
            self.consume(agent_id, kind);
        }
    }

    /// Atomically writes a marker, creating the directory on first use.
    pub fn write(&self, agent_id: &str, kind: MarkerKind, content: &str) -> Result<PathBuf> {
        self.ensure()?;
        let path = self.marker_path(agent_id, kind);
        let io_err = |source| DispatchError::Io {
            context: format!("writing marker {}", path.display()),
            source,
        };

        let mut temp = tempfile::NamedTempFile::new_in(&self.root).map_err(io_err)?;
        temp.write_all(content.as_bytes()).map_err(io_err)?;
        temp.write_all(b"\n").map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&path).map_err(|err| io_err(err.error))?;
        Ok(path)
    }
}
