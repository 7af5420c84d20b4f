//! Directory watch over the marker dir.
//!
//! The watcher callback runs on notify's thread and only reads files and
//! sends; the engine thread owns every deletion.

use crate::error::Result;
use crate::event::Input;
use crate::markers::MarkerDir;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::mpsc::Sender;

/// Keeps the underlying watcher alive. Dropping it closes the watch.
pub struct MarkerWatcher {
    _watcher: RecommendedWatcher,
}

pub fn watch_markers(markers: MarkerDir, tx: Sender<Input>) -> Result<MarkerWatcher> {
    markers.ensure()?;
    let root = markers.path().to_path_buf();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "Marker watch error");
                return;
            }
        };
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        for path in &event.paths {
            if let Some(marker) = markers.read_marker(path) {
                tracing::debug!(agent_id = %marker.agent_id, kind = ?marker.kind, "Marker observed");
                if tx.send(Input::Marker(marker)).is_err() {
                    return;
                }
            }
        }
    })?;
    watcher.watch(&root, RecursiveMode::NonRecursive)?;
    tracing::info!(dir = %root.display(), "Watching marker files");

    Ok(MarkerWatcher { _watcher: watcher })
}
