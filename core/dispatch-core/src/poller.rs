//! Periodic window sampling.
//!
//! The poller keeps the previous snapshot and diffs against it. The first
//! poll compares with an empty snapshot, so windows that already exist at
//! startup surface as `WindowAdded` and get reconnected.
//!
//! The base window is pinned to the lowest index of the first listing and
//! held until the session disappears. Once the operator closes it, every
//! untagged window is an orphan.

use crate::error::{DispatchError, Result};
use crate::event::{DomainEvent, Input};
use crate::launcher::WindowSource;
use crate::normalize::diff_windows;
use crate::window::WindowSnapshot;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct WindowPoller<S: WindowSource> {
    source: S,
    previous: WindowSnapshot,
    base_index: Option<u32>,
}

impl<S: WindowSource> WindowPoller<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            previous: WindowSnapshot::empty(Utc::now()),
            base_index: None,
        }
    }

    pub fn poll_once(&mut self) -> (WindowSnapshot, Vec<DomainEvent>) {
        let mut snapshot = self.source.snapshot();
        if snapshot.entries.is_empty() {
            self.base_index = None;
        } else if self.base_index.is_none() {
            self.base_index = snapshot.base_index;
        } else {
            snapshot.base_index = self.base_index;
        }
        let events = diff_windows(&self.previous, &snapshot);
        self.previous = snapshot.clone();
        (snapshot, events)
    }
}

/// Polls on a fixed interval until `stop` is set or the engine hangs up.
pub fn spawn_window_poller<S>(
    mut poller: WindowPoller<S>,
    interval: Duration,
    tx: Sender<Input>,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<()>>
where
    S: WindowSource + 'static,
{
    thread::Builder::new()
        .name("window-poller".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let (snapshot, events) = poller.poll_once();
                if !events.is_empty() {
                    tracing::debug!(windows = snapshot.entries.len(), events = events.len(), "Window diff");
                }
                if tx.send(Input::Windows { snapshot, events }).is_err() {
                    break;
                }
                if !wait_interval(&stop, interval) {
                    break;
                }
            }
            tracing::debug!("Window poller stopped");
        })
        .map_err(|source| DispatchError::Io {
            context: "starting window poller thread".to_string(),
            source,
        })
}

/// Sleeps for `interval` in short slices. Returns `false` if stopped early.
pub fn wait_interval(stop: &AtomicBool, interval: Duration) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(STOP_CHECK_INTERVAL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowEntry;
    use std::collections::VecDeque;
    use std::sync::{mpsc, Mutex};

    #[derive(Clone, Default)]
    struct FakeSource {
        listings: Arc<Mutex<VecDeque<Vec<WindowEntry>>>>,
    }

    impl FakeSource {
        fn push(&self, ids: &[Option<&str>]) {
            let entries = ids
                .iter()
                .enumerate()
                .map(|(index, id)| WindowEntry {
                    index: index as u32,
                    name: id.unwrap_or("zsh").to_string(),
                    agent_id: id.map(str::to_string),
                    pane_title: String::new(),
                })
                .collect();
            self.listings.lock().unwrap().push_back(entries);
        }

        fn push_indexed(&self, windows: &[(u32, Option<&str>)]) {
            let entries = windows
                .iter()
                .map(|(index, id)| WindowEntry {
                    index: *index,
                    name: id.unwrap_or("zsh").to_string(),
                    agent_id: id.map(str::to_string),
                    pane_title: String::new(),
                })
                .collect();
            self.listings.lock().unwrap().push_back(entries);
        }
    }

    impl WindowSource for FakeSource {
        fn list_windows(&self) -> Vec<WindowEntry> {
            self.listings.lock().unwrap().pop_front().unwrap_or_default()
        }

        fn active_window(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn poll_once_diffs_against_previous() {
        let source = FakeSource::default();
        source.push(&[None, Some("KAN-1")]);
        source.push(&[None, Some("KAN-1"), Some("KAN-2")]);
        source.push(&[]);

        let mut poller = WindowPoller::new(source);
        let (_, events) = poller.poll_once();
        assert_eq!(events, vec![DomainEvent::WindowAdded("KAN-1".to_string())]);

        let (_, events) = poller.poll_once();
        assert_eq!(events, vec![DomainEvent::WindowAdded("KAN-2".to_string())]);

        // Session gone: empty snapshot, both windows removed, no error.
        let (snapshot, events) = poller.poll_once();
        assert!(snapshot.entries.is_empty());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn base_window_stays_pinned_until_session_ends() {
        let source = FakeSource::default();
        source.push_indexed(&[(0, None), (1, Some("KAN-1"))]);
        source.push_indexed(&[(1, Some("KAN-1")), (2, None)]);
        source.push_indexed(&[]);
        source.push_indexed(&[(3, None), (4, Some("KAN-1"))]);

        let mut poller = WindowPoller::new(source);
        let (snapshot, events) = poller.poll_once();
        assert_eq!(snapshot.base_index, Some(0));
        assert!(!events.iter().any(|event| matches!(event, DomainEvent::OrphanWindow(_))));

        // Shell at 0 closed: the stray window is not promoted to base.
        let (snapshot, events) = poller.poll_once();
        assert_eq!(snapshot.base_index, Some(0));
        assert!(events.contains(&DomainEvent::OrphanWindow(2)));

        // A new session pins its own base.
        poller.poll_once();
        let (snapshot, events) = poller.poll_once();
        assert_eq!(snapshot.base_index, Some(3));
        assert!(!events.iter().any(|event| matches!(event, DomainEvent::OrphanWindow(_))));
    }

    #[test]
    fn spawned_poller_stops_on_flag() {
        let source = FakeSource::default();
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_window_poller(
            WindowPoller::new(source),
            Duration::from_millis(20),
            tx,
            stop.clone(),
        )
        .unwrap();
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(2)),
            Ok(Input::Windows { .. })
        ));
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn wait_interval_returns_false_when_stopped() {
        let stop = AtomicBool::new(true);
        assert!(!wait_interval(&stop, Duration::from_secs(10)));
        let stop = AtomicBool::new(false);
        assert!(wait_interval(&stop, Duration::from_millis(1)));
    }
}
