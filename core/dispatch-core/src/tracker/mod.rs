//! Ticket sources.
//!
//! A [`TicketSource`] returns the full current set of open work items in
//! tracker rank order. Failures are reported to the engine as
//! `Input::TrackerFailed` and never stop the poll loop.

mod jira;

pub use jira::{issue_to_work_item, parse_search_response, Issue, JiraCredentials, JiraSource, SearchResponse};

use crate::error::{DispatchError, Result};
use crate::event::Input;
use crate::poller::wait_interval;
use crate::types::WorkItem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub trait TicketSource: Send {
    fn poll(&mut self) -> Result<Vec<WorkItem>>;
}

impl<T: TicketSource + ?Sized> TicketSource for Box<T> {
    fn poll(&mut self) -> Result<Vec<WorkItem>> {
        (**self).poll()
    }
}

/// Polls `source` immediately, then every `interval`.
pub fn spawn_tracker_poller<T>(
    mut source: T,
    interval: Duration,
    tx: Sender<Input>,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<()>>
where
    T: TicketSource + 'static,
{
    thread::Builder::new()
        .name("tracker-poller".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let input = match source.poll() {
                    Ok(items) => {
                        tracing::debug!(count = items.len(), "Tracker poll");
                        Input::Tracker(items)
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Tracker poll failed");
                        Input::TrackerFailed(err.to_string())
                    }
                };
                if tx.send(input).is_err() {
                    break;
                }
                if !wait_interval(&stop, interval) {
                    break;
                }
            }
            tracing::debug!("Tracker poller stopped");
        })
        .map_err(|source| DispatchError::Io {
            context: "starting tracker poller thread".to_string(),
            source,
        })
}
