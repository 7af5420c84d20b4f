//! Bounded operator log shown in the console's log panel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

pub const MAX_LOGS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    /// Which part of the loop produced the line (`tracker`, `agent`, `tmux`, ...).
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Logbook {
    lines: VecDeque<LogLine>,
}

impl Logbook {
    /// Appends a line, dropping the oldest past [`MAX_LOGS`]. Mirrored to tracing.
    pub fn push(&mut self, source: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(source, "{message}");
        self.lines.push_back(LogLine {
            at: Utc::now(),
            source: source.to_string(),
            message,
        });
        while self.lines.len() > MAX_LOGS {
            self.lines.pop_front();
        }
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
