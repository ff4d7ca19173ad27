use crate::process::ManagedProcess;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_LOG_CAPACITY: usize = 200;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    #[default]
    #[serde(alias = "stdout")]
    Out,
    #[serde(alias = "stderr")]
    Err,
}

/// A validated log event. At least one of `process_id` / `process_name` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub process_id: Option<u32>,
    pub process_name: Option<String>,
    pub stream: LogStream,
    pub text: String,
}

impl LogEvent {
    /// Build an event from loosely-typed wire fields. Returns `None` when the
    /// line cannot be attributed to any process.
    pub fn from_wire(
        id: Option<i64>,
        name: Option<String>,
        stream: Option<LogStream>,
        line: String,
    ) -> Option<Self> {
        let process_id = id.and_then(|id| u32::try_from(id).ok());
        let process_name = name.filter(|n| !n.is_empty());
        if process_id.is_none() && process_name.is_none() {
            return None;
        }
        Some(Self {
            process_id,
            process_name,
            stream: stream.unwrap_or_default(),
            text: line,
        })
    }

    /// Whether this event belongs to `process`. Ids win when both sides have
    /// one; otherwise fall back to the name.
    pub fn matches(&self, process: &ManagedProcess) -> bool {
        match (self.process_id, process.registry_id()) {
            (Some(event_id), Some(selected_id)) => event_id == selected_id,
            _ => self.process_name.as_deref() == Some(process.name.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub stream: LogStream,
    pub text: String,
}

// ---------------------------------------------------------------------------
// LogView — bounded tail of the selected process's output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LogView {
    capacity: usize,
    label: Option<String>,
    lines: VecDeque<LogLine>,
}

impl LogView {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            label: None,
            lines: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, event: LogEvent) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(LogLine {
            stream: event.stream,
            text: event.text,
        });
    }

    /// Clear the content and relabel, used when the selection moves.
    pub fn reset(&mut self, label: Option<String>) {
        self.lines.clear();
        self.label = label;
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

}

impl Default for LogView {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
