//! Render-ready view of the monitor state.
//!
//! A [`Snapshot`] is built in one go from the core's state and handed to the
//! renderer behind an `Arc`, so the renderer never sees a half-applied update.

use crate::format;
use crate::history::Trend;
use crate::log::LogLine;
use crate::monitor::insights::{Insight, Summary};
use crate::monitor::notify::Severity;
use crate::monitor::view::FilterMode;
use crate::process::{ManagedProcess, ProcessStatus};

pub const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Overview,
    Logs,
}

impl ViewMode {
    pub fn toggle(self) -> Self {
        match self {
            ViewMode::Overview => ViewMode::Logs,
            ViewMode::Logs => ViewMode::Overview,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub clock: String,
    pub connected: bool,
    pub paused: bool,
    /// Whether the process-list timer is running.
    pub polling: bool,
    pub logs_degraded: bool,
    pub filter: FilterMode,
    pub search: Option<String>,
    pub refresh_ms: u64,
    /// Spinner frame plus description while an action executes.
    pub activity: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuEntry {
    pub label: String,
    pub highlighted: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionsPanel {
    pub menu_open: bool,
    pub entries: Vec<MenuEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRow {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub status: ProcessStatus,
    pub pid: String,
    pub uptime: String,
    pub cpu: String,
    pub memory: String,
    pub restarts: u32,
}

impl From<&ManagedProcess> for ProcessRow {
    fn from(p: &ManagedProcess) -> Self {
        Self {
            id: format::format_optional(p.registry_id()),
            name: p.name.clone(),
            namespace: p.namespace.clone(),
            status: p.status,
            pid: format::format_optional(p.pid),
            uptime: format::format_uptime(p.uptime_ms),
            cpu: format::format_percent(p.cpu_percent),
            memory: format::format_memory(p.memory_bytes),
            restarts: p.restarts.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailPanel {
    pub title: String,
    pub status: Option<ProcessStatus>,
    pub fields: Vec<(&'static str, String)>,
}

impl DetailPanel {
    pub fn for_process(selected: Option<&ManagedProcess>) -> Self {
        let Some(p) = selected else {
            return Self {
                title: "no process selected".to_string(),
                ..Self::default()
            };
        };
        let mut fields = vec![
            ("id", format::format_optional(p.registry_id())),
            ("namespace", p.namespace.clone()),
            ("status", p.status.to_string()),
            ("pid", format::format_optional(p.pid)),
            ("uptime", format::format_uptime(p.uptime_ms)),
            ("restarts", format::format_optional(p.restarts)),
            ("cpu", format::format_percent(p.cpu_percent)),
            ("memory", format::format_memory(p.memory_bytes)),
        ];
        if let Some(mode) = &p.exec_mode {
            fields.push(("mode", mode.clone()));
        }
        if let Some(script) = &p.script {
            fields.push(("script", script.clone()));
        }
        Self {
            title: p.name.clone(),
            status: Some(p.status),
            fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsPanel {
    pub cpu: String,
    pub memory: String,
    pub cpu_spark: String,
    pub mem_spark: String,
    /// Mean and peak CPU over the history window.
    pub cpu_window: String,
    pub cpu_trend: Trend,
    pub mem_trend: Trend,
    pub samples: usize,
}

impl Default for MetricsPanel {
    fn default() -> Self {
        Self {
            cpu: "-".to_string(),
            memory: "-".to_string(),
            cpu_spark: String::new(),
            mem_spark: String::new(),
            cpu_window: String::new(),
            cpu_trend: Trend::Steady,
            mem_trend: Trend::Steady,
            samples: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogPanel {
    pub label: Option<String>,
    pub lines: Vec<LogLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationView {
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub header: Header,
    pub summary: Summary,
    pub actions: ActionsPanel,
    pub rows: Vec<ProcessRow>,
    pub selected: Option<usize>,
    pub detail: DetailPanel,
    pub metrics: MetricsPanel,
    pub insights: Vec<Insight>,
    pub log: LogPanel,
    pub footer: String,
    pub notification: Option<NotificationView>,
    /// Open confirmation question, if any.
    pub prompt: Option<String>,
    pub view: ViewMode,
}

impl Snapshot {
    pub fn selected_row(&self) -> Option<&ProcessRow> {
        self.selected.and_then(|idx| self.rows.get(idx))
    }
}

pub fn footer_text(menu_open: bool, prompting: bool) -> String {
    if prompting {
        "y confirm | n/esc cancel".to_string()
    } else if menu_open {
        "↑/↓ choose | enter run | esc close".to_string()
    } else {
        "q quit | ↑/↓ move | / search | f filter | a actions | s/x/r/l/d start/stop/restart/reload/delete | S/X/R/L/D all | p pause | F5 refresh | v view".to_string()
    }
}
