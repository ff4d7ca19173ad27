use crate::process::{ManagedProcess, ProcessKey};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    All,
    Running,
    Stopped,
}

impl FilterMode {
    pub fn matches(self, process: &ManagedProcess) -> bool {
        match self {
            FilterMode::All => true,
            FilterMode::Running => process.is_online(),
            FilterMode::Stopped => !process.is_online(),
        }
    }

    pub fn next(self) -> Self {
        match self {
            FilterMode::All => FilterMode::Running,
            FilterMode::Running => FilterMode::Stopped,
            FilterMode::Stopped => FilterMode::All,
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::All => write!(f, "all"),
            FilterMode::Running => write!(f, "running"),
            FilterMode::Stopped => write!(f, "stopped"),
        }
    }
}

fn matches_query(process: &ManagedProcess, needle: &str) -> bool {
    process.name.to_lowercase().contains(needle)
        || process.namespace.to_lowercase().contains(needle)
        || process.status.to_string().contains(needle)
}

/// Process list plus the user's filter, search and selection.
///
/// The selection follows a process identity across polls; the index is only
/// re-derived for display. When the selected process drops out of the active
/// list the previous index is clamped and the selection moves to whatever now
/// occupies it.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    processes: Vec<ManagedProcess>,
    filter_mode: FilterMode,
    search_query: Option<String>,
    filtered_processes: Vec<ManagedProcess>,
    selected_index: usize,
    selected_key: Option<ProcessKey>,
    paused: bool,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processes(&self) -> &[ManagedProcess] {
        &self.processes
    }

    /// The active list: mode filter and search applied.
    pub fn filtered_processes(&self) -> &[ManagedProcess] {
        &self.filtered_processes
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter_mode
    }

    pub fn search_query(&self) -> Option<&str> {
        self.search_query.as_deref()
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn selected_key(&self) -> Option<&ProcessKey> {
        self.selected_key.as_ref()
    }

    pub fn selected(&self) -> Option<&ManagedProcess> {
        self.filtered_processes.get(self.selected_index)
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    /// Swap in a freshly polled list. Sorted by name, id breaks ties.
    pub fn replace_processes(&mut self, mut processes: Vec<ManagedProcess>) {
        processes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        self.processes = processes;
        self.project();
    }

    pub fn set_filter(&mut self, mode: FilterMode) {
        self.filter_mode = mode;
        self.project();
    }

    /// Blank queries clear the search.
    pub fn set_search(&mut self, query: Option<String>) {
        self.search_query = query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        self.project();
    }

    pub fn select_delta(&mut self, delta: isize) {
        let len = self.filtered_processes.len();
        if len == 0 {
            return;
        }
        let target = self.selected_index.saturating_add_signed(delta).min(len - 1);
        self.select_index(target);
    }

    pub fn jump_first(&mut self) {
        self.select_index(0);
    }

    pub fn jump_last(&mut self) {
        let len = self.filtered_processes.len();
        self.select_index(len.saturating_sub(1));
    }

    fn select_index(&mut self, index: usize) {
        self.selected_index = index;
        self.selected_key = self.filtered_processes.get(index).map(ManagedProcess::key);
    }

    /// Re-run filter and search, then re-derive the selection.
    fn project(&mut self) {
        let needle = self.search_query.as_deref().map(str::to_lowercase);
        self.filtered_processes = self
            .processes
            .iter()
            .filter(|p| self.filter_mode.matches(p))
            .filter(|p| needle.as_deref().is_none_or(|n| matches_query(p, n)))
            .cloned()
            .collect();

        let len = self.filtered_processes.len();
        if len == 0 {
            self.selected_index = 0;
            self.selected_key = None;
            return;
        }

        let found = self
            .selected_key
            .as_ref()
            .and_then(|key| self.filtered_processes.iter().position(|p| &p.key() == key));
        match found {
            Some(idx) => self.selected_index = idx,
            None => self.select_index(self.selected_index.min(len - 1)),
        }
    }
}
