use crate::client::{ActionKind, Registry};
use crate::monitor::notify::Severity;
use crate::process::{ManagedProcess, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    Selected,
    All,
}

/// What the user asked for, before it is resolved against the process list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub scope: ActionScope,
}

impl ActionRequest {
    pub fn selected(kind: ActionKind) -> Self {
        Self {
            kind,
            scope: ActionScope::Selected,
        }
    }

    pub fn all(kind: ActionKind) -> Self {
        Self {
            kind,
            scope: ActionScope::All,
        }
    }

    pub fn label(&self) -> String {
        match self.scope {
            ActionScope::Selected => self.kind.verb().to_string(),
            ActionScope::All => format!("{} all", self.kind.verb()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTarget {
    pub target: Target,
    pub name: String,
}

impl From<&ManagedProcess> for ActionTarget {
    fn from(process: &ManagedProcess) -> Self {
        Self {
            target: process.target(),
            name: process.name.clone(),
        }
    }
}

/// A resolved control command, alive from request until the follow-up refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub targets: Vec<ActionTarget>,
    pub bulk: bool,
    pub requires_confirmation: bool,
}

impl PendingAction {
    pub fn single(kind: ActionKind, process: &ManagedProcess) -> Self {
        Self {
            kind,
            targets: vec![ActionTarget::from(process)],
            bulk: false,
            requires_confirmation: kind.is_destructive(),
        }
    }

    /// Bulk actions skip per-item prompts; only delete-all asks once.
    pub fn bulk(kind: ActionKind, processes: &[ManagedProcess]) -> Self {
        Self {
            kind,
            targets: processes.iter().map(ActionTarget::from).collect(),
            bulk: true,
            requires_confirmation: kind == ActionKind::Delete,
        }
    }

    pub fn describe(&self) -> String {
        if self.bulk {
            let n = self.targets.len();
            let noun = if n == 1 { "process" } else { "processes" };
            format!("{} all {n} {noun}", self.kind.verb())
        } else {
            let name = self.targets.first().map(|t| t.name.as_str()).unwrap_or("-");
            format!("{} {name}", self.kind.verb())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    Idle,
    Confirming(PendingAction),
    Executing(PendingAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    AwaitConfirmation,
    Execute(PendingAction),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("action in progress: {0}")]
    Busy(String),
}

/// Idle → Confirming (destructive only) → Executing → Idle.
#[derive(Debug, Default)]
pub struct Dispatcher {
    state: DispatchState,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.state == DispatchState::Idle
    }

    pub fn confirming(&self) -> Option<&PendingAction> {
        match &self.state {
            DispatchState::Confirming(action) => Some(action),
            _ => None,
        }
    }

    pub fn executing(&self) -> Option<&PendingAction> {
        match &self.state {
            DispatchState::Executing(action) => Some(action),
            _ => None,
        }
    }

    /// New requests are rejected, not queued, while another one is open.
    pub fn request(&mut self, action: PendingAction) -> Result<Step, DispatchError> {
        match &self.state {
            DispatchState::Confirming(current) | DispatchState::Executing(current) => {
                return Err(DispatchError::Busy(current.describe()));
            }
            DispatchState::Idle => {}
        }

        if action.requires_confirmation {
            self.state = DispatchState::Confirming(action);
            Ok(Step::AwaitConfirmation)
        } else {
            self.state = DispatchState::Executing(action.clone());
            Ok(Step::Execute(action))
        }
    }

    /// Answer the open prompt. Returns the action to run on a yes.
    pub fn confirm(&mut self, yes: bool) -> Option<PendingAction> {
        let DispatchState::Confirming(action) = std::mem::take(&mut self.state) else {
            // Not prompting: leave whatever was there untouched.
            return None;
        };
        if yes {
            self.state = DispatchState::Executing(action.clone());
            Some(action)
        } else {
            None
        }
    }

    pub fn finish(&mut self) -> Option<PendingAction> {
        match std::mem::take(&mut self.state) {
            DispatchState::Executing(action) => Some(action),
            other => {
                self.state = other;
                None
            }
        }
    }
}

/// Per-target results of one executed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub bulk: bool,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl ActionOutcome {
    pub fn notification(&self) -> (String, Severity) {
        let kind = self.kind;
        if !self.bulk {
            return match (self.succeeded.first(), self.failed.first()) {
                (Some(name), _) => (format!("{name} {}", kind.past_tense()), Severity::Success),
                (None, Some((name, err))) => {
                    (format!("{kind} {name} failed: {err}"), Severity::Error)
                }
                (None, None) => (format!("{kind}: nothing to do"), Severity::Info),
            };
        }

        let ok = self.succeeded.len();
        match self.failed.as_slice() {
            [] => (
                format!("{kind} all: {ok} {}", kind.past_tense()),
                Severity::Success,
            ),
            [(name, err), rest @ ..] => {
                let failed = rest.len() + 1;
                let severity = if ok == 0 {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                (
                    format!(
                        "{kind} all: {ok} {}, {failed} failed ({name}: {err})",
                        kind.past_tense()
                    ),
                    severity,
                )
            }
        }
    }
}

/// Run `action` against the registry, one target at a time. A failing target
/// does not stop the rest.
pub async fn execute(registry: &dyn Registry, action: &PendingAction) -> ActionOutcome {
    let mut outcome = ActionOutcome {
        kind: action.kind,
        bulk: action.bulk,
        succeeded: Vec::new(),
        failed: Vec::new(),
    };

    for target in &action.targets {
        match registry.perform(action.kind, &target.target).await {
            Ok(()) => {
                log::info!("{} {}", action.kind.past_tense(), target.name);
                outcome.succeeded.push(target.name.clone());
            }
            Err(e) => {
                log::warn!("{} {} failed: {e}", action.kind, target.name);
                outcome.failed.push((target.name.clone(), e.to_string()));
            }
        }
    }

    outcome
}

/// Action picker opened from the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMenu {
    items: Vec<ActionRequest>,
    cursor: usize,
}

impl ActionMenu {
    pub fn new() -> Self {
        let items = ActionKind::ALL
            .into_iter()
            .map(ActionRequest::selected)
            .chain(ActionKind::ALL.into_iter().map(ActionRequest::all))
            .collect();
        Self { items, cursor: 0 }
    }

    pub fn items(&self) -> &[ActionRequest] {
        &self.items
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn move_by(&mut self, delta: isize) {
        let len = self.items.len() as isize;
        self.cursor = (self.cursor as isize + delta).rem_euclid(len) as usize;
    }

    pub fn current(&self) -> ActionRequest {
        self.items[self.cursor]
    }
}

impl Default for ActionMenu {
    fn default() -> Self {
        Self::new()
    }
}
