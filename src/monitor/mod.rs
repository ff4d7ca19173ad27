//! The monitoring/control core.
//!
//! One task owns every piece of mutable dashboard state and runs a `select!`
//! loop over its sources: renderer commands, the process-list and metrics
//! timers, the log stream, the notification deadline, and completions of
//! registry/metrics calls. Those calls run in spawned tasks and report back
//! over a channel, so the loop itself never waits on the registry. After every
//! handled event a fresh [`Snapshot`] is published on a watch channel.

pub mod actions;
pub mod insights;
pub mod notify;
pub mod snapshot;
pub mod view;

use crate::client::{LogMessage, LogSink, Registry, RegistryError, Subscription};
use crate::config::DashboardConfig;
use crate::format;
use crate::history::MetricsHistory;
use crate::log::LogView;
use crate::metrics::{HostLoad, HostMetrics, MetricsError};
use crate::process::{ManagedProcess, ProcessKey};
use actions::{ActionMenu, ActionOutcome, ActionScope, Dispatcher, PendingAction};
use insights::Thresholds;
use notify::NotificationSlot;
use snapshot::{
    ActionsPanel, DetailPanel, Header, LogPanel, MenuEntry, MetricsPanel, NotificationView,
    ProcessRow, SPINNER_FRAMES,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use view::ViewState;

pub use actions::ActionRequest;
pub use notify::Severity;
pub use snapshot::{Snapshot, ViewMode};
pub use view::FilterMode;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
const RESUBSCRIBE_BASE: Duration = Duration::from_secs(1);
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(30);
const DEGRADED_AFTER_FAILURES: u32 = 3;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub refresh_interval: Duration,
    pub metrics_interval: Duration,
    pub history_capacity: usize,
    pub log_capacity: usize,
    pub notification_ttl: Duration,
    pub thresholds: Thresholds,
}

impl From<&DashboardConfig> for MonitorSettings {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval(),
            metrics_interval: config.metrics_interval(),
            history_capacity: config.history_capacity,
            log_capacity: config.log_capacity,
            notification_ttl: config.notification_ttl(),
            thresholds: Thresholds::from(config),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&DashboardConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Command surface
// ---------------------------------------------------------------------------

/// Everything the renderer can ask of the core.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Tick,
    SelectDelta(isize),
    JumpFirst,
    JumpLast,
    SetFilter(FilterMode),
    CycleFilter,
    Search(Option<String>),
    TogglePause,
    ForceRefresh,
    OpenActionMenu,
    CloseActionMenu,
    MenuDelta(isize),
    MenuActivate,
    Action(ActionRequest),
    Confirm(bool),
    ToggleView,
    Shutdown,
}

/// Completions reported back by spawned work.
#[derive(Debug)]
enum Completion {
    Processes(Result<Vec<ManagedProcess>, RegistryError>),
    Metrics(Result<HostLoad, MetricsError>),
    Action(ActionOutcome),
    Resubscribe,
    Subscribed(Result<Subscription, RegistryError>),
}

#[derive(Debug)]
enum Event {
    Command(Command),
    Completion(Completion),
    Log(LogMessage),
    PollDue,
    MetricsDue,
    NotificationDue,
    Reaped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Nothing visible changed; skip publishing.
    Unchanged,
    Exit,
}

#[derive(Debug, Default)]
struct Timers {
    poll: Option<Interval>,
    metrics: Option<Interval>,
}

fn periodic(period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor {
    registry: Arc<dyn Registry>,
    metrics: Arc<dyn HostMetrics>,
    settings: MonitorSettings,

    view: ViewState,
    history: MetricsHistory,
    last_load: Option<HostLoad>,
    log_view: LogView,
    notification: NotificationSlot,
    dispatcher: Dispatcher,
    menu: Option<ActionMenu>,
    view_mode: ViewMode,
    spinner: usize,
    connected: bool,

    refresh_in_flight: bool,
    refresh_queued: bool,
    metrics_in_flight: bool,

    subscription: Option<Subscription>,
    log_failures: u32,
    logs_degraded: bool,

    timers: Timers,
    tasks: JoinSet<()>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    log_tx: LogSink,
    log_rx: mpsc::UnboundedReceiver<LogMessage>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    shut_down: bool,
}

impl Monitor {
    pub fn new(
        registry: Arc<dyn Registry>,
        metrics: Arc<dyn HostMetrics>,
        settings: MonitorSettings,
    ) -> (Self, watch::Receiver<Arc<Snapshot>>) {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Snapshot::default()));

        let monitor = Self {
            registry,
            metrics,
            view: ViewState::new(),
            history: MetricsHistory::with_capacity(settings.history_capacity),
            last_load: None,
            log_view: LogView::new(settings.log_capacity),
            notification: NotificationSlot::new(settings.notification_ttl),
            dispatcher: Dispatcher::new(),
            menu: None,
            view_mode: ViewMode::default(),
            spinner: 0,
            connected: false,
            refresh_in_flight: false,
            refresh_queued: false,
            metrics_in_flight: false,
            subscription: None,
            log_failures: 0,
            logs_degraded: false,
            timers: Timers::default(),
            tasks: JoinSet::new(),
            completion_tx,
            completion_rx,
            log_tx,
            log_rx,
            snapshot_tx,
            shut_down: false,
            settings,
        };
        (monitor, snapshot_rx)
    }

    /// Connect to the registry and start the timers and log subscription.
    /// A connection failure here is fatal to the session.
    pub async fn start(&mut self) -> Result<(), RegistryError> {
        self.registry.connect().await?;
        self.connected = true;

        self.timers.poll = Some(periodic(self.settings.refresh_interval));
        self.timers.metrics = Some(periodic(self.settings.metrics_interval));

        match self.registry.subscribe_logs(self.log_tx.clone()).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => self.log_stream_failed(Some(e.to_string())),
        }

        self.refresh_processes(true);
        self.sample_metrics();
        self.publish();
        Ok(())
    }

    /// Run until a `Shutdown` command arrives or the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let event = tokio::select! {
                cmd = commands.recv() => Event::Command(cmd.unwrap_or(Command::Shutdown)),
                Some(done) = self.completion_rx.recv() => Event::Completion(done),
                Some(msg) = self.log_rx.recv() => Event::Log(msg),
                _ = tick(&mut self.timers.poll) => Event::PollDue,
                _ = tick(&mut self.timers.metrics) => Event::MetricsDue,
                _ = sleep_until(self.notification.deadline()) => Event::NotificationDue,
                Some(joined) = self.tasks.join_next() => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        log::error!("background task panicked: {e}");
                    }
                    Event::Reaped
                }
            };

            if matches!(event, Event::Reaped) {
                continue;
            }
            match self.handle(event) {
                Flow::Exit => break,
                Flow::Unchanged => {}
                Flow::Continue => self.publish(),
            }
        }

        self.shutdown().await;
    }

    /// Stop timers, abort in-flight calls, drop the log subscription, then
    /// disconnect within a bounded time. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.timers.poll = None;
        self.timers.metrics = None;
        self.tasks.abort_all();
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.registry.disconnect())
            .await
            .is_err()
        {
            log::warn!("registry disconnect timed out after {SHUTDOWN_TIMEOUT:?}");
        }
        log::info!("monitor stopped");
    }

    fn handle(&mut self, event: Event) -> Flow {
        match event {
            Event::Command(cmd) => return self.handle_command(cmd),
            Event::Completion(done) => self.handle_completion(done),
            Event::Log(msg) => {
                if !self.handle_log(msg) {
                    return Flow::Unchanged;
                }
            }
            Event::PollDue => self.refresh_processes(false),
            Event::MetricsDue => self.sample_metrics(),
            Event::NotificationDue => {
                self.notification.expire(Instant::now());
            }
            Event::Reaped => {}
        }
        Flow::Continue
    }

    fn handle_command(&mut self, cmd: Command) -> Flow {
        let before = self.view.selected_key().cloned();
        match cmd {
            Command::Tick => {
                self.spinner = (self.spinner + 1) % SPINNER_FRAMES.len();
                self.notification.expire(Instant::now());
            }
            Command::SelectDelta(delta) => self.view.select_delta(delta),
            Command::JumpFirst => self.view.jump_first(),
            Command::JumpLast => self.view.jump_last(),
            Command::SetFilter(mode) => self.view.set_filter(mode),
            Command::CycleFilter => self.view.set_filter(self.view.filter_mode().next()),
            Command::Search(query) => self.view.set_search(query),
            Command::TogglePause => self.toggle_pause(),
            Command::ForceRefresh => {
                self.notify("refreshing", Severity::Info);
                self.refresh_processes(true);
            }
            Command::OpenActionMenu => {
                if self.dispatcher.is_idle() {
                    self.menu = Some(ActionMenu::new());
                } else {
                    self.notify("action in progress", Severity::Warning);
                }
            }
            Command::CloseActionMenu => self.menu = None,
            Command::MenuDelta(delta) => {
                if let Some(menu) = self.menu.as_mut() {
                    menu.move_by(delta);
                }
            }
            Command::MenuActivate => {
                if let Some(menu) = self.menu.take() {
                    self.request_action(menu.current());
                }
            }
            Command::Action(request) => self.request_action(request),
            Command::Confirm(yes) => self.confirm(yes),
            Command::ToggleView => self.view_mode = self.view_mode.toggle(),
            Command::Shutdown => return Flow::Exit,
        }
        self.sync_log_target(before);
        Flow::Continue
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Processes(result) => self.apply_processes(result),
            Completion::Metrics(result) => self.apply_metrics(result),
            Completion::Action(outcome) => {
                let (message, severity) = outcome.notification();
                self.notify(message, severity);
                self.refresh_processes(true);
                self.dispatcher.finish();
            }
            Completion::Resubscribe => self.resubscribe(),
            Completion::Subscribed(Ok(subscription)) => {
                log::info!("log stream resubscribed");
                self.subscription = Some(subscription);
                self.logs_degraded = false;
            }
            Completion::Subscribed(Err(e)) => self.log_stream_failed(Some(e.to_string())),
        }
    }

    /// Returns whether the event changed anything worth publishing.
    fn handle_log(&mut self, msg: LogMessage) -> bool {
        match msg {
            LogMessage::Event(event) => {
                self.log_failures = 0;
                // Events for processes that left the list simply don't match.
                match self.view.selected() {
                    Some(selected) if event.matches(selected) => {
                        self.log_view.push(event);
                        true
                    }
                    _ => false,
                }
            }
            LogMessage::Closed(reason) => {
                self.subscription = None;
                self.log_stream_failed(reason);
                true
            }
        }
    }

    // -- polling ------------------------------------------------------------

    fn refresh_processes(&mut self, force: bool) {
        if self.view.paused() && !force {
            return;
        }
        if self.refresh_in_flight {
            if force {
                self.refresh_queued = true;
            }
            return;
        }
        self.refresh_in_flight = true;

        let registry = Arc::clone(&self.registry);
        let tx = self.completion_tx.clone();
        self.tasks.spawn(async move {
            let result = registry.list().await;
            let _ = tx.send(Completion::Processes(result));
        });
    }

    fn apply_processes(&mut self, result: Result<Vec<ManagedProcess>, RegistryError>) {
        self.refresh_in_flight = false;
        match result {
            Ok(processes) => {
                let before = self.view.selected_key().cloned();
                self.view.replace_processes(processes);
                self.connected = true;
                self.sync_log_target(before);
            }
            Err(e) => {
                log::warn!("process refresh failed: {e}");
                self.connected = false;
                self.notify(format!("refresh failed: {e}"), Severity::Error);
            }
        }

        if self.refresh_queued {
            self.refresh_queued = false;
            self.refresh_processes(true);
        }
    }

    fn sample_metrics(&mut self) {
        if self.metrics_in_flight {
            return;
        }
        self.metrics_in_flight = true;

        let metrics = Arc::clone(&self.metrics);
        let tx = self.completion_tx.clone();
        self.tasks.spawn(async move {
            let result = metrics.sample_host_load().await;
            let _ = tx.send(Completion::Metrics(result));
        });
    }

    fn apply_metrics(&mut self, result: Result<HostLoad, MetricsError>) {
        self.metrics_in_flight = false;
        match result {
            Ok(load) => {
                self.history.push(load.cpu_percent, load.mem_percent());
                self.last_load = Some(load);
            }
            Err(e) => log::debug!("metrics sample failed: {e}"),
        }
    }

    fn toggle_pause(&mut self) {
        if self.view.toggle_pause() {
            self.timers.poll = None;
            self.notify("refresh paused", Severity::Info);
        } else {
            self.timers.poll = Some(periodic(self.settings.refresh_interval));
            self.notify("refresh resumed", Severity::Info);
            self.refresh_processes(true);
        }
    }

    // -- log stream ---------------------------------------------------------

    /// Reset the log panel when the selection moved to another process.
    fn sync_log_target(&mut self, before: Option<ProcessKey>) {
        if self.view.selected_key() != before.as_ref() {
            let label = self.view.selected().map(|p| p.name.clone());
            self.log_view.reset(label);
        }
    }

    fn log_stream_failed(&mut self, reason: Option<String>) {
        self.log_failures += 1;
        match reason {
            Some(reason) => log::warn!("log stream broken: {reason}"),
            None => log::warn!("log stream ended"),
        }
        if self.log_failures >= DEGRADED_AFTER_FAILURES {
            self.logs_degraded = true;
        }

        let delay = resubscribe_delay(self.log_failures);
        let tx = self.completion_tx.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Completion::Resubscribe);
        });
    }

    fn resubscribe(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        let registry = Arc::clone(&self.registry);
        let sink = self.log_tx.clone();
        let tx = self.completion_tx.clone();
        self.tasks.spawn(async move {
            let result = registry.subscribe_logs(sink).await;
            let _ = tx.send(Completion::Subscribed(result));
        });
    }

    // -- actions ------------------------------------------------------------

    fn request_action(&mut self, request: ActionRequest) {
        if !self.dispatcher.is_idle() {
            self.notify("action in progress", Severity::Warning);
            return;
        }

        let pending = match request.scope {
            ActionScope::Selected => match self.view.selected() {
                Some(process) => PendingAction::single(request.kind, process),
                None => {
                    self.notify("no process selected", Severity::Warning);
                    return;
                }
            },
            ActionScope::All => {
                if self.view.processes().is_empty() {
                    self.notify(format!("no processes to {}", request.kind), Severity::Warning);
                    return;
                }
                PendingAction::bulk(request.kind, self.view.processes())
            }
        };

        match self.dispatcher.request(pending) {
            Ok(actions::Step::AwaitConfirmation) => {}
            Ok(actions::Step::Execute(action)) => self.execute(action),
            Err(e) => self.notify(e.to_string(), Severity::Warning),
        }
    }

    fn confirm(&mut self, yes: bool) {
        let Some(prompt) = self.dispatcher.confirming().map(PendingAction::describe) else {
            return;
        };
        match self.dispatcher.confirm(yes) {
            Some(action) => self.execute(action),
            None => self.notify(format!("{prompt} cancelled"), Severity::Info),
        }
    }

    fn execute(&mut self, action: PendingAction) {
        self.notify(format!("{}…", action.describe()), Severity::Info);

        let registry = Arc::clone(&self.registry);
        let tx = self.completion_tx.clone();
        self.tasks.spawn(async move {
            let outcome = actions::execute(registry.as_ref(), &action).await;
            let _ = tx.send(Completion::Action(outcome));
        });
    }

    // -- output -------------------------------------------------------------

    fn notify(&mut self, message: impl Into<String>, severity: Severity) {
        self.notification.show(message, severity, Instant::now());
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(Arc::new(self.snapshot()));
    }

    /// Build the render snapshot from the current state.
    pub fn snapshot(&self) -> Snapshot {
        let selected = self.view.selected();
        let activity = self.dispatcher.executing().map(|action| {
            format!("{} {}", SPINNER_FRAMES[self.spinner], action.describe())
        });

        let header = Header {
            clock: chrono::Local::now().format("%H:%M:%S").to_string(),
            connected: self.connected,
            paused: self.view.paused(),
            polling: self.timers.poll.is_some(),
            logs_degraded: self.logs_degraded,
            filter: self.view.filter_mode(),
            search: self.view.search_query().map(String::from),
            refresh_ms: self.settings.refresh_interval.as_millis() as u64,
            activity,
        };

        let actions = match &self.menu {
            Some(menu) => ActionsPanel {
                menu_open: true,
                entries: menu
                    .items()
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| MenuEntry {
                        label: item.label(),
                        highlighted: idx == menu.cursor(),
                    })
                    .collect(),
            },
            None => ActionsPanel::default(),
        };

        let mut notes = selected
            .map(|p| insights::process_insights(p, &self.settings.thresholds))
            .unwrap_or_default();
        notes.extend(insights::host_insights(
            &self.history,
            self.last_load.as_ref(),
            &self.settings.thresholds,
        ));

        let metrics = match &self.last_load {
            Some(load) => MetricsPanel {
                cpu: format::format_percent(Some(load.cpu_percent)),
                memory: format!(
                    "{} / {} ({:.1}%)",
                    format::format_bytes(load.mem_used),
                    format::format_bytes(load.mem_total),
                    load.mem_percent()
                ),
                cpu_spark: format::sparkline(self.history.cpu_history.iter().copied()),
                mem_spark: format::sparkline(self.history.mem_history.iter().copied()),
                cpu_window: format!(
                    "avg {} peak {}",
                    format::format_percent(self.history.cpu_history.mean()),
                    format::format_percent(self.history.cpu_history.max())
                ),
                cpu_trend: self.history.cpu_history.trend(),
                mem_trend: self.history.mem_history.trend(),
                samples: self.history.cpu_history.len(),
            },
            None => MetricsPanel::default(),
        };

        let prompt = self
            .dispatcher
            .confirming()
            .map(|action| format!("{}? (y/n)", action.describe()));

        Snapshot {
            header,
            summary: insights::summarize(self.view.processes()),
            actions,
            rows: self
                .view
                .filtered_processes()
                .iter()
                .map(ProcessRow::from)
                .collect(),
            selected: selected.map(|_| self.view.selected_index()),
            detail: DetailPanel::for_process(selected),
            metrics,
            insights: notes,
            log: LogPanel {
                label: self.log_view.label().map(String::from),
                lines: self.log_view.lines().cloned().collect(),
            },
            footer: snapshot::footer_text(self.menu.is_some(), prompt.is_some()),
            notification: self.notification.current().map(|n| NotificationView {
                message: n.message.clone(),
                severity: n.severity,
            }),
            prompt,
            view: self.view_mode,
        }
    }
}

fn resubscribe_delay(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(5);
    (RESUBSCRIBE_BASE * 2u32.pow(exp)).min(RESUBSCRIBE_MAX)
}
