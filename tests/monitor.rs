use async_trait::async_trait;
use pmdash::client::{ActionKind, LogMessage, LogSink, Registry, RegistryError, Subscription};
use pmdash::log::LogEvent;
use pmdash::metrics::{CpuLoad, HostMetrics, MemoryUsage, MetricsError};
use pmdash::monitor::insights::InsightKind;
use pmdash::monitor::{
    ActionRequest, Command, FilterMode, Monitor, MonitorSettings, Severity, Snapshot,
};
use pmdash::process::{ManagedProcess, ProcessStatus, Target};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Default)]
struct FakeRegistry {
    processes: Mutex<Vec<ManagedProcess>>,
    fail_connect: AtomicBool,
    fail_list: AtomicBool,
    fail_subscribe: AtomicBool,
    list_delay: Mutex<Duration>,
    failing_targets: Mutex<Vec<Target>>,
    action_delay: Mutex<Duration>,
    calls: Mutex<Vec<(ActionKind, Target)>>,
    list_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
    sink: Mutex<Option<LogSink>>,
    disconnected: AtomicBool,
}

impl FakeRegistry {
    fn with(processes: Vec<ManagedProcess>) -> Arc<Self> {
        let registry = Self::default();
        *registry.processes.lock().unwrap() = processes;
        Arc::new(registry)
    }

    fn calls(&self) -> Vec<(ActionKind, Target)> {
        self.calls.lock().unwrap().clone()
    }

    fn push_log(&self, msg: LogMessage) {
        let sink = self.sink.lock().unwrap().clone().expect("not subscribed");
        sink.send(msg).unwrap();
    }

    async fn act(&self, kind: ActionKind, target: &Target) -> Result<(), RegistryError> {
        let delay = *self.action_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push((kind, target.clone()));
        if self.failing_targets.lock().unwrap().contains(target) {
            return Err(RegistryError::Rejected(format!("cannot {kind} {target}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn connect(&self) -> Result<(), RegistryError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(RegistryError::Connection {
                path: "/tmp/missing.sock".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    async fn list(&self) -> Result<Vec<ManagedProcess>, RegistryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(RegistryError::Rejected("supervisor busy".to_string()));
        }
        // Read the table first so a slow answer reflects the state at call time.
        let processes = self.processes.lock().unwrap().clone();
        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(processes)
    }

    async fn start(&self, target: &Target) -> Result<(), RegistryError> {
        self.act(ActionKind::Start, target).await
    }

    async fn stop(&self, target: &Target) -> Result<(), RegistryError> {
        self.act(ActionKind::Stop, target).await
    }

    async fn restart(&self, target: &Target) -> Result<(), RegistryError> {
        self.act(ActionKind::Restart, target).await
    }

    async fn reload(&self, target: &Target) -> Result<(), RegistryError> {
        self.act(ActionKind::Reload, target).await
    }

    async fn delete(&self, target: &Target) -> Result<(), RegistryError> {
        self.act(ActionKind::Delete, target).await
    }

    async fn subscribe_logs(&self, sink: LogSink) -> Result<Subscription, RegistryError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(RegistryError::NoReply);
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(Subscription::detached())
    }
}

struct FakeMetrics {
    cpu: f64,
}

#[async_trait]
impl HostMetrics for FakeMetrics {
    async fn current_load(&self) -> Result<CpuLoad, MetricsError> {
        Ok(CpuLoad {
            cpu_percent: self.cpu,
        })
    }

    async fn memory(&self) -> Result<MemoryUsage, MetricsError> {
        Ok(MemoryUsage {
            used: 4 * 1024 * 1024 * 1024,
            total: 16 * 1024 * 1024 * 1024,
        })
    }
}

fn process(id: i64, name: &str, status: ProcessStatus) -> ManagedProcess {
    let mut p = ManagedProcess::new(name, status);
    p.id = Some(id);
    p
}

fn sample() -> Vec<ManagedProcess> {
    vec![
        process(5, "web", ProcessStatus::Online),
        process(2, "api", ProcessStatus::Online),
        process(7, "worker", ProcessStatus::Stopped),
    ]
}

struct Harness {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    core: JoinHandle<()>,
}

impl Harness {
    async fn launch(registry: Arc<FakeRegistry>) -> Self {
        let metrics = Arc::new(FakeMetrics { cpu: 12.0 });
        let (mut monitor, snapshots) =
            Monitor::new(registry, metrics, MonitorSettings::default());
        monitor.start().await.unwrap();
        let (commands, rx) = mpsc::channel(16);
        let core = tokio::spawn(monitor.run(rx));
        Self {
            commands,
            snapshots,
            core,
        }
    }

    async fn send(&self, cmd: Command) {
        self.commands.send(cmd).await.unwrap();
    }

    async fn wait_for(&mut self, what: &str, pred: impl Fn(&Snapshot) -> bool) -> Arc<Snapshot> {
        loop {
            let snap = self.snapshots.borrow_and_update().clone();
            if pred(&snap) {
                return snap;
            }
            tokio::time::timeout(Duration::from_secs(30), self.snapshots.changed())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
                .unwrap();
        }
    }

    async fn loaded(&mut self, n: usize) -> Arc<Snapshot> {
        self.wait_for("process list", |s| s.rows.len() == n).await
    }
}

fn notice(s: &Snapshot) -> Option<&str> {
    s.notification.as_ref().map(|n| n.message.as_str())
}

#[tokio::test(start_paused = true)]
async fn test_initial_list_is_sorted_and_first_selected() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(registry).await;

    let snap = h.loaded(3).await;
    let names: Vec<&str> = snap.rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["api", "web", "worker"]);
    assert_eq!(snap.selected, Some(0));
    assert_eq!(snap.detail.title, "api");
    assert_eq!(snap.summary.online, 2);
    assert_eq!(snap.summary.stopped, 1);
    assert!(snap.header.connected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_is_fatal() {
    let registry = FakeRegistry::with(sample());
    registry.fail_connect.store(true, Ordering::SeqCst);
    let metrics = Arc::new(FakeMetrics { cpu: 0.0 });
    let (mut monitor, _rx) = Monitor::new(registry, metrics, MonitorSettings::default());
    let err = monitor.start().await.unwrap_err();
    assert!(matches!(err, RegistryError::Connection { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_keeps_previous_list() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    registry.fail_list.store(true, Ordering::SeqCst);
    h.send(Command::ForceRefresh).await;

    let snap = h.wait_for("unreachable header", |s| !s.header.connected).await;
    assert_eq!(snap.rows.len(), 3);
    assert!(notice(&snap).unwrap().starts_with("refresh failed"));
    assert_eq!(snap.notification.as_ref().unwrap().severity, Severity::Error);

    registry.fail_list.store(false, Ordering::SeqCst);
    h.send(Command::ForceRefresh).await;
    h.wait_for("reconnected header", |s| s.header.connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_polling_until_resumed() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::TogglePause).await;
    let snap = h.wait_for("paused", |s| s.header.paused).await;
    assert!(!snap.header.polling);

    let before = registry.list_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(registry.list_calls.load(Ordering::SeqCst), before);

    h.send(Command::TogglePause).await;
    let snap = h.wait_for("resumed", |s| !s.header.paused).await;
    assert!(snap.header.polling);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(registry.list_calls.load(Ordering::SeqCst) > before);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_keep_sampling_while_paused() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(registry).await;
    h.loaded(3).await;

    h.send(Command::TogglePause).await;
    h.wait_for("paused", |s| s.header.paused).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snap = h.wait_for("metric samples", |s| s.metrics.samples >= 4).await;
    assert_eq!(snap.metrics.cpu, "12.0%");
    assert_eq!(snap.metrics.cpu_window, "avg 12.0% peak 12.0%");
    assert!(snap.metrics.memory.ends_with("(25.0%)"));
}

#[tokio::test(start_paused = true)]
async fn test_denied_stop_makes_no_call() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::Action(ActionRequest::selected(ActionKind::Stop)))
        .await;
    let snap = h.wait_for("prompt", |s| s.prompt.is_some()).await;
    assert_eq!(snap.prompt.as_deref(), Some("stop api? (y/n)"));

    h.send(Command::Confirm(false)).await;
    let snap = h.wait_for("prompt closed", |s| s.prompt.is_none()).await;
    assert_eq!(notice(&snap), Some("stop api cancelled"));
    assert!(registry.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_stop_targets_selected_id() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::SelectDelta(1)).await;
    h.wait_for("web selected", |s| s.detail.title == "web").await;
    h.send(Command::Action(ActionRequest::selected(ActionKind::Stop)))
        .await;
    h.wait_for("prompt", |s| s.prompt.is_some()).await;
    h.send(Command::Confirm(true)).await;

    let snap = h
        .wait_for("stop result", |s| notice(s) == Some("web stopped"))
        .await;
    assert_eq!(snap.notification.as_ref().unwrap().severity, Severity::Success);
    assert_eq!(registry.calls(), vec![(ActionKind::Stop, Target::Id(5))]);
}

#[tokio::test(start_paused = true)]
async fn test_non_destructive_action_runs_without_prompt() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::Action(ActionRequest::selected(ActionKind::Restart)))
        .await;
    h.wait_for("restart result", |s| notice(s) == Some("api restarted"))
        .await;
    assert_eq!(registry.calls(), vec![(ActionKind::Restart, Target::Id(2))]);
}

#[tokio::test(start_paused = true)]
async fn test_denied_bulk_delete_makes_no_call() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::Action(ActionRequest::all(ActionKind::Delete)))
        .await;
    let snap = h.wait_for("prompt", |s| s.prompt.is_some()).await;
    assert!(snap.prompt.as_deref().unwrap().contains("delete all 3 processes"));

    h.send(Command::Confirm(false)).await;
    h.wait_for("prompt closed", |s| s.prompt.is_none()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(registry.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bulk_action_is_best_effort() {
    let registry = FakeRegistry::with(sample());
    registry
        .failing_targets
        .lock()
        .unwrap()
        .push(Target::Id(5));
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::Action(ActionRequest::all(ActionKind::Restart)))
        .await;
    let snap = h
        .wait_for("bulk result", |s| {
            notice(s).is_some_and(|m| m.contains("1 failed"))
        })
        .await;
    assert_eq!(snap.notification.as_ref().unwrap().severity, Severity::Warning);
    assert!(notice(&snap).unwrap().contains("2 restarted"));
    assert_eq!(registry.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_second_action_rejected_while_busy() {
    let registry = FakeRegistry::with(sample());
    *registry.action_delay.lock().unwrap() = Duration::from_secs(5);
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::Action(ActionRequest::selected(ActionKind::Start)))
        .await;
    h.send(Command::Action(ActionRequest::selected(ActionKind::Reload)))
        .await;

    let snap = h
        .wait_for("busy warning", |s| notice(s) == Some("action in progress"))
        .await;
    assert!(snap.header.activity.is_some());

    h.wait_for("start result", |s| notice(s) == Some("api started"))
        .await;
    assert_eq!(registry.calls(), vec![(ActionKind::Start, Target::Id(2))]);
}

#[tokio::test(start_paused = true)]
async fn test_action_without_selection_warns() {
    let registry = FakeRegistry::with(Vec::new());
    let mut h = Harness::launch(Arc::clone(&registry)).await;

    h.send(Command::Action(ActionRequest::selected(ActionKind::Stop)))
        .await;
    let snap = h
        .wait_for("warning", |s| notice(s) == Some("no process selected"))
        .await;
    assert!(snap.prompt.is_none());
    assert!(registry.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_action_menu_runs_highlighted_entry() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::OpenActionMenu).await;
    let snap = h.wait_for("menu", |s| s.actions.menu_open).await;
    assert_eq!(snap.actions.entries.len(), 10);
    assert!(snap.actions.entries[0].highlighted);

    // start, stop, restart
    h.send(Command::MenuDelta(2)).await;
    h.send(Command::MenuActivate).await;
    h.wait_for("restart result", |s| notice(s) == Some("api restarted"))
        .await;
    let snap = h.wait_for("menu closed", |s| !s.actions.menu_open).await;
    assert!(snap.actions.entries.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_logs_follow_selected_process() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::SelectDelta(1)).await;
    let snap = h.wait_for("web selected", |s| s.detail.title == "web").await;
    assert_eq!(snap.log.label.as_deref(), Some("web"));

    let from_api = LogEvent::from_wire(Some(2), Some("api".into()), None, "api line".into());
    let from_web = LogEvent::from_wire(Some(5), None, None, "web line".into());
    registry.push_log(LogMessage::Event(from_api.unwrap()));
    registry.push_log(LogMessage::Event(from_web.unwrap()));

    let snap = h.wait_for("log line", |s| !s.log.lines.is_empty()).await;
    assert_eq!(snap.log.lines.len(), 1);
    assert_eq!(snap.log.lines[0].text, "web line");

    h.send(Command::SelectDelta(-1)).await;
    let snap = h.wait_for("api selected", |s| s.detail.title == "api").await;
    assert!(snap.log.lines.is_empty());
    assert_eq!(snap.log.label.as_deref(), Some("api"));
}

#[tokio::test(start_paused = true)]
async fn test_selection_survives_reordering_refresh() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::SelectDelta(1)).await;
    h.wait_for("web selected", |s| s.detail.title == "web").await;

    registry
        .processes
        .lock()
        .unwrap()
        .push(process(9, "aaa", ProcessStatus::Online));
    h.send(Command::ForceRefresh).await;

    let snap = h.loaded(4).await;
    assert_eq!(snap.selected, Some(2));
    assert_eq!(snap.selected_row().unwrap().name, "web");
}

#[tokio::test(start_paused = true)]
async fn test_running_filter_and_cpu_insight() {
    let mut busy = process(5, "web", ProcessStatus::Online);
    busy.cpu_percent = Some(92.5);
    let registry = FakeRegistry::with(vec![busy, process(7, "worker", ProcessStatus::Stopped)]);
    let mut h = Harness::launch(registry).await;
    h.loaded(2).await;

    h.send(Command::SetFilter(FilterMode::Running)).await;
    let snap = h.loaded(1).await;
    assert_eq!(snap.rows[0].name, "web");
    assert_eq!(snap.header.filter, FilterMode::Running);
    assert!(snap.insights.iter().any(|i| i.kind == InsightKind::HighCpu));
}

#[tokio::test(start_paused = true)]
async fn test_search_narrows_rows() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(registry).await;
    h.loaded(3).await;

    h.send(Command::Search(Some("WOR".to_string()))).await;
    let snap = h.loaded(1).await;
    assert_eq!(snap.rows[0].name, "worker");
    assert_eq!(snap.detail.title, "worker");

    h.send(Command::Search(None)).await;
    let snap = h.loaded(3).await;
    assert_eq!(snap.detail.title, "worker");
}

#[tokio::test(start_paused = true)]
async fn test_closed_log_stream_resubscribes() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;
    assert_eq!(registry.subscribe_calls.load(Ordering::SeqCst), 1);

    registry.push_log(LogMessage::Closed(Some("eof".to_string())));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(registry.subscribe_calls.load(Ordering::SeqCst), 2);

    let snap = h.wait_for("header", |s| s.header.connected).await;
    assert!(!snap.header.logs_degraded);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_log_stream_failures_mark_degraded() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    registry.fail_subscribe.store(true, Ordering::SeqCst);
    registry.push_log(LogMessage::Closed(None));

    h.wait_for("degraded logs", |s| s.header.logs_degraded).await;
    // The close plus two failed resubscribes.
    assert_eq!(registry.subscribe_calls.load(Ordering::SeqCst), 3);

    registry.fail_subscribe.store(false, Ordering::SeqCst);
    h.wait_for("recovered logs", |s| !s.header.logs_degraded)
        .await;
    assert_eq!(registry.subscribe_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_forced_refresh_during_fetch_runs_afterwards() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    // Only forced refreshes fetch while paused.
    h.send(Command::TogglePause).await;
    h.wait_for("paused", |s| s.header.paused).await;
    let before = registry.list_calls.load(Ordering::SeqCst);

    *registry.list_delay.lock().unwrap() = Duration::from_secs(5);
    h.send(Command::ForceRefresh).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(registry.list_calls.load(Ordering::SeqCst), before + 1);

    registry
        .processes
        .lock()
        .unwrap()
        .push(process(9, "aaa", ProcessStatus::Online));
    h.send(Command::ForceRefresh).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(registry.list_calls.load(Ordering::SeqCst), before + 1);

    let snap = h.loaded(4).await;
    assert_eq!(snap.rows[0].name, "aaa");
    assert_eq!(registry.list_calls.load(Ordering::SeqCst), before + 2);
}

#[tokio::test(start_paused = true)]
async fn test_log_event_for_removed_process_is_ignored() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::SelectDelta(1)).await;
    h.wait_for("web selected", |s| s.detail.title == "web").await;

    registry.processes.lock().unwrap().retain(|p| p.name != "web");
    h.send(Command::ForceRefresh).await;
    let snap = h.loaded(2).await;
    assert_eq!(snap.log.label.as_deref(), Some("worker"));
    assert!(snap.log.lines.is_empty());

    let _ = h.snapshots.borrow_and_update();
    let stale = LogEvent::from_wire(Some(5), Some("web".into()), None, "late line".into());
    registry.push_log(LogMessage::Event(stale.unwrap()));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!h.snapshots.has_changed().unwrap());

    let current = LogEvent::from_wire(Some(7), None, None, "worker line".into());
    registry.push_log(LogMessage::Event(current.unwrap()));
    let snap = h.wait_for("worker line", |s| !s.log.lines.is_empty()).await;
    let texts: Vec<&str> = snap.log.lines.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(texts, vec!["worker line"]);
}

#[tokio::test(start_paused = true)]
async fn test_notification_expires() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(registry).await;
    h.loaded(3).await;

    h.send(Command::CycleFilter).await;
    h.send(Command::TogglePause).await;
    h.wait_for("notice", |s| notice(s) == Some("refresh paused"))
        .await;
    h.wait_for("expiry", |s| s.notification.is_none()).await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_disconnects() {
    let registry = FakeRegistry::with(sample());
    let mut h = Harness::launch(Arc::clone(&registry)).await;
    h.loaded(3).await;

    h.send(Command::Shutdown).await;
    tokio::time::timeout(Duration::from_secs(5), h.core)
        .await
        .unwrap()
        .unwrap();
    assert!(registry.disconnected.load(Ordering::SeqCst));
}
