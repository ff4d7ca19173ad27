use crate::config::DashboardConfig;
use crate::format;
use crate::history::{MetricsHistory, Trend};
use crate::metrics::HostLoad;
use crate::monitor::notify::Severity;
use crate::process::{ManagedProcess, ProcessStatus};

const HOST_MEMORY_WARN_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub cpu_warn_percent: f64,
    pub memory_warn_bytes: u64,
    pub restart_warn: u32,
}

impl From<&DashboardConfig> for Thresholds {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            cpu_warn_percent: config.cpu_warn_percent,
            memory_warn_bytes: config.memory_warn_bytes,
            restart_warn: config.restart_warn,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&DashboardConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub online: usize,
    pub stopped: usize,
    pub errored: usize,
    pub stopping: usize,
    pub launching: usize,
    pub unknown: usize,
    pub cpu_total: f64,
    pub memory_total: u64,
}

pub fn summarize(processes: &[ManagedProcess]) -> Summary {
    let mut summary = Summary {
        total: processes.len(),
        ..Summary::default()
    };
    for p in processes {
        match p.status {
            ProcessStatus::Online => summary.online += 1,
            ProcessStatus::Stopped => summary.stopped += 1,
            ProcessStatus::Errored => summary.errored += 1,
            ProcessStatus::Stopping => summary.stopping += 1,
            ProcessStatus::Launching => summary.launching += 1,
            ProcessStatus::Unknown => summary.unknown += 1,
        }
        summary.cpu_total += p.cpu_percent.unwrap_or(0.0);
        summary.memory_total += p.memory_bytes.unwrap_or(0);
    }
    summary
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightKind {
    HighCpu,
    HighMemory,
    RestartLoop,
    Errored,
    Stopped,
    HostCpuHigh,
    HostMemoryHigh,
    HostCpuTrend,
    Healthy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insight {
    pub kind: InsightKind,
    pub severity: Severity,
    pub message: String,
}

impl Insight {
    fn new(kind: InsightKind, severity: Severity, message: String) -> Self {
        Self {
            kind,
            severity,
            message,
        }
    }
}

pub fn process_insights(process: &ManagedProcess, t: &Thresholds) -> Vec<Insight> {
    let mut out = Vec::new();

    match process.status {
        ProcessStatus::Errored => out.push(Insight::new(
            InsightKind::Errored,
            Severity::Error,
            format!("{} is errored", process.name),
        )),
        ProcessStatus::Stopped => out.push(Insight::new(
            InsightKind::Stopped,
            Severity::Info,
            format!("{} is stopped", process.name),
        )),
        _ => {}
    }

    if let Some(cpu) = process.cpu_percent
        && cpu >= t.cpu_warn_percent
    {
        out.push(Insight::new(
            InsightKind::HighCpu,
            Severity::Warning,
            format!("high CPU: {cpu:.1}% (>= {:.0}%)", t.cpu_warn_percent),
        ));
    }

    if let Some(mem) = process.memory_bytes
        && mem >= t.memory_warn_bytes
    {
        out.push(Insight::new(
            InsightKind::HighMemory,
            Severity::Warning,
            format!(
                "high memory: {} (>= {})",
                format::format_bytes(mem),
                format::format_bytes(t.memory_warn_bytes)
            ),
        ));
    }

    if let Some(restarts) = process.restarts
        && restarts >= t.restart_warn
    {
        out.push(Insight::new(
            InsightKind::RestartLoop,
            Severity::Warning,
            format!("restarted {restarts} times"),
        ));
    }

    if out.is_empty() && process.is_online() {
        out.push(Insight::new(
            InsightKind::Healthy,
            Severity::Success,
            format!("{} looks healthy", process.name),
        ));
    }

    out
}

pub fn host_insights(
    history: &MetricsHistory,
    last: Option<&HostLoad>,
    t: &Thresholds,
) -> Vec<Insight> {
    let mut out = Vec::new();
    let Some(load) = last else {
        return out;
    };

    if load.cpu_percent >= t.cpu_warn_percent {
        out.push(Insight::new(
            InsightKind::HostCpuHigh,
            Severity::Warning,
            format!("host CPU at {:.1}%", load.cpu_percent),
        ));
    }

    let mem = load.mem_percent();
    if mem >= HOST_MEMORY_WARN_PERCENT {
        out.push(Insight::new(
            InsightKind::HostMemoryHigh,
            Severity::Warning,
            format!("host memory at {mem:.1}%"),
        ));
    }

    match history.cpu_history.trend() {
        Trend::Rising => out.push(Insight::new(
            InsightKind::HostCpuTrend,
            Severity::Info,
            "host CPU trending up".to_string(),
        )),
        Trend::Falling => out.push(Insight::new(
            InsightKind::HostCpuTrend,
            Severity::Info,
            "host CPU trending down".to_string(),
        )),
        Trend::Steady => {}
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online(name: &str) -> ManagedProcess {
        ManagedProcess::new(name, ProcessStatus::Online)
    }

    fn kinds(insights: &[Insight]) -> Vec<InsightKind> {
        insights.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_summary_counts() {
        let mut a = online("a");
        a.cpu_percent = Some(10.0);
        a.memory_bytes = Some(100);
        let mut b = online("b");
        b.cpu_percent = Some(5.5);
        let list = vec![
            a,
            b,
            ManagedProcess::new("c", ProcessStatus::Stopped),
            ManagedProcess::new("d", ProcessStatus::Errored),
        ];
        let s = summarize(&list);
        assert_eq!(s.total, 4);
        assert_eq!(s.online, 2);
        assert_eq!(s.stopped, 1);
        assert_eq!(s.errored, 1);
        assert_eq!(s.cpu_total, 15.5);
        assert_eq!(s.memory_total, 100);
    }

    #[test]
    fn test_high_cpu_flagged() {
        let mut p = online("busy");
        p.cpu_percent = Some(85.0);
        let insights = process_insights(&p, &Thresholds::default());
        assert_eq!(kinds(&insights), vec![InsightKind::HighCpu]);
        assert_eq!(insights[0].severity, Severity::Warning);
    }

    #[test]
    fn test_memory_and_restarts_flagged() {
        let mut p = online("leaky");
        p.memory_bytes = Some(600 * 1024 * 1024);
        p.restarts = Some(12);
        let insights = process_insights(&p, &Thresholds::default());
        assert_eq!(
            kinds(&insights),
            vec![InsightKind::HighMemory, InsightKind::RestartLoop]
        );
    }

    #[test]
    fn test_quiet_online_process_is_healthy() {
        let mut p = online("calm");
        p.cpu_percent = Some(1.0);
        p.restarts = Some(0);
        assert_eq!(
            kinds(&process_insights(&p, &Thresholds::default())),
            vec![InsightKind::Healthy]
        );
    }

    #[test]
    fn test_errored_process() {
        let p = ManagedProcess::new("bad", ProcessStatus::Errored);
        let insights = process_insights(&p, &Thresholds::default());
        assert_eq!(kinds(&insights), vec![InsightKind::Errored]);
        assert_eq!(insights[0].severity, Severity::Error);
    }

    #[test]
    fn test_host_insights() {
        let mut history = MetricsHistory::with_capacity(8);
        for cpu in [10.0, 10.0, 90.0, 95.0] {
            history.push(cpu, 50.0);
        }
        let load = HostLoad {
            cpu_percent: 95.0,
            mem_used: 95,
            mem_total: 100,
        };
        let insights = host_insights(&history, Some(&load), &Thresholds::default());
        assert_eq!(
            kinds(&insights),
            vec![
                InsightKind::HostCpuHigh,
                InsightKind::HostMemoryHigh,
                InsightKind::HostCpuTrend
            ]
        );
    }

    #[test]
    fn test_no_host_sample_no_insights() {
        let history = MetricsHistory::default();
        assert!(host_insights(&history, None, &Thresholds::default()).is_empty());
    }
}
