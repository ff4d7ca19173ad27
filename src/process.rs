use serde::{Deserialize, Serialize};
use std::fmt;

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Online,
    Stopped,
    Errored,
    Stopping,
    #[serde(alias = "starting")]
    Launching,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Online => write!(f, "online"),
            ProcessStatus::Stopped => write!(f, "stopped"),
            ProcessStatus::Errored => write!(f, "errored"),
            ProcessStatus::Stopping => write!(f, "stopping"),
            ProcessStatus::Launching => write!(f, "launching"),
            ProcessStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A process as reported by the registry. Replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireProcess")]
pub struct ManagedProcess {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default = "default_namespace", alias = "group")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restarts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_mode: Option<String>,
}

/// Accepted shape of a process entry. pm3 reports `uptime` in whole seconds
/// and has no registry ids; `uptime_ms` wins when both are present.
#[derive(Deserialize)]
struct WireProcess {
    #[serde(default)]
    id: Option<i64>,
    name: String,
    #[serde(default = "default_namespace", alias = "group")]
    namespace: String,
    #[serde(default)]
    pid: Option<u32>,
    status: ProcessStatus,
    #[serde(default)]
    uptime_ms: Option<u64>,
    #[serde(default, rename = "uptime")]
    uptime_secs: Option<u64>,
    #[serde(default)]
    cpu_percent: Option<f64>,
    #[serde(default)]
    memory_bytes: Option<u64>,
    #[serde(default)]
    restarts: Option<u32>,
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    exec_mode: Option<String>,
}

impl From<WireProcess> for ManagedProcess {
    fn from(wire: WireProcess) -> Self {
        let uptime_ms = wire
            .uptime_ms
            .or_else(|| wire.uptime_secs.map(|secs| secs.saturating_mul(1000)));
        Self {
            id: wire.id,
            name: wire.name,
            namespace: wire.namespace,
            pid: wire.pid,
            status: wire.status,
            uptime_ms,
            cpu_percent: wire.cpu_percent,
            memory_bytes: wire.memory_bytes,
            restarts: wire.restarts,
            script: wire.script,
            exec_mode: wire.exec_mode,
        }
    }
}

impl ManagedProcess {
    pub fn new(name: impl Into<String>, status: ProcessStatus) -> Self {
        Self {
            id: None,
            name: name.into(),
            namespace: default_namespace(),
            pid: None,
            status,
            uptime_ms: None,
            cpu_percent: None,
            memory_bytes: None,
            restarts: None,
            script: None,
            exec_mode: None,
        }
    }

    /// The registry id, if it is a usable one. Negative ids mark transient entries.
    pub fn registry_id(&self) -> Option<u32> {
        self.id.and_then(|id| u32::try_from(id).ok())
    }

    pub fn key(&self) -> ProcessKey {
        match self.registry_id() {
            Some(id) => ProcessKey::Id(id),
            None => ProcessKey::Name(self.name.clone()),
        }
    }

    /// Target used when addressing this process in a control command.
    pub fn target(&self) -> Target {
        match self.registry_id() {
            Some(id) => Target::Id(id),
            None => Target::Name(self.name.clone()),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ProcessStatus::Online
    }
}

/// Stable identity of a process across polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProcessKey {
    Id(u32),
    Name(String),
}

/// Argument to a control command: a registry id or a process name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(u32),
    Name(String),
}

impl Target {
    pub fn as_arg(&self) -> String {
        match self {
            Target::Id(id) => id.to_string(),
            Target::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "#{id}"),
            Target::Name(name) => write!(f, "{name}"),
        }
    }
}
