//! Host load sampling.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics sampler unavailable: {0}")]
    Unavailable(String),
    #[error("host reported no memory")]
    NoMemory,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuLoad {
    pub cpu_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub used: u64,
    pub total: u64,
}

/// One combined host sample as consumed by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostLoad {
    pub cpu_percent: f64,
    pub mem_used: u64,
    pub mem_total: u64,
}

impl HostLoad {
    pub fn mem_percent(&self) -> f64 {
        if self.mem_total == 0 {
            0.0
        } else {
            self.mem_used as f64 / self.mem_total as f64 * 100.0
        }
    }
}

#[async_trait]
pub trait HostMetrics: Send + Sync {
    async fn current_load(&self) -> Result<CpuLoad, MetricsError>;

    async fn memory(&self) -> Result<MemoryUsage, MetricsError>;

    async fn sample_host_load(&self) -> Result<HostLoad, MetricsError> {
        let cpu = self.current_load().await?;
        let mem = self.memory().await?;
        Ok(HostLoad {
            cpu_percent: cpu.cpu_percent,
            mem_used: mem.used,
            mem_total: mem.total,
        })
    }
}

/// `sysinfo`-backed sampler. CPU usage is a delta between refreshes, so the
/// first reading after construction is typically 0.
pub struct SysinfoMetrics {
    system: Arc<Mutex<System>>,
}

impl SysinfoMetrics {
    pub fn new() -> Self {
        let refresh = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        Self {
            system: Arc::new(Mutex::new(System::new_with_specifics(refresh))),
        }
    }

    async fn with_system<T, F>(&self, f: F) -> Result<T, MetricsError>
    where
        T: Send + 'static,
        F: FnOnce(&mut System) -> T + Send + 'static,
    {
        let system = Arc::clone(&self.system);
        tokio::task::spawn_blocking(move || -> Result<T, MetricsError> {
            let mut guard = system
                .lock()
                .map_err(|_| MetricsError::Unavailable("sampler lock poisoned".to_string()))?;
            Ok(f(&mut *guard))
        })
        .await
        .map_err(|e| MetricsError::Unavailable(e.to_string()))?
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostMetrics for SysinfoMetrics {
    async fn current_load(&self) -> Result<CpuLoad, MetricsError> {
        self.with_system(|sys| {
            sys.refresh_cpu_usage();
            CpuLoad {
                cpu_percent: f64::from(sys.global_cpu_usage()),
            }
        })
        .await
    }

    async fn memory(&self) -> Result<MemoryUsage, MetricsError> {
        let usage = self
            .with_system(|sys| {
                sys.refresh_memory();
                MemoryUsage {
                    used: sys.used_memory(),
                    total: sys.total_memory(),
                }
            })
            .await?;
        if usage.total == 0 {
            return Err(MetricsError::NoMemory);
        }
        Ok(usage)
    }
}
