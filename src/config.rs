use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One day. Longer periods overflow timer deadlines.
pub const MAX_DURATION_MS: u64 = 86_400_000;
pub const MAX_CAPACITY: u64 = 100_000;

const KNOWN_FIELDS: [&str; 9] = [
    "socket",
    "refresh_interval_ms",
    "metrics_interval_ms",
    "history_capacity",
    "log_capacity",
    "notification_ms",
    "cpu_warn_percent",
    "memory_warn_bytes",
    "restart_warn",
];

/// Effective dashboard settings: defaults, then `pmdash.toml`, then CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,
    pub refresh_interval_ms: u64,
    pub metrics_interval_ms: u64,
    pub history_capacity: usize,
    pub log_capacity: usize,
    pub notification_ms: u64,
    pub cpu_warn_percent: f64,
    pub memory_warn_bytes: u64,
    pub restart_warn: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            socket: None,
            refresh_interval_ms: 2000,
            metrics_interval_ms: 1000,
            history_capacity: 60,
            log_capacity: 200,
            notification_ms: 3000,
            cpu_warn_percent: 80.0,
            memory_warn_bytes: 512 * 1024 * 1024,
            restart_warn: 5,
        }
    }
}

impl DashboardConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounded = [
            ("refresh_interval_ms", self.refresh_interval_ms, MAX_DURATION_MS),
            ("metrics_interval_ms", self.metrics_interval_ms, MAX_DURATION_MS),
            ("notification_ms", self.notification_ms, MAX_DURATION_MS),
            ("history_capacity", self.history_capacity as u64, MAX_CAPACITY),
            ("log_capacity", self.log_capacity as u64, MAX_CAPACITY),
        ];
        for (field, value, max) in bounded {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            if value > max {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: format!("must be at most {max}"),
                });
            }
        }
        if !(self.cpu_warn_percent > 0.0) {
            return Err(ConfigError::Invalid {
                field: "cpu_warn_percent".to_string(),
                reason: "must be a positive percentage".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    TomlParse(String),
    #[error("unknown field `{field}`")]
    UnknownField { field: String },
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },
    #[error("{0}")]
    IoError(String),
}

/// Load the config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<DashboardConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(DashboardConfig::default());
        }
        Err(e) => return Err(ConfigError::IoError(format!("{}: {}", path.display(), e))),
    };
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<DashboardConfig, ConfigError> {
    let table: toml::Table =
        toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))?;

    if let Some(field) = table.keys().find(|k| !KNOWN_FIELDS.contains(&k.as_str())) {
        return Err(ConfigError::UnknownField {
            field: field.clone(),
        });
    }

    let config: DashboardConfig = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::TomlParse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
