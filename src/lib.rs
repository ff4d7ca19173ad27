pub mod cli;
pub mod client;
pub mod config;
pub mod format;
pub mod history;
pub mod log;
pub mod metrics;
pub mod monitor;
pub mod paths;
pub mod process;
pub mod protocol;
pub mod tui;

pub use config::DashboardConfig;
pub use paths::Paths;

use color_eyre::eyre::Context;
use std::fs::OpenOptions;

/// Send log output to `<data_dir>/logs/pmdash.log`. The dashboard owns the
/// terminal, so nothing may be written to stderr while it runs.
pub fn init_logging(paths: &Paths) -> color_eyre::Result<()> {
    let dir = paths.log_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log_file())
        .with_context(|| format!("failed to open {}", paths.log_file().display()))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()
        .context("logger already initialized")?;
    Ok(())
}
