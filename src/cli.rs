use crate::config::DashboardConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "pmdash",
    about = "A live dashboard for a pm3 process supervisor",
    version
)]
pub struct Cli {
    /// Supervisor control socket
    #[arg(long, global = true, env = "PMDASH_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Config file to use instead of <data_dir>/pmdash.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Process list refresh interval in milliseconds
    #[arg(long, global = true)]
    pub refresh_ms: Option<u64>,

    /// Host metrics sampling interval in milliseconds
    #[arg(long, global = true)]
    pub metrics_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the interactive dashboard (default)
    #[command(visible_alias = "tui")]
    Dashboard,
    /// Print the current process list once
    #[command(visible_alias = "ls")]
    List {
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and print the effective settings
    CheckConfig,
}

impl Cli {
    /// Layer command-line flags over the file configuration.
    pub fn apply_overrides(&self, config: &mut DashboardConfig) {
        if let Some(socket) = &self.socket {
            config.socket = Some(socket.clone());
        }
        if let Some(ms) = self.refresh_ms {
            config.refresh_interval_ms = ms;
        }
        if let Some(ms) = self.metrics_ms {
            config.metrics_interval_ms = ms;
        }
    }
}
