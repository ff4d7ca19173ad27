use clap::Parser;
use color_eyre::eyre::{Context, bail};
use comfy_table::{Attribute, Cell, Color, Table, presets::UTF8_FULL_CONDENSED};
use owo_colors::OwoColorize;
use pmdash::cli::{Cli, Command};
use pmdash::client::{Registry, SocketRegistry};
use pmdash::config::{self, DashboardConfig};
use pmdash::format;
use pmdash::metrics::SysinfoMetrics;
use pmdash::monitor::MonitorSettings;
use pmdash::paths::{self, Paths};
use pmdash::process::{ManagedProcess, ProcessStatus};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let paths = Paths::new()?;
    let config = effective_config(&cli, &paths)?;

    match cli.command.unwrap_or(Command::Dashboard) {
        Command::Dashboard => {
            pmdash::init_logging(&paths)?;
            let socket = resolve_socket(&config)?;
            log::info!("starting dashboard against {}", socket.display());
            let registry = Arc::new(SocketRegistry::new(socket));
            let metrics = Arc::new(SysinfoMetrics::new());
            pmdash::tui::run(registry, metrics, MonitorSettings::from(&config)).await?;
        }
        Command::List { json } => {
            let registry = SocketRegistry::new(resolve_socket(&config)?);
            registry
                .connect()
                .await
                .context("could not reach the process supervisor")?;
            let processes = registry.list().await?;
            registry.disconnect().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&processes)?);
            } else {
                print_processes(&processes);
            }
        }
        Command::CheckConfig => {
            let rendered = toml::to_string_pretty(&config).context("failed to render config")?;
            println!("{}", "configuration ok".green());
            match resolve_socket(&config) {
                Ok(socket) => println!("{} {}", "socket:".dimmed(), socket.display()),
                Err(e) => println!("{} {e}", "socket:".dimmed()),
            }
            print!("{rendered}");
        }
    }

    Ok(())
}

fn effective_config(cli: &Cli, paths: &Paths) -> color_eyre::Result<DashboardConfig> {
    let path = match &cli.config {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            path.clone()
        }
        None => paths.config_file(),
    };

    let mut config = config::load_config(&path)
        .with_context(|| format!("invalid config {}", path.display()))?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn resolve_socket(config: &DashboardConfig) -> color_eyre::Result<PathBuf> {
    match config.socket.clone().or_else(paths::default_socket) {
        Some(socket) => Ok(socket),
        None => bail!("could not determine the supervisor socket; pass --socket"),
    }
}

fn status_color(status: ProcessStatus) -> Color {
    match status {
        ProcessStatus::Online => Color::Green,
        ProcessStatus::Launching => Color::Yellow,
        ProcessStatus::Stopping => Color::Magenta,
        ProcessStatus::Stopped => Color::Reset,
        ProcessStatus::Errored => Color::Red,
        ProcessStatus::Unknown => Color::DarkGrey,
    }
}

fn print_processes(processes: &[ManagedProcess]) {
    if processes.is_empty() {
        println!("{}", "no processes registered".yellow());
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(
        ["id", "name", "namespace", "pid", "status", "cpu", "mem", "uptime", "restarts"]
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );

    for p in processes {
        let restarts = p.restarts.unwrap_or(0);
        let restarts_cell = if restarts > 0 {
            Cell::new(restarts).fg(Color::Yellow)
        } else {
            Cell::new(restarts)
        };
        table.add_row(vec![
            Cell::new(format::format_optional(p.registry_id())),
            Cell::new(&p.name).fg(Color::Cyan),
            Cell::new(&p.namespace).fg(Color::Magenta),
            Cell::new(format::format_optional(p.pid)),
            Cell::new(p.status).fg(status_color(p.status)),
            Cell::new(format::format_percent(p.cpu_percent)),
            Cell::new(format::format_memory(p.memory_bytes)),
            Cell::new(format::format_uptime(p.uptime_ms)),
            restarts_cell,
        ]);
    }
    println!("{table}");
}
