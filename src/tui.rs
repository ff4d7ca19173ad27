use crate::client::{ActionKind, Registry};
use crate::history::Trend;
use crate::log::LogStream;
use crate::metrics::HostMetrics;
use crate::monitor::insights::Insight;
use crate::monitor::{
    ActionRequest, Command, Monitor, MonitorSettings, Severity, Snapshot, ViewMode,
};
use crate::process::ProcessStatus;
use color_eyre::eyre::Context;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use ratatui::{Frame, Terminal};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

const TICK_RATE: Duration = Duration::from_millis(250);
const INPUT_POLL: Duration = Duration::from_millis(100);
const EXIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Connect, then drive the dashboard until the user quits.
pub async fn run(
    registry: Arc<dyn Registry>,
    metrics: Arc<dyn HostMetrics>,
    settings: MonitorSettings,
) -> color_eyre::Result<()> {
    let (mut monitor, mut snapshots) = Monitor::new(registry, metrics, settings);
    monitor
        .start()
        .await
        .context("could not reach the process supervisor")?;

    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let core = tokio::spawn(monitor.run(cmd_rx));

    let _guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend).context("failed to initialize terminal")?;
    terminal.clear().context("failed to clear terminal")?;

    let stop = Arc::new(AtomicBool::new(false));
    let (input_tx, mut input_rx) = mpsc::channel(64);
    let input = spawn_input_thread(input_tx, Arc::clone(&stop));

    let mut keys = KeyState::default();
    let mut ticker = tokio::time::interval(TICK_RATE);
    let mut table_state = TableState::default();

    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        terminal
            .draw(|f| ui(f, &snapshot, &keys, &mut table_state))
            .context("failed to draw frame")?;

        let commands = tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                Vec::new()
            }
            Some(ev) = input_rx.recv() => match translate(&mut keys, &snapshot, ev) {
                Input::Quit => break,
                Input::Commands(cmds) => cmds,
            },
            _ = ticker.tick() => vec![Command::Tick],
        };

        for cmd in commands {
            if cmd_tx.send(cmd).await.is_err() {
                break;
            }
        }
    }

    let _ = cmd_tx.send(Command::Shutdown).await;
    if tokio::time::timeout(EXIT_TIMEOUT, core).await.is_err() {
        log::warn!("monitor did not stop within {EXIT_TIMEOUT:?}");
    }
    stop.store(true, Ordering::Relaxed);
    let _ = input.join();

    terminal.show_cursor().ok();
    Ok(())
}

fn spawn_input_thread(
    tx: mpsc::Sender<Event>,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match event::poll(INPUT_POLL) {
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if tx.blocking_send(ev).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        log::error!("failed to read terminal event: {e}");
                        return;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    log::error!("failed to poll terminal events: {e}");
                    return;
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Input {
    Quit,
    Commands(Vec<Command>),
}

/// Renderer-local input state. Only the search line being typed lives here.
#[derive(Debug, Default)]
struct KeyState {
    search: Option<String>,
}

fn translate(keys: &mut KeyState, snapshot: &Snapshot, ev: Event) -> Input {
    match ev {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(keys, snapshot, key),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollDown => Input::Commands(vec![Command::SelectDelta(1)]),
            MouseEventKind::ScrollUp => Input::Commands(vec![Command::SelectDelta(-1)]),
            _ => Input::Commands(Vec::new()),
        },
        _ => Input::Commands(Vec::new()),
    }
}

fn handle_key(keys: &mut KeyState, snapshot: &Snapshot, key: KeyEvent) -> Input {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Input::Quit;
    }
    let one = |cmd| Input::Commands(vec![cmd]);
    let none = Input::Commands(Vec::new());

    if snapshot.prompt.is_some() {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => one(Command::Confirm(true)),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => one(Command::Confirm(false)),
            _ => none,
        };
    }

    if snapshot.actions.menu_open {
        return match key.code {
            KeyCode::Up | KeyCode::Char('k') => one(Command::MenuDelta(-1)),
            KeyCode::Down | KeyCode::Char('j') => one(Command::MenuDelta(1)),
            KeyCode::Enter => one(Command::MenuActivate),
            KeyCode::Esc | KeyCode::Char('a') | KeyCode::Char('q') => {
                one(Command::CloseActionMenu)
            }
            _ => none,
        };
    }

    if let Some(query) = keys.search.as_mut() {
        return match key.code {
            KeyCode::Enter => {
                keys.search = None;
                none
            }
            KeyCode::Esc => {
                keys.search = None;
                one(Command::Search(None))
            }
            KeyCode::Backspace => {
                query.pop();
                one(Command::Search(Some(query.clone())))
            }
            KeyCode::Char(c) => {
                query.push(c);
                one(Command::Search(Some(query.clone())))
            }
            _ => none,
        };
    }

    match key.code {
        KeyCode::Char('q') => Input::Quit,
        KeyCode::Esc if snapshot.header.search.is_some() => one(Command::Search(None)),
        KeyCode::Esc => Input::Quit,
        KeyCode::Down | KeyCode::Char('j') => one(Command::SelectDelta(1)),
        KeyCode::Up | KeyCode::Char('k') => one(Command::SelectDelta(-1)),
        KeyCode::PageDown => one(Command::SelectDelta(10)),
        KeyCode::PageUp => one(Command::SelectDelta(-10)),
        KeyCode::Home | KeyCode::Char('g') => one(Command::JumpFirst),
        KeyCode::End | KeyCode::Char('G') => one(Command::JumpLast),
        KeyCode::Char('/') => {
            keys.search = Some(snapshot.header.search.clone().unwrap_or_default());
            none
        }
        KeyCode::Char('f') => one(Command::CycleFilter),
        KeyCode::Char('a') | KeyCode::Enter => one(Command::OpenActionMenu),
        KeyCode::Char('p') => one(Command::TogglePause),
        KeyCode::F(5) => one(Command::ForceRefresh),
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            one(Command::ForceRefresh)
        }
        KeyCode::Char('v') | KeyCode::Tab => one(Command::ToggleView),
        KeyCode::Char(c) => match action_for(c) {
            Some(request) => one(Command::Action(request)),
            None => none,
        },
        _ => none,
    }
}

/// Lowercase acts on the selected process, uppercase on every process.
fn action_for(c: char) -> Option<ActionRequest> {
    let kind = match c.to_ascii_lowercase() {
        's' => ActionKind::Start,
        'x' => ActionKind::Stop,
        'r' => ActionKind::Restart,
        'l' => ActionKind::Reload,
        'd' => ActionKind::Delete,
        _ => return None,
    };
    Some(if c.is_ascii_uppercase() {
        ActionRequest::all(kind)
    } else {
        ActionRequest::selected(kind)
    })
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

fn ui(f: &mut Frame, snapshot: &Snapshot, keys: &KeyState, table_state: &mut TableState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(f.area());

    f.render_widget(header_widget(snapshot), layout[0]);
    f.render_widget(summary_widget(snapshot), layout[1]);

    match snapshot.view {
        ViewMode::Overview => {
            let body = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(6), Constraint::Length(8)])
                .split(layout[2]);
            let main = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
                .split(body[0]);
            let side = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Min(6),
                    Constraint::Length(5),
                    Constraint::Length(6),
                ])
                .split(main[1]);

            draw_table(f, snapshot, table_state, main[0]);
            f.render_widget(detail_widget(snapshot), side[0]);
            f.render_widget(metrics_widget(snapshot), side[1]);
            f.render_widget(insights_widget(&snapshot.insights), side[2]);
            f.render_widget(log_widget(snapshot, body[1].height), body[1]);
        }
        ViewMode::Logs => {
            let body = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(8), Constraint::Min(4)])
                .split(layout[2]);
            draw_table(f, snapshot, table_state, body[0]);
            f.render_widget(log_widget(snapshot, body[1].height), body[1]);
        }
    }

    f.render_widget(footer_widget(snapshot, keys), layout[3]);

    if snapshot.actions.menu_open {
        draw_menu(f, snapshot);
    }
    if let Some(prompt) = &snapshot.prompt {
        draw_prompt(f, prompt);
    }
}

fn bordered(title: impl Into<String>) -> Block<'static> {
    Block::default()
        .title(title.into())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
}

fn header_widget(snapshot: &Snapshot) -> Paragraph<'static> {
    let h = &snapshot.header;
    let bar = Style::default().bg(Color::DarkGray).fg(Color::White);
    let sep = || Span::styled(" | ", bar);

    let (link, link_color) = if h.connected {
        ("connected", Color::Green)
    } else {
        ("unreachable", Color::Red)
    };

    let mut spans = vec![
        Span::styled(" PMDASH ", bar.add_modifier(Modifier::BOLD)),
        sep(),
        Span::styled(h.clock.clone(), bar),
        sep(),
        Span::styled(link, bar.fg(link_color).add_modifier(Modifier::BOLD)),
        sep(),
        Span::styled(format!("filter: {}", h.filter), bar),
    ];
    if let Some(search) = &h.search {
        spans.push(sep());
        spans.push(Span::styled(format!("search: {search}"), bar.fg(Color::Cyan)));
    }
    spans.push(sep());
    if h.paused {
        spans.push(Span::styled("paused", bar.fg(Color::Yellow)));
    } else {
        spans.push(Span::styled(format!("refresh {}ms", h.refresh_ms), bar));
    }
    if h.logs_degraded {
        spans.push(sep());
        spans.push(Span::styled("logs degraded", bar.fg(Color::Yellow)));
    }
    if let Some(activity) = &h.activity {
        spans.push(sep());
        spans.push(Span::styled(activity.clone(), bar.fg(Color::LightBlue)));
    }

    Paragraph::new(Line::from(spans)).style(bar)
}

fn summary_widget(snapshot: &Snapshot) -> Paragraph<'static> {
    let s = &snapshot.summary;
    let label = Style::default().fg(Color::Gray);
    let count = |n: usize, status: ProcessStatus| {
        Span::styled(
            n.to_string(),
            status_style(status).add_modifier(Modifier::BOLD),
        )
    };

    Paragraph::new(Line::from(vec![
        Span::styled(" total ", label),
        Span::styled(s.total.to_string(), Style::default().add_modifier(Modifier::BOLD)),
        Span::styled("  online ", label),
        count(s.online, ProcessStatus::Online),
        Span::styled("  stopped ", label),
        count(s.stopped, ProcessStatus::Stopped),
        Span::styled("  errored ", label),
        count(s.errored, ProcessStatus::Errored),
        Span::styled("  launching ", label),
        count(s.launching, ProcessStatus::Launching),
        Span::styled("  cpu ", label),
        Span::raw(crate::format::format_percent(Some(s.cpu_total))),
        Span::styled("  mem ", label),
        Span::raw(crate::format::format_bytes(s.memory_total)),
    ]))
}

fn draw_table(f: &mut Frame, snapshot: &Snapshot, state: &mut TableState, area: Rect) {
    let header = Row::new(vec![
        Cell::from("id"),
        Cell::from("name"),
        Cell::from("namespace"),
        Cell::from("status"),
        Cell::from("pid"),
        Cell::from("uptime"),
        Cell::from("↺"),
        Cell::from("cpu"),
        Cell::from("mem"),
    ])
    .style(
        Style::default()
            .fg(Color::White)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    let rows = snapshot.rows.iter().enumerate().map(|(idx, row)| {
        let restarts_style = if row.restarts > 0 {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        let row_style = if idx % 2 == 0 {
            Style::default()
        } else {
            Style::default().bg(Color::Rgb(18, 18, 18))
        };

        Row::new(vec![
            Cell::from(row.id.clone()),
            Cell::from(row.name.clone()).style(Style::default().fg(Color::Cyan)),
            Cell::from(row.namespace.clone()).style(Style::default().fg(Color::Magenta)),
            Cell::from(row.status.to_string()).style(status_style(row.status)),
            Cell::from(row.pid.clone()),
            Cell::from(row.uptime.clone()),
            Cell::from(row.restarts.to_string()).style(restarts_style),
            Cell::from(row.cpu.clone()),
            Cell::from(row.memory.clone()),
        ])
        .style(row_style)
    });

    let widths = [
        Constraint::Length(4),
        Constraint::Min(12),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(7),
        Constraint::Length(8),
        Constraint::Length(4),
        Constraint::Length(7),
        Constraint::Length(9),
    ];

    let title = if snapshot.rows.len() == snapshot.summary.total {
        format!("Processes ({})", snapshot.rows.len())
    } else {
        format!("Processes ({}/{})", snapshot.rows.len(), snapshot.summary.total)
    };
    let table = Table::new(rows, widths)
        .header(header)
        .block(bordered(title))
        .row_highlight_style(
            Style::default()
                .bg(Color::LightBlue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    state.select(snapshot.selected);
    f.render_stateful_widget(table, area, state);
}

fn detail_widget(snapshot: &Snapshot) -> Paragraph<'static> {
    let detail = &snapshot.detail;
    let label = Style::default().fg(Color::Gray);

    let lines: Vec<Line> = match detail.status {
        None => vec![Line::from(Span::styled(detail.title.clone(), label))],
        Some(status) => detail
            .fields
            .iter()
            .map(|(key, value)| {
                let value_style = if *key == "status" {
                    status_style(status)
                } else {
                    Style::default()
                };
                Line::from(vec![
                    Span::styled(format!("{key:<10}"), label),
                    Span::styled(value.clone(), value_style),
                ])
            })
            .collect(),
    };

    let title = match detail.status {
        Some(_) => format!("Selected: {}", detail.title),
        None => "Selected".to_string(),
    };
    Paragraph::new(Text::from(lines))
        .block(bordered(title))
        .wrap(Wrap { trim: true })
}

fn metrics_widget(snapshot: &Snapshot) -> Paragraph<'static> {
    let m = &snapshot.metrics;
    let label = Style::default().fg(Color::Gray);
    let trend = |t: Trend| {
        let color = match t {
            Trend::Rising => Color::Yellow,
            Trend::Falling => Color::Green,
            Trend::Steady => Color::Gray,
        };
        Span::styled(format!(" {}", t.arrow()), Style::default().fg(color))
    };

    let lines = vec![
        Line::from(vec![
            Span::styled("cpu ", label),
            Span::raw(m.cpu.clone()),
            trend(m.cpu_trend),
        ]),
        Line::from(Span::styled(m.cpu_spark.clone(), Style::default().fg(Color::Cyan))),
        Line::from(Span::styled(m.cpu_window.clone(), label)),
        Line::from(vec![
            Span::styled("mem ", label),
            Span::raw(m.memory.clone()),
            trend(m.mem_trend),
        ]),
    ];

    Paragraph::new(Text::from(lines)).block(bordered(format!("Host ({} samples)", m.samples)))
}

fn insights_widget(insights: &[Insight]) -> Paragraph<'static> {
    let lines: Vec<Line> = insights
        .iter()
        .map(|i| {
            Line::from(Span::styled(
                format!("• {}", i.message),
                severity_style(i.severity),
            ))
        })
        .collect();
    Paragraph::new(Text::from(lines))
        .block(bordered("Insights"))
        .wrap(Wrap { trim: true })
}

fn log_widget(snapshot: &Snapshot, height: u16) -> Paragraph<'static> {
    let visible = height.saturating_sub(2) as usize;
    let lines = &snapshot.log.lines;
    let start = lines.len().saturating_sub(visible);

    let text: Vec<Line> = lines[start..]
        .iter()
        .map(|line| {
            let style = match line.stream {
                LogStream::Out => Style::default(),
                LogStream::Err => Style::default().fg(Color::Red),
            };
            Line::from(Span::styled(line.text.clone(), style))
        })
        .collect();

    let title = match &snapshot.log.label {
        Some(name) => format!("Logs: {name}"),
        None => "Logs".to_string(),
    };
    Paragraph::new(Text::from(text)).block(bordered(title))
}

fn footer_widget(snapshot: &Snapshot, keys: &KeyState) -> Paragraph<'static> {
    let line = if let Some(query) = &keys.search {
        Line::from(vec![
            Span::styled("/", Style::default().fg(Color::Cyan)),
            Span::raw(query.clone()),
            Span::styled("▏", Style::default().fg(Color::Cyan)),
            Span::styled("   enter keep | esc clear", Style::default().fg(Color::DarkGray)),
        ])
    } else if let Some(n) = &snapshot.notification {
        Line::from(Span::styled(n.message.clone(), severity_style(n.severity)))
    } else {
        Line::from(Span::styled(
            snapshot.footer.clone(),
            Style::default().fg(Color::DarkGray),
        ))
    };
    Paragraph::new(line).block(Block::default().borders(Borders::TOP))
}

fn draw_menu(f: &mut Frame, snapshot: &Snapshot) {
    let entries = &snapshot.actions.entries;
    let area = centered_rect(30, entries.len() as u16 + 2, f.area());
    let lines: Vec<Line> = entries
        .iter()
        .map(|entry| {
            if entry.highlighted {
                Line::from(Span::styled(
                    format!("> {}", entry.label),
                    Style::default()
                        .bg(Color::LightBlue)
                        .fg(Color::Black)
                        .add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(format!("  {}", entry.label))
            }
        })
        .collect();

    f.render_widget(Clear, area);
    f.render_widget(Paragraph::new(Text::from(lines)).block(bordered("Actions")), area);
}

fn draw_prompt(f: &mut Frame, prompt: &str) {
    let width = (prompt.chars().count() as u16 + 6).max(24);
    let area = centered_rect(width, 3, f.area());
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(Span::styled(
            prompt.to_string(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))
        .block(bordered("Confirm")),
        area,
    );
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn status_style(status: ProcessStatus) -> Style {
    match status {
        ProcessStatus::Online => Style::default().fg(Color::Green),
        ProcessStatus::Launching => Style::default().fg(Color::Yellow),
        ProcessStatus::Stopping => Style::default().fg(Color::Magenta),
        ProcessStatus::Stopped => Style::default().fg(Color::Gray),
        ProcessStatus::Errored => Style::default().fg(Color::Red),
        ProcessStatus::Unknown => Style::default().fg(Color::DarkGray),
    }
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Info => Style::default().fg(Color::LightBlue),
        Severity::Success => Style::default().fg(Color::Green),
        Severity::Warning => Style::default().fg(Color::Yellow),
        Severity::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

struct TerminalGuard;

impl TerminalGuard {
    fn new() -> color_eyre::Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        execute!(
            io::stdout(),
            EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide
        )
        .context("failed to enter alternate screen")?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            io::stdout(),
            LeaveAlternateScreen,
            DisableMouseCapture,
            cursor::Show
        );
    }
}
