mod clipboard;
mod help;

use crate::audit::{AuditLog, AuditSeverity};
use crate::cli::Cli;
use crate::gateway::{Gateway, HttpGateway};
use crate::model::{
    ClientEvent, ConfigSnapshot, Notice, OperationKind, OperationState, RemoteStatus,
};
use crate::orchestrator::{run_controller, UiCommand};
use crate::sync::Synchronizer;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Tabs, Wrap},
    Terminal,
};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Dialog shown on top of the dashboard. At most one is open; the newest
/// request wins.
enum Modal {
    ConfirmReset,
    Elevation { message: String },
    Preview { ids: ConfigSnapshot },
    Notice(Notice),
}

struct UiState {
    tab: usize,
    info: String,
    system: Option<crate::model::SystemInfo>,
    status: RemoteStatus,
    op_state: OperationState,
    audit: AuditLog,
    modal: Option<Modal>,
    set_read_only: bool,
    show_details: bool,
}

impl UiState {
    fn new(args: &Cli) -> Self {
        Self {
            tab: 0,
            info: String::new(),
            system: None,
            status: RemoteStatus::default(),
            op_state: OperationState::Idle,
            audit: AuditLog::new(),
            modal: None,
            set_read_only: args.set_read_only,
            show_details: false,
        }
    }

    fn busy(&self) -> bool {
        matches!(
            self.op_state,
            OperationState::InFlight { .. } | OperationState::NeedsElevation { .. }
        )
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = crate::cli::build_config(&args);
    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(&cfg)?);

    // Unbounded channels avoid backpressure between core and UI thread.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let sync = Arc::new(Synchronizer::new(gateway.clone(), event_tx.clone()));
    let poller = tokio::spawn(sync.clone().run_poller(cfg.poll_interval));

    // TUI runs in a dedicated thread to keep all blocking I/O out of the
    // Tokio runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, event_rx, cmd_tx));

    let res = run_controller(gateway, sync, event_tx, cmd_rx).await;
    poller.abort();

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: Cli,
    mut event_rx: UnboundedReceiver<ClientEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::new(&args);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if matches!(
                    (k.modifiers, k.code),
                    (KeyModifiers::CONTROL, KeyCode::Char('c'))
                ) {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
                if state.modal.is_some() {
                    handle_modal_key(&mut state, &cmd_tx, k.code);
                    continue;
                }
                match k.code {
                    KeyCode::Char('q') => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    KeyCode::Char('r') => {
                        if state.busy() {
                            state.info = "Another operation is still in progress".into();
                        } else {
                            state.info = "Resetting configuration…".into();
                            let _ = cmd_tx.send(UiCommand::Start {
                                kind: OperationKind::Reset,
                                set_read_only: state.set_read_only,
                            });
                        }
                    }
                    KeyCode::Char('k') => {
                        let _ = cmd_tx.send(UiCommand::Start {
                            kind: OperationKind::KillCursor,
                            set_read_only: false,
                        });
                    }
                    KeyCode::Char('g') => {
                        let _ = cmd_tx.send(UiCommand::Start {
                            kind: OperationKind::GeneratePreview,
                            set_read_only: false,
                        });
                    }
                    KeyCode::Char('u') => {
                        let _ = cmd_tx.send(UiCommand::Start {
                            kind: OperationKind::DisableAutoUpdate,
                            set_read_only: false,
                        });
                    }
                    KeyCode::Char('R') => {
                        state.info = "Refreshing…".into();
                        let _ = cmd_tx.send(UiCommand::Refresh);
                    }
                    KeyCode::Char('o') => {
                        state.set_read_only = !state.set_read_only;
                        state.info = if state.set_read_only {
                            "Reset will mark the config file read-only".into()
                        } else {
                            "Reset will leave the config file writable".into()
                        };
                    }
                    KeyCode::Char('d') => {
                        state.show_details = !state.show_details;
                    }
                    KeyCode::Char('c') => {
                        state.audit.clear();
                    }
                    KeyCode::Tab => {
                        state.tab = (state.tab + 1) % 2;
                    }
                    KeyCode::Char('?') => {
                        state.tab = 1;
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn handle_modal_key(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, code: KeyCode) {
    match state.modal.as_ref() {
        Some(Modal::ConfirmReset) => match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                state.modal = None;
                let _ = cmd_tx.send(UiCommand::ConfirmReset(true));
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.modal = None;
                let _ = cmd_tx.send(UiCommand::ConfirmReset(false));
            }
            _ => {}
        },
        Some(Modal::Elevation { .. }) => match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                state.modal = None;
                let _ = cmd_tx.send(UiCommand::ConfirmElevation(true));
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.modal = None;
                let _ = cmd_tx.send(UiCommand::ConfirmElevation(false));
            }
            _ => {}
        },
        Some(Modal::Preview { ids }) => match code {
            KeyCode::Esc | KeyCode::Enter => {
                state.modal = None;
            }
            KeyCode::Char('g') => {
                state.modal = None;
                let _ = cmd_tx.send(UiCommand::Start {
                    kind: OperationKind::GeneratePreview,
                    set_read_only: false,
                });
            }
            KeyCode::Char(c @ '1'..='4') => {
                let (label, value) = match c {
                    '1' => ("machine ID", ids.machine_id.clone()),
                    '2' => ("MAC machine ID", ids.mac_machine_id.clone()),
                    '3' => ("device ID", ids.device_id.clone()),
                    _ => ("SQM ID", ids.sqm_id.clone()),
                };
                match clipboard::copy_to_clipboard(&value) {
                    Ok(()) => {
                        state
                            .audit
                            .push(AuditSeverity::Success, format!("Copied {label} to clipboard"));
                        state.info = format!("Copied {label} to clipboard");
                    }
                    Err(e) => {
                        state.info = format!("Clipboard copy failed: {e:#}");
                    }
                }
            }
            _ => {}
        },
        Some(Modal::Notice(_)) => {
            if matches!(code, KeyCode::Esc | KeyCode::Enter) {
                state.modal = None;
            }
        }
        None => {}
    }
}

fn apply_event(state: &mut UiState, ev: ClientEvent) {
    match ev {
        ClientEvent::OperationChanged { state: op } => {
            match &op {
                OperationState::InFlight { kind, .. } => {
                    state.info = format!("Working: {}…", kind.label());
                }
                OperationState::Succeeded { kind, outcome } => {
                    state.info = format!("Finished: {}", kind.label());
                    if *kind == OperationKind::GeneratePreview {
                        if let Some(ids) = outcome.ids.clone() {
                            state.modal = Some(Modal::Preview { ids });
                        }
                    }
                }
                OperationState::Failed { kind, failure, .. } => {
                    state.info = format!("Failed: {} ({failure:?})", kind.label());
                }
                OperationState::NeedsElevation { .. } => {
                    state.info = "Administrator privileges required".into();
                }
                OperationState::Idle => {}
            }
            state.op_state = op;
        }
        ClientEvent::StatusChanged { status } => state.status = status,
        ClientEvent::SystemLoaded { info } => state.system = Some(info),
        ClientEvent::Audit { severity, message } => {
            state.audit.push(severity, message);
        }
        ClientEvent::Notice(notice) => {
            state.modal = Some(Modal::Notice(notice));
        }
        ClientEvent::ConfirmResetRequested => {
            state.modal = Some(Modal::ConfirmReset);
        }
        ClientEvent::ElevationRequested { message } => {
            state.modal = Some(Modal::Elevation { message });
        }
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Dashboard"), Line::from("Help")])
        .select(state.tab)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("cursor-reset-cli"),
        )
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_dashboard(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }

    if let Some(modal) = state.modal.as_ref() {
        draw_modal(area, f, modal);
    }
}

fn kv<'a>(label: &'a str, value: Span<'a>) -> Line<'a> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(Color::Gray)),
        value,
    ])
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(7),
                Constraint::Length(8),
                Constraint::Min(5),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(main[0]);

    // System information (left).
    let system_lines = match state.system.as_ref() {
        Some(info) => vec![
            kv("OS: ", Span::raw(info.os.clone())),
            kv("User: ", Span::raw(info.username.clone())),
            kv(
                "Privileges: ",
                if info.is_admin {
                    Span::styled("Administrator", Style::default().fg(Color::Green))
                } else {
                    Span::styled("Standard user", Style::default().fg(Color::Red))
                },
            ),
            kv("Config path: ", Span::raw(info.config_path.clone())),
        ],
        None => vec![Line::from("Loading system information…")],
    };
    let system = Paragraph::new(system_lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("System"));
    f.render_widget(system, top[0]);

    // Cursor process and operation state (right).
    let cursor_span = if state.status.process_running {
        Span::styled("Running", Style::default().fg(Color::Red))
    } else {
        Span::styled("Not running", Style::default().fg(Color::Green))
    };
    let synced = state
        .status
        .last_synced_at
        .and_then(|at| {
            let fmt = time::macros::format_description!("[hour]:[minute]:[second]");
            at.format(&fmt).ok()
        })
        .unwrap_or_else(|| "never".to_string());
    let cursor_lines = vec![
        kv("Cursor: ", cursor_span),
        kv("Operation: ", op_state_span(&state.op_state)),
        kv(
            "Read-only after reset: ",
            if state.set_read_only {
                Span::styled("on", Style::default().fg(Color::Green))
            } else {
                Span::raw("off")
            },
        ),
        kv("Last synced: ", Span::raw(synced)),
    ];
    let cursor = Paragraph::new(cursor_lines)
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(cursor, top[1]);

    // Identifier snapshot.
    let config_title = if state.show_details {
        "Configuration (d to hide)"
    } else {
        "Configuration (d to reveal)"
    };
    let config_lines = match state.status.config.as_ref() {
        Some(config) => vec![
            kv("Machine ID: ", id_span(&config.machine_id, state.show_details)),
            kv(
                "MAC machine ID: ",
                id_span(&config.mac_machine_id, state.show_details),
            ),
            kv("Device ID: ", id_span(&config.device_id, state.show_details)),
            kv("SQM ID: ", id_span(&config.sqm_id, state.show_details)),
            kv(
                "Last modified: ",
                Span::raw(
                    config
                        .last_modified
                        .clone()
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "Not set".to_string()),
                ),
            ),
        ],
        None => vec![Line::from("No configuration file found")],
    };
    let config = Paragraph::new(config_lines)
        .block(Block::default().borders(Borders::ALL).title(config_title));
    f.render_widget(config, main[1]);

    // Activity log: newest entries fill the panel bottom-up.
    let visible = main[2].height.saturating_sub(2) as usize;
    let skip = state.audit.len().saturating_sub(visible);
    let log_lines: Vec<Line> = state
        .audit
        .entries()
        .skip(skip)
        .map(|entry| {
            let color = match entry.severity {
                AuditSeverity::Info => Color::Gray,
                AuditSeverity::Success => Color::Green,
                AuditSeverity::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(format!("[{}] ", entry.time_label()), Style::default().fg(Color::DarkGray)),
                Span::styled(entry.message.clone(), Style::default().fg(color)),
            ])
        })
        .collect();
    let log = Paragraph::new(log_lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Activity Log (c to clear)"),
    );
    f.render_widget(log, main[2]);

    // Status / hint line.
    let status_line = vec![Line::from(vec![
        Span::styled("Info: ", Style::default().fg(Color::Gray)),
        Span::raw(state.info.clone()),
        Span::raw("   "),
        Span::styled(
            "r reset | k close | g preview | u no-update | R refresh | ? help | q quit",
            Style::default().fg(Color::DarkGray),
        ),
    ])];
    let status =
        Paragraph::new(status_line).block(Block::default().borders(Borders::ALL).title("Keys"));
    f.render_widget(status, main[3]);
}

fn op_state_span(state: &OperationState) -> Span<'static> {
    match state {
        OperationState::Idle => Span::styled("idle", Style::default().fg(Color::Gray)),
        OperationState::InFlight { kind, started_at } => Span::styled(
            format!("{}… ({}s)", kind.label(), started_at.elapsed().as_secs()),
            Style::default().fg(Color::Yellow),
        ),
        OperationState::Succeeded { kind, .. } => Span::styled(
            format!("{} done", kind.label()),
            Style::default().fg(Color::Green),
        ),
        OperationState::Failed { kind, .. } => Span::styled(
            format!("{} failed", kind.label()),
            Style::default().fg(Color::Red),
        ),
        OperationState::NeedsElevation { .. } => Span::styled(
            "waiting for elevation decision",
            Style::default().fg(Color::Magenta),
        ),
    }
}

fn id_span(value: &str, reveal: bool) -> Span<'static> {
    if value.is_empty() {
        Span::styled("Not set", Style::default().fg(Color::DarkGray))
    } else if reveal {
        Span::raw(value.to_string())
    } else {
        Span::styled("••••••••", Style::default().fg(Color::DarkGray))
    }
}

fn draw_modal(area: Rect, f: &mut ratatui::Frame, modal: &Modal) {
    let (title, lines, color) = match modal {
        Modal::ConfirmReset => (
            "Confirm reset".to_string(),
            vec![
                Line::from("Cursor is currently running."),
                Line::from("It will be closed before the configuration is reset."),
                Line::from(""),
                Line::from("Continue?  (y / n)"),
            ],
            Color::Yellow,
        ),
        Modal::Elevation { message } => {
            let mut lines = vec![Line::from("Administrator privileges are required.")];
            lines.push(Line::from(""));
            for l in message.lines() {
                lines.push(Line::from(l.to_string()));
            }
            lines.push(Line::from(""));
            lines.push(Line::from("Attempt automatic elevation?  (y / n)"));
            ("Elevation required".to_string(), lines, Color::Magenta)
        }
        Modal::Preview { ids } => (
            "Preview identifiers (not saved)".to_string(),
            vec![
                Line::from(format!("1  Machine ID:     {}", ids.machine_id)),
                Line::from(format!("2  MAC machine ID: {}", ids.mac_machine_id)),
                Line::from(format!("3  Device ID:      {}", ids.device_id)),
                Line::from(format!("4  SQM ID:         {}", ids.sqm_id)),
                Line::from(""),
                Line::from("1-4 copy | g regenerate | esc close"),
            ],
            Color::Cyan,
        ),
        Modal::Notice(notice) => {
            let color = match notice.severity {
                AuditSeverity::Success => Color::Green,
                AuditSeverity::Error => Color::Red,
                AuditSeverity::Info => Color::Cyan,
            };
            let mut lines: Vec<Line> =
                notice.body.lines().map(|l| Line::from(l.to_string())).collect();
            lines.push(Line::from(""));
            lines.push(Line::from("enter / esc to dismiss"));
            (notice.title.clone(), lines, color)
        }
    };

    let height = (lines.len() as u16 + 2).min(area.height.saturating_sub(2));
    let rect = centered_rect(area, 70, height);
    f.render_widget(Clear, rect);
    let body = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(title),
    );
    f.render_widget(body, rect);
}

fn centered_rect(area: Rect, percent_x: u16, height: u16) -> Rect {
    let width = area.width * percent_x / 100;
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect {
        x,
        y,
        width,
        height,
    }
}
