use crate::gateway::{Gateway, HttpGateway};
use crate::model::{ClientConfig, ClientEvent, OperationKind, OperationState};
use crate::orchestrator::{run_controller, UiCommand};
use crate::report;
use crate::sync::Synchronizer;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::audit::AuditSeverity;

/// Output line routing for the stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "cursor-reset-cli",
    version,
    about = "Client for the Cursor machine-identity reset helper"
)]
pub struct Cli {
    /// Base URL of the local reset helper backend
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub base_url: String,

    /// Print backend status and exit (no TUI)
    #[arg(long)]
    pub status: bool,

    /// Reset the stored configuration and exit (no TUI)
    #[arg(long)]
    pub reset: bool,

    /// Close all Cursor processes and exit (no TUI)
    #[arg(long)]
    pub kill: bool,

    /// Generate preview identifiers without saving them and exit (no TUI)
    #[arg(long)]
    pub generate: bool,

    /// Disable Cursor auto-update and exit (no TUI)
    #[arg(long)]
    pub disable_autoupdate: bool,

    /// Mark the rewritten configuration file read-only after a reset
    #[arg(long)]
    pub set_read_only: bool,

    /// Assume "yes" for confirmation prompts in one-shot modes
    #[arg(long)]
    pub yes: bool,

    /// Print machine-readable JSON instead of text in one-shot modes
    #[arg(long)]
    pub json: bool,

    /// Cursor process status poll interval
    #[arg(long, default_value = "10s")]
    pub poll_interval: humantime::Duration,

    /// Per-request timeout for backend calls. The backend is expected to
    /// answer or fail explicitly; this bounds the wait when it does neither.
    #[arg(long, default_value = "30s")]
    pub request_timeout: humantime::Duration,

    /// Write diagnostics to this file instead of the default log location
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,
}

impl Cli {
    fn action_count(&self) -> usize {
        [
            self.status,
            self.reset,
            self.kill,
            self.generate,
            self.disable_autoupdate,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    pub fn one_shot(&self) -> bool {
        self.action_count() > 0
    }

    /// Whether this invocation will run the interactive TUI.
    pub fn runs_tui(&self) -> bool {
        !self.one_shot() && cfg!(feature = "tui")
    }

    fn operation(&self) -> Option<OperationKind> {
        if self.reset {
            Some(OperationKind::Reset)
        } else if self.kill {
            Some(OperationKind::KillCursor)
        } else if self.generate {
            Some(OperationKind::GeneratePreview)
        } else if self.disable_autoupdate {
            Some(OperationKind::DisableAutoUpdate)
        } else {
            None
        }
    }
}

/// Build a `ClientConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> ClientConfig {
    ClientConfig {
        base_url: args.base_url.clone(),
        poll_interval: Duration::from(args.poll_interval),
        request_timeout: Duration::from(args.request_timeout),
        user_agent: format!("cursor-reset-cli/{}", env!("CARGO_PKG_VERSION")),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.action_count() > 1 {
        bail!(
            "choose at most one of --status, --reset, --kill, --generate, --disable-autoupdate"
        );
    }
    if args.json && !args.one_shot() {
        bail!("--json requires a one-shot action flag");
    }

    if args.one_shot() {
        return run_one_shot(args).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Built without a TUI: fall back to the status report.
        let mut args = args;
        args.status = true;
        run_one_shot(args).await
    }
}

/// Drive a single user intent through the orchestrator and exit.
async fn run_one_shot(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(&cfg)?);

    // Fail fast when the helper is down; operations would only time out later.
    gateway
        .health()
        .await
        .map_err(|e| anyhow!("reset helper not reachable at {}: {}", cfg.base_url, e))?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let sync = Arc::new(Synchronizer::new(gateway.clone(), event_tx.clone()));
    let controller = tokio::spawn(run_controller(
        gateway,
        sync.clone(),
        event_tx,
        cmd_rx,
    ));
    let (out_tx, out_handle) = spawn_output_writer();

    let result = if args.status {
        run_status_mode(&args, &mut event_rx, &sync, &out_tx).await
    } else {
        run_operation_mode(&args, &mut event_rx, &cmd_tx, &out_tx).await
    };

    let _ = cmd_tx.send(UiCommand::Quit);
    controller.await.context("controller task failed")??;
    drop(out_tx);
    let _ = out_handle.await;
    result
}

/// Wait for the initial load, then print the status report.
async fn run_status_mode(
    args: &Cli,
    event_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    sync: &Synchronizer,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    let mut system = None;
    while let Some(ev) = event_rx.recv().await {
        match ev {
            ClientEvent::SystemLoaded { info } => system = Some(info),
            ClientEvent::Audit {
                severity: AuditSeverity::Error,
                message,
            } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("error: {message}")));
            }
            ClientEvent::Audit { message, .. } if message == "Initial data loaded" => break,
            _ => {}
        }
    }

    let status = sync.status();
    if args.json {
        let value = report::status_json(system.as_ref(), &status);
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&value)?));
    } else {
        for line in report::build_status_report(system.as_ref(), &status).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    Ok(())
}

/// Send the requested operation and consume events until a terminal state.
async fn run_operation_mode(
    args: &Cli,
    event_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    cmd_tx: &mpsc::UnboundedSender<UiCommand>,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    let kind = args
        .operation()
        .ok_or_else(|| anyhow!("no operation flag given"))?;
    let _ = cmd_tx.send(UiCommand::Start {
        kind,
        set_read_only: args.set_read_only,
    });

    while let Some(ev) = event_rx.recv().await {
        match ev {
            ClientEvent::Audit { severity, message } => {
                let line = match severity {
                    AuditSeverity::Error => format!("error: {message}"),
                    _ => message,
                };
                let _ = out_tx.send(OutputLine::Stderr(line));
            }
            ClientEvent::ConfirmResetRequested => {
                let accepted = confirm(
                    "Cursor is currently running. It will be closed before resetting. Continue?",
                    args.yes,
                )
                .await;
                let _ = cmd_tx.send(UiCommand::ConfirmReset(accepted));
                if !accepted {
                    let _ = out_tx.send(OutputLine::Stderr("Reset cancelled.".to_string()));
                    return Ok(());
                }
            }
            ClientEvent::ElevationRequested { message } => {
                let _ = out_tx.send(OutputLine::Stderr(message));
                let accepted = confirm("Attempt automatic privilege elevation?", args.yes).await;
                let _ = cmd_tx.send(UiCommand::ConfirmElevation(accepted));
                if !accepted {
                    bail!("administrator privileges are required for this operation");
                }
            }
            ClientEvent::Notice(notice) => {
                let _ = out_tx.send(OutputLine::Stderr(format!("== {} ==", notice.title)));
                for line in notice.body.lines() {
                    let _ = out_tx.send(OutputLine::Stderr(line.to_string()));
                }
            }
            ClientEvent::OperationChanged { state } => match state {
                OperationState::Succeeded { kind, outcome } => {
                    if args.json {
                        let value = report::outcome_json(kind, &outcome);
                        let _ = out_tx
                            .send(OutputLine::Stdout(serde_json::to_string_pretty(&value)?));
                    } else {
                        for line in report::build_outcome_report(kind, &outcome).lines {
                            let _ = out_tx.send(OutputLine::Stdout(line));
                        }
                    }
                    return Ok(());
                }
                OperationState::Failed { message, .. } => {
                    bail!(message);
                }
                // The elevation sub-flow returned the slot to idle: either
                // the user was handed an elevated instance or may now retry.
                OperationState::Idle => return Ok(()),
                _ => {}
            },
            _ => {}
        }
    }
    bail!("orchestrator stopped before the operation finished")
}

/// Ask on the terminal; `--yes` answers affirmatively without prompting.
async fn confirm(prompt: &str, assume_yes: bool) -> bool {
    if assume_yes {
        eprintln!("{prompt} yes (--yes)");
        return true;
    }
    let prompt = prompt.to_string();
    tokio::task::spawn_blocking(move || {
        eprint!("{prompt} [y/N]: ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes" | "YES")
    })
    .await
    .unwrap_or(false)
}
