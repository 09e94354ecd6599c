//! Operation lifecycle controller.
//!
//! Owns the operation slot and applies every state transition from a single
//! task, so no transition can interleave with another. Gateway calls run as
//! spawned tasks that report completion through an internal channel; audit
//! entries are emitted at the point the outcome is observed.

use crate::audit::AuditSeverity;
use crate::gateway::{self, Gateway, GatewayError};
use crate::model::{ClientEvent, ElevationOutcome, Notice, OperationKind, OperationOutcome};
use crate::orchestrator::machine::OperationSlot;
use crate::sync::Synchronizer;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers to drive the orchestrator.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Start {
        kind: OperationKind,
        set_read_only: bool,
    },
    /// Answer to the reset-while-running confirmation gate.
    ConfirmReset(bool),
    /// Answer to an elevation demand.
    ConfirmElevation(bool),
    /// Explicit full status pull.
    Refresh,
    Quit,
}

/// Completions reported by spawned gateway tasks.
enum TaskMsg {
    PreflightChecked {
        running: bool,
    },
    OpFinished {
        kind: OperationKind,
        result: Result<OperationOutcome, GatewayError>,
    },
    ElevationFinished {
        result: Result<ElevationOutcome, GatewayError>,
    },
}

/// Reset start sequence in progress; the slot is not claimed yet, so the
/// gateway has not been touched.
enum PendingReset {
    Checking { set_read_only: bool },
    AwaitingConfirm { set_read_only: bool },
}

struct Controller {
    gateway: Arc<dyn Gateway>,
    sync: Arc<Synchronizer>,
    event_tx: UnboundedSender<ClientEvent>,
    task_tx: UnboundedSender<TaskMsg>,
    slot: OperationSlot,
    pending_reset: Option<PendingReset>,
    elevation_origin: Option<OperationKind>,
}

/// Run the orchestrator until the UI sends `Quit` or drops its command
/// handle.
pub(crate) async fn run_controller(
    gateway: Arc<dyn Gateway>,
    sync: Arc<Synchronizer>,
    event_tx: UnboundedSender<ClientEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let (task_tx, mut task_rx) = mpsc::unbounded_channel::<TaskMsg>();
    let mut ctrl = Controller {
        gateway,
        sync,
        event_tx,
        task_tx,
        slot: OperationSlot::new(),
        pending_reset: None,
        elevation_origin: None,
    };
    ctrl.bootstrap();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        if !ctrl.handle_command(cmd) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            Some(msg) = task_rx.recv() => ctrl.handle_task(msg),
        }
    }
    Ok(())
}

impl Controller {
    /// Initial load, mirroring a fresh session: system info plus a full
    /// status pull.
    fn bootstrap(&self) {
        self.audit(AuditSeverity::Info, "Loading system information...");
        let gateway = self.gateway.clone();
        let sync = self.sync.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            match gateway.system_info().await {
                Ok(info) => {
                    let _ = event_tx.send(ClientEvent::SystemLoaded { info });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "system info load failed");
                    let _ = event_tx.send(ClientEvent::Audit {
                        severity: AuditSeverity::Error,
                        message: "Failed to load system information".to_string(),
                    });
                }
            }
            sync.sync_all().await;
            let _ = event_tx.send(ClientEvent::Audit {
                severity: AuditSeverity::Success,
                message: "Initial data loaded".to_string(),
            });
        });
    }

    fn handle_command(&mut self, cmd: UiCommand) -> bool {
        match cmd {
            UiCommand::Start {
                kind,
                set_read_only,
            } => self.handle_start(kind, set_read_only),
            UiCommand::ConfirmReset(accepted) => self.handle_confirm_reset(accepted),
            UiCommand::ConfirmElevation(accepted) => self.handle_confirm_elevation(accepted),
            UiCommand::Refresh => {
                let sync = self.sync.clone();
                tokio::spawn(async move {
                    sync.sync_all().await;
                });
            }
            UiCommand::Quit => return false,
        }
        true
    }

    fn handle_task(&mut self, msg: TaskMsg) {
        match msg {
            TaskMsg::PreflightChecked { running } => self.handle_preflight(running),
            TaskMsg::OpFinished { kind, result } => self.handle_op_finished(kind, result),
            TaskMsg::ElevationFinished { result } => self.handle_elevation_finished(result),
        }
    }

    fn handle_start(&mut self, kind: OperationKind, set_read_only: bool) {
        if !self.slot.can_start() {
            tracing::debug!(?kind, "start ignored: operation slot busy");
            return;
        }
        match kind {
            OperationKind::Reset => {
                if self.pending_reset.is_some() {
                    tracing::debug!("reset already being prepared");
                    return;
                }
                self.pending_reset = Some(PendingReset::Checking { set_read_only });
                // Fresh pull before the mutating call: resetting while Cursor
                // holds the config file open can corrupt the write.
                let sync = self.sync.clone();
                let task_tx = self.task_tx.clone();
                tokio::spawn(async move {
                    let running = sync.sync_status_only().await;
                    let _ = task_tx.send(TaskMsg::PreflightChecked { running });
                });
            }
            OperationKind::Elevate => {
                tracing::debug!("elevation starts only from an elevation demand");
            }
            _ => self.start_operation(kind, false),
        }
    }

    fn handle_preflight(&mut self, running: bool) {
        match self.pending_reset.take() {
            Some(PendingReset::Checking { set_read_only }) => {
                if !self.slot.can_start() {
                    tracing::debug!("reset dropped: slot claimed during pre-flight");
                    return;
                }
                if running {
                    self.pending_reset = Some(PendingReset::AwaitingConfirm { set_read_only });
                    let _ = self.event_tx.send(ClientEvent::ConfirmResetRequested);
                } else {
                    self.start_operation(OperationKind::Reset, set_read_only);
                }
            }
            other => self.pending_reset = other,
        }
    }

    fn handle_confirm_reset(&mut self, accepted: bool) {
        match self.pending_reset.take() {
            Some(PendingReset::AwaitingConfirm { set_read_only }) => {
                if accepted && self.slot.can_start() {
                    self.start_operation(OperationKind::Reset, set_read_only);
                } else if !accepted {
                    self.audit(AuditSeverity::Info, "Configuration reset cancelled");
                }
            }
            other => self.pending_reset = other,
        }
    }

    fn start_operation(&mut self, kind: OperationKind, set_read_only: bool) {
        if !self.slot.begin(kind) {
            return;
        }
        self.emit_state();
        match kind {
            OperationKind::Reset => {
                self.audit(AuditSeverity::Info, "Starting configuration reset...")
            }
            OperationKind::KillCursor => {
                self.audit(AuditSeverity::Info, "Attempting to close Cursor processes...")
            }
            OperationKind::DisableAutoUpdate => {
                self.audit(AuditSeverity::Info, "Attempting to disable auto-update...")
            }
            _ => {}
        }
        let gateway = self.gateway.clone();
        let task_tx = self.task_tx.clone();
        tokio::spawn(async move {
            let result = gateway::invoke(gateway.as_ref(), kind, set_read_only).await;
            let _ = task_tx.send(TaskMsg::OpFinished { kind, result });
        });
    }

    fn handle_op_finished(
        &mut self,
        kind: OperationKind,
        result: Result<OperationOutcome, GatewayError>,
    ) {
        match result {
            Ok(outcome) => {
                if let Some(message) = outcome.needs_elevation.clone() {
                    if self.slot.demand_elevation(message.clone()) {
                        self.emit_state();
                        // No audit entry and no resync here: nothing changed
                        // remotely, and the log stays untouched until the
                        // user decides.
                        let _ = self
                            .event_tx
                            .send(ClientEvent::ElevationRequested { message });
                    }
                    return;
                }
                if !self.slot.succeed(outcome.clone()) {
                    tracing::warn!(?kind, "completion for an operation that is not in flight");
                    return;
                }
                self.emit_state();
                self.success_audits(kind, &outcome);
                if let Some(notice) = success_notice(kind, &outcome) {
                    self.notice(notice);
                }
                // Exactly one resync per success, initiated after the
                // transition is recorded.
                let sync = self.sync.clone();
                tokio::spawn(async move {
                    sync.sync_all().await;
                });
            }
            Err(e) => {
                let text = failure_text(kind, &e);
                if !self.slot.fail(e.failure_kind(), e.to_string()) {
                    tracing::warn!(?kind, "failure for an operation that is not in flight");
                    return;
                }
                self.emit_state();
                self.audit(AuditSeverity::Error, text.clone());
                self.notice(Notice {
                    severity: AuditSeverity::Error,
                    title: "Operation failed".to_string(),
                    body: text,
                });
            }
        }
    }

    fn handle_confirm_elevation(&mut self, accepted: bool) {
        if accepted {
            let Some(origin) = self.slot.approve_elevation() else {
                tracing::debug!("no elevation demand pending");
                return;
            };
            self.elevation_origin = Some(origin);
            self.emit_state();
            self.audit(AuditSeverity::Info, "Requesting administrator privileges...");
            let gateway = self.gateway.clone();
            let task_tx = self.task_tx.clone();
            tokio::spawn(async move {
                let result = gateway.elevate().await;
                let _ = task_tx.send(TaskMsg::ElevationFinished { result });
            });
        } else if self.slot.decline_elevation() {
            self.emit_state();
            self.notice(Notice {
                severity: AuditSeverity::Error,
                title: "Administrator privileges required".to_string(),
                body: "The operation needs an elevated backend.\n\
                       Restart the reset helper as administrator and try again."
                    .to_string(),
            });
        }
    }

    fn handle_elevation_finished(&mut self, result: Result<ElevationOutcome, GatewayError>) {
        match result {
            Ok(outcome) if outcome.needs_restart => {
                // The backend spawned an elevated instance; this client
                // cannot continue the original operation in-process.
                self.elevation_origin = None;
                self.slot.reset_idle();
                self.emit_state();
                self.audit(AuditSeverity::Info, "Privilege elevation initiated");
                self.notice(Notice {
                    severity: AuditSeverity::Info,
                    title: "Elevated instance starting".to_string(),
                    body: "Approve the elevation prompt and wait for the new elevated \
                           instance, then close this client and continue there."
                        .to_string(),
                });
            }
            Ok(_) => {
                let origin = self.elevation_origin.take();
                self.slot.reset_idle();
                self.emit_state();
                self.audit(AuditSeverity::Success, "Privileges elevated successfully");
                let mut body =
                    String::from("The backend now runs with administrator privileges.");
                if let Some(origin) = origin {
                    body.push_str(&format!(
                        "\nYou can retry the {} operation now.",
                        origin.label()
                    ));
                }
                self.notice(Notice {
                    severity: AuditSeverity::Success,
                    title: "Privileges elevated".to_string(),
                    body,
                });
                // Admin status and remote state both changed; pull fresh truth.
                let gateway = self.gateway.clone();
                let sync = self.sync.clone();
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    match gateway.system_info().await {
                        Ok(info) => {
                            let _ = event_tx.send(ClientEvent::SystemLoaded { info });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "system info refresh failed");
                            let _ = event_tx.send(ClientEvent::Audit {
                                severity: AuditSeverity::Error,
                                message: "Failed to load system information".to_string(),
                            });
                        }
                    }
                    sync.sync_all().await;
                });
            }
            Err(e) => {
                self.elevation_origin = None;
                let text = failure_text(OperationKind::Elevate, &e);
                if self.slot.fail(e.failure_kind(), e.to_string()) {
                    self.emit_state();
                }
                self.audit(AuditSeverity::Error, text.clone());
                self.notice(Notice {
                    severity: AuditSeverity::Error,
                    title: "Elevation failed".to_string(),
                    body: text,
                });
            }
        }
    }

    fn success_audits(&self, kind: OperationKind, outcome: &OperationOutcome) {
        match kind {
            OperationKind::Reset => {
                self.audit(
                    AuditSeverity::Success,
                    "Configuration reset completed successfully",
                );
                if let Some(ids) = &outcome.ids {
                    self.audit(
                        AuditSeverity::Info,
                        format!("Generated new machine ID: {}…", prefix(&ids.machine_id, 16)),
                    );
                }
                if outcome.registry_modified {
                    self.audit(
                        AuditSeverity::Success,
                        "Windows registry MachineGuid modified and backed up",
                    );
                }
            }
            OperationKind::KillCursor => {
                self.audit(AuditSeverity::Success, "Cursor processes closed successfully")
            }
            OperationKind::DisableAutoUpdate => {
                self.audit(AuditSeverity::Success, "Auto-update disabled successfully");
                for step in &outcome.operations {
                    self.audit(AuditSeverity::Info, step.clone());
                }
            }
            OperationKind::GeneratePreview | OperationKind::Elevate => {}
        }
    }

    fn emit_state(&self) {
        let _ = self.event_tx.send(ClientEvent::OperationChanged {
            state: self.slot.state().clone(),
        });
    }

    fn audit(&self, severity: AuditSeverity, message: impl Into<String>) {
        let _ = self.event_tx.send(ClientEvent::Audit {
            severity,
            message: message.into(),
        });
    }

    fn notice(&self, notice: Notice) {
        let _ = self.event_tx.send(ClientEvent::Notice(notice));
    }
}

/// Modal-level notice for successful mutating operations. Preview results
/// surface through the `Succeeded` state instead.
fn success_notice(kind: OperationKind, outcome: &OperationOutcome) -> Option<Notice> {
    if !kind.is_mutating() {
        return None;
    }
    match kind {
        OperationKind::Reset => {
            let mut body = String::from("New identifiers are in place.");
            if outcome.registry_modified {
                body.push_str("\nWindows MachineGuid was updated; the previous value was backed up.");
            }
            body.push_str("\nRestart Cursor for the changes to take effect.");
            Some(Notice {
                severity: AuditSeverity::Success,
                title: "Configuration reset complete".to_string(),
                body,
            })
        }
        OperationKind::KillCursor => Some(Notice {
            severity: AuditSeverity::Success,
            title: "Cursor closed".to_string(),
            body: outcome
                .message
                .clone()
                .unwrap_or_else(|| "All Cursor processes closed.".to_string()),
        }),
        OperationKind::DisableAutoUpdate => {
            let mut body = String::from("Operations performed:");
            for step in &outcome.operations {
                body.push_str("\n- ");
                body.push_str(step);
            }
            body.push_str("\nCursor updates must be installed manually from now on.");
            Some(Notice {
                severity: AuditSeverity::Success,
                title: "Auto-update disabled".to_string(),
                body,
            })
        }
        OperationKind::GeneratePreview | OperationKind::Elevate => None,
    }
}

fn failure_text(kind: OperationKind, e: &GatewayError) -> String {
    match kind {
        OperationKind::Reset => format!("Reset failed: {e}"),
        OperationKind::KillCursor => format!("Failed to close Cursor: {e}"),
        OperationKind::GeneratePreview => format!("Failed to generate preview: {e}"),
        OperationKind::DisableAutoUpdate => format!("Failed to disable auto-update: {e}"),
        OperationKind::Elevate => format!("Failed to elevate privileges: {e}"),
    }
}

fn prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConfigSnapshot, OperationState, SystemInfo};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};
    use tokio::time::timeout;

    #[derive(Default)]
    struct MockGateway {
        calls: Mutex<Vec<&'static str>>,
        running: Mutex<VecDeque<Result<bool, GatewayError>>>,
        reset: Mutex<VecDeque<Result<OperationOutcome, GatewayError>>>,
        kill: Mutex<VecDeque<Result<OperationOutcome, GatewayError>>>,
        elevations: Mutex<VecDeque<Result<ElevationOutcome, GatewayError>>>,
        kill_gate: Option<Arc<Notify>>,
    }

    impl MockGateway {
        fn record(&self, name: &'static str) {
            self.calls.lock().unwrap().push(name);
        }

        fn count(&self, name: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
        }

        fn push_running(&self, r: Result<bool, GatewayError>) {
            self.running.lock().unwrap().push_back(r);
        }

        fn push_reset(&self, r: Result<OperationOutcome, GatewayError>) {
            self.reset.lock().unwrap().push_back(r);
        }

        fn push_elevate(&self, r: Result<ElevationOutcome, GatewayError>) {
            self.elevations.lock().unwrap().push_back(r);
        }
    }

    #[async_trait]
    impl Gateway for MockGateway {
        async fn system_info(&self) -> Result<SystemInfo, GatewayError> {
            self.record("system");
            Ok(SystemInfo {
                os: "linux".into(),
                username: "tester".into(),
                is_admin: false,
                config_path: "/tmp/storage.json".into(),
            })
        }

        async fn config_snapshot(&self) -> Result<Option<ConfigSnapshot>, GatewayError> {
            self.record("config");
            Ok(None)
        }

        async fn process_running(&self) -> Result<bool, GatewayError> {
            self.record("check");
            self.running.lock().unwrap().pop_front().unwrap_or(Ok(false))
        }

        async fn reset(&self, _set_read_only: bool) -> Result<OperationOutcome, GatewayError> {
            self.record("reset");
            self.reset
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(OperationOutcome::default()))
        }

        async fn kill_cursor(&self) -> Result<OperationOutcome, GatewayError> {
            self.record("kill");
            if let Some(gate) = &self.kill_gate {
                gate.notified().await;
            }
            self.kill
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(OperationOutcome::default()))
        }

        async fn generate_ids(&self) -> Result<OperationOutcome, GatewayError> {
            self.record("generate");
            Ok(OperationOutcome::default())
        }

        async fn disable_auto_update(&self) -> Result<OperationOutcome, GatewayError> {
            self.record("disable");
            Ok(OperationOutcome::default())
        }

        async fn elevate(&self) -> Result<ElevationOutcome, GatewayError> {
            self.record("elevate");
            self.elevations.lock().unwrap().pop_front().unwrap_or(Ok(ElevationOutcome {
                needs_restart: false,
                message: None,
            }))
        }

        async fn health(&self) -> Result<bool, GatewayError> {
            Ok(true)
        }
    }

    struct Harness {
        gw: Arc<MockGateway>,
        cmd_tx: mpsc::UnboundedSender<UiCommand>,
        event_rx: mpsc::UnboundedReceiver<ClientEvent>,
    }

    impl Harness {
        async fn start(gw: MockGateway) -> Self {
            let gw = Arc::new(gw);
            let dyn_gw: Arc<dyn Gateway> = gw.clone();
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            let sync = Arc::new(Synchronizer::new(dyn_gw.clone(), event_tx.clone()));
            tokio::spawn(run_controller(dyn_gw, sync, event_tx, cmd_rx));
            let mut harness = Self {
                gw,
                cmd_tx,
                event_rx,
            };
            harness.wait_for_audit("Initial data loaded").await;
            harness
        }

        fn send(&self, cmd: UiCommand) {
            self.cmd_tx.send(cmd).expect("controller alive");
        }

        async fn next_event(&mut self) -> ClientEvent {
            timeout(Duration::from_secs(2), self.event_rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel open")
        }

        async fn wait_for_audit(&mut self, needle: &str) -> String {
            loop {
                if let ClientEvent::Audit { message, .. } = self.next_event().await {
                    if message.contains(needle) {
                        return message;
                    }
                }
            }
        }

        async fn wait_for_state<F>(&mut self, pred: F) -> OperationState
        where
            F: Fn(&OperationState) -> bool,
        {
            loop {
                if let ClientEvent::OperationChanged { state } = self.next_event().await {
                    if pred(&state) {
                        return state;
                    }
                }
            }
        }

        async fn wait_for_call_count(&self, name: &str, at_least: usize) {
            timeout(Duration::from_secs(2), async {
                while self.gw.count(name) < at_least {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("timed out waiting for gateway call");
        }
    }

    fn in_flight(state: &OperationState) -> bool {
        matches!(state, OperationState::InFlight { .. })
    }

    fn succeeded(state: &OperationState) -> bool {
        matches!(state, OperationState::Succeeded { .. })
    }

    fn needs_elevation_outcome(message: &str) -> OperationOutcome {
        OperationOutcome {
            needs_elevation: Some(message.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_is_a_noop_while_another_operation_is_in_flight() {
        let gate = Arc::new(Notify::new());
        let gw = MockGateway {
            kill_gate: Some(gate.clone()),
            ..Default::default()
        };
        let mut h = Harness::start(gw).await;

        h.send(UiCommand::Start {
            kind: OperationKind::KillCursor,
            set_read_only: false,
        });
        h.wait_for_state(in_flight).await;

        // Second start while the kill call is blocked: must not reach the
        // gateway. The refresh afterwards is an ordering fence — commands are
        // handled in order, so once its sync lands the no-op was processed.
        let config_calls = h.gw.count("config");
        h.send(UiCommand::Start {
            kind: OperationKind::GeneratePreview,
            set_read_only: false,
        });
        h.send(UiCommand::Refresh);
        h.wait_for_call_count("config", config_calls + 1).await;
        assert_eq!(h.gw.count("generate"), 0);

        gate.notify_one();
        let state = h.wait_for_state(succeeded).await;
        match state {
            OperationState::Succeeded { kind, .. } => {
                assert_eq!(kind, OperationKind::KillCursor)
            }
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(h.gw.count("generate"), 0);
        assert_eq!(h.gw.count("kill"), 1);
    }

    #[tokio::test]
    async fn success_triggers_exactly_one_full_resync() {
        let mut h = Harness::start(MockGateway::default()).await;
        let config_calls = h.gw.count("config");

        h.send(UiCommand::Start {
            kind: OperationKind::KillCursor,
            set_read_only: false,
        });
        h.wait_for_state(succeeded).await;
        h.wait_for_call_count("config", config_calls + 1).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.gw.count("config"), config_calls + 1);
    }

    #[tokio::test]
    async fn privilege_demand_routes_to_elevation_without_resync_or_audit() {
        let gw = MockGateway::default();
        gw.push_reset(Ok(needs_elevation_outcome("Admin required")));
        let mut h = Harness::start(gw).await;
        let config_calls = h.gw.count("config");

        h.send(UiCommand::Start {
            kind: OperationKind::Reset,
            set_read_only: false,
        });

        let mut audits_after_demand = 0;
        let mut saw_demand = false;
        loop {
            match h.next_event().await {
                ClientEvent::ElevationRequested { message } => {
                    assert_eq!(message, "Admin required");
                    break;
                }
                ClientEvent::OperationChanged { state } => {
                    if let OperationState::NeedsElevation { kind, message } = state {
                        assert_eq!(kind, OperationKind::Reset);
                        assert_eq!(message, "Admin required");
                        saw_demand = true;
                    }
                }
                ClientEvent::Audit { message, .. } if saw_demand => {
                    audits_after_demand += 1;
                    panic!("audit after elevation demand: {message}");
                }
                _ => {}
            }
        }
        assert!(saw_demand);
        assert_eq!(audits_after_demand, 0);

        // No resync was initiated by the demand.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.gw.count("config"), config_calls);

        // Declining releases the slot.
        h.send(UiCommand::ConfirmElevation(false));
        let state = h
            .wait_for_state(|s| matches!(s, OperationState::Idle))
            .await;
        assert!(matches!(state, OperationState::Idle));
    }

    #[tokio::test]
    async fn reset_is_gated_on_confirmation_while_cursor_runs() {
        let gw = MockGateway::default();
        // One response for the bootstrap sync, one for the pre-flight.
        gw.push_running(Ok(true));
        gw.push_running(Ok(true));
        let mut h = Harness::start(gw).await;

        h.send(UiCommand::Start {
            kind: OperationKind::Reset,
            set_read_only: false,
        });
        loop {
            if matches!(h.next_event().await, ClientEvent::ConfirmResetRequested) {
                break;
            }
        }
        assert_eq!(h.gw.count("reset"), 0, "gateway must not be invoked");

        h.send(UiCommand::ConfirmReset(false));
        h.wait_for_audit("Configuration reset cancelled").await;
        assert_eq!(h.gw.count("reset"), 0);
    }

    #[tokio::test]
    async fn confirmed_reset_reaches_the_gateway() {
        let gw = MockGateway::default();
        gw.push_running(Ok(true));
        gw.push_running(Ok(true));
        let mut h = Harness::start(gw).await;

        h.send(UiCommand::Start {
            kind: OperationKind::Reset,
            set_read_only: true,
        });
        loop {
            if matches!(h.next_event().await, ClientEvent::ConfirmResetRequested) {
                break;
            }
        }
        h.send(UiCommand::ConfirmReset(true));
        let state = h.wait_for_state(succeeded).await;
        match state {
            OperationState::Succeeded { kind, .. } => assert_eq!(kind, OperationKind::Reset),
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(h.gw.count("reset"), 1);
    }

    #[tokio::test]
    async fn approved_elevation_with_restart_abandons_the_operation() {
        let gw = MockGateway::default();
        gw.push_reset(Ok(needs_elevation_outcome("Admin required")));
        gw.push_elevate(Ok(ElevationOutcome {
            needs_restart: true,
            message: None,
        }));
        let mut h = Harness::start(gw).await;

        h.send(UiCommand::Start {
            kind: OperationKind::Reset,
            set_read_only: false,
        });
        loop {
            if matches!(h.next_event().await, ClientEvent::ElevationRequested { .. }) {
                break;
            }
        }
        h.send(UiCommand::ConfirmElevation(true));
        h.wait_for_audit("Privilege elevation initiated").await;
        h.wait_for_state(|s| matches!(s, OperationState::Idle)).await;
        assert_eq!(h.gw.count("elevate"), 1);
        assert_eq!(h.gw.count("reset"), 1, "no automatic retry");
    }

    #[tokio::test]
    async fn approved_elevation_without_restart_resyncs_admin_status() {
        let gw = MockGateway::default();
        gw.push_reset(Ok(needs_elevation_outcome("Admin required")));
        gw.push_elevate(Ok(ElevationOutcome {
            needs_restart: false,
            message: None,
        }));
        let mut h = Harness::start(gw).await;
        let system_calls = h.gw.count("system");
        let config_calls = h.gw.count("config");

        h.send(UiCommand::Start {
            kind: OperationKind::Reset,
            set_read_only: false,
        });
        loop {
            if matches!(h.next_event().await, ClientEvent::ElevationRequested { .. }) {
                break;
            }
        }
        h.send(UiCommand::ConfirmElevation(true));
        h.wait_for_audit("Privileges elevated successfully").await;
        h.wait_for_call_count("system", system_calls + 1).await;
        h.wait_for_call_count("config", config_calls + 1).await;
        assert_eq!(h.gw.count("reset"), 1, "no automatic retry");
    }
}
