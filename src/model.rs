use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use time::OffsetDateTime;

use crate::audit::AuditSeverity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

/// User-triggered operations against the reset helper backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Reset,
    KillCursor,
    GeneratePreview,
    DisableAutoUpdate,
    Elevate,
}

impl OperationKind {
    /// Human-readable label for audit entries and notices.
    pub fn label(self) -> &'static str {
        match self {
            OperationKind::Reset => "configuration reset",
            OperationKind::KillCursor => "close Cursor",
            OperationKind::GeneratePreview => "identifier preview",
            OperationKind::DisableAutoUpdate => "disable auto-update",
            OperationKind::Elevate => "privilege elevation",
        }
    }

    /// Mutating operations get a modal-level notice on every terminal state.
    pub fn is_mutating(self) -> bool {
        !matches!(self, OperationKind::GeneratePreview)
    }
}

/// Why an operation ended up in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Timeout,
    Contract,
    Application,
}

/// The single per-session operation slot. A new operation may only start
/// from `Idle`, `Succeeded` or `Failed`; `InFlight` and `NeedsElevation`
/// block further starts until resolved.
#[derive(Debug, Clone)]
pub enum OperationState {
    Idle,
    InFlight {
        kind: OperationKind,
        started_at: Instant,
    },
    Succeeded {
        kind: OperationKind,
        outcome: OperationOutcome,
    },
    Failed {
        kind: OperationKind,
        failure: FailureKind,
        message: String,
    },
    NeedsElevation {
        kind: OperationKind,
        message: String,
    },
}

/// Identifier snapshot as stored in Cursor's configuration file. Immutable
/// once constructed; a fresh snapshot fully replaces the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(rename = "telemetryMachineId")]
    pub machine_id: String,
    #[serde(rename = "telemetryMacMachineId")]
    pub mac_machine_id: String,
    #[serde(rename = "telemetryDevDeviceId")]
    pub device_id: String,
    #[serde(rename = "telemetrySqmId")]
    pub sqm_id: String,
    #[serde(rename = "lastModified", default)]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub os: String,
    pub username: String,
    pub is_admin: bool,
    pub config_path: String,
}

/// Authoritative view of remote state, owned by the status synchronizer.
#[derive(Debug, Clone, Default)]
pub struct RemoteStatus {
    pub process_running: bool,
    pub config: Option<ConfigSnapshot>,
    pub last_synced_at: Option<OffsetDateTime>,
}

/// Success payload of a gateway operation call.
#[derive(Debug, Clone, Default)]
pub struct OperationOutcome {
    /// Fresh identifier snapshot (reset and identifier preview).
    pub ids: Option<ConfigSnapshot>,
    /// Whether the backend touched the Windows registry (reset only).
    pub registry_modified: bool,
    /// Step descriptions reported by the backend (disable auto-update).
    pub operations: Vec<String>,
    /// Backend-supplied completion message, passed through verbatim.
    pub message: Option<String>,
    /// Set when the backend demanded elevation instead of performing the
    /// operation; carries the backend's elevation instructions.
    pub needs_elevation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ElevationOutcome {
    pub needs_restart: bool,
    pub message: Option<String>,
}

/// Modal-level notification for the presentation layers.
#[derive(Debug, Clone)]
pub struct Notice {
    pub severity: AuditSeverity,
    pub title: String,
    pub body: String,
}

/// Events emitted by the orchestration core and consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    OperationChanged { state: OperationState },
    StatusChanged { status: RemoteStatus },
    SystemLoaded { info: SystemInfo },
    Audit { severity: AuditSeverity, message: String },
    Notice(Notice),
    /// Reset pre-flight found Cursor running; the operation is gated on an
    /// affirmative user decision.
    ConfirmResetRequested,
    /// The backend demanded elevation; the user must approve or decline.
    ElevationRequested { message: String },
}
