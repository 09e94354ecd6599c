//! Plain-text and JSON rendering for the one-shot CLI modes.
//!
//! Pure formatting over core state; no orchestration logic lives here.

use crate::model::{ConfigSnapshot, OperationKind, OperationOutcome, RemoteStatus, SystemInfo};
use time::format_description::well_known::Rfc3339;

/// Pre-formatted lines for text output.
pub(crate) struct TextReport {
    pub lines: Vec<String>,
}

/// Build the `--status` report.
pub(crate) fn build_status_report(
    info: Option<&SystemInfo>,
    status: &RemoteStatus,
) -> TextReport {
    let mut lines = Vec::new();

    match info {
        Some(info) => {
            lines.push(format!("OS:          {}", capitalize(&info.os)));
            lines.push(format!("User:        {}", info.username));
            lines.push(format!(
                "Privileges:  {}",
                if info.is_admin {
                    "Administrator"
                } else {
                    "Standard user"
                }
            ));
            lines.push(format!("Config path: {}", info.config_path));
        }
        None => lines.push("System information unavailable".to_string()),
    }

    lines.push(format!(
        "Cursor:      {}",
        if status.process_running {
            "Running"
        } else {
            "Not running"
        }
    ));

    match status.config.as_ref() {
        Some(config) => lines.extend(snapshot_lines(config)),
        None => lines.push("Configuration: no configuration file found".to_string()),
    }

    if let Some(at) = status.last_synced_at {
        if let Ok(stamp) = at.format(&Rfc3339) {
            lines.push(format!("Synced at:   {stamp}"));
        }
    }

    TextReport { lines }
}

/// Identifier block shared by the status report and operation results.
pub(crate) fn snapshot_lines(config: &ConfigSnapshot) -> Vec<String> {
    let mut lines = vec![
        format!("Machine ID:     {}", or_unset(&config.machine_id)),
        format!("MAC machine ID: {}", or_unset(&config.mac_machine_id)),
        format!("Device ID:      {}", or_unset(&config.device_id)),
        format!("SQM ID:         {}", or_unset(&config.sqm_id)),
    ];
    if let Some(modified) = config.last_modified.as_deref() {
        if !modified.is_empty() {
            lines.push(format!("Last modified:  {modified}"));
        }
    }
    lines
}

/// Build the result report for a completed operation.
pub(crate) fn build_outcome_report(kind: OperationKind, outcome: &OperationOutcome) -> TextReport {
    let mut lines = Vec::new();
    match kind {
        OperationKind::Reset => {
            lines.push("Configuration reset successfully.".to_string());
            if outcome.registry_modified {
                lines.push(
                    "Windows MachineGuid was updated; the previous value was backed up."
                        .to_string(),
                );
            }
            if let Some(ids) = &outcome.ids {
                lines.extend(snapshot_lines(ids));
            }
            lines.push("Restart Cursor for the changes to take effect.".to_string());
        }
        OperationKind::KillCursor => {
            lines.push(
                outcome
                    .message
                    .clone()
                    .unwrap_or_else(|| "All Cursor processes closed.".to_string()),
            );
        }
        OperationKind::GeneratePreview => {
            lines.push("Preview identifiers (not saved):".to_string());
            if let Some(ids) = &outcome.ids {
                lines.extend(snapshot_lines(ids));
            }
        }
        OperationKind::DisableAutoUpdate => {
            lines.push("Auto-update disabled.".to_string());
            for step in &outcome.operations {
                lines.push(format!("  - {step}"));
            }
        }
        OperationKind::Elevate => {
            if let Some(message) = outcome.message.as_deref() {
                lines.push(message.to_string());
            }
        }
    }
    TextReport { lines }
}

/// Machine-readable `--status --json` payload.
pub(crate) fn status_json(info: Option<&SystemInfo>, status: &RemoteStatus) -> serde_json::Value {
    serde_json::json!({
        "system": info,
        "cursorRunning": status.process_running,
        "config": status.config,
        "lastSyncedAt": status
            .last_synced_at
            .and_then(|at| at.format(&Rfc3339).ok()),
    })
}

/// Machine-readable result payload for a completed operation.
pub(crate) fn outcome_json(kind: OperationKind, outcome: &OperationOutcome) -> serde_json::Value {
    serde_json::json!({
        "operation": kind,
        "success": true,
        "data": outcome.ids,
        "registryModified": outcome.registry_modified,
        "operations": outcome.operations,
        "message": outcome.message,
    })
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "Not set"
    } else {
        value
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot {
            machine_id: "aaaa".into(),
            mac_machine_id: "bbbb".into(),
            device_id: "cccc".into(),
            sqm_id: String::new(),
            last_modified: Some("2024-01-01T00:00:00Z".into()),
        }
    }

    #[test]
    fn status_report_handles_missing_pieces() {
        let report = build_status_report(None, &RemoteStatus::default());
        assert!(report
            .lines
            .iter()
            .any(|l| l.contains("System information unavailable")));
        assert!(report
            .lines
            .iter()
            .any(|l| l.contains("no configuration file found")));
    }

    #[test]
    fn empty_identifiers_render_as_unset() {
        let lines = snapshot_lines(&snapshot());
        assert!(lines.iter().any(|l| l.contains("SQM ID") && l.contains("Not set")));
        assert!(lines.iter().any(|l| l.contains("Last modified")));
    }

    #[test]
    fn outcome_json_carries_operation_payload() {
        let outcome = OperationOutcome {
            operations: vec!["Removed updater directory".into()],
            ..Default::default()
        };
        let value = outcome_json(OperationKind::DisableAutoUpdate, &outcome);
        assert_eq!(value["success"], true);
        assert_eq!(value["operations"][0], "Removed updater directory");
    }
}
