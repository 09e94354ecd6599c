//! Typed request/response wrapper over the reset helper backend.
//!
//! Pure translation layer: every call is single-shot, with no retries and no
//! caching. Retry policy belongs to the orchestrator. Every distinguishable
//! backend error kind is preserved, never swallowed.

use crate::model::{
    ClientConfig, ConfigSnapshot, ElevationOutcome, FailureKind, OperationKind, OperationOutcome,
    SystemInfo,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    TimedOut,
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Application(String),
}

impl GatewayError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            GatewayError::Unreachable(_) => FailureKind::Transport,
            GatewayError::TimedOut => FailureKind::Timeout,
            GatewayError::MalformedResponse(_) => FailureKind::Contract,
            GatewayError::Application(_) => FailureKind::Application,
        }
    }
}

/// Backend endpoints consumed by the orchestration core. The HTTP
/// implementation lives in [`HttpGateway`]; tests substitute a scripted one.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn system_info(&self) -> Result<SystemInfo, GatewayError>;
    async fn config_snapshot(&self) -> Result<Option<ConfigSnapshot>, GatewayError>;
    async fn process_running(&self) -> Result<bool, GatewayError>;
    async fn reset(&self, set_read_only: bool) -> Result<OperationOutcome, GatewayError>;
    async fn kill_cursor(&self) -> Result<OperationOutcome, GatewayError>;
    async fn generate_ids(&self) -> Result<OperationOutcome, GatewayError>;
    async fn disable_auto_update(&self) -> Result<OperationOutcome, GatewayError>;
    async fn elevate(&self) -> Result<ElevationOutcome, GatewayError>;
    async fn health(&self) -> Result<bool, GatewayError>;
}

/// Dispatch a user operation to the matching endpoint. Elevation restart
/// semantics are handled by the elevation sub-flow, which calls
/// [`Gateway::elevate`] directly.
pub async fn invoke(
    gateway: &dyn Gateway,
    kind: OperationKind,
    set_read_only: bool,
) -> Result<OperationOutcome, GatewayError> {
    match kind {
        OperationKind::Reset => gateway.reset(set_read_only).await,
        OperationKind::KillCursor => gateway.kill_cursor().await,
        OperationKind::GeneratePreview => gateway.generate_ids().await,
        OperationKind::DisableAutoUpdate => gateway.disable_auto_update().await,
        OperationKind::Elevate => {
            let outcome = gateway.elevate().await?;
            Ok(OperationOutcome {
                message: outcome.message,
                ..Default::default()
            })
        }
    }
}

/// JSON envelope shared by all backend responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    needs_elevation: bool,
    #[serde(default)]
    elevation_message: Option<String>,
    #[serde(default)]
    registry_modified: bool,
    #[serde(default)]
    operations: Vec<String>,
    #[serde(default)]
    needs_restart: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Normalize an envelope into an operation outcome. A privilege demand is a
/// regular outcome, not an error: it routes to the elevation sub-flow.
fn outcome_from(env: ApiEnvelope) -> Result<OperationOutcome, GatewayError> {
    if !env.success {
        if env.needs_elevation {
            let message = env.elevation_message.unwrap_or_else(|| {
                "Administrator privileges are required for this operation.".to_string()
            });
            return Ok(OperationOutcome {
                needs_elevation: Some(message),
                ..Default::default()
            });
        }
        return Err(GatewayError::Application(
            env.error
                .unwrap_or_else(|| "backend reported failure".to_string()),
        ));
    }
    let ids = match env.data {
        Some(value) if !value.is_null() => Some(
            serde_json::from_value::<ConfigSnapshot>(value)
                .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?,
        ),
        _ => None,
    };
    Ok(OperationOutcome {
        ids,
        registry_modified: env.registry_modified,
        operations: env.operations,
        message: env.message,
        needs_elevation: None,
    })
}

fn app_error(env: &ApiEnvelope) -> GatewayError {
    GatewayError::Application(
        env.error
            .clone()
            .unwrap_or_else(|| "backend reported failure".to_string()),
    )
}

pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .user_agent(cfg.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_envelope(&self, path: &str) -> Result<ApiEnvelope, GatewayError> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(map_transport)?;
        decode_envelope(resp).await
    }

    async fn post_envelope(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiEnvelope, GatewayError> {
        let mut req = self.http.post(self.url(path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.map_err(map_transport)?;
        decode_envelope(resp).await
    }
}

fn map_transport(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::TimedOut
    } else {
        GatewayError::Unreachable(e.to_string())
    }
}

async fn decode_envelope(resp: reqwest::Response) -> Result<ApiEnvelope, GatewayError> {
    // Error statuses still carry the JSON envelope; decode failures are
    // contract violations either way.
    resp.json::<ApiEnvelope>().await.map_err(|e| {
        if e.is_timeout() {
            GatewayError::TimedOut
        } else {
            GatewayError::MalformedResponse(e.to_string())
        }
    })
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn system_info(&self) -> Result<SystemInfo, GatewayError> {
        let env = self.get_envelope("/api/system-info").await?;
        if !env.success {
            return Err(app_error(&env));
        }
        let data = env
            .data
            .ok_or_else(|| GatewayError::MalformedResponse("missing system info".to_string()))?;
        serde_json::from_value(data).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }

    async fn config_snapshot(&self) -> Result<Option<ConfigSnapshot>, GatewayError> {
        let env = self.get_envelope("/api/config").await?;
        if !env.success {
            return Err(app_error(&env));
        }
        // `data: null` is authoritative: no configuration file exists.
        match env.data {
            Some(value) if !value.is_null() => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| GatewayError::MalformedResponse(e.to_string())),
            _ => Ok(None),
        }
    }

    async fn process_running(&self) -> Result<bool, GatewayError> {
        let env = self.get_envelope("/api/check-cursor").await?;
        if !env.success {
            return Err(app_error(&env));
        }
        env.data
            .as_ref()
            .and_then(|d| d.get("running"))
            .and_then(|v| v.as_bool())
            .ok_or_else(|| GatewayError::MalformedResponse("missing running flag".to_string()))
    }

    async fn reset(&self, set_read_only: bool) -> Result<OperationOutcome, GatewayError> {
        let body = serde_json::json!({ "setReadOnly": set_read_only });
        let env = self.post_envelope("/api/reset", Some(body)).await?;
        outcome_from(env)
    }

    async fn kill_cursor(&self) -> Result<OperationOutcome, GatewayError> {
        let env = self.post_envelope("/api/kill-cursor", None).await?;
        outcome_from(env)
    }

    async fn generate_ids(&self) -> Result<OperationOutcome, GatewayError> {
        let env = self.post_envelope("/api/generate-ids", None).await?;
        outcome_from(env)
    }

    async fn disable_auto_update(&self) -> Result<OperationOutcome, GatewayError> {
        let env = self.post_envelope("/api/disable-autoupdate", None).await?;
        outcome_from(env)
    }

    async fn elevate(&self) -> Result<ElevationOutcome, GatewayError> {
        let env = self.post_envelope("/api/elevate", None).await?;
        if !env.success {
            return Err(app_error(&env));
        }
        Ok(ElevationOutcome {
            needs_restart: env.needs_restart,
            message: env.message,
        })
    }

    async fn health(&self) -> Result<bool, GatewayError> {
        let env = self.get_envelope("/api/health").await?;
        Ok(env.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(raw: &str) -> ApiEnvelope {
        serde_json::from_str(raw).expect("envelope parses")
    }

    #[test]
    fn privilege_demand_is_an_outcome_not_an_error() {
        let env = envelope(
            r#"{"success":false,"needsElevation":true,"elevationMessage":"Admin required"}"#,
        );
        let outcome = outcome_from(env).expect("not an error");
        assert_eq!(outcome.needs_elevation.as_deref(), Some("Admin required"));
        assert!(outcome.ids.is_none());
    }

    #[test]
    fn backend_failure_maps_to_application_error() {
        let env = envelope(r#"{"success":false,"error":"Failed to close Cursor"}"#);
        match outcome_from(env) {
            Err(GatewayError::Application(msg)) => assert_eq!(msg, "Failed to close Cursor"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn reset_success_carries_ids_and_registry_flag() {
        let env = envelope(
            r#"{
                "success": true,
                "registryModified": true,
                "data": {
                    "telemetryMachineId": "m1",
                    "telemetryMacMachineId": "m2",
                    "telemetryDevDeviceId": "d1",
                    "telemetrySqmId": "s1",
                    "lastModified": "2024-01-01T00:00:00Z"
                }
            }"#,
        );
        let outcome = outcome_from(env).expect("success");
        assert!(outcome.registry_modified);
        let ids = outcome.ids.expect("snapshot present");
        assert_eq!(ids.machine_id, "m1");
        assert_eq!(ids.last_modified.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn garbled_payload_is_a_contract_violation() {
        let env = envelope(r#"{"success":true,"data":{"telemetryMachineId":42}}"#);
        match outcome_from(env) {
            Err(GatewayError::MalformedResponse(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn disable_autoupdate_steps_pass_through() {
        let env = envelope(
            r#"{"success":true,"operations":["Removed updater directory","Created blocking file"]}"#,
        );
        let outcome = outcome_from(env).expect("success");
        assert_eq!(outcome.operations.len(), 2);
    }
}
