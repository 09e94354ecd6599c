//! Remote status synchronization.
//!
//! Owns the single authoritative [`RemoteStatus`] snapshot. Query results are
//! merged by request *start* time, per field, so a slow stale response can
//! never overwrite data produced by a later-issued request. Query failures
//! leave the held snapshot untouched: stale data beats no data.

use crate::audit::AuditSeverity;
use crate::gateway::Gateway;
use crate::model::{ClientEvent, ConfigSnapshot, RemoteStatus};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;

struct Held {
    status: RemoteStatus,
    /// Start time of the request that produced `process_running`.
    running_basis: Option<Instant>,
    /// Start time of the request that produced `config`.
    config_basis: Option<Instant>,
}

pub struct Synchronizer {
    gateway: Arc<dyn Gateway>,
    held: Mutex<Held>,
    event_tx: UnboundedSender<ClientEvent>,
}

impl Synchronizer {
    pub fn new(gateway: Arc<dyn Gateway>, event_tx: UnboundedSender<ClientEvent>) -> Self {
        Self {
            gateway,
            held: Mutex::new(Held {
                status: RemoteStatus::default(),
                running_basis: None,
                config_basis: None,
            }),
            event_tx,
        }
    }

    /// Current snapshot; read-only to everything outside this module.
    pub fn status(&self) -> RemoteStatus {
        self.lock().status.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Held> {
        // A poisoned lock only means a panicking reader; the data is sound.
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Full pull: process state and configuration snapshot, queried
    /// concurrently, merged under the newer-start-wins rule.
    pub async fn sync_all(&self) {
        let started = Instant::now();
        let (running, config) = futures::join!(
            self.gateway.process_running(),
            self.gateway.config_snapshot()
        );

        let mut changed = false;
        match running {
            Ok(running) => changed |= self.apply_running(started, running),
            Err(e) => {
                tracing::warn!(error = %e, "process status query failed");
                self.audit(AuditSeverity::Error, "Failed to check Cursor status");
            }
        }
        match config {
            Ok(config) => changed |= self.apply_config(started, config),
            Err(e) => {
                tracing::warn!(error = %e, "config query failed");
                self.audit(AuditSeverity::Error, "Failed to load configuration");
            }
        }
        if changed {
            self.emit_status();
        }
    }

    /// Light pull used by the polling loop and the reset pre-flight; only
    /// `process_running` is refreshed. Returns the running flag as known
    /// after the attempt (held value when the query fails).
    pub async fn sync_status_only(&self) -> bool {
        let started = Instant::now();
        match self.gateway.process_running().await {
            Ok(running) => {
                if self.apply_running(started, running) {
                    self.emit_status();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "process status query failed");
                self.audit(AuditSeverity::Error, "Failed to check Cursor status");
            }
        }
        self.status().process_running
    }

    /// Recurring poll; runs until the task is aborted.
    pub async fn run_poller(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; startup already did a full sync.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.sync_status_only().await;
        }
    }

    fn apply_running(&self, started: Instant, running: bool) -> bool {
        let mut held = self.lock();
        if held.running_basis.is_some_and(|basis| started <= basis) {
            return false;
        }
        held.running_basis = Some(started);
        held.status.process_running = running;
        advance(&mut held.status.last_synced_at);
        true
    }

    fn apply_config(&self, started: Instant, config: Option<ConfigSnapshot>) -> bool {
        let mut held = self.lock();
        if held.config_basis.is_some_and(|basis| started <= basis) {
            return false;
        }
        held.config_basis = Some(started);
        // Full replacement, including `None`: an absent config file is an
        // authoritative answer, unlike a failed query.
        held.status.config = config;
        advance(&mut held.status.last_synced_at);
        true
    }

    fn emit_status(&self) {
        let _ = self.event_tx.send(ClientEvent::StatusChanged {
            status: self.status(),
        });
    }

    fn audit(&self, severity: AuditSeverity, message: &str) {
        let _ = self.event_tx.send(ClientEvent::Audit {
            severity,
            message: message.to_string(),
        });
    }
}

/// `last_synced_at` only moves forward, even if the wall clock does not.
fn advance(slot: &mut Option<OffsetDateTime>) {
    let now = OffsetDateTime::now_utc();
    *slot = Some(match *slot {
        Some(prev) if prev > now => prev,
        _ => now,
    });
}
