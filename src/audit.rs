//! Bounded audit trail.
//!
//! Producers append entries in the order their causing events were observed;
//! the presentation layer may clear the log, which leaves a single synthetic
//! entry behind.

use std::collections::VecDeque;
use time::OffsetDateTime;

/// Oldest entries are evicted first once the log is full.
pub const AUDIT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSeverity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub at: OffsetDateTime,
    pub severity: AuditSeverity,
    pub message: String,
}

impl AuditEntry {
    /// Wall-clock label in the local timezone, `HH:MM:SS`.
    pub fn time_label(&self) -> String {
        let fmt = time::macros::format_description!("[hour]:[minute]:[second]");
        self.at.format(&fmt).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: AuditSeverity, message: impl Into<String>) {
        while self.entries.len() >= AUDIT_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(AuditEntry {
            at: now(),
            severity,
            message: message.into(),
        });
    }

    /// Drop everything and leave a single synthetic marker entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.push(AuditSeverity::Info, "Log cleared by user");
    }

    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut log = AuditLog::new();
        for i in 0..AUDIT_CAPACITY + 10 {
            log.push(AuditSeverity::Info, format!("entry {i}"));
        }
        assert_eq!(log.len(), AUDIT_CAPACITY);
        let first = log.entries().next().expect("non-empty");
        assert_eq!(first.message, "entry 10");
        let last = log.entries().last().expect("non-empty");
        assert_eq!(last.message, format!("entry {}", AUDIT_CAPACITY + 9));
    }

    #[test]
    fn clear_leaves_single_synthetic_entry() {
        let mut log = AuditLog::new();
        log.push(AuditSeverity::Success, "done");
        log.push(AuditSeverity::Error, "failed");
        log.clear();
        assert_eq!(log.len(), 1);
        let only = log.entries().next().expect("non-empty");
        assert_eq!(only.severity, AuditSeverity::Info);
        assert_eq!(only.message, "Log cleared by user");
    }

    #[test]
    fn preserves_append_order() {
        let mut log = AuditLog::new();
        log.push(AuditSeverity::Info, "a");
        log.push(AuditSeverity::Success, "b");
        log.push(AuditSeverity::Error, "c");
        let messages: Vec<_> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["a", "b", "c"]);
    }
}
