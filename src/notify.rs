//! Scan completion notification contract.
//!
//! The orchestrator calls the notifier exactly once per scan, after the
//! terminal status is decided. Delivery failures are logged and swallowed;
//! a scan never fails because of its notification, and the core never
//! retries delivery.

use async_trait::async_trait;

use crate::model::{DetectedChange, ScanEntry, ScanLog};

/// Receives the aggregated result of one scan.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        log: &ScanLog,
        entries: &[ScanEntry],
        pending_changes: &[DetectedChange],
    ) -> Result<(), String>;
}

/// Default notifier: structured log lines, nothing external.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(
        &self,
        log: &ScanLog,
        entries: &[ScanEntry],
        pending_changes: &[DetectedChange],
    ) -> Result<(), String> {
        tracing::info!(
            scan_log_id = log.id,
            status = log.status.as_str(),
            targets = entries.len(),
            objects = log.total_objects_scanned,
            changes = log.total_changes_detected,
            errors = log.total_errors,
            pending_notifications = pending_changes.len(),
            "Scan finished"
        );
        for change in pending_changes {
            tracing::info!(
                tenant = %change.tenant_code,
                environment = %change.environment,
                object = %change.full_name,
                change = change.change_type.as_str(),
                "Pending change"
            );
        }
        Ok(())
    }
}
