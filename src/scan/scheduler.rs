//! Interval scheduler for automatic full scans.
//!
//! One background task: optionally fire at startup, then tick every
//! configured interval. Each scheduled scan runs to completion before the
//! next tick is waited on, so the scheduler never overlaps its own scans.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::db::libsql::LibSqlBackend;
use crate::model::ScanTrigger;
use crate::scan::cancel::CancelToken;
use crate::scan::scanner::{Scanner, ScannerDeps};

/// Spawn the scheduler loop. Returns the task handle; cancel the token to
/// stop it.
pub fn spawn_scheduler(
    repository_path: String,
    deps: ScannerDeps,
    cancel: CancelToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = deps.config.scheduler.scan_interval;
        let max_parallel = deps.config.scheduler.max_parallel_tenants;

        if deps.config.scheduler.run_on_startup {
            run_scheduled_scan(&repository_path, &deps, &cancel, max_parallel).await;
        }

        let mut ticker = tokio::time::interval(interval);
        // The immediate first tick would double the startup scan.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    run_scheduled_scan(&repository_path, &deps, &cancel, max_parallel).await;
                }
            }
        }
        tracing::info!("Scheduler stopped");
    })
}

async fn run_scheduled_scan(
    repository_path: &str,
    deps: &ScannerDeps,
    cancel: &CancelToken,
    max_parallel: usize,
) {
    if cancel.is_cancelled() {
        return;
    }
    let backend = match LibSqlBackend::new_local(std::path::Path::new(repository_path)).await {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!("Scheduler could not open repository: {}", e);
            return;
        }
    };
    let scanner = Scanner::new(Arc::new(backend), deps.clone(), cancel.child());
    match scanner
        .run_full_scan(ScanTrigger::Scheduled, None, max_parallel, false)
        .await
    {
        Ok(log) => {
            tracing::info!(
                scan_log_id = log.id,
                status = log.status.as_str(),
                "Scheduled scan finished"
            );
        }
        Err(e) => {
            tracing::error!("Scheduled scan failed: {}", e);
        }
    }
}
