//! Bounded scan request queue and its worker loop.
//!
//! User-triggered scans go through this queue; the scheduler calls the
//! orchestrator directly. Capacity is small on purpose: a full queue means
//! scans are already backed up, and the caller gets a `QueueFull` error
//! instead of a silently dropped request.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::db::libsql::LibSqlBackend;
use crate::error::ScanError;
use crate::model::{Environment, ScanLog, ScanTrigger};
use crate::scan::cancel::CancelToken;
use crate::scan::scanner::{Scanner, ScannerDeps};

/// One queued scan request.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub id: Uuid,
    /// None scans every tenant.
    pub tenant_id: Option<i32>,
    /// None scans every configured environment of the tenant(s).
    pub environment: Option<Environment>,
    pub triggered_by: Option<String>,
    pub scan_all: bool,
}

impl ScanRequest {
    pub fn full(triggered_by: Option<String>, scan_all: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: None,
            environment: None,
            triggered_by,
            scan_all,
        }
    }

    pub fn single(
        tenant_id: i32,
        environment: Option<Environment>,
        triggered_by: Option<String>,
        scan_all: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: Some(tenant_id),
            environment,
            triggered_by,
            scan_all,
        }
    }
}

/// Sending half of the scan queue.
#[derive(Debug, Clone)]
pub struct ScanQueue {
    tx: mpsc::Sender<ScanRequest>,
}

impl ScanQueue {
    /// Create a queue with the given capacity. Returns the queue handle and
    /// the receiver for the worker loop.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ScanRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a request. Fails fast when the queue is full.
    pub fn enqueue(&self, request: ScanRequest) -> Result<(), ScanError> {
        self.tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => ScanError::QueueFull,
            TrySendError::Closed(_) => ScanError::QueueClosed,
        })
    }
}

/// Consume requests until the channel closes or the token cancels.
///
/// Each request gets a fresh repository handle so nothing leaks across
/// scans; the scanner's own connections are per-operation anyway.
pub async fn run_queue_worker(
    mut rx: mpsc::Receiver<ScanRequest>,
    repository_path: String,
    deps: ScannerDeps,
    cancel: CancelToken,
) {
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        tracing::info!(request_id = %request.id, "Processing scan request");
        match process_request(&request, &repository_path, &deps, &cancel).await {
            Ok(log) => {
                tracing::info!(
                    request_id = %request.id,
                    scan_log_id = log.id,
                    status = log.status.as_str(),
                    "Scan request finished"
                );
            }
            Err(e) => {
                tracing::error!(request_id = %request.id, "Scan request failed: {}", e);
            }
        }
    }
    tracing::info!("Scan queue worker stopped");
}

async fn process_request(
    request: &ScanRequest,
    repository_path: &str,
    deps: &ScannerDeps,
    cancel: &CancelToken,
) -> Result<ScanLog, ScanError> {
    let backend = LibSqlBackend::new_local(std::path::Path::new(repository_path))
        .await
        .map_err(ScanError::Database)?;
    let scanner = Scanner::new(Arc::new(backend), deps.clone(), cancel.child());

    match request.tenant_id {
        Some(tenant_id) => {
            scanner
                .run_single_scan(
                    tenant_id,
                    request.environment,
                    ScanTrigger::OnDemand,
                    request.triggered_by.clone(),
                    request.scan_all,
                )
                .await
        }
        None => {
            scanner
                .run_full_scan(
                    ScanTrigger::OnDemand,
                    request.triggered_by.clone(),
                    deps.config.scheduler.max_parallel_tenants,
                    request.scan_all,
                )
                .await
        }
    }
}
