//! Central repository: store traits and backends.
//!
//! The repository is the sole owner of the persisted analytical schema. Each
//! concern gets its own store trait; `Database` is the supertrait the rest of
//! the process depends on, so backends stay swappable and tests can run
//! against the in-memory libsql backend.

pub mod libsql;
pub mod libsql_migrations;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::model::{
    Baseline, BaselineObject, DetectedChange, Environment, ScanEntry, ScanLog, Snapshot,
};

/// Scan logs and their per-target entries.
#[async_trait]
pub trait ScanLogStore: Send + Sync {
    /// Insert a scan log and return its id.
    async fn create_scan_log(&self, log: &ScanLog) -> Result<i64, DatabaseError>;

    /// Update a scan log in place (terminal-status write).
    async fn update_scan_log(&self, log: &ScanLog) -> Result<(), DatabaseError>;

    async fn get_scan_log(&self, id: i64) -> Result<Option<ScanLog>, DatabaseError>;

    async fn list_recent_scan_logs(&self, limit: u32) -> Result<Vec<ScanLog>, DatabaseError>;

    /// Insert a scan entry and return its id.
    async fn create_scan_entry(&self, entry: &ScanEntry) -> Result<i64, DatabaseError>;

    async fn update_scan_entry(&self, entry: &ScanEntry) -> Result<(), DatabaseError>;

    async fn list_scan_entries(&self, scan_log_id: i64) -> Result<Vec<ScanEntry>, DatabaseError>;
}

/// Snapshot metadata and definition text.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert a batch of snapshots with their definitions inside one
    /// transaction. `snapshots` and `definitions` must have equal length;
    /// the i-th definition belongs to the i-th snapshot.
    async fn bulk_insert_snapshots(
        &self,
        scan_log_id: i64,
        snapshots: &[Snapshot],
        definitions: &[String],
    ) -> Result<(), DatabaseError>;

    /// For each full name of the target, the snapshot with the greatest
    /// snapshot date.
    async fn latest_snapshots(
        &self,
        tenant_id: i32,
        environment: Environment,
    ) -> Result<Vec<Snapshot>, DatabaseError>;

    async fn get_snapshot_definition(
        &self,
        snapshot_id: i64,
    ) -> Result<Option<String>, DatabaseError>;
}

/// Detected changes and their notification bookkeeping.
#[async_trait]
pub trait ChangeStore: Send + Sync {
    async fn bulk_insert_changes(&self, changes: &[DetectedChange]) -> Result<(), DatabaseError>;

    /// All changes not yet handed to the notification collaborator.
    async fn pending_notifications(&self) -> Result<Vec<DetectedChange>, DatabaseError>;

    /// Flip `notification_sent`. Ids are batched in groups of at most 1000.
    async fn mark_notifications_sent(&self, ids: &[i64]) -> Result<(), DatabaseError>;

    async fn list_changes_for_scan(
        &self,
        scan_log_id: i64,
    ) -> Result<Vec<DetectedChange>, DatabaseError>;

    async fn list_recent_changes(&self, limit: u32) -> Result<Vec<DetectedChange>, DatabaseError>;
}

/// Frozen baselines.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Insert baseline metadata and return its id. Names are unique,
    /// case-insensitive.
    async fn create_baseline(&self, baseline: &Baseline) -> Result<i64, DatabaseError>;

    /// Clone the non-custom latest snapshots of (tenant, environment) into
    /// the baseline tables and update `total_objects`. Returns the number of
    /// frozen objects.
    async fn freeze_baseline_from_latest(
        &self,
        baseline_id: i64,
        tenant_id: i32,
        environment: Environment,
    ) -> Result<u64, DatabaseError>;

    async fn list_baselines(&self) -> Result<Vec<Baseline>, DatabaseError>;

    async fn get_baseline(&self, id: i64) -> Result<Option<Baseline>, DatabaseError>;

    /// Delete a baseline; objects and definitions cascade.
    async fn delete_baseline(&self, id: i64) -> Result<(), DatabaseError>;

    async fn list_baseline_objects(
        &self,
        baseline_id: i64,
    ) -> Result<Vec<BaselineObject>, DatabaseError>;

    async fn get_baseline_object_definition(
        &self,
        object_id: i64,
    ) -> Result<Option<String>, DatabaseError>;

    /// Baseline metadata plus every object paired with its definition text.
    async fn load_baseline_with_definitions(
        &self,
        id: i64,
    ) -> Result<Option<(Baseline, Vec<(BaselineObject, String)>)>, DatabaseError>;
}

/// Unified repository interface.
#[async_trait]
pub trait Database:
    ScanLogStore + SnapshotStore + ChangeStore + BaselineStore + Send + Sync
{
    /// Create storage structures if absent. Idempotent.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;
}
