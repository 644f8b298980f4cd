//! libSQL backend for the repository traits.
//!
//! An embedded SQLite-compatible database. Two modes:
//! - Local file (production default)
//! - In-memory (tests)
//!
//! Connections are short-lived: one per logical operation, created through
//! `connect()`. Concurrent store calls from different scan targets each get
//! their own connection; a single target's bulk insert runs inside one
//! BEGIN/COMMIT bracket on one connection.

mod baselines;
mod changes;
mod scan_logs;
mod snapshots;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase};

use crate::db::{libsql_migrations, Database};
use crate::error::DatabaseError;
use crate::model::{
    Baseline, BaselineObject, ChangeType, DetectedChange, Environment, ObjectKind, ScanEntry,
    ScanLog, ScanStatus, ScanTrigger, Snapshot,
};

/// Explicit column list for scan_logs (matches positional access in
/// `row_to_scan_log`). "trigger" is an SQLite keyword and stays quoted.
pub(crate) const SCAN_LOG_COLUMNS: &str = "\
    id, started_at, completed_at, status, \"trigger\", triggered_by, \
    total_tenants, total_environments, total_objects_scanned, \
    total_changes_detected, total_errors, error_summary";

/// Explicit column list for scan_entries (matches `row_to_scan_entry`).
pub(crate) const SCAN_ENTRY_COLUMNS: &str = "\
    id, scan_log_id, tenant_id, tenant_code, environment, started_at, \
    completed_at, success, objects_found, objects_new, objects_modified, \
    objects_deleted, error_message, duration_seconds";

/// Explicit column list for object_snapshots and the latest_snapshots view
/// (matches `row_to_snapshot`).
pub(crate) const SNAPSHOT_COLUMNS: &str = "\
    id, scan_log_id, tenant_id, tenant_name, tenant_code, environment, \
    full_name, schema_name, object_name, kind, definition_hash, \
    object_last_modified, snapshot_date, is_custom";

/// Explicit column list for detected_changes (matches `row_to_change`).
pub(crate) const CHANGE_COLUMNS: &str = "\
    id, scan_log_id, tenant_id, tenant_code, environment, full_name, kind, \
    change_type, previous_hash, current_hash, detected_at, notification_sent";

/// Explicit column list for baselines (matches `row_to_baseline`).
pub(crate) const BASELINE_COLUMNS: &str = "\
    id, name, description, source_tenant_id, source_tenant_name, \
    source_tenant_code, source_environment, total_objects, created_at, \
    created_by";

/// Explicit column list for baseline_objects (matches
/// `row_to_baseline_object`).
pub(crate) const BASELINE_OBJECT_COLUMNS: &str = "\
    id, baseline_id, full_name, schema_name, object_name, kind, \
    definition_hash, source_snapshot_id";

/// Embedded libSQL repository backend.
pub struct LibSqlBackend {
    db: Arc<LibSqlDatabase>,
}

impl LibSqlBackend {
    /// Open or create a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Connection(format!(
                        "Failed to create repository directory: {}",
                        e
                    ))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to open repository: {}", e))
            })?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Create an in-memory database (for testing).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory repository: {}", e))
            })?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Create a new connection.
    ///
    /// Sets `busy_timeout` so concurrent writers wait instead of failing with
    /// "database is locked", and enables foreign keys so cascade deletes
    /// actually fire.
    pub(crate) async fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {}", e)))?;
        conn.query("PRAGMA busy_timeout = 5000", ())
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to set busy_timeout: {}", e)))?;
        conn.query("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to enable foreign keys: {}", e)))?;
        Ok(conn)
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute_batch(libsql_migrations::SCHEMA)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }
}

// ==================== Helper functions ====================

/// Parse an ISO-8601 timestamp string from SQLite into DateTime<Utc>.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ndt.and_utc());
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(ndt.and_utc());
    }
    Err(format!("unparseable timestamp: {:?}", s))
}

/// Format a DateTime<Utc> for storage (RFC 3339 with microsecond precision,
/// so lexicographic TEXT ordering matches chronological ordering).
pub(crate) fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Format an optional DateTime<Utc>.
pub(crate) fn fmt_opt_ts(dt: &Option<DateTime<Utc>>) -> libsql::Value {
    match dt {
        Some(dt) => libsql::Value::Text(fmt_ts(dt)),
        None => libsql::Value::Null,
    }
}

/// Convert an `Option<&str>` to a `libsql::Value`, preserving NULL.
pub(crate) fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Extract a text column, empty string for NULL.
pub(crate) fn get_text(row: &libsql::Row, idx: i32) -> String {
    row.get::<String>(idx).unwrap_or_default()
}

/// Extract an optional text column. None for SQL NULL.
pub(crate) fn get_opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

/// Extract an i64 column, defaulting to 0.
pub(crate) fn get_i64(row: &libsql::Row, idx: i32) -> i64 {
    row.get::<i64>(idx).unwrap_or(0)
}

/// Extract an i32 column, defaulting to 0.
pub(crate) fn get_i32(row: &libsql::Row, idx: i32) -> i32 {
    row.get::<i64>(idx).unwrap_or(0) as i32
}

/// Extract a bool from an integer column.
pub(crate) fn get_bool(row: &libsql::Row, idx: i32) -> bool {
    row.get::<i64>(idx).unwrap_or(0) != 0
}

/// Extract an f64 column, defaulting to 0.
pub(crate) fn get_f64(row: &libsql::Row, idx: i32) -> f64 {
    row.get::<f64>(idx).unwrap_or(0.0)
}

/// Parse a timestamp from a text column. Logs and returns the Unix epoch on
/// parse failure so the problem is detectable rather than masked by "now".
pub(crate) fn get_ts(row: &libsql::Row, idx: i32) -> DateTime<Utc> {
    match row.get::<String>(idx) {
        Ok(s) => match parse_timestamp(&s) {
            Ok(dt) => dt,
            Err(e) => {
                tracing::warn!("Timestamp parse failure at column {}: {}", idx, e);
                DateTime::UNIX_EPOCH
            }
        },
        Err(_) => DateTime::UNIX_EPOCH,
    }
}

/// Parse an optional timestamp from a text column. None for SQL NULL.
pub(crate) fn get_opt_ts(row: &libsql::Row, idx: i32) -> Option<DateTime<Utc>> {
    match row.get::<String>(idx) {
        Ok(s) if s.is_empty() => None,
        Ok(s) => match parse_timestamp(&s) {
            Ok(dt) => Some(dt),
            Err(e) => {
                tracing::warn!("Timestamp parse failure at column {}: {}", idx, e);
                None
            }
        },
        Err(_) => None,
    }
}

pub(crate) fn parse_environment(s: &str) -> Result<Environment, DatabaseError> {
    Environment::parse(s)
        .ok_or_else(|| DatabaseError::Serialization(format!("invalid environment '{}'", s)))
}

pub(crate) fn parse_kind(s: &str) -> Result<ObjectKind, DatabaseError> {
    ObjectKind::from_code(s)
        .ok_or_else(|| DatabaseError::Serialization(format!("invalid object kind '{}'", s)))
}

pub(crate) fn parse_status(s: &str) -> Result<ScanStatus, DatabaseError> {
    ScanStatus::parse(s)
        .ok_or_else(|| DatabaseError::Serialization(format!("invalid scan status '{}'", s)))
}

pub(crate) fn parse_trigger(s: &str) -> Result<ScanTrigger, DatabaseError> {
    ScanTrigger::parse(s)
        .ok_or_else(|| DatabaseError::Serialization(format!("invalid scan trigger '{}'", s)))
}

pub(crate) fn parse_change_type(s: &str) -> Result<ChangeType, DatabaseError> {
    ChangeType::parse(s)
        .ok_or_else(|| DatabaseError::Serialization(format!("invalid change type '{}'", s)))
}

// ==================== Row converters ====================

pub(crate) fn row_to_scan_log(row: &libsql::Row) -> Result<ScanLog, DatabaseError> {
    Ok(ScanLog {
        id: get_i64(row, 0),
        started_at: get_ts(row, 1),
        completed_at: get_opt_ts(row, 2),
        status: parse_status(&get_text(row, 3))?,
        trigger: parse_trigger(&get_text(row, 4))?,
        triggered_by: get_opt_text(row, 5),
        total_tenants: get_i32(row, 6),
        total_environments: get_i32(row, 7),
        total_objects_scanned: get_i32(row, 8),
        total_changes_detected: get_i32(row, 9),
        total_errors: get_i32(row, 10),
        error_summary: get_opt_text(row, 11),
    })
}

pub(crate) fn row_to_scan_entry(row: &libsql::Row) -> Result<ScanEntry, DatabaseError> {
    Ok(ScanEntry {
        id: get_i64(row, 0),
        scan_log_id: get_i64(row, 1),
        tenant_id: get_i32(row, 2),
        tenant_code: get_text(row, 3),
        environment: parse_environment(&get_text(row, 4))?,
        started_at: get_ts(row, 5),
        completed_at: get_opt_ts(row, 6),
        success: get_bool(row, 7),
        objects_found: get_i32(row, 8),
        objects_new: get_i32(row, 9),
        objects_modified: get_i32(row, 10),
        objects_deleted: get_i32(row, 11),
        error_message: get_opt_text(row, 12),
        duration_seconds: get_f64(row, 13),
    })
}

pub(crate) fn row_to_snapshot(row: &libsql::Row) -> Result<Snapshot, DatabaseError> {
    Ok(Snapshot {
        id: get_i64(row, 0),
        scan_log_id: get_i64(row, 1),
        tenant_id: get_i32(row, 2),
        tenant_name: get_text(row, 3),
        tenant_code: get_text(row, 4),
        environment: parse_environment(&get_text(row, 5))?,
        full_name: get_text(row, 6),
        schema: get_text(row, 7),
        name: get_text(row, 8),
        kind: parse_kind(&get_text(row, 9))?,
        definition_hash: get_text(row, 10),
        object_last_modified: get_ts(row, 11),
        snapshot_date: get_ts(row, 12),
        is_custom: get_bool(row, 13),
    })
}

pub(crate) fn row_to_change(row: &libsql::Row) -> Result<DetectedChange, DatabaseError> {
    Ok(DetectedChange {
        id: get_i64(row, 0),
        scan_log_id: get_i64(row, 1),
        tenant_id: get_i32(row, 2),
        tenant_code: get_text(row, 3),
        environment: parse_environment(&get_text(row, 4))?,
        full_name: get_text(row, 5),
        kind: parse_kind(&get_text(row, 6))?,
        change_type: parse_change_type(&get_text(row, 7))?,
        previous_hash: get_opt_text(row, 8),
        current_hash: get_opt_text(row, 9),
        detected_at: get_ts(row, 10),
        notification_sent: get_bool(row, 11),
    })
}

pub(crate) fn row_to_baseline(row: &libsql::Row) -> Result<Baseline, DatabaseError> {
    Ok(Baseline {
        id: get_i64(row, 0),
        name: get_text(row, 1),
        description: get_opt_text(row, 2),
        source_tenant_id: get_i32(row, 3),
        source_tenant_name: get_text(row, 4),
        source_tenant_code: get_text(row, 5),
        source_environment: parse_environment(&get_text(row, 6))?,
        total_objects: get_i32(row, 7),
        created_at: get_ts(row, 8),
        created_by: get_opt_text(row, 9),
    })
}

pub(crate) fn row_to_baseline_object(row: &libsql::Row) -> Result<BaselineObject, DatabaseError> {
    Ok(BaselineObject {
        id: get_i64(row, 0),
        baseline_id: get_i64(row, 1),
        full_name: get_text(row, 2),
        schema: get_text(row, 3),
        name: get_text(row, 4),
        kind: parse_kind(&get_text(row, 5))?,
        definition_hash: get_text(row, 6),
        source_snapshot_id: get_i64(row, 7),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_round_trip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&fmt_ts(&now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn timestamp_parses_sqlite_datetime() {
        assert!(parse_timestamp("2026-01-15 10:30:00").is_ok());
        assert!(parse_timestamp("2026-01-15 10:30:00.123").is_ok());
        assert!(parse_timestamp("not a date").is_err());
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        backend.run_migrations().await.unwrap();
        backend.run_migrations().await.unwrap();
    }
}
