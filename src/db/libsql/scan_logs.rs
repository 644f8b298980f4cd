//! Scan log and scan entry persistence.

use async_trait::async_trait;
use libsql::params;

use crate::db::libsql::{
    fmt_opt_ts, fmt_ts, opt_text, row_to_scan_entry, row_to_scan_log, LibSqlBackend,
    SCAN_ENTRY_COLUMNS, SCAN_LOG_COLUMNS,
};
use crate::db::ScanLogStore;
use crate::error::DatabaseError;
use crate::model::{ScanEntry, ScanLog};

#[async_trait]
impl ScanLogStore for LibSqlBackend {
    async fn create_scan_log(&self, log: &ScanLog) -> Result<i64, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            INSERT INTO scan_logs (
                started_at, completed_at, status, "trigger", triggered_by,
                total_tenants, total_environments, total_objects_scanned,
                total_changes_detected, total_errors, error_summary
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                fmt_ts(&log.started_at),
                fmt_opt_ts(&log.completed_at),
                log.status.as_str(),
                log.trigger.as_str(),
                opt_text(log.triggered_by.as_deref()),
                log.total_tenants as i64,
                log.total_environments as i64,
                log.total_objects_scanned as i64,
                log.total_changes_detected as i64,
                log.total_errors as i64,
                opt_text(log.error_summary.as_deref()),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    async fn update_scan_log(&self, log: &ScanLog) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        let affected = conn
            .execute(
                r#"
                UPDATE scan_logs
                SET completed_at = ?2,
                    status = ?3,
                    total_tenants = ?4,
                    total_environments = ?5,
                    total_objects_scanned = ?6,
                    total_changes_detected = ?7,
                    total_errors = ?8,
                    error_summary = ?9
                WHERE id = ?1
                "#,
                params![
                    log.id,
                    fmt_opt_ts(&log.completed_at),
                    log.status.as_str(),
                    log.total_tenants as i64,
                    log.total_environments as i64,
                    log.total_objects_scanned as i64,
                    log.total_changes_detected as i64,
                    log.total_errors as i64,
                    opt_text(log.error_summary.as_deref()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound(format!("scan log {}", log.id)));
        }
        Ok(())
    }

    async fn get_scan_log(&self, id: i64) -> Result<Option<ScanLog>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM scan_logs WHERE id = ?1", SCAN_LOG_COLUMNS),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_scan_log(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_recent_scan_logs(&self, limit: u32) -> Result<Vec<ScanLog>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM scan_logs ORDER BY started_at DESC, id DESC LIMIT ?1",
                    SCAN_LOG_COLUMNS
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut logs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            logs.push(row_to_scan_log(&row)?);
        }
        Ok(logs)
    }

    async fn create_scan_entry(&self, entry: &ScanEntry) -> Result<i64, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            INSERT INTO scan_entries (
                scan_log_id, tenant_id, tenant_code, environment, started_at,
                completed_at, success, objects_found, objects_new,
                objects_modified, objects_deleted, error_message, duration_seconds
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                entry.scan_log_id,
                entry.tenant_id as i64,
                entry.tenant_code.as_str(),
                entry.environment.as_str(),
                fmt_ts(&entry.started_at),
                fmt_opt_ts(&entry.completed_at),
                entry.success as i64,
                entry.objects_found as i64,
                entry.objects_new as i64,
                entry.objects_modified as i64,
                entry.objects_deleted as i64,
                opt_text(entry.error_message.as_deref()),
                entry.duration_seconds,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    async fn update_scan_entry(&self, entry: &ScanEntry) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        let affected = conn
            .execute(
                r#"
                UPDATE scan_entries
                SET completed_at = ?2,
                    success = ?3,
                    objects_found = ?4,
                    objects_new = ?5,
                    objects_modified = ?6,
                    objects_deleted = ?7,
                    error_message = ?8,
                    duration_seconds = ?9
                WHERE id = ?1
                "#,
                params![
                    entry.id,
                    fmt_opt_ts(&entry.completed_at),
                    entry.success as i64,
                    entry.objects_found as i64,
                    entry.objects_new as i64,
                    entry.objects_modified as i64,
                    entry.objects_deleted as i64,
                    opt_text(entry.error_message.as_deref()),
                    entry.duration_seconds,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound(format!("scan entry {}", entry.id)));
        }
        Ok(())
    }

    async fn list_scan_entries(&self, scan_log_id: i64) -> Result<Vec<ScanEntry>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM scan_entries WHERE scan_log_id = ?1 ORDER BY id",
                    SCAN_ENTRY_COLUMNS
                ),
                params![scan_log_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            entries.push(row_to_scan_entry(&row)?);
        }
        Ok(entries)
    }
}
