//! Detected change persistence and notification bookkeeping.

use async_trait::async_trait;
use libsql::{params, params_from_iter};

use crate::db::libsql::{fmt_ts, opt_text, row_to_change, LibSqlBackend, CHANGE_COLUMNS};
use crate::db::ChangeStore;
use crate::error::DatabaseError;
use crate::model::DetectedChange;

/// Cap on the number of ids in one `UPDATE ... WHERE id IN (...)`.
const MARK_SENT_BATCH: usize = 1000;

#[async_trait]
impl ChangeStore for LibSqlBackend {
    async fn bulk_insert_changes(&self, changes: &[DetectedChange]) -> Result<(), DatabaseError> {
        if changes.is_empty() {
            return Ok(());
        }

        let conn = self.connect().await?;
        conn.execute("BEGIN", ())
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        for change in changes {
            let result = conn
                .execute(
                    r#"
                    INSERT INTO detected_changes (
                        scan_log_id, tenant_id, tenant_code, environment,
                        full_name, kind, change_type, previous_hash,
                        current_hash, detected_at, notification_sent
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)
                    "#,
                    params![
                        change.scan_log_id,
                        change.tenant_id as i64,
                        change.tenant_code.as_str(),
                        change.environment.as_str(),
                        change.full_name.as_str(),
                        change.kind.code(),
                        change.change_type.as_str(),
                        opt_text(change.previous_hash.as_deref()),
                        opt_text(change.current_hash.as_deref()),
                        fmt_ts(&change.detected_at),
                    ],
                )
                .await;

            if let Err(e) = result {
                let _ = conn.execute("ROLLBACK", ()).await;
                return Err(DatabaseError::Query(e.to_string()));
            }
        }

        conn.execute("COMMIT", ())
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn pending_notifications(&self) -> Result<Vec<DetectedChange>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM detected_changes \
                     WHERE notification_sent = 0 \
                     ORDER BY detected_at, id",
                    CHANGE_COLUMNS
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut changes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            changes.push(row_to_change(&row)?);
        }
        Ok(changes)
    }

    async fn mark_notifications_sent(&self, ids: &[i64]) -> Result<(), DatabaseError> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.connect().await?;
        for chunk in ids.chunks(MARK_SENT_BATCH) {
            let placeholders = (1..=chunk.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE detected_changes SET notification_sent = 1 WHERE id IN ({})",
                placeholders
            );
            conn.execute(&sql, params_from_iter(chunk.iter().copied()))
                .await
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
        }
        Ok(())
    }

    async fn list_changes_for_scan(
        &self,
        scan_log_id: i64,
    ) -> Result<Vec<DetectedChange>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM detected_changes \
                     WHERE scan_log_id = ?1 \
                     ORDER BY tenant_id, environment, full_name",
                    CHANGE_COLUMNS
                ),
                params![scan_log_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut changes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            changes.push(row_to_change(&row)?);
        }
        Ok(changes)
    }

    async fn list_recent_changes(&self, limit: u32) -> Result<Vec<DetectedChange>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM detected_changes \
                     ORDER BY detected_at DESC, id DESC LIMIT ?1",
                    CHANGE_COLUMNS
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut changes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            changes.push(row_to_change(&row)?);
        }
        Ok(changes)
    }
}
