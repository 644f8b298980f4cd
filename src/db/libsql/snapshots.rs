//! Snapshot persistence: the bulk-insert path and the latest view.

use std::collections::HashMap;

use async_trait::async_trait;
use libsql::params;

use crate::db::libsql::{fmt_ts, row_to_snapshot, LibSqlBackend, SNAPSHOT_COLUMNS};
use crate::db::SnapshotStore;
use crate::error::DatabaseError;
use crate::model::{normalize_key, Environment, Snapshot};

#[async_trait]
impl SnapshotStore for LibSqlBackend {
    async fn bulk_insert_snapshots(
        &self,
        scan_log_id: i64,
        snapshots: &[Snapshot],
        definitions: &[String],
    ) -> Result<(), DatabaseError> {
        if snapshots.len() != definitions.len() {
            return Err(DatabaseError::Invariant(format!(
                "snapshot/definition length mismatch: {} snapshots, {} definitions",
                snapshots.len(),
                definitions.len()
            )));
        }
        let Some(first) = snapshots.first() else {
            return Ok(());
        };
        let tenant_id = first.tenant_id;
        let environment = first.environment;

        // One connection, one transaction: the whole target either lands or
        // rolls back.
        let conn = self.connect().await?;
        conn.execute("BEGIN", ())
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let result = insert_batch(
            &conn,
            scan_log_id,
            tenant_id,
            environment,
            snapshots,
            definitions,
        )
        .await;

        match result {
            Ok(()) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    async fn latest_snapshots(
        &self,
        tenant_id: i32,
        environment: Environment,
    ) -> Result<Vec<Snapshot>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM latest_snapshots \
                     WHERE tenant_id = ?1 AND environment = ?2 \
                     ORDER BY full_name",
                    SNAPSHOT_COLUMNS
                ),
                params![tenant_id as i64, environment.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut snapshots = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            snapshots.push(row_to_snapshot(&row)?);
        }
        Ok(snapshots)
    }

    async fn get_snapshot_definition(
        &self,
        snapshot_id: i64,
    ) -> Result<Option<String>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT definition FROM object_snapshot_definitions WHERE snapshot_id = ?1",
                params![snapshot_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            Some(row) => Ok(row.get::<String>(0).ok()),
            None => Ok(None),
        }
    }
}

/// Insert snapshots, re-query the generated ids scoped by
/// (scan_log_id, tenant_id, environment), and pair definitions by full name.
/// A definition whose snapshot id cannot be resolved is skipped.
async fn insert_batch(
    conn: &libsql::Connection,
    scan_log_id: i64,
    tenant_id: i32,
    environment: Environment,
    snapshots: &[Snapshot],
    definitions: &[String],
) -> Result<(), DatabaseError> {
    for snapshot in snapshots {
        conn.execute(
            r#"
            INSERT INTO object_snapshots (
                scan_log_id, tenant_id, tenant_name, tenant_code, environment,
                full_name, schema_name, object_name, kind, definition_hash,
                object_last_modified, snapshot_date, is_custom
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                scan_log_id,
                snapshot.tenant_id as i64,
                snapshot.tenant_name.as_str(),
                snapshot.tenant_code.as_str(),
                snapshot.environment.as_str(),
                snapshot.full_name.as_str(),
                snapshot.schema.as_str(),
                snapshot.name.as_str(),
                snapshot.kind.code(),
                snapshot.definition_hash.as_str(),
                fmt_ts(&snapshot.object_last_modified),
                fmt_ts(&snapshot.snapshot_date),
                snapshot.is_custom as i64,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    }

    // Identity join: pair generated ids with their definitions by full name.
    let mut rows = conn
        .query(
            "SELECT id, full_name FROM object_snapshots \
             WHERE scan_log_id = ?1 AND tenant_id = ?2 AND environment = ?3 \
             ORDER BY id",
            params![scan_log_id, tenant_id as i64, environment.as_str()],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

    let mut id_by_name: HashMap<String, i64> = HashMap::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?
    {
        let id = row.get::<i64>(0).unwrap_or(0);
        let full_name = row.get::<String>(1).unwrap_or_default();
        id_by_name.insert(normalize_key(&full_name), id);
    }

    for (snapshot, definition) in snapshots.iter().zip(definitions) {
        let Some(&snapshot_id) = id_by_name.get(&normalize_key(&snapshot.full_name)) else {
            tracing::warn!(
                full_name = %snapshot.full_name,
                "No snapshot id resolved for definition, skipping"
            );
            continue;
        };
        conn.execute(
            "INSERT INTO object_snapshot_definitions (snapshot_id, definition) VALUES (?1, ?2)",
            params![snapshot_id, definition.as_str()],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    }

    Ok(())
}
