//! Baseline persistence: metadata, the freeze path and cascade deletion.

use async_trait::async_trait;
use libsql::params;

use crate::db::libsql::{
    fmt_ts, opt_text, row_to_baseline, row_to_baseline_object, LibSqlBackend, BASELINE_COLUMNS,
    BASELINE_OBJECT_COLUMNS,
};
use crate::db::BaselineStore;
use crate::error::DatabaseError;
use crate::model::{Baseline, BaselineObject, Environment};

#[async_trait]
impl BaselineStore for LibSqlBackend {
    async fn create_baseline(&self, baseline: &Baseline) -> Result<i64, DatabaseError> {
        let conn = self.connect().await?;

        // Name uniqueness is case-insensitive (COLLATE NOCASE on the column);
        // check first to report a typed error instead of a constraint string.
        let mut rows = conn
            .query(
                "SELECT 1 FROM baselines WHERE name = ?1 COLLATE NOCASE",
                params![baseline.name.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        if rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
            .is_some()
        {
            return Err(DatabaseError::DuplicateBaseline(baseline.name.clone()));
        }

        conn.execute(
            r#"
            INSERT INTO baselines (
                name, description, source_tenant_id, source_tenant_name,
                source_tenant_code, source_environment, total_objects,
                created_at, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                baseline.name.as_str(),
                opt_text(baseline.description.as_deref()),
                baseline.source_tenant_id as i64,
                baseline.source_tenant_name.as_str(),
                baseline.source_tenant_code.as_str(),
                baseline.source_environment.as_str(),
                baseline.total_objects as i64,
                fmt_ts(&baseline.created_at),
                opt_text(baseline.created_by.as_deref()),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    async fn freeze_baseline_from_latest(
        &self,
        baseline_id: i64,
        tenant_id: i32,
        environment: Environment,
    ) -> Result<u64, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute("BEGIN", ())
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let result = freeze(&conn, baseline_id, tenant_id, environment).await;

        match result {
            Ok(count) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
                Ok(count)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    async fn list_baselines(&self) -> Result<Vec<Baseline>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM baselines ORDER BY created_at DESC, id DESC",
                    BASELINE_COLUMNS
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut baselines = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            baselines.push(row_to_baseline(&row)?);
        }
        Ok(baselines)
    }

    async fn get_baseline(&self, id: i64) -> Result<Option<Baseline>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM baselines WHERE id = ?1", BASELINE_COLUMNS),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_baseline(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete_baseline(&self, id: i64) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        let affected = conn
            .execute("DELETE FROM baselines WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        if affected == 0 {
            return Err(DatabaseError::NotFound(format!("baseline {}", id)));
        }
        Ok(())
    }

    async fn list_baseline_objects(
        &self,
        baseline_id: i64,
    ) -> Result<Vec<BaselineObject>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM baseline_objects \
                     WHERE baseline_id = ?1 ORDER BY full_name",
                    BASELINE_OBJECT_COLUMNS
                ),
                params![baseline_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut objects = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            objects.push(row_to_baseline_object(&row)?);
        }
        Ok(objects)
    }

    async fn get_baseline_object_definition(
        &self,
        object_id: i64,
    ) -> Result<Option<String>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT definition FROM baseline_object_definitions \
                 WHERE baseline_object_id = ?1",
                params![object_id],
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

    async fn load_baseline_with_definitions(
        &self,
        id: i64,
    ) -> Result<Option<(Baseline, Vec<(BaselineObject, String)>)>, DatabaseError> {
        let Some(baseline) = self.get_baseline(id).await? else {
            return Ok(None);
        };

        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT bo.id, bo.baseline_id, bo.full_name, bo.schema_name,
                       bo.object_name, bo.kind, bo.definition_hash,
                       bo.source_snapshot_id, bod.definition
                FROM baseline_objects bo
                JOIN baseline_object_definitions bod ON bod.baseline_object_id = bo.id
                WHERE bo.baseline_id = ?1
                ORDER BY bo.full_name
                "#,
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut objects = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let object = row_to_baseline_object(&row)?;
            let definition = row.get::<String>(8).unwrap_or_default();
            objects.push((object, definition));
        }
        Ok(Some((baseline, objects)))
    }
}

/// Clone the non-custom latest snapshots of the target into the baseline
/// tables, then stamp the object count onto the metadata row.
async fn freeze(
    conn: &libsql::Connection,
    baseline_id: i64,
    tenant_id: i32,
    environment: Environment,
) -> Result<u64, DatabaseError> {
    let inserted = conn
        .execute(
            r#"
            INSERT INTO baseline_objects (
                baseline_id, full_name, schema_name, object_name, kind,
                definition_hash, source_snapshot_id
            )
            SELECT ?1, full_name, schema_name, object_name, kind,
                   definition_hash, id
            FROM latest_snapshots
            WHERE tenant_id = ?2 AND environment = ?3 AND is_custom = 0
            "#,
            params![baseline_id, tenant_id as i64, environment.as_str()],
        )
        .await
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

    conn.execute(
        r#"
        INSERT INTO baseline_object_definitions (baseline_object_id, definition)
        SELECT bo.id, osd.definition
        FROM baseline_objects bo
        JOIN object_snapshot_definitions osd ON osd.snapshot_id = bo.source_snapshot_id
        WHERE bo.baseline_id = ?1
        "#,
        params![baseline_id],
    )
    .await
    .map_err(|e| DatabaseError::Query(e.to_string()))?;

    conn.execute(
        "UPDATE baselines SET total_objects = ?2 WHERE id = ?1",
        params![baseline_id, inserted as i64],
    )
    .await
    .map_err(|e| DatabaseError::Query(e.to_string()))?;

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::db::{BaselineStore, Database, ScanLogStore, SnapshotStore};
    use crate::model::{
        definition_hash, Baseline, Environment, ObjectKind, ScanLog, ScanTrigger, Snapshot,
    };

    use super::LibSqlBackend;

    async fn backend() -> LibSqlBackend {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        backend.run_migrations().await.unwrap();
        backend
    }

    fn baseline(name: &str) -> Baseline {
        Baseline {
            id: 0,
            name: name.to_string(),
            description: Some("release cut".to_string()),
            source_tenant_id: 1,
            source_tenant_name: "Acme Corp".to_string(),
            source_tenant_code: "ACME".to_string(),
            source_environment: Environment::Production,
            total_objects: 0,
            created_at: Utc::now(),
            created_by: Some("ops".to_string()),
        }
    }

    fn snapshot(scan_log_id: i64, full_name: &str, definition: &str, is_custom: bool) -> Snapshot {
        let (schema, name) = full_name.split_once('.').unwrap();
        Snapshot {
            id: 0,
            scan_log_id,
            tenant_id: 1,
            tenant_name: "Acme Corp".to_string(),
            tenant_code: "ACME".to_string(),
            environment: Environment::Production,
            full_name: full_name.to_string(),
            schema: schema.to_string(),
            name: name.to_string(),
            kind: ObjectKind::Procedure,
            definition_hash: definition_hash(definition),
            object_last_modified: Utc::now(),
            snapshot_date: Utc::now(),
            is_custom,
        }
    }

    async fn seed_snapshots(db: &LibSqlBackend) {
        let scan = db
            .create_scan_log(&ScanLog::started(ScanTrigger::Manual, None))
            .await
            .unwrap();
        let snaps = vec![
            snapshot(scan, "dbo.ProcA", "SELECT 'a'", false),
            snapshot(scan, "dbo.ProcB", "SELECT 'b'", false),
            snapshot(scan, "dbo.Acme_Custom", "SELECT 'c'", true),
        ];
        let defs = vec![
            "SELECT 'a'".to_string(),
            "SELECT 'b'".to_string(),
            "SELECT 'c'".to_string(),
        ];
        db.bulk_insert_snapshots(scan, &snaps, &defs).await.unwrap();
    }

    #[tokio::test]
    async fn freeze_excludes_custom_objects() {
        let db = backend().await;
        seed_snapshots(&db).await;

        let id = db.create_baseline(&baseline("V1")).await.unwrap();
        let count = db
            .freeze_baseline_from_latest(id, 1, Environment::Production)
            .await
            .unwrap();
        assert_eq!(count, 2);

        let fetched = db.get_baseline(id).await.unwrap().unwrap();
        assert_eq!(fetched.total_objects, 2);

        let objects = db.list_baseline_objects(id).await.unwrap();
        assert_eq!(objects.len(), 2);
        assert!(objects.iter().all(|o| !o.full_name.contains("Custom")));

        let def = db
            .get_baseline_object_definition(objects[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(definition_hash(&def), objects[0].definition_hash);
    }

    #[tokio::test]
    async fn freeze_of_empty_target_returns_zero() {
        let db = backend().await;
        let id = db.create_baseline(&baseline("Empty")).await.unwrap();
        let count = db
            .freeze_baseline_from_latest(id, 1, Environment::Production)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn baseline_names_are_unique_case_insensitive() {
        let db = backend().await;
        db.create_baseline(&baseline("Release-1")).await.unwrap();
        let err = db.create_baseline(&baseline("RELEASE-1")).await.unwrap_err();
        assert!(err.to_string().contains("Release-1") || err.to_string().contains("RELEASE-1"));
    }

    #[tokio::test]
    async fn delete_cascades_to_objects_and_definitions() {
        let db = backend().await;
        seed_snapshots(&db).await;

        let id = db.create_baseline(&baseline("V1")).await.unwrap();
        db.freeze_baseline_from_latest(id, 1, Environment::Production)
            .await
            .unwrap();
        let objects = db.list_baseline_objects(id).await.unwrap();
        assert!(!objects.is_empty());
        let object_id = objects[0].id;

        db.delete_baseline(id).await.unwrap();
        assert!(db.get_baseline(id).await.unwrap().is_none());
        assert!(db.list_baseline_objects(id).await.unwrap().is_empty());
        assert!(db
            .get_baseline_object_definition(object_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn load_with_definitions_pairs_text() {
        let db = backend().await;
        seed_snapshots(&db).await;

        let id = db.create_baseline(&baseline("V1")).await.unwrap();
        db.freeze_baseline_from_latest(id, 1, Environment::Production)
            .await
            .unwrap();

        let (meta, objects) = db.load_baseline_with_definitions(id).await.unwrap().unwrap();
        assert_eq!(meta.name, "V1");
        assert_eq!(objects.len(), 2);
        for (object, definition) in &objects {
            assert_eq!(definition_hash(definition), object.definition_hash);
        }
    }
}
