//! Baseline management: freeze, enumerate, compare.
//!
//! A baseline is an immutable named copy of one target's non-custom latest
//! snapshots. Creation is freeze-or-nothing: a target with no snapshots
//! rolls the metadata row back and reports an error instead of leaving an
//! empty baseline behind.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::compare::{compare_sets, ComparisonResult, ObjectRef};
use crate::db::Database;
use crate::error::{DatabaseError, Error};
use crate::model::{normalize_key, Baseline, BaselineObject, Environment};
use crate::settings::Settings;

/// Creates and serves baselines on top of the repository.
pub struct BaselineManager {
    db: Arc<dyn Database>,
    settings: Arc<Settings>,
}

impl BaselineManager {
    pub fn new(db: Arc<dyn Database>, settings: Arc<Settings>) -> Self {
        Self { db, settings }
    }

    /// Freeze the latest non-custom snapshots of (tenant, environment) into
    /// a new named baseline. Returns the baseline id and its object count.
    pub async fn create(
        &self,
        name: &str,
        description: Option<String>,
        created_by: Option<String>,
        tenant_id: i32,
        environment: Environment,
    ) -> Result<(i64, u64), Error> {
        let tenant = self.settings.tenant(tenant_id)?;

        let baseline = Baseline {
            id: 0,
            name: name.to_string(),
            description,
            source_tenant_id: tenant.id,
            source_tenant_name: tenant.name.clone(),
            source_tenant_code: tenant.code.clone(),
            source_environment: environment,
            total_objects: 0,
            created_at: Utc::now(),
            created_by,
        };

        let baseline_id = self.db.create_baseline(&baseline).await?;
        let count = match self
            .db
            .freeze_baseline_from_latest(baseline_id, tenant_id, environment)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                // Do not leave a metadata row without content behind.
                let _ = self.db.delete_baseline(baseline_id).await;
                return Err(e.into());
            }
        };

        if count == 0 {
            self.db.delete_baseline(baseline_id).await?;
            return Err(DatabaseError::NotFound(format!(
                "no snapshots for {}/{}; run a scan first",
                tenant.code, environment
            ))
            .into());
        }

        tracing::info!(
            baseline_id,
            name = %name,
            objects = count,
            "Baseline frozen"
        );
        Ok((baseline_id, count))
    }

    pub async fn list(&self) -> Result<Vec<Baseline>, DatabaseError> {
        self.db.list_baselines().await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Baseline>, DatabaseError> {
        self.db.get_baseline(id).await
    }

    pub async fn objects(&self, id: i64) -> Result<Vec<BaselineObject>, DatabaseError> {
        self.db.list_baseline_objects(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        self.db.delete_baseline(id).await
    }

    /// Compare a baseline (source side) against the live latest snapshots of
    /// its own source target.
    pub async fn compare_to_live(&self, baseline_id: i64) -> Result<ComparisonResult, Error> {
        let baseline = self
            .db
            .get_baseline(baseline_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("baseline {}", baseline_id)))?;
        self.compare_to_target(
            baseline_id,
            baseline.source_tenant_id,
            baseline.source_environment,
        )
        .await
    }

    /// Compare a baseline against any live target.
    pub async fn compare_to_target(
        &self,
        baseline_id: i64,
        tenant_id: i32,
        environment: Environment,
    ) -> Result<ComparisonResult, Error> {
        let objects = self.db.list_baseline_objects(baseline_id).await?;
        if objects.is_empty() && self.db.get_baseline(baseline_id).await?.is_none() {
            return Err(DatabaseError::NotFound(format!("baseline {}", baseline_id)).into());
        }

        let source: Vec<ObjectRef> = objects
            .iter()
            .map(|object| ObjectRef {
                full_name: object.full_name.clone(),
                kind: object.kind,
                definition_hash: object.definition_hash.clone(),
                snapshot_id: Some(object.source_snapshot_id),
            })
            .collect();

        let live = self.db.latest_snapshots(tenant_id, environment).await?;
        let target: Vec<ObjectRef> = live
            .iter()
            .filter(|s| !s.is_custom)
            .map(ObjectRef::from_snapshot)
            .collect();

        // The live side still gets the registry and convention guards; a
        // custom object that slipped into history must not read as drift.
        let tenant_code = self
            .settings
            .tenant(tenant_id)
            .ok()
            .map(|tenant| tenant.code.clone());
        let custom_keys: HashSet<String> = self
            .settings
            .custom_objects
            .iter()
            .filter(|entry| {
                tenant_code
                    .as_deref()
                    .is_some_and(|code| entry.tenant_code.eq_ignore_ascii_case(code))
            })
            .map(|entry| normalize_key(&entry.full_name))
            .collect();

        Ok(compare_sets(
            &source,
            &target,
            &custom_keys,
            tenant_code.as_deref(),
            None,
        ))
    }

    pub async fn object_definition(
        &self,
        object_id: i64,
    ) -> Result<Option<String>, DatabaseError> {
        self.db.get_baseline_object_definition(object_id).await
    }

    /// Baseline metadata plus every object paired with its definition text.
    pub async fn load_with_definitions(
        &self,
        id: i64,
    ) -> Result<Option<(Baseline, Vec<(BaselineObject, String)>)>, DatabaseError> {
        self.db.load_baseline_with_definitions(id).await
    }
}
