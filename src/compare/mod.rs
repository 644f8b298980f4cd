//! Cross-target comparison over repository data.
//!
//! The comparator never touches a source database: it reads the latest
//! snapshot views (or an in-memory map, for baseline comparisons) and
//! classifies every full name as equal, modified, or present on one side
//! only. Results are ordered by (status, full name).

mod diff;

pub use diff::{line_diff, LineDiff};

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::COMPARE_DEADLINE;
use crate::db::Database;
use crate::error::DatabaseError;
use crate::model::{
    normalize_definition, normalize_key, Environment, ObjectKind, ScanTrigger, Snapshot,
};
use crate::scan::Scanner;

/// Classification of one full name across the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    OnlyInSource,
    OnlyInTarget,
    Modified,
    Equal,
}

impl ComparisonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonStatus::OnlyInSource => "OnlyInSource",
            ComparisonStatus::OnlyInTarget => "OnlyInTarget",
            ComparisonStatus::Modified => "Modified",
            ComparisonStatus::Equal => "Equal",
        }
    }
}

/// One side of a comparison: an object's identity and its definition hash.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    pub full_name: String,
    pub kind: ObjectKind,
    pub definition_hash: String,
    /// Present when the side comes from live snapshots; used for diffing.
    pub snapshot_id: Option<i64>,
}

impl ObjectRef {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            full_name: snapshot.full_name.clone(),
            kind: snapshot.kind,
            definition_hash: snapshot.definition_hash.clone(),
            snapshot_id: Some(snapshot.id),
        }
    }
}

/// One compared full name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonItem {
    pub full_name: String,
    pub kind: ObjectKind,
    pub status: ComparisonStatus,
    pub source_hash: Option<String>,
    pub target_hash: Option<String>,
    pub source_snapshot_id: Option<i64>,
    pub target_snapshot_id: Option<i64>,
}

/// Full comparison result with per-status tallies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub items: Vec<ComparisonItem>,
    pub equal: usize,
    pub modified: usize,
    pub only_in_source: usize,
    pub only_in_target: usize,
}

impl ComparisonResult {
    pub fn is_in_sync(&self) -> bool {
        self.modified == 0 && self.only_in_source == 0 && self.only_in_target == 0
    }
}

/// Pure comparison over two sides.
///
/// Target entries that are custom (in `custom_keys`, or whose name contains
/// `tenant_code` when provided) are excluded: custom objects are never part
/// of divergence reporting. `kind_filter` restricts emitted items to one
/// object kind.
pub fn compare_sets(
    source: &[ObjectRef],
    target: &[ObjectRef],
    custom_keys: &HashSet<String>,
    tenant_code: Option<&str>,
    kind_filter: Option<ObjectKind>,
) -> ComparisonResult {
    let is_custom = |object: &ObjectRef| {
        let key = normalize_key(&object.full_name);
        if custom_keys.contains(&key) {
            return true;
        }
        match tenant_code {
            Some(code) if !code.is_empty() => {
                let name = object
                    .full_name
                    .rsplit('.')
                    .next()
                    .unwrap_or(&object.full_name);
                name.to_ascii_lowercase()
                    .contains(&code.to_ascii_lowercase())
            }
            _ => false,
        }
    };

    let mut source_by_key: HashMap<String, &ObjectRef> = HashMap::new();
    for object in source {
        source_by_key
            .entry(normalize_key(&object.full_name))
            .or_insert(object);
    }
    let mut target_by_key: HashMap<String, &ObjectRef> = HashMap::new();
    for object in target {
        if is_custom(object) {
            continue;
        }
        target_by_key
            .entry(normalize_key(&object.full_name))
            .or_insert(object);
    }

    let mut result = ComparisonResult::default();

    for (key, src) in &source_by_key {
        if kind_filter.is_some_and(|kind| src.kind != kind) {
            continue;
        }
        let item = match target_by_key.get(key) {
            Some(tgt) if tgt.definition_hash == src.definition_hash => ComparisonItem {
                full_name: src.full_name.clone(),
                kind: src.kind,
                status: ComparisonStatus::Equal,
                source_hash: Some(src.definition_hash.clone()),
                target_hash: Some(tgt.definition_hash.clone()),
                source_snapshot_id: src.snapshot_id,
                target_snapshot_id: tgt.snapshot_id,
            },
            Some(tgt) => ComparisonItem {
                full_name: src.full_name.clone(),
                kind: src.kind,
                status: ComparisonStatus::Modified,
                source_hash: Some(src.definition_hash.clone()),
                target_hash: Some(tgt.definition_hash.clone()),
                source_snapshot_id: src.snapshot_id,
                target_snapshot_id: tgt.snapshot_id,
            },
            None => ComparisonItem {
                full_name: src.full_name.clone(),
                kind: src.kind,
                status: ComparisonStatus::OnlyInSource,
                source_hash: Some(src.definition_hash.clone()),
                target_hash: None,
                source_snapshot_id: src.snapshot_id,
                target_snapshot_id: None,
            },
        };
        result.items.push(item);
    }

    for (key, tgt) in &target_by_key {
        if source_by_key.contains_key(key) {
            continue;
        }
        if kind_filter.is_some_and(|kind| tgt.kind != kind) {
            continue;
        }
        result.items.push(ComparisonItem {
            full_name: tgt.full_name.clone(),
            kind: tgt.kind,
            status: ComparisonStatus::OnlyInTarget,
            source_hash: None,
            target_hash: Some(tgt.definition_hash.clone()),
            source_snapshot_id: None,
            target_snapshot_id: tgt.snapshot_id,
        });
    }

    result.items.sort_by(|a, b| {
        a.status
            .cmp(&b.status)
            .then_with(|| normalize_key(&a.full_name).cmp(&normalize_key(&b.full_name)))
    });

    for item in &result.items {
        match item.status {
            ComparisonStatus::Equal => result.equal += 1,
            ComparisonStatus::Modified => result.modified += 1,
            ComparisonStatus::OnlyInSource => result.only_in_source += 1,
            ComparisonStatus::OnlyInTarget => result.only_in_target += 1,
        }
    }

    result
}

/// Comparator over repository data.
pub struct Comparator {
    db: Arc<dyn Database>,
}

impl Comparator {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Compare the latest snapshots of two targets. Custom snapshots on
    /// either side are excluded. Runs under the interactive deadline.
    pub async fn compare(
        &self,
        tenant_a: i32,
        env_a: Environment,
        tenant_b: i32,
        env_b: Environment,
        kind_filter: Option<ObjectKind>,
    ) -> Result<ComparisonResult, DatabaseError> {
        tokio::time::timeout(
            COMPARE_DEADLINE,
            self.compare_inner(tenant_a, env_a, tenant_b, env_b, kind_filter),
        )
        .await
        .map_err(|_| {
            DatabaseError::Query(format!(
                "Compare timed out after {} seconds",
                COMPARE_DEADLINE.as_secs()
            ))
        })?
    }

    async fn compare_inner(
        &self,
        tenant_a: i32,
        env_a: Environment,
        tenant_b: i32,
        env_b: Environment,
        kind_filter: Option<ObjectKind>,
    ) -> Result<ComparisonResult, DatabaseError> {
        let side_a = self.latest_refs(tenant_a, env_a).await?;
        let side_b = self.latest_refs(tenant_b, env_b).await?;
        Ok(compare_sets(
            &side_a,
            &side_b,
            &HashSet::new(),
            None,
            kind_filter,
        ))
    }

    /// Best-effort refresh of both sides through a synthetic Compare-trigger
    /// scan, then the comparison. A refresh failure is logged and the
    /// compare proceeds from existing repository data.
    pub async fn compare_with_refresh(
        &self,
        scanner: &Scanner,
        tenant_a: i32,
        env_a: Environment,
        tenant_b: i32,
        env_b: Environment,
        kind_filter: Option<ObjectKind>,
    ) -> Result<ComparisonResult, DatabaseError> {
        for (tenant, env) in [(tenant_a, env_a), (tenant_b, env_b)] {
            if let Err(e) = scanner
                .run_single_scan(tenant, Some(env), ScanTrigger::Compare, None, false)
                .await
            {
                tracing::warn!(
                    tenant_id = tenant,
                    environment = %env,
                    "Compare-triggered refresh failed: {}",
                    e
                );
            }
        }
        self.compare(tenant_a, env_a, tenant_b, env_b, kind_filter)
            .await
    }

    /// Line diff between two snapshot definitions. Definitions are
    /// normalized before diffing.
    pub async fn diff(
        &self,
        snapshot_id_a: i64,
        snapshot_id_b: i64,
    ) -> Result<LineDiff, DatabaseError> {
        let a = self
            .db
            .get_snapshot_definition(snapshot_id_a)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("snapshot {}", snapshot_id_a)))?;
        let b = self
            .db
            .get_snapshot_definition(snapshot_id_b)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("snapshot {}", snapshot_id_b)))?;
        Ok(line_diff(
            &normalize_definition(&a),
            &normalize_definition(&b),
        ))
    }

    async fn latest_refs(
        &self,
        tenant_id: i32,
        environment: Environment,
    ) -> Result<Vec<ObjectRef>, DatabaseError> {
        let snapshots = self.db.latest_snapshots(tenant_id, environment).await?;
        Ok(snapshots
            .iter()
            .filter(|s| !s.is_custom)
            .map(ObjectRef::from_snapshot)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(full_name: &str, hash: &str) -> ObjectRef {
        ObjectRef {
            full_name: full_name.to_string(),
            kind: ObjectKind::Procedure,
            definition_hash: hash.to_string(),
            snapshot_id: None,
        }
    }

    #[test]
    fn classifies_all_four_statuses() {
        let source = vec![
            object("dbo.Equal", "h1"),
            object("dbo.Changed", "h2"),
            object("dbo.SourceOnly", "h3"),
        ];
        let target = vec![
            object("dbo.Equal", "h1"),
            object("dbo.Changed", "h9"),
            object("dbo.TargetOnly", "h4"),
        ];

        let result = compare_sets(&source, &target, &HashSet::new(), None, None);
        assert_eq!(result.equal, 1);
        assert_eq!(result.modified, 1);
        assert_eq!(result.only_in_source, 1);
        assert_eq!(result.only_in_target, 1);
        assert!(!result.is_in_sync());
    }

    #[test]
    fn items_are_ordered_by_status_then_name() {
        let source = vec![
            object("dbo.B_Equal", "h"),
            object("dbo.A_Equal", "h"),
            object("dbo.Z_Gone", "h1"),
        ];
        let target = vec![object("dbo.B_Equal", "h"), object("dbo.A_Equal", "h")];

        let result = compare_sets(&source, &target, &HashSet::new(), None, None);
        let names: Vec<&str> = result.items.iter().map(|i| i.full_name.as_str()).collect();
        assert_eq!(names, vec!["dbo.Z_Gone", "dbo.A_Equal", "dbo.B_Equal"]);
        assert_eq!(result.items[0].status, ComparisonStatus::OnlyInSource);
    }

    #[test]
    fn name_matching_is_case_insensitive() {
        let source = vec![object("dbo.GetOrders", "h1")];
        let target = vec![object("DBO.GETORDERS", "h1")];
        let result = compare_sets(&source, &target, &HashSet::new(), None, None);
        assert_eq!(result.equal, 1);
        assert!(result.is_in_sync());
    }

    #[test]
    fn kind_filter_restricts_output() {
        let source = vec![
            ObjectRef {
                full_name: "dbo.AView".to_string(),
                kind: ObjectKind::View,
                definition_hash: "h1".to_string(),
                snapshot_id: None,
            },
            object("dbo.AProc", "h2"),
        ];
        let result = compare_sets(&source, &[], &HashSet::new(), None, Some(ObjectKind::View));
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].full_name, "dbo.AView");
    }

    #[test]
    fn custom_target_entries_are_excluded() {
        let source = vec![object("dbo.Shared", "h1")];
        let target = vec![
            object("dbo.Shared", "h1"),
            object("dbo.Acme_Report", "h2"),
            object("dbo.Registered", "h3"),
        ];
        let mut custom = HashSet::new();
        custom.insert(normalize_key("dbo.Registered"));

        let result = compare_sets(&source, &target, &custom, Some("ACME"), None);
        assert_eq!(result.equal, 1);
        assert_eq!(result.only_in_target, 0);
    }
}
