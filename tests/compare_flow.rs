//! Comparator and baseline scenarios over scanned repository data.

mod common;

use std::sync::Arc;

use common::{deps, memory_backend, object, tenant, ScriptedExtractor, TargetScript};
use modwatch::baseline::BaselineManager;
use modwatch::compare::{Comparator, ComparisonStatus};
use modwatch::model::{Environment, ProgrammableObject, ScanTrigger};
use modwatch::scan::{CancelToken, Scanner};
use modwatch::settings::Settings;

fn settings_with_tenants(tenants: Vec<modwatch::settings::TenantSettings>) -> Settings {
    let mut settings = Settings::default();
    settings.tenants = tenants;
    settings
}

async fn scan_once(
    db: Arc<modwatch::db::libsql::LibSqlBackend>,
    settings: Settings,
    extractor: ScriptedExtractor,
) {
    Scanner::new(db, deps(settings, extractor, None), CancelToken::new())
        .run_full_scan(ScanTrigger::Manual, None, 5, false)
        .await
        .unwrap();
}

/// Scenario: two targets share ten identical objects and diverge on two.
#[tokio::test]
async fn compare_reports_equal_and_modified_ordered() {
    let db = memory_backend().await;
    let settings = settings_with_tenants(vec![tenant(1, "LEFT", "left"), tenant(2, "RIGHT", "right")]);

    let shared: Vec<ProgrammableObject> = (0..10)
        .map(|i| object("dbo", &format!("Shared{:02}", i), &format!("body {}", i)))
        .collect();

    let mut left_catalog = shared.clone();
    left_catalog.push(object("dbo", "DivergedA", "left body a"));
    left_catalog.push(object("dbo", "DivergedB", "left body b"));

    let mut right_catalog = shared;
    right_catalog.push(object("dbo", "DivergedA", "right body a"));
    right_catalog.push(object("dbo", "DivergedB", "right body b"));

    let extractor = ScriptedExtractor::new()
        .with("left", TargetScript::Catalog(left_catalog))
        .with("right", TargetScript::Catalog(right_catalog));
    scan_once(db.clone(), settings, extractor).await;

    let comparator = Comparator::new(db);
    let result = comparator
        .compare(
            1,
            Environment::Production,
            2,
            Environment::Production,
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.equal, 10);
    assert_eq!(result.modified, 2);
    assert_eq!(result.only_in_source, 0);
    assert_eq!(result.only_in_target, 0);

    // Ordered by (status, full name): the modified pair leads.
    assert_eq!(result.items[0].status, ComparisonStatus::Modified);
    assert_eq!(result.items[0].full_name, "dbo.DivergedA");
    assert_eq!(result.items[1].status, ComparisonStatus::Modified);
    assert_eq!(result.items[1].full_name, "dbo.DivergedB");
    assert!(result.items[2..].iter().all(|i| i.status == ComparisonStatus::Equal));
}

/// Objects present on only one side are classified by side.
#[tokio::test]
async fn compare_reports_one_sided_objects() {
    let db = memory_backend().await;
    let settings = settings_with_tenants(vec![tenant(1, "LEFT", "left"), tenant(2, "RIGHT", "right")]);
    let extractor = ScriptedExtractor::new()
        .with(
            "left",
            TargetScript::Catalog(vec![
                object("dbo", "Everywhere", "same"),
                object("dbo", "LeftOnly", "l"),
            ]),
        )
        .with(
            "right",
            TargetScript::Catalog(vec![
                object("dbo", "Everywhere", "same"),
                object("dbo", "RightOnly", "r"),
            ]),
        );
    scan_once(db.clone(), settings, extractor).await;

    let result = Comparator::new(db)
        .compare(
            1,
            Environment::Production,
            2,
            Environment::Production,
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.equal, 1);
    assert_eq!(result.only_in_source, 1);
    assert_eq!(result.only_in_target, 1);
    assert_eq!(result.items[0].status, ComparisonStatus::OnlyInSource);
    assert_eq!(result.items[0].full_name, "dbo.LeftOnly");
}

/// Diffing two snapshot definitions counts added and removed lines.
#[tokio::test]
async fn diff_counts_lines_between_snapshots() {
    let db = memory_backend().await;
    let settings = settings_with_tenants(vec![tenant(1, "LEFT", "left"), tenant(2, "RIGHT", "right")]);
    let extractor = ScriptedExtractor::new()
        .with(
            "left",
            TargetScript::Catalog(vec![object("dbo", "P", "line one\nline two\nline three")]),
        )
        .with(
            "right",
            TargetScript::Catalog(vec![object("dbo", "P", "line one\nline 2\nline three")]),
        );
    scan_once(db.clone(), settings, extractor).await;

    let left_snapshot = &db_latest(&db, 1).await[0];
    let right_snapshot = &db_latest(&db, 2).await[0];

    let diff = Comparator::new(db.clone())
        .diff(left_snapshot.id, right_snapshot.id)
        .await
        .unwrap();
    assert_eq!(diff.removed, 1);
    assert_eq!(diff.added, 1);
    assert!(diff.rendered.contains("-line two"));
    assert!(diff.rendered.contains("+line 2"));
}

async fn db_latest(
    db: &Arc<modwatch::db::libsql::LibSqlBackend>,
    tenant_id: i32,
) -> Vec<modwatch::model::Snapshot> {
    use modwatch::db::SnapshotStore;
    db.latest_snapshots(tenant_id, Environment::Production)
        .await
        .unwrap()
}

/// Scenario: freeze a baseline of 15 objects (2 custom), compare to the
/// unchanged live target, then to a modified one.
#[tokio::test]
async fn baseline_freeze_and_compare_to_live() {
    let db = memory_backend().await;
    let settings = settings_with_tenants(vec![tenant(1, "ACME", "acme")]);

    let mut catalog: Vec<ProgrammableObject> = (0..13)
        .map(|i| object("dbo", &format!("Proc{:02}", i), &format!("body {}", i)))
        .collect();
    // Custom by convention: names carry the tenant code.
    catalog.push(object("dbo", "Acme_ReportX", "custom x"));
    catalog.push(object("dbo", "Acme_ReportY", "custom y"));

    let extractor = ScriptedExtractor::new().with("acme", TargetScript::Catalog(catalog.clone()));
    scan_once(db.clone(), settings.clone(), extractor).await;

    let manager = BaselineManager::new(db.clone(), Arc::new(settings.clone()));
    let (baseline_id, count) = manager
        .create("V1", None, Some("ops".to_string()), 1, Environment::Production)
        .await
        .unwrap();
    assert_eq!(count, 13);

    let meta = manager.get(baseline_id).await.unwrap().unwrap();
    assert_eq!(meta.total_objects, 13);

    // Unchanged target: everything equal.
    let result = manager.compare_to_live(baseline_id).await.unwrap();
    assert_eq!(result.equal, 13);
    assert!(result.is_in_sync());

    // Modify one object and rescan.
    let mut changed = catalog;
    changed[0].definition = "body 0 changed".to_string();
    let extractor = ScriptedExtractor::new().with("acme", TargetScript::Catalog(changed));
    scan_once(db.clone(), settings, extractor).await;

    let result = manager.compare_to_live(baseline_id).await.unwrap();
    assert_eq!(result.equal, 12);
    assert_eq!(result.modified, 1);
    assert_eq!(result.items[0].full_name, "dbo.Proc00");
    assert_eq!(result.items[0].status, ComparisonStatus::Modified);
}

/// Creating a baseline of a target with no snapshots rolls back.
#[tokio::test]
async fn baseline_of_empty_target_is_rejected() {
    let db = memory_backend().await;
    let settings = settings_with_tenants(vec![tenant(1, "ACME", "acme")]);
    let manager = BaselineManager::new(db, Arc::new(settings));

    let err = manager
        .create("Empty", None, None, 1, Environment::Production)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("run a scan first"));
    assert!(manager.list().await.unwrap().is_empty());
}

/// Baseline content stays frozen while live keeps moving.
#[tokio::test]
async fn baseline_is_immutable_across_rescans() {
    let db = memory_backend().await;
    let settings = settings_with_tenants(vec![tenant(1, "ACME", "acme")]);

    let extractor = ScriptedExtractor::new().with(
        "acme",
        TargetScript::Catalog(vec![object("dbo", "P", "v1")]),
    );
    scan_once(db.clone(), settings.clone(), extractor).await;

    let manager = BaselineManager::new(db.clone(), Arc::new(settings.clone()));
    let (baseline_id, _) = manager
        .create("Frozen", None, None, 1, Environment::Production)
        .await
        .unwrap();
    let before = manager.objects(baseline_id).await.unwrap();

    let extractor = ScriptedExtractor::new().with(
        "acme",
        TargetScript::Catalog(vec![object("dbo", "P", "v2")]),
    );
    scan_once(db.clone(), settings, extractor).await;

    let after = manager.objects(baseline_id).await.unwrap();
    assert_eq!(before.len(), after.len());
    assert_eq!(before[0].definition_hash, after[0].definition_hash);

    // And the drift is visible in the comparison.
    let result = manager.compare_to_live(baseline_id).await.unwrap();
    assert_eq!(result.modified, 1);
}
