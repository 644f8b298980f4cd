//! Scan orchestration.
//!
//! Fans extraction out over (tenant, environment) targets with bounded
//! parallelism, a hard per-target deadline and partial-failure accounting.
//! Tenants run concurrently up to the semaphore cap; within one tenant,
//! environments run sequentially so a single target's resources stay
//! bounded. Target failures never escape the target: they are recorded on
//! the scan entry, counted, and the scan moves on.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::Database;
use crate::error::{single_line, ScanError};
use crate::extract::{ConnectionSpec, Extractor};
use crate::model::{
    normalize_key, Environment, ScanEntry, ScanLog, ScanStatus, ScanTrigger, Snapshot, Target,
};
use crate::notify::Notifier;
use crate::scan::cancel::CancelToken;
use crate::scan::detector::detect_changes;
use crate::secrets::SecretCipher;
use crate::settings::{ConnectionSettings, Settings, TenantSettings};

/// The error summary keeps at most this many target error lines.
const MAX_ERROR_SUMMARY_LINES: usize = 20;

/// Shared dependencies, cloned into every scan.
#[derive(Clone)]
pub struct ScannerDeps {
    pub settings: Arc<Settings>,
    pub config: Arc<Config>,
    pub extractor: Arc<dyn Extractor>,
    pub cipher: Arc<dyn SecretCipher>,
    pub notifier: Arc<dyn Notifier>,
}

/// Drives full and single scans against the repository.
pub struct Scanner {
    db: Arc<dyn Database>,
    deps: ScannerDeps,
    cancel: CancelToken,
}

#[derive(Default)]
struct ScanTotals {
    objects: AtomicI64,
    changes: AtomicI64,
    errors: AtomicI64,
    successes: AtomicI64,
}

#[derive(Debug, Default, Clone)]
struct TargetCounts {
    found: i32,
    new: i32,
    modified: i32,
    deleted: i32,
}

impl Scanner {
    pub fn new(db: Arc<dyn Database>, deps: ScannerDeps, cancel: CancelToken) -> Self {
        Self { db, deps, cancel }
    }

    /// Scan every configured tenant and environment.
    pub async fn run_full_scan(
        &self,
        trigger: ScanTrigger,
        triggered_by: Option<String>,
        max_parallel_tenants: usize,
        scan_all: bool,
    ) -> Result<ScanLog, ScanError> {
        let tenants: Vec<TenantSettings> = self.deps.settings.tenants.clone();
        self.run_scan(tenants, None, trigger, triggered_by, max_parallel_tenants, scan_all)
            .await
    }

    /// Scan one tenant, optionally restricted to one environment.
    pub async fn run_single_scan(
        &self,
        tenant_id: i32,
        environment: Option<Environment>,
        trigger: ScanTrigger,
        triggered_by: Option<String>,
        scan_all: bool,
    ) -> Result<ScanLog, ScanError> {
        let tenant = self.deps.settings.tenant(tenant_id)?.clone();
        self.run_scan(vec![tenant], environment, trigger, triggered_by, 1, scan_all)
            .await
    }

    async fn run_scan(
        &self,
        tenants: Vec<TenantSettings>,
        environment: Option<Environment>,
        trigger: ScanTrigger,
        triggered_by: Option<String>,
        max_parallel_tenants: usize,
        scan_all: bool,
    ) -> Result<ScanLog, ScanError> {
        let mut log = ScanLog::started(trigger, triggered_by);

        // Scope: one entry of work per configured (tenant, environment).
        let scoped: Vec<(TenantSettings, Vec<Environment>)> = tenants
            .into_iter()
            .map(|tenant| {
                let envs = match environment {
                    Some(env) => {
                        if tenant.connection(env).is_some() {
                            vec![env]
                        } else {
                            Vec::new()
                        }
                    }
                    None => tenant.configured_environments(),
                };
                (tenant, envs)
            })
            .collect();

        log.total_tenants = scoped.len() as i32;
        log.total_environments = scoped.iter().map(|(_, envs)| envs.len() as i32).sum();

        // Failure to create the scan log is fatal for this scan.
        log.id = self.db.create_scan_log(&log).await?;
        tracing::info!(
            scan_log_id = log.id,
            trigger = log.trigger.as_str(),
            tenants = log.total_tenants,
            targets = log.total_environments,
            "Scan started"
        );

        let semaphore = Arc::new(Semaphore::new(max_parallel_tenants.max(1)));
        let totals = Arc::new(ScanTotals::default());
        let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        for (tenant, envs) in scoped {
            if envs.is_empty() {
                continue;
            }
            let base_filter = base_filter_for(&self.deps.settings, &tenant, scan_all);
            let db = Arc::clone(&self.db);
            let deps = self.deps.clone();
            let cancel = self.cancel.clone();
            let semaphore = Arc::clone(&semaphore);
            let totals = Arc::clone(&totals);
            let errors = Arc::clone(&errors);
            let scan_log_id = log.id;

            // Admission happens here: a tenant that has not yet been granted
            // a permit is never started once cancellation fires, and tenants
            // start in configuration order.
            let permit = tokio::select! {
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = self.cancel.cancelled() => break,
            };

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                scan_tenant(
                    db, deps, cancel, scan_log_id, tenant, envs, base_filter, totals, errors,
                )
                .await;
            }));
        }

        // Scatter-gather join: totals are read only after every target is
        // done.
        for handle in handles {
            let _ = handle.await;
        }

        log.completed_at = Some(Utc::now());
        log.total_objects_scanned = totals.objects.load(Ordering::Relaxed) as i32;
        log.total_changes_detected = totals.changes.load(Ordering::Relaxed) as i32;
        log.total_errors = totals.errors.load(Ordering::Relaxed) as i32;
        let successes = totals.successes.load(Ordering::Relaxed);

        if self.cancel.is_cancelled() {
            log.status = ScanStatus::Failed;
            log.error_summary = Some("Cancelled".to_string());
        } else {
            let error_lines = errors.lock().expect("error accumulator poisoned");
            if !error_lines.is_empty() {
                log.error_summary = Some(
                    error_lines
                        .iter()
                        .take(MAX_ERROR_SUMMARY_LINES)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join("\n"),
                );
            }
            log.status = if log.total_errors == 0 {
                ScanStatus::Completed
            } else if successes > 0 {
                ScanStatus::CompletedWithErrors
            } else {
                ScanStatus::Failed
            };
        }

        // Even if this update fails, the returned in-memory log reflects the
        // final state.
        if let Err(e) = self.db.update_scan_log(&log).await {
            tracing::error!(scan_log_id = log.id, "Failed to persist final scan log: {}", e);
        }

        self.dispatch_notification(&log).await;

        tracing::info!(
            scan_log_id = log.id,
            status = log.status.as_str(),
            objects = log.total_objects_scanned,
            changes = log.total_changes_detected,
            errors = log.total_errors,
            "Scan finished"
        );
        Ok(log)
    }

    /// Hand the aggregated result to the notification collaborator. Never
    /// retried, never fails the scan.
    async fn dispatch_notification(&self, log: &ScanLog) {
        let entries = match self.db.list_scan_entries(log.id).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Could not load scan entries for notification: {}", e);
                Vec::new()
            }
        };
        let pending = match self.db.pending_notifications().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!("Could not load pending changes for notification: {}", e);
                Vec::new()
            }
        };
        if let Err(e) = self.deps.notifier.notify(log, &entries, &pending).await {
            tracing::warn!(scan_log_id = log.id, "Notification delivery failed: {}", e);
        }
    }
}

/// Per-tenant base filter: None means scan everything. Otherwise the union
/// of global entries and entries naming this tenant, case-insensitive.
fn base_filter_for(
    settings: &Settings,
    tenant: &TenantSettings,
    scan_all: bool,
) -> Option<HashSet<String>> {
    if scan_all || settings.tracked_objects.is_empty() {
        return None;
    }
    Some(
        settings
            .tracked_objects
            .iter()
            .filter(|entry| {
                entry
                    .tenant_code
                    .as_deref()
                    .map_or(true, |code| code.eq_ignore_ascii_case(&tenant.code))
            })
            .map(|entry| normalize_key(&entry.full_name))
            .collect(),
    )
}

#[allow(clippy::too_many_arguments)]
async fn scan_tenant(
    db: Arc<dyn Database>,
    deps: ScannerDeps,
    cancel: CancelToken,
    scan_log_id: i64,
    tenant: TenantSettings,
    envs: Vec<Environment>,
    base_filter: Option<HashSet<String>>,
    totals: Arc<ScanTotals>,
    errors: Arc<Mutex<Vec<String>>>,
) {
    if deps.config.detection.by_convention && tenant.code.len() < 3 {
        tracing::warn!(
            tenant = %tenant.code,
            "Tenant code is short; convention-based custom detection will over-match"
        );
    }

    // Environments run sequentially within one tenant.
    for env in envs {
        if cancel.is_cancelled() {
            return;
        }
        let Some(conn) = tenant.connection(env).cloned() else {
            continue;
        };
        let target = Target {
            tenant_id: tenant.id,
            tenant_code: tenant.code.clone(),
            tenant_name: tenant.name.clone(),
            environment: env,
        };

        let outcome = scan_target(
            Arc::clone(&db),
            &deps,
            &cancel,
            scan_log_id,
            &target,
            conn,
            base_filter.as_ref(),
        )
        .await;

        match outcome {
            Ok(counts) => {
                totals.objects.fetch_add(counts.found as i64, Ordering::Relaxed);
                totals.changes.fetch_add(
                    (counts.new + counts.modified + counts.deleted) as i64,
                    Ordering::Relaxed,
                );
                totals.successes.fetch_add(1, Ordering::Relaxed);
            }
            Err(message) => {
                totals.errors.fetch_add(1, Ordering::Relaxed);
                errors
                    .lock()
                    .expect("error accumulator poisoned")
                    .push(format!("{}: {}", target, message));
            }
        }
    }
}

/// Scan one target under the 90-second deadline. Returns the entry counts on
/// success or a single-line error message on failure; either way the scan
/// entry has been written and closed.
async fn scan_target(
    db: Arc<dyn Database>,
    deps: &ScannerDeps,
    cancel: &CancelToken,
    scan_log_id: i64,
    target: &Target,
    conn: ConnectionSettings,
    base_filter: Option<&HashSet<String>>,
) -> Result<TargetCounts, String> {
    let started = Instant::now();
    let mut entry = ScanEntry::started(scan_log_id, target);
    entry.id = match db.create_scan_entry(&entry).await {
        Ok(id) => id,
        Err(e) => return Err(single_line(&format!("Scan entry create failed: {}", e))),
    };

    let deadline = deps.config.scheduler.target_deadline;
    let work = scan_target_inner(&db, deps, scan_log_id, target, conn, base_filter);
    let result = tokio::select! {
        result = tokio::time::timeout(deadline, work) => match result {
            Ok(inner) => inner,
            Err(_) => Err(format!("Timeout after {} seconds", deadline.as_secs())),
        },
        _ = cancel.cancelled() => Err("Cancelled".to_string()),
    };

    entry.completed_at = Some(Utc::now());
    entry.duration_seconds = started.elapsed().as_secs_f64();
    match &result {
        Ok(counts) => {
            entry.success = true;
            entry.objects_found = counts.found;
            entry.objects_new = counts.new;
            entry.objects_modified = counts.modified;
            entry.objects_deleted = counts.deleted;
        }
        Err(message) => {
            entry.success = false;
            entry.error_message = Some(single_line(message));
            tracing::warn!("Target {} scan failed: {}", target, message);
        }
    }

    if let Err(e) = db.update_scan_entry(&entry).await {
        tracing::error!("Failed to close scan entry for {}: {}", target, e);
    }

    result.map_err(|message| single_line(&message))
}

/// The deadline-covered part: connect, extract, filter, persist, detect.
async fn scan_target_inner(
    db: &Arc<dyn Database>,
    deps: &ScannerDeps,
    scan_log_id: i64,
    target: &Target,
    conn: ConnectionSettings,
    base_filter: Option<&HashSet<String>>,
) -> Result<TargetCounts, String> {
    let password = deps
        .cipher
        .decrypt(&conn.password)
        .await
        .map_err(|e| format!("Credential error: {}", e))?;
    let spec = ConnectionSpec::from_settings(
        &conn,
        password,
        deps.config.scheduler.connection_timeout,
    );

    let diagnostic = deps
        .extractor
        .test_connection(&spec, deps.config.scheduler.connection_timeout)
        .await
        .map_err(|e| format!("Connect failed: {}", e))?;
    tracing::debug!("Connected to {}: {}", target, diagnostic);

    let objects = deps
        .extractor
        .extract_all(&spec, deps.config.scheduler.target_deadline)
        .await
        .map_err(|e| format!("Extraction failed: {}", e))?;

    let custom_registry: HashSet<String> = deps
        .settings
        .custom_objects
        .iter()
        .filter(|entry| entry.tenant_code.eq_ignore_ascii_case(&target.tenant_code))
        .map(|entry| normalize_key(&entry.full_name))
        .collect();
    let by_convention = deps.config.detection.by_convention;
    let code_lower = target.tenant_code.to_ascii_lowercase();

    let snapshot_date = Utc::now();
    let mut snapshots: Vec<Snapshot> = Vec::new();
    let mut definitions: Vec<String> = Vec::new();
    // One snapshot per full name; overloaded routines collapse to the first
    // occurrence, consistent with the detector's first-seen rule.
    let mut seen: HashSet<String> = HashSet::with_capacity(objects.len());
    for object in &objects {
        let key = normalize_key(&object.full_name());
        if !seen.insert(key.clone()) {
            continue;
        }
        let is_custom = custom_registry.contains(&key)
            || (by_convention && object.name.to_ascii_lowercase().contains(&code_lower));
        let included = is_custom || base_filter.map_or(true, |filter| filter.contains(&key));
        if !included {
            continue;
        }
        snapshots.push(Snapshot::from_object(
            scan_log_id,
            target,
            object,
            snapshot_date,
            is_custom,
        ));
        definitions.push(object.definition.clone());
    }

    // The previous latest set must be read before inserting the current one,
    // otherwise "latest" already contains this scan and detection never
    // fires.
    let previous = db
        .latest_snapshots(target.tenant_id, target.environment)
        .await
        .map_err(|e| format!("Repository read failed: {}", e))?;

    db.bulk_insert_snapshots(scan_log_id, &snapshots, &definitions)
        .await
        .map_err(|e| format!("Snapshot write failed: {}", e))?;

    // Only non-custom snapshots feed change detection.
    let previous_base: Vec<Snapshot> = previous.into_iter().filter(|s| !s.is_custom).collect();
    let current_base: Vec<Snapshot> = snapshots
        .iter()
        .filter(|s| !s.is_custom)
        .cloned()
        .collect();
    let changes = detect_changes(scan_log_id, target, &previous_base, &current_base, Utc::now());

    db.bulk_insert_changes(&changes)
        .await
        .map_err(|e| format!("Change write failed: {}", e))?;

    let mut counts = TargetCounts {
        found: snapshots.len() as i32,
        ..TargetCounts::default()
    };
    for change in &changes {
        match change.change_type {
            crate::model::ChangeType::Created => counts.new += 1,
            crate::model::ChangeType::Modified => counts.modified += 1,
            crate::model::ChangeType::Deleted => counts.deleted += 1,
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::config::Config;
    use crate::db::libsql::LibSqlBackend;
    use crate::db::{ChangeStore, Database, ScanLogStore, SnapshotStore};
    use crate::error::ExtractError;
    use crate::extract::{ConnectionSpec, Extractor};
    use crate::model::{ChangeType, ObjectKind, ProgrammableObject, ScanStatus};
    use crate::notify::TracingNotifier;
    use crate::secrets::PlainCipher;
    use crate::settings::{
        ConnectionSettings, CustomObjectSettings, Settings, TenantSettings,
        TrackedObjectSettings,
    };

    use super::*;

    /// Extractor scripted per database name.
    struct ScriptedExtractor {
        catalogs: HashMap<String, Vec<ProgrammableObject>>,
    }

    #[async_trait]
    impl Extractor for ScriptedExtractor {
        async fn test_connection(
            &self,
            spec: &ConnectionSpec,
            _deadline: Duration,
        ) -> Result<String, ExtractError> {
            if self.catalogs.contains_key(&spec.dbname) {
                Ok(format!("scripted / {}", spec.dbname))
            } else {
                Err(ExtractError::Connect(format!("unknown database {}", spec.dbname)))
            }
        }

        async fn extract_all(
            &self,
            spec: &ConnectionSpec,
            _deadline: Duration,
        ) -> Result<Vec<ProgrammableObject>, ExtractError> {
            self.catalogs
                .get(&spec.dbname)
                .cloned()
                .ok_or_else(|| ExtractError::Connect(format!("unknown database {}", spec.dbname)))
        }

        async fn extract_single(
            &self,
            spec: &ConnectionSpec,
            schema: &str,
            name: &str,
            _deadline: Duration,
        ) -> Result<Option<ProgrammableObject>, ExtractError> {
            Ok(self.catalogs.get(&spec.dbname).and_then(|objects| {
                objects
                    .iter()
                    .find(|o| o.schema == schema && o.name == name)
                    .cloned()
            }))
        }
    }

    fn object(schema: &str, name: &str, definition: &str) -> ProgrammableObject {
        ProgrammableObject {
            schema: schema.to_string(),
            name: name.to_string(),
            kind: ObjectKind::Procedure,
            definition: definition.to_string(),
            last_modified: Utc::now(),
        }
    }

    fn tenant(id: i32, code: &str, dbname: &str) -> TenantSettings {
        let mut environments = std::collections::BTreeMap::new();
        environments.insert(
            "production".to_string(),
            ConnectionSettings {
                host: "localhost".to_string(),
                port: 5432,
                dbname: dbname.to_string(),
                user: "modwatch".to_string(),
                password: String::new(),
            },
        );
        TenantSettings {
            id,
            code: code.to_string(),
            name: format!("{} Inc", code),
            environments,
        }
    }

    async fn scanner_with(
        settings: Settings,
        catalogs: HashMap<String, Vec<ProgrammableObject>>,
    ) -> (Scanner, Arc<LibSqlBackend>) {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        backend.run_migrations().await.unwrap();
        let config = Config::resolve(&settings).unwrap();
        let deps = ScannerDeps {
            settings: Arc::new(settings),
            config: Arc::new(config),
            extractor: Arc::new(ScriptedExtractor { catalogs }),
            cipher: Arc::new(PlainCipher),
            notifier: Arc::new(TracingNotifier),
        };
        let scanner = Scanner::new(backend.clone(), deps, CancelToken::new());
        (scanner, backend)
    }

    #[tokio::test]
    async fn first_scan_establishes_history_without_changes() {
        let mut settings = Settings::default();
        settings.tenants.push(tenant(1, "ACME", "acme"));
        let mut catalogs = HashMap::new();
        catalogs.insert(
            "acme".to_string(),
            vec![object("dbo", "GetOrders", "SELECT 1"), object("dbo", "GetItems", "SELECT 2")],
        );
        let (scanner, db) = scanner_with(settings, catalogs).await;

        let log = scanner
            .run_full_scan(ScanTrigger::Manual, Some("tester".to_string()), 5, false)
            .await
            .unwrap();

        assert_eq!(log.status, ScanStatus::Completed);
        assert_eq!(log.total_objects_scanned, 2);
        assert_eq!(log.total_changes_detected, 0);
        assert_eq!(log.total_errors, 0);

        let latest = db.latest_snapshots(1, Environment::Production).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert!(db.list_changes_for_scan(log.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_scan_detects_modifications() {
        let mut settings = Settings::default();
        settings.tenants.push(tenant(1, "ACME", "acme"));
        let mut catalogs = HashMap::new();
        catalogs.insert(
            "acme".to_string(),
            vec![object("dbo", "GetOrders", "SELECT 1")],
        );
        let (scanner, db) = scanner_with(settings.clone(), catalogs).await;
        scanner
            .run_full_scan(ScanTrigger::Manual, None, 5, false)
            .await
            .unwrap();

        // Same repository, changed catalog.
        let mut catalogs = HashMap::new();
        catalogs.insert(
            "acme".to_string(),
            vec![object("dbo", "GetOrders", "SELECT 99")],
        );
        let config = Config::resolve(&settings).unwrap();
        let deps = ScannerDeps {
            settings: Arc::new(settings),
            config: Arc::new(config),
            extractor: Arc::new(ScriptedExtractor { catalogs }),
            cipher: Arc::new(PlainCipher),
            notifier: Arc::new(TracingNotifier),
        };
        let scanner = Scanner::new(db.clone(), deps, CancelToken::new());
        let log = scanner
            .run_full_scan(ScanTrigger::Manual, None, 5, false)
            .await
            .unwrap();

        assert_eq!(log.total_changes_detected, 1);
        let changes = db.list_changes_for_scan(log.id).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Modified);
        assert_eq!(changes[0].full_name, "dbo.GetOrders");
    }

    #[tokio::test]
    async fn failed_target_is_recorded_not_fatal() {
        let mut settings = Settings::default();
        settings.tenants.push(tenant(1, "ACME", "acme"));
        settings.tenants.push(tenant(2, "GLOBEX", "missing-db"));
        let mut catalogs = HashMap::new();
        catalogs.insert("acme".to_string(), vec![object("dbo", "P1", "SELECT 1")]);
        let (scanner, db) = scanner_with(settings, catalogs).await;

        let log = scanner
            .run_full_scan(ScanTrigger::Scheduled, None, 5, false)
            .await
            .unwrap();

        assert_eq!(log.status, ScanStatus::CompletedWithErrors);
        assert_eq!(log.total_errors, 1);
        assert!(log.error_summary.as_deref().unwrap().contains("GLOBEX"));

        let entries = db.list_scan_entries(log.id).await.unwrap();
        let failed = entries.iter().find(|e| !e.success).unwrap();
        assert!(failed.error_message.as_deref().unwrap().contains("Connect failed"));
        let healthy = entries.iter().find(|e| e.success).unwrap();
        assert_eq!(healthy.objects_found, 1);
    }

    #[tokio::test]
    async fn base_filter_admits_tracked_and_custom_objects_only() {
        let mut settings = Settings::default();
        settings.tenants.push(tenant(1, "ACME", "acme"));
        settings.tracked_objects.push(TrackedObjectSettings {
            full_name: "dbo.Tracked".to_string(),
            tenant_code: None,
        });
        settings.custom_objects.push(CustomObjectSettings {
            tenant_code: "ACME".to_string(),
            full_name: "dbo.Registered".to_string(),
        });
        let mut catalogs = HashMap::new();
        catalogs.insert(
            "acme".to_string(),
            vec![
                object("dbo", "Tracked", "SELECT 1"),
                object("dbo", "Untracked", "SELECT 2"),
                object("dbo", "Registered", "SELECT 3"),
                // Custom by convention: name contains the tenant code.
                object("dbo", "Acme_Report", "SELECT 4"),
            ],
        );
        let (scanner, db) = scanner_with(settings, catalogs).await;

        scanner
            .run_full_scan(ScanTrigger::Manual, None, 5, false)
            .await
            .unwrap();

        let latest = db.latest_snapshots(1, Environment::Production).await.unwrap();
        let names: Vec<&str> = latest.iter().map(|s| s.full_name.as_str()).collect();
        assert_eq!(names, vec!["dbo.Acme_Report", "dbo.Registered", "dbo.Tracked"]);

        // Non-custom emitted snapshots are all within the filter; custom ones
        // are flagged.
        for snap in &latest {
            if snap.full_name == "dbo.Tracked" {
                assert!(!snap.is_custom);
            } else {
                assert!(snap.is_custom, "{} should be custom", snap.full_name);
            }
        }
    }

    #[tokio::test]
    async fn scan_all_overrides_the_base_filter() {
        let mut settings = Settings::default();
        settings.tenants.push(tenant(1, "ACME", "acme"));
        settings.tracked_objects.push(TrackedObjectSettings {
            full_name: "dbo.Tracked".to_string(),
            tenant_code: None,
        });
        let mut catalogs = HashMap::new();
        catalogs.insert(
            "acme".to_string(),
            vec![object("dbo", "Tracked", "SELECT 1"), object("dbo", "Other", "SELECT 2")],
        );
        let (scanner, db) = scanner_with(settings, catalogs).await;

        scanner
            .run_full_scan(ScanTrigger::Manual, None, 5, true)
            .await
            .unwrap();

        let latest = db.latest_snapshots(1, Environment::Production).await.unwrap();
        assert_eq!(latest.len(), 2);
    }

    #[tokio::test]
    async fn custom_objects_do_not_feed_change_detection() {
        let mut settings = Settings::default();
        settings.tenants.push(tenant(1, "ACME", "acme"));
        let mut catalogs = HashMap::new();
        catalogs.insert(
            "acme".to_string(),
            vec![object("dbo", "Acme_Custom", "v1"), object("dbo", "Shared", "v1")],
        );
        let (scanner, db) = scanner_with(settings.clone(), catalogs).await;
        scanner
            .run_full_scan(ScanTrigger::Manual, None, 5, false)
            .await
            .unwrap();

        // Both objects change; only the non-custom one is reported.
        let mut catalogs = HashMap::new();
        catalogs.insert(
            "acme".to_string(),
            vec![object("dbo", "Acme_Custom", "v2"), object("dbo", "Shared", "v2")],
        );
        let config = Config::resolve(&settings).unwrap();
        let deps = ScannerDeps {
            settings: Arc::new(settings),
            config: Arc::new(config),
            extractor: Arc::new(ScriptedExtractor { catalogs }),
            cipher: Arc::new(PlainCipher),
            notifier: Arc::new(TracingNotifier),
        };
        let scanner = Scanner::new(db.clone(), deps, CancelToken::new());
        let log = scanner
            .run_full_scan(ScanTrigger::Manual, None, 5, false)
            .await
            .unwrap();

        let changes = db.list_changes_for_scan(log.id).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].full_name, "dbo.Shared");
    }
}
