//! SQLite-dialect schema for the embedded repository.
//!
//! One consolidated migration, run on every startup; idempotent via
//! `IF NOT EXISTS`. Type mapping:
//! - timestamps -> `TEXT` (RFC 3339)
//! - booleans -> `INTEGER` (0/1)
//! - identity ids -> `INTEGER PRIMARY KEY AUTOINCREMENT`
//! - the filtered pending-notification index -> partial index
//! - the latest-snapshot view -> correlated `MAX(snapshot_date)` view

pub const SCHEMA: &str = r#"

-- ==================== Migration tracking ====================

CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ==================== Scan logs ====================

CREATE TABLE IF NOT EXISTS scan_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    "trigger" TEXT NOT NULL,
    triggered_by TEXT,
    total_tenants INTEGER NOT NULL DEFAULT 0,
    total_environments INTEGER NOT NULL DEFAULT 0,
    total_objects_scanned INTEGER NOT NULL DEFAULT 0,
    total_changes_detected INTEGER NOT NULL DEFAULT 0,
    total_errors INTEGER NOT NULL DEFAULT 0,
    error_summary TEXT
);

CREATE INDEX IF NOT EXISTS idx_scan_logs_started_at ON scan_logs(started_at DESC);

CREATE TABLE IF NOT EXISTS scan_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_log_id INTEGER NOT NULL REFERENCES scan_logs(id) ON DELETE CASCADE,
    tenant_id INTEGER NOT NULL,
    tenant_code TEXT NOT NULL,
    environment TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    success INTEGER NOT NULL DEFAULT 0,
    objects_found INTEGER NOT NULL DEFAULT 0,
    objects_new INTEGER NOT NULL DEFAULT 0,
    objects_modified INTEGER NOT NULL DEFAULT 0,
    objects_deleted INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    duration_seconds REAL NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_scan_entries_scan_log ON scan_entries(scan_log_id);

-- ==================== Snapshots ====================

CREATE TABLE IF NOT EXISTS object_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_log_id INTEGER NOT NULL REFERENCES scan_logs(id) ON DELETE CASCADE,
    tenant_id INTEGER NOT NULL,
    tenant_name TEXT NOT NULL,
    tenant_code TEXT NOT NULL,
    environment TEXT NOT NULL,
    full_name TEXT NOT NULL,
    schema_name TEXT NOT NULL,
    object_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    definition_hash TEXT NOT NULL,
    object_last_modified TEXT NOT NULL,
    snapshot_date TEXT NOT NULL,
    is_custom INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_object_snapshots_target_date
    ON object_snapshots(tenant_id, environment, snapshot_date DESC);
CREATE INDEX IF NOT EXISTS idx_object_snapshots_name_target_date
    ON object_snapshots(full_name, tenant_id, environment, snapshot_date DESC);
CREATE INDEX IF NOT EXISTS idx_object_snapshots_scan_log
    ON object_snapshots(scan_log_id);
CREATE INDEX IF NOT EXISTS idx_object_snapshots_hash
    ON object_snapshots(definition_hash);

CREATE TABLE IF NOT EXISTS object_snapshot_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id INTEGER NOT NULL UNIQUE REFERENCES object_snapshots(id) ON DELETE CASCADE,
    definition TEXT NOT NULL
);

-- For each (tenant_id, environment, full_name), the snapshot row with the
-- greatest snapshot_date; ties broken by greatest id.
CREATE VIEW IF NOT EXISTS latest_snapshots AS
SELECT s.*
FROM object_snapshots s
WHERE s.id = (
    SELECT s2.id
    FROM object_snapshots s2
    WHERE s2.tenant_id = s.tenant_id
      AND s2.environment = s.environment
      AND s2.full_name = s.full_name
    ORDER BY s2.snapshot_date DESC, s2.id DESC
    LIMIT 1
);

-- ==================== Detected changes ====================

CREATE TABLE IF NOT EXISTS detected_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_log_id INTEGER NOT NULL REFERENCES scan_logs(id) ON DELETE CASCADE,
    tenant_id INTEGER NOT NULL,
    tenant_code TEXT NOT NULL,
    environment TEXT NOT NULL,
    full_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    change_type TEXT NOT NULL,
    previous_hash TEXT,
    current_hash TEXT,
    detected_at TEXT NOT NULL,
    notification_sent INTEGER NOT NULL DEFAULT 0,
    UNIQUE (scan_log_id, tenant_id, environment, full_name)
);

CREATE INDEX IF NOT EXISTS idx_detected_changes_unsent
    ON detected_changes(notification_sent) WHERE notification_sent = 0;
CREATE INDEX IF NOT EXISTS idx_detected_changes_detected_at
    ON detected_changes(detected_at DESC);

-- ==================== Baselines ====================

CREATE TABLE IF NOT EXISTS baselines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    description TEXT,
    source_tenant_id INTEGER NOT NULL,
    source_tenant_name TEXT NOT NULL,
    source_tenant_code TEXT NOT NULL,
    source_environment TEXT NOT NULL,
    total_objects INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    created_by TEXT
);

CREATE TABLE IF NOT EXISTS baseline_objects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    baseline_id INTEGER NOT NULL REFERENCES baselines(id) ON DELETE CASCADE,
    full_name TEXT NOT NULL,
    schema_name TEXT NOT NULL,
    object_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    definition_hash TEXT NOT NULL,
    source_snapshot_id INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_baseline_objects_baseline
    ON baseline_objects(baseline_id);

CREATE TABLE IF NOT EXISTS baseline_object_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    baseline_object_id INTEGER NOT NULL UNIQUE REFERENCES baseline_objects(id) ON DELETE CASCADE,
    definition TEXT NOT NULL
);

"#;
