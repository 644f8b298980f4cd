//! Domain model: targets, snapshots, scan bookkeeping, detected changes and
//! baselines.

mod object;

pub use object::{
    definition_hash, normalize_definition, normalize_key, ObjectKind, ProgrammableObject,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monitored environment. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::Development,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "Development",
            Environment::Staging => "Staging",
            Environment::Production => "Production",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "staging" | "stage" => Some(Environment::Staging),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One monitored database: a (tenant, environment) pair. Immutable value,
/// passed by value between tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub tenant_id: i32,
    pub tenant_code: String,
    pub tenant_name: String,
    pub environment: Environment,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant_code, self.environment)
    }
}

/// Terminal and in-flight scan states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "Running",
            ScanStatus::Completed => "Completed",
            ScanStatus::CompletedWithErrors => "CompletedWithErrors",
            ScanStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Running" => Some(ScanStatus::Running),
            "Completed" => Some(ScanStatus::Completed),
            "CompletedWithErrors" => Some(ScanStatus::CompletedWithErrors),
            "Failed" => Some(ScanStatus::Failed),
            _ => None,
        }
    }
}

/// What started a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTrigger {
    Scheduled,
    Manual,
    OnDemand,
    Compare,
}

impl ScanTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanTrigger::Scheduled => "Scheduled",
            ScanTrigger::Manual => "Manual",
            ScanTrigger::OnDemand => "OnDemand",
            ScanTrigger::Compare => "Compare",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Scheduled" => Some(ScanTrigger::Scheduled),
            "Manual" => Some(ScanTrigger::Manual),
            "OnDemand" => Some(ScanTrigger::OnDemand),
            "Compare" => Some(ScanTrigger::Compare),
            _ => None,
        }
    }
}

/// One orchestrator execution over a set of targets. Created in `Running`
/// state, updated exactly once to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanLog {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ScanStatus,
    pub trigger: ScanTrigger,
    pub triggered_by: Option<String>,
    pub total_tenants: i32,
    pub total_environments: i32,
    pub total_objects_scanned: i32,
    pub total_changes_detected: i32,
    pub total_errors: i32,
    pub error_summary: Option<String>,
}

impl ScanLog {
    pub fn started(trigger: ScanTrigger, triggered_by: Option<String>) -> Self {
        Self {
            id: 0,
            started_at: Utc::now(),
            completed_at: None,
            status: ScanStatus::Running,
            trigger,
            triggered_by,
            total_tenants: 0,
            total_environments: 0,
            total_objects_scanned: 0,
            total_changes_detected: 0,
            total_errors: 0,
            error_summary: None,
        }
    }
}

/// Per-(scan, target) record. Created at target start, updated exactly once
/// at target end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEntry {
    pub id: i64,
    pub scan_log_id: i64,
    pub tenant_id: i32,
    pub tenant_code: String,
    pub environment: Environment,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub objects_found: i32,
    pub objects_new: i32,
    pub objects_modified: i32,
    pub objects_deleted: i32,
    pub error_message: Option<String>,
    pub duration_seconds: f64,
}

impl ScanEntry {
    pub fn started(scan_log_id: i64, target: &Target) -> Self {
        Self {
            id: 0,
            scan_log_id,
            tenant_id: target.tenant_id,
            tenant_code: target.tenant_code.clone(),
            environment: target.environment,
            started_at: Utc::now(),
            completed_at: None,
            success: false,
            objects_found: 0,
            objects_new: 0,
            objects_modified: 0,
            objects_deleted: 0,
            error_message: None,
            duration_seconds: 0.0,
        }
    }
}

/// Metadata row for one captured object state. The definition text lives in
/// a separate one-to-one row so bulk reads stay cheap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub scan_log_id: i64,
    pub tenant_id: i32,
    pub tenant_name: String,
    pub tenant_code: String,
    pub environment: Environment,
    pub full_name: String,
    pub schema: String,
    pub name: String,
    pub kind: ObjectKind,
    pub definition_hash: String,
    pub object_last_modified: DateTime<Utc>,
    pub snapshot_date: DateTime<Utc>,
    pub is_custom: bool,
}

impl Snapshot {
    /// Build a snapshot row from an extracted object for one target.
    pub fn from_object(
        scan_log_id: i64,
        target: &Target,
        object: &ProgrammableObject,
        snapshot_date: DateTime<Utc>,
        is_custom: bool,
    ) -> Self {
        Self {
            id: 0,
            scan_log_id,
            tenant_id: target.tenant_id,
            tenant_name: target.tenant_name.clone(),
            tenant_code: target.tenant_code.clone(),
            environment: target.environment,
            full_name: object.full_name(),
            schema: object.schema.clone(),
            name: object.name.clone(),
            kind: object.kind,
            definition_hash: object.definition_hash(),
            object_last_modified: object.last_modified,
            snapshot_date,
            is_custom,
        }
    }
}

/// Kind of detected divergence between two consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "Created",
            ChangeType::Modified => "Modified",
            ChangeType::Deleted => "Deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Created" => Some(ChangeType::Created),
            "Modified" => Some(ChangeType::Modified),
            "Deleted" => Some(ChangeType::Deleted),
            _ => None,
        }
    }
}

/// One created/modified/deleted object, attributed to the scan that saw it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedChange {
    pub id: i64,
    pub scan_log_id: i64,
    pub tenant_id: i32,
    pub tenant_code: String,
    pub environment: Environment,
    pub full_name: String,
    pub kind: ObjectKind,
    pub change_type: ChangeType,
    /// None for created objects.
    pub previous_hash: Option<String>,
    /// None for deleted objects.
    pub current_hash: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub notification_sent: bool,
}

/// Named frozen version of one target's non-custom objects. Content is
/// immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub source_tenant_id: i32,
    pub source_tenant_name: String,
    pub source_tenant_code: String,
    pub source_environment: Environment,
    pub total_objects: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

/// One object frozen into a baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineObject {
    pub id: i64,
    pub baseline_id: i64,
    pub full_name: String,
    pub schema: String,
    pub name: String,
    pub kind: ObjectKind,
    pub definition_hash: String,
    pub source_snapshot_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parse_accepts_aliases() {
        assert_eq!(Environment::parse("prod"), Some(Environment::Production));
        assert_eq!(Environment::parse("Staging"), Some(Environment::Staging));
        assert_eq!(Environment::parse("qa"), None);
    }

    #[test]
    fn status_and_trigger_round_trip() {
        for s in [
            ScanStatus::Running,
            ScanStatus::Completed,
            ScanStatus::CompletedWithErrors,
            ScanStatus::Failed,
        ] {
            assert_eq!(ScanStatus::parse(s.as_str()), Some(s));
        }
        for t in [
            ScanTrigger::Scheduled,
            ScanTrigger::Manual,
            ScanTrigger::OnDemand,
            ScanTrigger::Compare,
        ] {
            assert_eq!(ScanTrigger::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn snapshot_from_object_derives_fields() {
        let target = Target {
            tenant_id: 7,
            tenant_code: "ACME".to_string(),
            tenant_name: "Acme Corp".to_string(),
            environment: Environment::Production,
        };
        let object = ProgrammableObject {
            schema: "dbo".to_string(),
            name: "GetOrders".to_string(),
            kind: ObjectKind::Procedure,
            definition: "CREATE PROCEDURE dbo.GetOrders AS SELECT 1;".to_string(),
            last_modified: Utc::now(),
        };
        let snap = Snapshot::from_object(42, &target, &object, Utc::now(), false);
        assert_eq!(snap.scan_log_id, 42);
        assert_eq!(snap.full_name, "dbo.GetOrders");
        assert_eq!(snap.kind, ObjectKind::Procedure);
        assert_eq!(snap.definition_hash, object.definition_hash());
        assert!(!snap.is_custom);
    }
}
