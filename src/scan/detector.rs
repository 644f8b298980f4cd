//! Change detection between two snapshot sets of one target.
//!
//! Pure function over the previous and current sets, keyed by
//! case-insensitive full name. Callers feed only non-custom snapshots;
//! custom objects are tracked for visibility but never emit changes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{normalize_key, ChangeType, DetectedChange, Snapshot, Target};

/// Derive the created/modified/deleted set for one target.
///
/// An empty previous set yields no changes: the first scan of a target
/// establishes history rather than reporting the whole database as created.
/// The output is sorted by full name, so repeated detection over the same
/// inputs yields identical results.
pub fn detect_changes(
    scan_log_id: i64,
    target: &Target,
    previous: &[Snapshot],
    current: &[Snapshot],
    detected_at: DateTime<Utc>,
) -> Vec<DetectedChange> {
    if previous.is_empty() {
        return Vec::new();
    }

    let previous_by_key = index_by_key(previous);
    let current_by_key = index_by_key(current);

    let mut changes = Vec::new();

    for (key, snapshot) in &current_by_key {
        match previous_by_key.get(key) {
            None => changes.push(change(
                scan_log_id,
                target,
                snapshot,
                ChangeType::Created,
                None,
                Some(snapshot.definition_hash.clone()),
                detected_at,
            )),
            Some(prev) if prev.definition_hash != snapshot.definition_hash => {
                changes.push(change(
                    scan_log_id,
                    target,
                    snapshot,
                    ChangeType::Modified,
                    Some(prev.definition_hash.clone()),
                    Some(snapshot.definition_hash.clone()),
                    detected_at,
                ));
            }
            Some(_) => {}
        }
    }

    for (key, snapshot) in &previous_by_key {
        if !current_by_key.contains_key(key) {
            changes.push(change(
                scan_log_id,
                target,
                snapshot,
                ChangeType::Deleted,
                Some(snapshot.definition_hash.clone()),
                None,
                detected_at,
            ));
        }
    }

    changes.sort_by(|a, b| normalize_key(&a.full_name).cmp(&normalize_key(&b.full_name)));
    changes
}

/// Index snapshots by normalized full name. The first-seen casing of a name
/// wins; later duplicates (differing only in case) are ignored.
fn index_by_key(snapshots: &[Snapshot]) -> HashMap<String, &Snapshot> {
    let mut map: HashMap<String, &Snapshot> = HashMap::with_capacity(snapshots.len());
    for snapshot in snapshots {
        map.entry(normalize_key(&snapshot.full_name)).or_insert(snapshot);
    }
    map
}

fn change(
    scan_log_id: i64,
    target: &Target,
    snapshot: &Snapshot,
    change_type: ChangeType,
    previous_hash: Option<String>,
    current_hash: Option<String>,
    detected_at: DateTime<Utc>,
) -> DetectedChange {
    DetectedChange {
        id: 0,
        scan_log_id,
        tenant_id: target.tenant_id,
        tenant_code: target.tenant_code.clone(),
        environment: target.environment,
        full_name: snapshot.full_name.clone(),
        kind: snapshot.kind,
        change_type,
        previous_hash,
        current_hash,
        detected_at,
        notification_sent: false,
    }
}
