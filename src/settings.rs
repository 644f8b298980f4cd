//! File-backed settings.
//!
//! `modwatch.toml` is the single source for tenants, their per-environment
//! connections, the tracked-object base filter, the custom-object registry
//! and the tunables. The `config` module resolves these raw settings into
//! typed configs with environment-variable overrides applied.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::Environment;

/// Root of the settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub custom_detection: CustomDetectionSettings,
    #[serde(default)]
    pub tenants: Vec<TenantSettings>,
    /// Base filter of tracked objects. Empty means "scan everything".
    #[serde(default)]
    pub tracked_objects: Vec<TrackedObjectSettings>,
    /// Explicit per-tenant custom-object registry.
    #[serde(default)]
    pub custom_objects: Vec<CustomObjectSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub interval_minutes: u64,
    pub max_parallel_tenants: usize,
    pub connection_timeout_seconds: u64,
    pub run_on_startup: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 360,
            max_parallel_tenants: 5,
            connection_timeout_seconds: 30,
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    /// Path of the embedded repository database file.
    pub path: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            path: "modwatch.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomDetectionSettings {
    /// Mark objects whose name contains the tenant code as custom.
    pub by_convention: bool,
}

impl Default for CustomDetectionSettings {
    fn default() -> Self {
        Self {
            by_convention: true,
        }
    }
}

/// One monitored tenant with its per-environment connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSettings {
    pub id: i32,
    pub code: String,
    pub name: String,
    /// Keys are environment names (`development`, `staging`, `production`).
    #[serde(default)]
    pub environments: BTreeMap<String, ConnectionSettings>,
}

impl TenantSettings {
    /// Environments configured for this tenant, in the closed-set order.
    pub fn configured_environments(&self) -> Vec<Environment> {
        Environment::ALL
            .iter()
            .copied()
            .filter(|env| self.connection(*env).is_some())
            .collect()
    }

    pub fn connection(&self, env: Environment) -> Option<&ConnectionSettings> {
        self.environments
            .iter()
            .find(|(key, _)| Environment::parse(key) == Some(env))
            .map(|(_, conn)| conn)
    }
}

/// Connection record for one target database. The password is stored as an
/// opaque value and decrypted through the secret cipher just before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub dbname: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_port() -> u16 {
    5432
}

/// Base-filter entry. `tenant_code = None` means the entry is global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedObjectSettings {
    pub full_name: String,
    #[serde(default)]
    pub tenant_code: Option<String>,
}

/// Custom-registry entry: a known tenant-specific object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomObjectSettings {
    pub tenant_code: String,
    pub full_name: String,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn tenant(&self, tenant_id: i32) -> Result<&TenantSettings, ConfigError> {
        self.tenants
            .iter()
            .find(|t| t.id == tenant_id)
            .ok_or(ConfigError::UnknownTenant(tenant_id))
    }

    pub fn tenant_by_code(&self, code: &str) -> Option<&TenantSettings> {
        self.tenants
            .iter()
            .find(|t| t.code.eq_ignore_ascii_case(code))
    }
}
