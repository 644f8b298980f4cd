//! Resolved runtime configuration.
//!
//! `Settings` is the raw file contents; the structs here are what the rest
//! of the process consumes. Resolution applies `MODWATCH_*` environment
//! overrides on top of the file values and converts units into `Duration`s.

mod helpers;

use std::time::Duration;

use helpers::env_or;

use crate::error::ConfigError;
use crate::settings::Settings;

/// Hard per-target cap over connect + extract + repository writes.
/// Not configurable; the per-connection test timeout is.
pub const TARGET_DEADLINE: Duration = Duration::from_secs(90);

/// Deadline for interactive compare queries.
pub const COMPARE_DEADLINE: Duration = Duration::from_secs(20);

/// Scheduler behavior.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between automatic full scans.
    pub scan_interval: Duration,
    /// Concurrency cap across tenants inside one scan.
    pub max_parallel_tenants: usize,
    /// Per-connection test timeout.
    pub connection_timeout: Duration,
    /// Fire a full scan when the process starts.
    pub run_on_startup: bool,
    /// Hard cap over connect + extract + write per target. Always
    /// `TARGET_DEADLINE`; carried here so the scanner has one config source.
    pub target_deadline: Duration,
}

impl SchedulerConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let interval_minutes = env_or(
            "MODWATCH_SCHEDULER_INTERVAL_MINUTES",
            settings.scheduler.interval_minutes,
        )?;
        let max_parallel_tenants = env_or(
            "MODWATCH_SCHEDULER_MAX_PARALLEL_TENANTS",
            settings.scheduler.max_parallel_tenants,
        )?;
        let connection_timeout_seconds = env_or(
            "MODWATCH_SCHEDULER_CONNECTION_TIMEOUT_SECONDS",
            settings.scheduler.connection_timeout_seconds,
        )?;
        let run_on_startup = env_or(
            "MODWATCH_SCHEDULER_RUN_ON_STARTUP",
            settings.scheduler.run_on_startup,
        )?;

        if interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.interval_minutes".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            scan_interval: Duration::from_secs(interval_minutes * 60),
            max_parallel_tenants: max_parallel_tenants.max(1),
            connection_timeout: Duration::from_secs(connection_timeout_seconds),
            run_on_startup,
            target_deadline: TARGET_DEADLINE,
        })
    }
}

/// Scan queue sizing.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
}

impl QueueConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let capacity = env_or("MODWATCH_QUEUE_CAPACITY", settings.queue.capacity)?;
        Ok(Self {
            capacity: capacity.max(1),
        })
    }
}

/// Custom-object detection behavior.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub by_convention: bool,
}

impl DetectionConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let by_convention = env_or(
            "MODWATCH_CUSTOM_DETECTION_BY_CONVENTION",
            settings.custom_detection.by_convention,
        )?;
        Ok(Self { by_convention })
    }
}

/// Central repository location.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub path: String,
}

impl RepositoryConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let path = env_or("MODWATCH_REPOSITORY_PATH", settings.repository.path.clone())?;
        if path.trim().is_empty() {
            return Err(ConfigError::Missing("repository.path".to_string()));
        }
        Ok(Self { path })
    }
}

/// Everything resolved, ready for the runtime.
#[derive(Debug, Clone)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub queue: QueueConfig,
    pub detection: DetectionConfig,
    pub repository: RepositoryConfig,
}

impl Config {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            scheduler: SchedulerConfig::resolve(settings)?,
            queue: QueueConfig::resolve(settings)?,
            detection: DetectionConfig::resolve(settings)?,
            repository: RepositoryConfig::resolve(settings)?,
        })
    }
}
