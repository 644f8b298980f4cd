//! Object extraction from monitored target databases.
//!
//! The `Extractor` trait is the seam between the orchestrator and the wire:
//! production uses the PostgreSQL implementation, tests script their own.
//! Extractors are stateless; every call receives the connection descriptor
//! and opens its own short-lived session, so nothing leaks across scans.

mod postgres;

pub use postgres::PgExtractor;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExtractError;
use crate::model::ProgrammableObject;
use crate::settings::ConnectionSettings;

/// Connection descriptor for one target database, password already
/// decrypted. Immutable value, passed by value.
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub connect_timeout: Duration,
}

impl ConnectionSpec {
    /// Build a spec from settings plus the decrypted password.
    pub fn from_settings(
        settings: &ConnectionSettings,
        password: String,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            dbname: settings.dbname.clone(),
            user: settings.user.clone(),
            password,
            connect_timeout,
        }
    }
}

/// Reads the programmable-object catalog of a target database.
///
/// Implementations MUST NOT retry on transport errors; they fail fast and
/// the orchestrator decides what a failure means for the scan.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Probe the target. Returns a diagnostic message (typically server and
    /// database names) on success.
    async fn test_connection(
        &self,
        spec: &ConnectionSpec,
        deadline: Duration,
    ) -> Result<String, ExtractError>;

    /// Every non-system programmable object with its definition text and
    /// server-reported modification timestamp.
    async fn extract_all(
        &self,
        spec: &ConnectionSpec,
        deadline: Duration,
    ) -> Result<Vec<ProgrammableObject>, ExtractError>;

    /// A single object by schema and name, or `None` when absent.
    async fn extract_single(
        &self,
        spec: &ConnectionSpec,
        schema: &str,
        name: &str,
        deadline: Duration,
    ) -> Result<Option<ProgrammableObject>, ExtractError>;
}
