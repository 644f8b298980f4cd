//! Error taxonomy for modwatch.
//!
//! Each subsystem gets its own error enum; the top-level `Error` wraps them
//! for callers that cross subsystem boundaries (CLI, scheduler). Target-level
//! failures during a scan are *not* errors at this level: the scanner records
//! them in the scan entry and keeps going.

use thiserror::Error;

/// Configuration loading / resolution errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file {path} is not valid TOML: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Unknown tenant id {0}")]
    UnknownTenant(i32),

    #[error("Tenant {tenant} has no configuration for environment {environment}")]
    MissingEnvironment { tenant: String, environment: String },
}

/// Central repository errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Baseline name already exists: {0}")]
    DuplicateBaseline(String),
}

/// Errors talking to a monitored target database.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Catalog query failed: {0}")]
    Query(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),
}

/// Orchestrator-level scan errors. Target-level failures never surface here;
/// they are folded into the scan log's totals and error summary.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Scan queue is full")]
    QueueFull,

    #[error("Scan queue is closed")]
    QueueClosed,

    #[error("Scan was cancelled")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Errors decrypting a stored credential.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Unrecognized secret tag in {0:?}")]
    UnknownTag(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// Top-level error for callers that span subsystems.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// Collapse an error chain into a single line for scan log summaries.
pub fn single_line(msg: &str) -> String {
    msg.split(['\n', '\r'])
        .filter(|part| !part.trim().is_empty())
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_collapses_newlines() {
        assert_eq!(single_line("a\nb\r\nc"), "a; b; c");
        assert_eq!(single_line("plain"), "plain");
        assert_eq!(single_line("trailing\n\n"), "trailing");
    }
}
