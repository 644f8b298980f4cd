//! Shared test fixtures: a scripted extractor and settings builders.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use modwatch::config::Config;
use modwatch::db::libsql::LibSqlBackend;
use modwatch::db::Database;
use modwatch::error::ExtractError;
use modwatch::extract::{ConnectionSpec, Extractor};
use modwatch::model::{ObjectKind, ProgrammableObject};
use modwatch::notify::TracingNotifier;
use modwatch::scan::ScannerDeps;
use modwatch::secrets::PlainCipher;
use modwatch::settings::{ConnectionSettings, Settings, TenantSettings};

/// Per-database behavior for the scripted extractor.
pub enum TargetScript {
    /// Return this catalog immediately.
    Catalog(Vec<ProgrammableObject>),
    /// Sleep, then return this catalog.
    Delay(Duration, Vec<ProgrammableObject>),
    /// Refuse the connection.
    ConnectError(String),
}

/// Extractor scripted per database name.
pub struct ScriptedExtractor {
    pub scripts: HashMap<String, TargetScript>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
        }
    }

    pub fn with(mut self, dbname: &str, script: TargetScript) -> Self {
        self.scripts.insert(dbname.to_string(), script);
        self
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn test_connection(
        &self,
        spec: &ConnectionSpec,
        _deadline: Duration,
    ) -> Result<String, ExtractError> {
        match self.scripts.get(&spec.dbname) {
            Some(TargetScript::ConnectError(message)) => {
                Err(ExtractError::Connect(message.clone()))
            }
            Some(_) => Ok(format!("scripted / {}", spec.dbname)),
            None => Err(ExtractError::Connect(format!(
                "unknown database {}",
                spec.dbname
            ))),
        }
    }

    async fn extract_all(
        &self,
        spec: &ConnectionSpec,
        _deadline: Duration,
    ) -> Result<Vec<ProgrammableObject>, ExtractError> {
        match self.scripts.get(&spec.dbname) {
            Some(TargetScript::Catalog(objects)) => Ok(objects.clone()),
            Some(TargetScript::Delay(duration, objects)) => {
                tokio::time::sleep(*duration).await;
                Ok(objects.clone())
            }
            Some(TargetScript::ConnectError(message)) => {
                Err(ExtractError::Connect(message.clone()))
            }
            None => Err(ExtractError::Connect(format!(
                "unknown database {}",
                spec.dbname
            ))),
        }
    }

    async fn extract_single(
        &self,
        spec: &ConnectionSpec,
        schema: &str,
        name: &str,
        deadline: Duration,
    ) -> Result<Option<ProgrammableObject>, ExtractError> {
        let objects = self.extract_all(spec, deadline).await?;
        Ok(objects
            .into_iter()
            .find(|o| o.schema == schema && o.name == name))
    }
}

pub fn object(schema: &str, name: &str, definition: &str) -> ProgrammableObject {
    ProgrammableObject {
        schema: schema.to_string(),
        name: name.to_string(),
        kind: ObjectKind::Procedure,
        definition: definition.to_string(),
        last_modified: Utc::now(),
    }
}

/// A tenant with one production environment pointing at `dbname`.
pub fn tenant(id: i32, code: &str, dbname: &str) -> TenantSettings {
    let mut environments = BTreeMap::new();
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

pub async fn memory_backend() -> Arc<LibSqlBackend> {
    let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    backend.run_migrations().await.unwrap();
    backend
}

/// Scanner dependencies over the given settings and extractor, with an
/// optionally shortened per-target deadline for timeout tests.
pub fn deps(
    settings: Settings,
    extractor: ScriptedExtractor,
    target_deadline: Option<Duration>,
) -> ScannerDeps {
    let mut config = Config::resolve(&settings).unwrap();
    if let Some(deadline) = target_deadline {
        config.scheduler.target_deadline = deadline;
    }
    ScannerDeps {
        settings: Arc::new(settings),
        config: Arc::new(config),
        extractor: Arc::new(extractor),
        cipher: Arc::new(PlainCipher),
        notifier: Arc::new(TracingNotifier),
    }
}
