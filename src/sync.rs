//! Script application contract and sync-script generation.
//!
//! The engine never pushes changes on its own; the external sync layer
//! decides when to apply. This module supplies that layer's two inputs: a
//! `ScriptApplier` it can call with a batched script, and a generator that
//! renders a compare result into such a script.

use async_trait::async_trait;
use tokio_postgres::NoTls;

use crate::compare::{ComparisonResult, ComparisonStatus};
use crate::error::ExtractError;
use crate::extract::ConnectionSpec;

/// Executes a generated script against a target database.
#[async_trait]
pub trait ScriptApplier: Send + Sync {
    async fn apply(&self, spec: &ConnectionSpec, script: &str) -> Result<(), ExtractError>;
}

/// Applies scripts over a plain PostgreSQL connection, one batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgScriptApplier;

#[async_trait]
impl ScriptApplier for PgScriptApplier {
    async fn apply(&self, spec: &ConnectionSpec, script: &str) -> Result<(), ExtractError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&spec.host)
            .port(spec.port)
            .dbname(&spec.dbname)
            .user(&spec.user)
            .password(&spec.password)
            .connect_timeout(spec.connect_timeout);

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| ExtractError::Connect(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("Apply connection closed: {}", e);
            }
        });

        client
            .batch_execute(script)
            .await
            .map_err(|e| ExtractError::Query(e.to_string()))
    }
}

/// Render a sync script that would bring the target side up to the source
/// side: create-or-replace for modified and source-only objects, drop for
/// target-only objects. `definitions` yields the source definition text for
/// a full name.
pub fn generate_sync_script<F>(result: &ComparisonResult, mut definitions: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut statements: Vec<String> = Vec::new();

    for item in &result.items {
        match item.status {
            ComparisonStatus::Equal => {}
            ComparisonStatus::Modified | ComparisonStatus::OnlyInSource => {
                if let Some(definition) = definitions(&item.full_name) {
                    let text = definition.trim_end().trim_end_matches(';');
                    statements.push(format!("{};", text));
                } else {
                    statements.push(format!("-- missing definition for {}", item.full_name));
                }
            }
            ComparisonStatus::OnlyInTarget => {
                statements.push(format!(
                    "DROP {} IF EXISTS {};",
                    drop_keyword(item.kind),
                    item.full_name
                ));
            }
        }
    }

    statements.join("\n\n")
}

fn drop_keyword(kind: crate::model::ObjectKind) -> &'static str {
    use crate::model::ObjectKind;
    match kind {
        ObjectKind::Procedure => "PROCEDURE",
        ObjectKind::View => "VIEW",
        ObjectKind::ScalarFunction | ObjectKind::TableFunction | ObjectKind::InlineFunction => {
            "FUNCTION"
        }
    }
}
