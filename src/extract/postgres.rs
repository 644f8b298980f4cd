//! PostgreSQL catalog extractor.
//!
//! Reads views from `pg_catalog.pg_views` and functions/procedures from
//! `pg_catalog.pg_proc`, excluding system schemas. PostgreSQL does not track
//! per-object modification times, so the server clock at extraction stands
//! in as the reported timestamp; equality is decided by the definition hash
//! anyway.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls};

use crate::error::ExtractError;
use crate::extract::{ConnectionSpec, Extractor};
use crate::model::{ObjectKind, ProgrammableObject};

const VIEW_SQL: &str = "\
    SELECT schemaname::text, viewname::text, definition::text \
    FROM pg_catalog.pg_views \
    WHERE schemaname NOT IN ('pg_catalog', 'information_schema')";

const ROUTINE_SQL: &str = "\
    SELECT n.nspname::text, p.proname::text, p.prokind::text, p.proretset, \
           pg_get_functiondef(p.oid)::text \
    FROM pg_catalog.pg_proc p \
    JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace \
    WHERE n.nspname NOT IN ('pg_catalog', 'information_schema') \
      AND p.prokind IN ('f', 'p')";

/// Stateless PostgreSQL extractor. One connection per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgExtractor;

impl PgExtractor {
    pub fn new() -> Self {
        Self
    }

    async fn connect(&self, spec: &ConnectionSpec) -> Result<Client, ExtractError> {
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

        // The connection task ends when the client is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("Target connection closed: {}", e);
            }
        });

        Ok(client)
    }
}

#[async_trait]
impl Extractor for PgExtractor {
    async fn test_connection(
        &self,
        spec: &ConnectionSpec,
        deadline: Duration,
    ) -> Result<String, ExtractError> {
        with_deadline(deadline, async {
            let client = self.connect(spec).await?;
            let row = client
                .query_one(
                    "SELECT current_database()::text, \
                     split_part(version(), ' on ', 1)::text",
                    &[],
                )
                .await
                .map_err(|e| ExtractError::Query(e.to_string()))?;
            let dbname: String = row.get(0);
            let server: String = row.get(1);
            Ok(format!("{} / {}", server, dbname))
        })
        .await
    }

    async fn extract_all(
        &self,
        spec: &ConnectionSpec,
        deadline: Duration,
    ) -> Result<Vec<ProgrammableObject>, ExtractError> {
        with_deadline(deadline, async {
            let client = self.connect(spec).await?;
            let now = server_now(&client).await?;

            let mut objects = Vec::new();

            for row in client
                .query(VIEW_SQL, &[])
                .await
                .map_err(|e| ExtractError::Query(e.to_string()))?
            {
                objects.push(view_object(&row, now));
            }

            for row in client
                .query(ROUTINE_SQL, &[])
                .await
                .map_err(|e| ExtractError::Query(e.to_string()))?
            {
                objects.push(routine_object(&row, now));
            }

            Ok(objects)
        })
        .await
    }

    async fn extract_single(
        &self,
        spec: &ConnectionSpec,
        schema: &str,
        name: &str,
        deadline: Duration,
    ) -> Result<Option<ProgrammableObject>, ExtractError> {
        with_deadline(deadline, async {
            let client = self.connect(spec).await?;
            let now = server_now(&client).await?;

            let view_sql = format!("{} AND schemaname = $1 AND viewname = $2", VIEW_SQL);
            let view_rows = client
                .query(view_sql.as_str(), &[&schema, &name])
                .await
                .map_err(|e| ExtractError::Query(e.to_string()))?;
            if let Some(row) = view_rows.first() {
                return Ok(Some(view_object(row, now)));
            }

            let routine_sql = format!("{} AND n.nspname = $1 AND p.proname = $2", ROUTINE_SQL);
            let routine_rows = client
                .query(routine_sql.as_str(), &[&schema, &name])
                .await
                .map_err(|e| ExtractError::Query(e.to_string()))?;
            Ok(routine_rows.first().map(|row| routine_object(row, now)))
        })
        .await
    }
}

/// Race a future against the caller's deadline.
async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T, ExtractError>>,
) -> Result<T, ExtractError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ExtractError::Timeout(deadline.as_secs())),
    }
}

async fn server_now(client: &Client) -> Result<DateTime<Utc>, ExtractError> {
    let row = client
        .query_one("SELECT now()", &[])
        .await
        .map_err(|e| ExtractError::Query(e.to_string()))?;
    Ok(row.get(0))
}

fn view_object(row: &tokio_postgres::Row, now: DateTime<Utc>) -> ProgrammableObject {
    let schema: String = row.get(0);
    let name: String = row.get(1);
    let definition: Option<String> = row.get(2);
    ProgrammableObject {
        schema,
        name,
        kind: ObjectKind::View,
        definition: definition.unwrap_or_default(),
        last_modified: now,
    }
}

fn routine_object(row: &tokio_postgres::Row, now: DateTime<Utc>) -> ProgrammableObject {
    let schema: String = row.get(0);
    let name: String = row.get(1);
    let prokind: String = row.get(2);
    let returns_set: bool = row.get(3);
    let definition: Option<String> = row.get(4);

    let kind = match prokind.as_str() {
        "p" => ObjectKind::Procedure,
        _ if returns_set => ObjectKind::TableFunction,
        _ => ObjectKind::ScalarFunction,
    };

    ProgrammableObject {
        schema,
        name,
        kind,
        definition: definition.unwrap_or_default(),
        last_modified: now,
    }
}
