//! Command handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};

use crate::baseline::BaselineManager;
use crate::cli::{BaselineCommand, Cli, Commands, OutputFormat};
use crate::compare::Comparator;
use crate::config::{Config, COMPARE_DEADLINE};
use crate::db::libsql::LibSqlBackend;
use crate::db::{ChangeStore, Database, ScanLogStore};
use crate::extract::{ConnectionSpec, PgExtractor};
use crate::model::{normalize_key, Environment, ObjectKind, ScanLog, ScanTrigger};
use crate::notify::TracingNotifier;
use crate::scan::{run_queue_worker, spawn_scheduler, CancelToken, ScanQueue, Scanner, ScannerDeps};
use crate::secrets::PlainCipher;
use crate::settings::Settings;

/// Execute the parsed command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Arc::new(
        Settings::load(Path::new(&cli.config))
            .with_context(|| format!("loading settings from {}", cli.config))?,
    );
    let config = Arc::new(Config::resolve(&settings)?);

    let backend = Arc::new(
        LibSqlBackend::new_local(Path::new(&config.repository.path))
            .await
            .context("opening repository")?,
    );
    backend.run_migrations().await.context("running migrations")?;
    let db: Arc<dyn Database> = backend;

    let deps = ScannerDeps {
        settings: Arc::clone(&settings),
        config: Arc::clone(&config),
        extractor: Arc::new(PgExtractor::new()),
        cipher: Arc::new(PlainCipher),
        notifier: Arc::new(TracingNotifier),
    };

    match cli.command {
        Commands::Serve => serve(config, deps).await,
        Commands::Scan {
            tenant,
            env,
            all,
            user,
        } => scan(db, deps, cli.format, tenant, env, all, user).await,
        Commands::Compare {
            source_tenant,
            source_env,
            target_tenant,
            target_env,
            kind,
            refresh,
        } => {
            compare(
                db,
                deps,
                cli.format,
                source_tenant,
                source_env,
                target_tenant,
                target_env,
                kind,
                refresh,
            )
            .await
        }
        Commands::Diff {
            snapshot_a,
            snapshot_b,
        } => diff(db, snapshot_a, snapshot_b).await,
        Commands::Fetch { tenant, env, name } => fetch(deps, tenant, env, name).await,
        Commands::Baseline { command } => {
            baseline(db, settings, cli.format, command).await
        }
        Commands::History { limit } => history(db, cli.format, limit).await,
        Commands::Changes { limit } => changes(db, cli.format, limit).await,
    }
}

async fn serve(config: Arc<Config>, deps: ScannerDeps) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    let repository_path = config.repository.path.clone();

    let scheduler = spawn_scheduler(repository_path.clone(), deps.clone(), cancel.child());

    let (_queue, rx) = ScanQueue::new(config.queue.capacity);
    let worker = tokio::spawn(run_queue_worker(
        rx,
        repository_path,
        deps,
        cancel.child(),
    ));

    tracing::info!("modwatch serving; press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("Shutting down");
    cancel.cancel();

    let _ = scheduler.await;
    let _ = worker.await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn scan(
    db: Arc<dyn Database>,
    deps: ScannerDeps,
    format: OutputFormat,
    tenant: Option<String>,
    env: Option<String>,
    all: bool,
    user: Option<String>,
) -> anyhow::Result<()> {
    let environment = env.as_deref().map(parse_environment).transpose()?;
    let max_parallel = deps.config.scheduler.max_parallel_tenants;
    let settings = Arc::clone(&deps.settings);
    let scanner = Scanner::new(db, deps, CancelToken::new());

    let log = match tenant {
        Some(tenant) => {
            let tenant_id = resolve_tenant(&settings, &tenant)?;
            scanner
                .run_single_scan(tenant_id, environment, ScanTrigger::Manual, user, all)
                .await?
        }
        None => {
            scanner
                .run_full_scan(ScanTrigger::Manual, user, max_parallel, all)
                .await?
        }
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&log)?),
        OutputFormat::Text => print_scan_log(&log),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn compare(
    db: Arc<dyn Database>,
    deps: ScannerDeps,
    format: OutputFormat,
    source_tenant: String,
    source_env: String,
    target_tenant: String,
    target_env: String,
    kind: Option<String>,
    refresh: bool,
) -> anyhow::Result<()> {
    let settings = Arc::clone(&deps.settings);
    let tenant_a = resolve_tenant(&settings, &source_tenant)?;
    let env_a = parse_environment(&source_env)?;
    let tenant_b = resolve_tenant(&settings, &target_tenant)?;
    let env_b = parse_environment(&target_env)?;
    let kind_filter = kind.as_deref().map(parse_kind).transpose()?;

    let comparator = Comparator::new(Arc::clone(&db));
    let result = if refresh {
        let scanner = Scanner::new(db, deps, CancelToken::new());
        comparator
            .compare_with_refresh(&scanner, tenant_a, env_a, tenant_b, env_b, kind_filter)
            .await?
    } else {
        comparator
            .compare(tenant_a, env_a, tenant_b, env_b, kind_filter)
            .await?
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!(
                "equal: {}  modified: {}  only in source: {}  only in target: {}",
                result.equal, result.modified, result.only_in_source, result.only_in_target
            );
            for item in &result.items {
                if item.status != crate::compare::ComparisonStatus::Equal {
                    println!("  {:14} {:4} {}", item.status.as_str(), item.kind, item.full_name);
                }
            }
            if result.is_in_sync() {
                println!("targets are in sync");
            }
        }
    }
    Ok(())
}

async fn diff(db: Arc<dyn Database>, snapshot_a: i64, snapshot_b: i64) -> anyhow::Result<()> {
    let comparator = Comparator::new(db);
    let diff = comparator.diff(snapshot_a, snapshot_b).await?;
    println!("+{} -{}", diff.added, diff.removed);
    println!("{}", diff.rendered);
    Ok(())
}

async fn fetch(
    deps: ScannerDeps,
    tenant: String,
    env: String,
    name: String,
) -> anyhow::Result<()> {
    let tenant_id = resolve_tenant(&deps.settings, &tenant)?;
    let environment = parse_environment(&env)?;
    let Some((schema, object_name)) = name.split_once('.') else {
        bail!("object name must be schema-qualified (schema.name)");
    };

    let tenant_settings = deps.settings.tenant(tenant_id)?;
    let conn = tenant_settings
        .connection(environment)
        .with_context(|| format!("tenant {} has no {} environment", tenant, environment))?;
    let password = deps
        .cipher
        .decrypt(&conn.password)
        .await
        .map_err(|e| anyhow::anyhow!("credential error: {}", e))?;
    let spec = ConnectionSpec::from_settings(
        conn,
        password,
        deps.config.scheduler.connection_timeout,
    );

    let object = deps
        .extractor
        .extract_single(&spec, schema, object_name, COMPARE_DEADLINE)
        .await?
        .with_context(|| format!("object {} not found", name))?;

    println!(
        "{} {}  hash {}  modified {}",
        object.kind,
        object.full_name(),
        object.definition_hash(),
        object.last_modified.format("%Y-%m-%d %H:%M:%S")
    );
    println!("{}", object.definition);
    Ok(())
}

async fn baseline(
    db: Arc<dyn Database>,
    settings: Arc<Settings>,
    format: OutputFormat,
    command: BaselineCommand,
) -> anyhow::Result<()> {
    let manager = BaselineManager::new(db, Arc::clone(&settings));

    match command {
        BaselineCommand::Create {
            name,
            tenant,
            env,
            description,
            user,
        } => {
            let tenant_id = resolve_tenant(&settings, &tenant)?;
            let environment = parse_environment(&env)?;
            let (id, count) = manager
                .create(&name, description, user, tenant_id, environment)
                .await?;
            println!("baseline {} created: id {}, {} objects", name, id, count);
        }
        BaselineCommand::List => {
            let baselines = manager.list().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&baselines)?),
                OutputFormat::Text => {
                    for b in &baselines {
                        println!(
                            "{:4}  {:24}  {}/{}  {} objects  {}",
                            b.id,
                            b.name,
                            b.source_tenant_code,
                            b.source_environment,
                            b.total_objects,
                            b.created_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                    if baselines.is_empty() {
                        println!("no baselines");
                    }
                }
            }
        }
        BaselineCommand::Show { id } => {
            let Some(meta) = manager.get(id).await? else {
                bail!("baseline {} not found", id);
            };
            let objects = manager.objects(id).await?;
            match format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&serde_json::json!({
                            "baseline": meta,
                            "objects": objects,
                        }))?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{} ({}/{}): {} objects, created {}",
                        meta.name,
                        meta.source_tenant_code,
                        meta.source_environment,
                        meta.total_objects,
                        meta.created_at.format("%Y-%m-%d %H:%M")
                    );
                    for object in &objects {
                        println!("  {:4} {}  {}", object.kind, object.full_name, object.definition_hash);
                    }
                }
            }
        }
        BaselineCommand::Delete { id } => {
            manager.delete(id).await?;
            println!("baseline {} deleted", id);
        }
        BaselineCommand::Compare { id } => {
            let result = manager.compare_to_live(id).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                OutputFormat::Text => {
                    println!(
                        "equal: {}  modified: {}  only in baseline: {}  only live: {}",
                        result.equal, result.modified, result.only_in_source, result.only_in_target
                    );
                    for item in &result.items {
                        if item.status != crate::compare::ComparisonStatus::Equal {
                            println!("  {:14} {}", item.status.as_str(), item.full_name);
                        }
                    }
                }
            }
        }
        BaselineCommand::Script { id } => {
            let Some((_, objects)) = manager.load_with_definitions(id).await? else {
                bail!("baseline {} not found", id);
            };
            let definitions: std::collections::HashMap<String, String> = objects
                .into_iter()
                .map(|(object, definition)| (normalize_key(&object.full_name), definition))
                .collect();
            let result = manager.compare_to_live(id).await?;
            let script = crate::sync::generate_sync_script(&result, |name| {
                definitions.get(&normalize_key(name)).cloned()
            });
            if script.is_empty() {
                println!("-- target matches baseline; nothing to apply");
            } else {
                println!("{}", script);
            }
        }
    }
    Ok(())
}

async fn history(db: Arc<dyn Database>, format: OutputFormat, limit: u32) -> anyhow::Result<()> {
    let logs = db.list_recent_scan_logs(limit).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&logs)?),
        OutputFormat::Text => {
            for log in &logs {
                print_scan_log(log);
                for entry in db.list_scan_entries(log.id).await? {
                    let state = if entry.success { "ok" } else { "FAILED" };
                    println!(
                        "    {}/{}  {}  found {}  +{} ~{} -{}  {:.1}s{}",
                        entry.tenant_code,
                        entry.environment,
                        state,
                        entry.objects_found,
                        entry.objects_new,
                        entry.objects_modified,
                        entry.objects_deleted,
                        entry.duration_seconds,
                        entry
                            .error_message
                            .as_deref()
                            .map(|m| format!("  ({})", m))
                            .unwrap_or_default()
                    );
                }
            }
            if logs.is_empty() {
                println!("no scans recorded");
            }
        }
    }
    Ok(())
}

async fn changes(db: Arc<dyn Database>, format: OutputFormat, limit: u32) -> anyhow::Result<()> {
    let changes = db.list_recent_changes(limit).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&changes)?),
        OutputFormat::Text => {
            for change in &changes {
                println!(
                    "{}  {:8}  {}/{}  {:4} {}",
                    change.detected_at.format("%Y-%m-%d %H:%M:%S"),
                    change.change_type.as_str(),
                    change.tenant_code,
                    change.environment,
                    change.kind,
                    change.full_name
                );
            }
            if changes.is_empty() {
                println!("no changes detected");
            }
        }
    }
    Ok(())
}

fn print_scan_log(log: &ScanLog) {
    println!(
        "scan {}  {}  {}  tenants {}  targets {}  objects {}  changes {}  errors {}",
        log.id,
        log.started_at.format("%Y-%m-%d %H:%M:%S"),
        log.status.as_str(),
        log.total_tenants,
        log.total_environments,
        log.total_objects_scanned,
        log.total_changes_detected,
        log.total_errors
    );
    if let Some(summary) = &log.error_summary {
        for line in summary.lines() {
            println!("    ! {}", line);
        }
    }
}

/// Accept a tenant by numeric id or by code.
fn resolve_tenant(settings: &Settings, value: &str) -> anyhow::Result<i32> {
    if let Ok(id) = value.parse::<i32>() {
        settings.tenant(id)?;
        return Ok(id);
    }
    settings
        .tenant_by_code(value)
        .map(|tenant| tenant.id)
        .with_context(|| format!("unknown tenant '{}'", value))
}

fn parse_environment(value: &str) -> anyhow::Result<Environment> {
    Environment::parse(value).with_context(|| format!("unknown environment '{}'", value))
}

fn parse_kind(value: &str) -> anyhow::Result<ObjectKind> {
    ObjectKind::from_code(value).with_context(|| format!("unknown object kind '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TenantSettings;

    fn settings_with_tenant() -> Settings {
        let mut settings = Settings::default();
        settings.tenants.push(TenantSettings {
            id: 7,
            code: "ACME".to_string(),
            name: "Acme Corp".to_string(),
            environments: Default::default(),
        });
        settings
    }

    #[test]
    fn resolve_tenant_accepts_id_and_code() {
        let settings = settings_with_tenant();
        assert_eq!(resolve_tenant(&settings, "7").unwrap(), 7);
        assert_eq!(resolve_tenant(&settings, "acme").unwrap(), 7);
        assert!(resolve_tenant(&settings, "8").is_err());
        assert!(resolve_tenant(&settings, "globex").is_err());
    }

    #[test]
    fn parse_helpers_reject_garbage() {
        assert!(parse_environment("qa").is_err());
        assert!(parse_kind("XX").is_err());
        assert_eq!(parse_kind("v").unwrap(), ObjectKind::View);
    }
}
