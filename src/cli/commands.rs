//! CLI command implementations
//!
//! Every command loads the configuration, applies flag overrides, wires the
//! file-backed version store and catalog, and prints one JSON response.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;

use crate::backup::{BackupManager, BackupOrchestrator};
use crate::config::AppConfig;
use crate::migrations::generator::MigrationGenerator;
use crate::migrations::{
    CatalogExecutor, DirectorySource, FileVersionStore, MigrationRegistry, MigrationRunner,
    MigrationTarget, MigrationVersion, VersionStore,
};

use super::args::{BackupsAction, Cli, Command, UpArgs};
use super::errors::{CliError, CliResult};
use super::io::{write_json, write_response};

/// File name of the catalog kept in `data_dir`
pub const CATALOG_FILE: &str = "catalog.json";

/// Run the parsed command line.
pub fn run(cli: Cli) -> CliResult<()> {
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    if let Some(collection) = cli.collection {
        config.collection_name = collection;
        config.validate()?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io_error("Failed to start runtime", e))?;

    match cli.command {
        Command::Up(args) => runtime.block_on(up(config, args)),
        Command::Status => runtime.block_on(status(&config)),
        Command::Version => runtime.block_on(version(&config)),
        Command::Create { name } => create(&config, &name),
        Command::Backups { action } => backups(&config, action),
    }
}

fn catalog_path(config: &AppConfig) -> PathBuf {
    config.data_dir.join(CATALOG_FILE)
}

fn version_store(config: &AppConfig) -> Arc<FileVersionStore> {
    Arc::new(FileVersionStore::for_config(&config.data_dir, &config.runner_config()))
}

/// Runner over the migrations directory, the catalog and the version store.
async fn build_runner(config: &AppConfig) -> CliResult<MigrationRunner<CatalogExecutor>> {
    let catalog = CatalogExecutor::open(catalog_path(config))
        .await
        .map_err(|e| CliError::boot_failed(format!("Failed to open catalog: {}", e)))?;

    let source = DirectorySource::new(&config.migrations_dir).verify_checksums(config.verify_checksums);
    let registry: MigrationRegistry<CatalogExecutor> = MigrationRegistry::load(&source)?;

    let mut runner =
        MigrationRunner::new(config.runner_config(), version_store(config), Arc::new(catalog))
            .with_registry(registry);

    if config.backup.enabled {
        let manager: Arc<dyn BackupOrchestrator> = Arc::new(BackupManager::new(config.backup.clone())?);
        runner = runner.with_backup(manager);
    }

    Ok(runner)
}

/// Resolve the target: explicit argument, else the latest registered version.
fn resolve_target(args: &UpArgs, latest: Option<MigrationVersion>) -> CliResult<MigrationTarget> {
    let mut target = match args.target.as_deref() {
        Some(input) => input.parse::<MigrationTarget>()?,
        None => MigrationTarget::to(latest.unwrap_or(MigrationVersion::ZERO)),
    };
    target.rerun |= args.rerun;
    Ok(target)
}

/// Apply `up` flags to the loaded config and re-check it.
fn apply_up_overrides(mut config: AppConfig, args: &UpArgs) -> CliResult<AppConfig> {
    if let Some(enabled) = args.backup_override() {
        config.backup.enabled = enabled;
    }
    if args.quiet_latest {
        config.log_if_latest = false;
    }
    config.validate()?;
    Ok(config)
}

async fn up(config: AppConfig, args: UpArgs) -> CliResult<()> {
    let config = apply_up_overrides(config, &args)?;
    let runner = build_runner(&config).await?;
    let target = resolve_target(&args, runner.registry().latest())?;
    let report = runner.migrate(target).await?;

    write_json(&report)
}

async fn status(config: &AppConfig) -> CliResult<()> {
    let runner = build_runner(config).await?;
    let report = runner.status().await?;
    write_json(&report)
}

async fn version(config: &AppConfig) -> CliResult<()> {
    let store = version_store(config);
    let record = store.record().await.map_err(crate::migrations::MigrationError::from)?;

    write_response(json!({
        "collection": config.collection_name,
        "path": store.path(),
        "record": record,
    }))
}

fn create(config: &AppConfig, name: &str) -> CliResult<()> {
    let generator = MigrationGenerator::new(&config.migrations_dir);
    let file_path = generator.create(name)?;
    let version = unit_version(&file_path);

    write_response(json!({
        "created": true,
        "version": version,
        "file": file_path,
    }))
}

/// Version named by the unit directory holding a generated script.
fn unit_version(script: &Path) -> Option<MigrationVersion> {
    script
        .parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .and_then(|name| name.parse().ok())
}

fn backups(config: &AppConfig, action: BackupsAction) -> CliResult<()> {
    let manager = BackupManager::new(config.backup.clone())?;

    match action {
        BackupsAction::List => {
            let archives = manager.list_archives()?;
            write_response(json!({
                "archive_dir": manager.archive_dir(),
                "archives": archives,
            }))
        }
        BackupsAction::Prune => {
            let deleted = manager.enforce_retention()?;
            write_response(json!({
                "deleted": deleted,
                "max_archives": config.backup.max_archives,
            }))
        }
    }
}
