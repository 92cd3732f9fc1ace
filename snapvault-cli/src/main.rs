/*!
Snapvault CLI - Command-line interface for full-store backups.

This CLI exports, lists, downloads, restores and purges whole-store snapshots of a
JSON collection directory, and can run the automatic backup schedule in the
foreground.
*/

use anyhow::Context;
use clap::{Parser, Subcommand};
use snapvault_core::schedule::DEFAULT_SCHEDULE_EXPRESSION;
use snapvault_core::{
    create_engine_from_config, ArtifactConfig, ArtifactStore, BackupScheduler, BackupSettings,
    JsonDirDataStore, SettingsDocument, SnapshotEngine, SnapvaultError,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::{error, info};

type Engine = SnapshotEngine<JsonDirDataStore, Box<dyn ArtifactStore>>;

#[derive(Parser)]
#[command(name = "snapvault")]
#[command(about = "Full-store snapshot, restore and purge for document collections")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Directory holding one JSON array file per collection
    #[arg(short, long, global = true, env = "SNAPVAULT_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Directory holding backup artifacts (defaults to ./backups)
    #[arg(short, long, global = true, env = "SNAPVAULT_BACKUP_DIR")]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export every collection into a new backup artifact
    Export {
        /// Print the full export receipt as JSON
        #[arg(long)]
        json: bool,
    },
    /// List backup artifacts, newest first
    List {
        /// Print `[{fileName, date, sizeBytes}]` as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Copy the raw bytes of a backup artifact
    Download {
        /// Artifact file name
        name: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace collections with the contents of a backup
    Restore {
        /// Artifact file name in the backup directory
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        name: Option<String>,
        /// Restore from a snapshot file anywhere on disk
        #[arg(long)]
        file: Option<PathBuf>,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Delete every document while keeping the collections
    Purge {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Run automatic backups until interrupted
    Schedule {
        /// Application settings document with a `backup` section
        #[arg(short, long, env = "SNAPVAULT_SETTINGS")]
        settings: Option<PathBuf>,
        /// Five-field cron expression, overriding the settings document
        #[arg(long)]
        cron: Option<String>,
    },
}

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "File")]
    file_name: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Size")]
    size: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("Error: {}", user_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), anyhow::Error> {
    let engine = create_engine(&cli)?;

    match cli.command {
        Commands::Export { json } => export_snapshot(&engine, json).await,
        Commands::List { json } => list_artifacts(&engine, json),
        Commands::Download { name, output } => download_artifact(&engine, &name, output.as_deref()),
        Commands::Restore { name, file, force } => {
            restore_snapshot(&engine, name.as_deref(), file.as_deref(), force).await
        }
        Commands::Purge { force } => purge_all(&engine, force).await,
        Commands::Schedule { settings, cron } => {
            run_schedule(engine, settings.as_deref(), cron).await
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    if json {
        if let Err(e) = snapvault_core::observability::init_observability(true) {
            eprintln!("Failed to initialize logging: {e}");
        }
        return;
    }

    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    // stdout is reserved for command output such as downloaded artifacts
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn create_engine(cli: &Cli) -> Result<Engine, anyhow::Error> {
    let config = match &cli.backup_dir {
        Some(dir) => ArtifactConfig::with_dir(dir),
        None => ArtifactConfig::default_local(),
    };
    let store = JsonDirDataStore::new(&cli.data_dir);

    Ok(create_engine_from_config(store, &config)?)
}

/// Message shown to the operator; details stay in the log
fn user_message(e: &anyhow::Error) -> String {
    match e.downcast_ref::<SnapvaultError>() {
        Some(err) if err.is_not_found() => "backup not found".to_string(),
        Some(err) if err.is_validation() => err.to_string(),
        Some(SnapvaultError::Connection(_)) => "data directory is not available".to_string(),
        Some(_) => "operation failed".to_string(),
        None => format!("{e:#}"),
    }
}

async fn export_snapshot(engine: &Engine, json: bool) -> Result<(), anyhow::Error> {
    let receipt = engine.export_snapshot().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        println!("{}", receipt.file_name);
    }
    Ok(())
}

fn list_artifacts(engine: &Engine, json: bool) -> Result<(), anyhow::Error> {
    let artifacts = engine.list_artifacts()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
        return Ok(());
    }

    if artifacts.is_empty() {
        println!("No backups found");
        return Ok(());
    }

    let rows: Vec<ArtifactRow> = artifacts
        .into_iter()
        .map(|info| ArtifactRow {
            date: format_timestamp(info.last_modified),
            size: format_size(info.size_bytes),
            file_name: info.file_name,
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

fn download_artifact(
    engine: &Engine,
    name: &str,
    output: Option<&Path>,
) -> Result<(), anyhow::Error> {
    let bytes = engine.read_artifact(name)?;

    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(file_name = %name, output = %path.display(), "Backup downloaded");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

enum RestoreSource<'a> {
    Artifact(&'a str),
    File(&'a Path),
}

async fn restore_snapshot(
    engine: &Engine,
    name: Option<&str>,
    file: Option<&Path>,
    force: bool,
) -> Result<(), anyhow::Error> {
    let source = match (name, file) {
        (_, Some(path)) => RestoreSource::File(path),
        (Some(name), None) => RestoreSource::Artifact(name),
        (None, None) => anyhow::bail!("either a backup name or --file is required"),
    };
    let label = match &source {
        RestoreSource::Artifact(name) => name.to_string(),
        RestoreSource::File(path) => path.display().to_string(),
    };

    if !force && !confirm(&format!("Replace the collections contained in '{label}'?"))? {
        println!("Restore cancelled");
        return Ok(());
    }

    let report = match source {
        RestoreSource::Artifact(name) => engine.restore_artifact(name).await?,
        RestoreSource::File(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            engine.restore_from_bytes(&bytes).await?
        }
    };

    println!(
        "Restored {} collection(s): {} document(s) removed, {} inserted",
        report.collections.len(),
        report.documents_deleted(),
        report.documents_inserted()
    );
    Ok(())
}

async fn purge_all(engine: &Engine, force: bool) -> Result<(), anyhow::Error> {
    if !force && !confirm("Delete every document in every collection?")? {
        println!("Purge cancelled");
        return Ok(());
    }

    let report = engine.purge_all().await?;
    println!(
        "Purged {} document(s) from {} collection(s)",
        report.deleted, report.collections
    );
    Ok(())
}

async fn run_schedule(
    engine: Engine,
    settings_path: Option<&Path>,
    cron: Option<String>,
) -> Result<(), anyhow::Error> {
    let settings = match (cron, settings_path) {
        (Some(expression), _) => BackupSettings::enabled(expression),
        (None, Some(path)) => SettingsDocument::from_path(path)?.backup,
        (None, None) => BackupSettings::enabled(DEFAULT_SCHEDULE_EXPRESSION),
    };

    if !settings.enabled {
        println!("Automatic backups are disabled in the settings document");
        return Ok(());
    }

    let scheduler = BackupScheduler::new(Arc::new(engine));
    scheduler.init_schedule(&settings)?;

    if let Some(next) = scheduler
        .current_expression()
        .and_then(|expression| expression.next_after(&chrono::Utc::now()))
    {
        println!(
            "Automatic backups on '{}', next at {}",
            settings.schedule_expression,
            format_timestamp(next)
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Interrupted, waiting for any running backup to finish");
    scheduler.shutdown().await;

    let stats = scheduler.stats();
    println!(
        "Scheduled backups: {} succeeded, {} failed",
        stats.runs_succeeded, stats.runs_failed
    );

    #[cfg(feature = "metrics")]
    if let Some(metrics) = snapvault_core::observability::SnapvaultMetrics::global() {
        println!("{}", metrics.gather_metrics()?);
    }

    Ok(())
}

fn confirm(question: &str) -> Result<bool, anyhow::Error> {
    print!("{question} (y/N): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().to_lowercase().starts_with('y'))
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
