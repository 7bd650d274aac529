//! Lakeload Ingest - incremental landing-zone loader

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lakeload_common::logging::{init_logging, LogConfig, LogLevel};
use lakeload_ingest::manifest::refresh_manifest;
use lakeload_ingest::{CancellationFlag, Engine, IngestConfig, Store};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

/// Exit code when the run completed but at least one file failed
const EXIT_FILES_FAILED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "lakeload-ingest")]
#[command(author, version, about = "Incremental ingestion of landing-zone partitions")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one incremental ingestion pass
    Run {
        /// SQLite store path
        #[arg(long, env = "LAKELOAD_DB_PATH")]
        db: Option<PathBuf>,

        /// Landing directory
        #[arg(long, env = "LAKELOAD_LANDING_DIR")]
        landing: Option<PathBuf>,

        /// Ignore manifest fingerprints when deciding what to skip
        #[arg(long)]
        no_manifest_hint: bool,
    },

    /// Print the processing ledger
    Ledger {
        /// SQLite store path
        #[arg(long, env = "LAKELOAD_DB_PATH")]
        db: Option<PathBuf>,
    },

    /// Manifest maintenance
    Manifest {
        #[command(subcommand)]
        action: ManifestAction,
    },
}

#[derive(Subcommand, Debug)]
enum ManifestAction {
    /// Fingerprint every landing file and rewrite the manifest
    Refresh {
        /// Landing directory
        #[arg(long, env = "LAKELOAD_LANDING_DIR")]
        landing: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("lakeload-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env().context("Failed to load ingestion configuration")?;

    match cli.command {
        Command::Run {
            db,
            landing,
            no_manifest_hint,
        } => {
            let mut config = config;
            if let Some(db) = db {
                config = config.with_db_path(db);
            }
            if let Some(landing) = landing {
                config = config.with_landing_dir(landing);
            }
            if no_manifest_hint {
                config = config.with_manifest_hint(false);
            }
            run(config).await
        },
        Command::Ledger { db } => {
            let db_path = db.unwrap_or(config.db_path);
            let store = Store::open(&db_path)
                .with_context(|| format!("Failed to open store {}", db_path.display()))?;
            for entry in store.ledger().list()? {
                println!(
                    "{:<5} {:<28} {:>8} {:>8}  {}  {}  {}",
                    entry.status,
                    entry.file_name,
                    entry.rows_in,
                    entry.rows_inserted,
                    entry.processed_at.to_rfc3339(),
                    short_fingerprint(&entry.fingerprint),
                    entry.note
                );
            }
            Ok(ExitCode::SUCCESS)
        },
        Command::Manifest {
            action: ManifestAction::Refresh { landing },
        } => {
            let config = match landing {
                Some(landing) => config.with_landing_dir(landing),
                None => config,
            };
            let report = refresh_manifest(
                &config.landing_dir,
                &config.manifest_path(),
                &config.catalog,
                &config.fingerprint,
            )?;
            println!(
                "manifest {}: written={} unchanged={} removed={} failed={}",
                config.manifest_path().display(),
                report.written,
                report.unchanged,
                report.removed.len(),
                report.failed.len()
            );
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// Leading characters of a fingerprint for display
fn short_fingerprint(fingerprint: &str) -> String {
    fingerprint.chars().take(12).collect()
}

async fn run(config: IngestConfig) -> Result<ExitCode> {
    let cancel = CancellationFlag::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping after the current file");
                cancel.cancel();
            }
        })
    };

    info!(
        db = %config.db_path.display(),
        landing = %config.landing_dir.display(),
        "Starting run"
    );

    let summary = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut store = Store::open(&config.db_path)
            .with_context(|| format!("Failed to open store {}", config.db_path.display()))?;
        let summary = Engine::new(config)
            .with_cancellation(cancel)
            .run(&mut store)
            .context("Ingestion run failed")?;
        Ok(summary)
    })
    .await
    .context("Ingestion task panicked")??;

    watcher.abort();

    print!("{}", summary);
    for failure in summary.failures() {
        println!("FAILED {}: {}", failure.name, failure.note);
    }

    if summary.files_failed > 0 {
        Ok(ExitCode::from(EXIT_FILES_FAILED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
