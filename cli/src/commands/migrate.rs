// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `aclmig migrate`
//!
//! Builds the production service graph (command-line ACL tools, SQLite state
//! store, event bus), runs one migration and prints the summary. Ctrl+C and
//! SIGTERM cancel the run; items already being processed finish first.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use acl_migrator_core::{
    application::{create_state_repository, MigrationService, RunReport, StandardMigrationService},
    domain::{
        config::{ConfigManifest, DatabaseBackend},
        events::{MigrationEvent, RunOutcome},
        migration::MigrationStatus,
    },
    infrastructure::{
        event_bus::{EventBus, EventBusError, EventReceiver},
        filesystem::{create_acl_filesystem, FilesystemBackend},
    },
};

use super::format_status;

pub const EXIT_COMPLETED: i32 = 0;
pub const EXIT_FAILURES: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

const PROGRESS_EVERY: u64 = 1000;
const FAILURES_SHOWN: usize = 20;

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Source path (file or directory carrying POSIX ACLs)
    #[arg(short, long, value_name = "PATH")]
    pub source: PathBuf,

    /// Destination path (file or directory on the NFSv4 export)
    #[arg(short, long, value_name = "PATH")]
    pub dest: PathBuf,

    /// Number of concurrent workers (1-32)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Skip items whose ACL, ownership, mtime and output settings are unchanged
    /// since their last successful migration
    #[arg(long)]
    pub incremental: bool,

    /// Also migrate owner and group
    #[arg(long)]
    pub ownership: bool,

    /// Only visit directories; files are neither read nor written
    #[arg(long)]
    pub folder_only: bool,

    /// NFSv4 domain appended to named principals (e.g. example.com)
    #[arg(long)]
    pub domain: Option<String>,

    /// Append the domain to owner and group names as well
    #[arg(long)]
    pub qualify_ownership: bool,

    /// Path to the migration state database
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

impl MigrateArgs {
    /// Command-line flags win over file and environment values
    pub fn apply_overrides(&self, config: &mut ConfigManifest) {
        let migration = &mut config.spec.migration;
        if let Some(workers) = self.workers {
            migration.workers = workers;
        }
        if let Some(domain) = &self.domain {
            migration.domain = domain.clone();
        }
        migration.incremental |= self.incremental;
        migration.ownership |= self.ownership;
        migration.folder_only |= self.folder_only;
        migration.qualify_ownership |= self.qualify_ownership;

        if let Some(db) = &self.db {
            config.spec.database.backend = DatabaseBackend::Sqlite;
            config.spec.database.path = db.clone();
        }
    }
}

pub fn exit_code(outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Completed => EXIT_COMPLETED,
        RunOutcome::CompletedWithFailures => EXIT_FAILURES,
        RunOutcome::Interrupted => EXIT_INTERRUPTED,
    }
}

/// Run a migration and return the process exit code
pub async fn execute(args: MigrateArgs, config_path: Option<PathBuf>) -> Result<i32> {
    let mut config =
        ConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    args.apply_overrides(&mut config);
    config
        .validate()
        .context("Configuration validation failed")?;

    let repository = create_state_repository(&config.spec.database.storage_backend())
        .await
        .context("Failed to open migration state store")?;
    let filesystem = create_acl_filesystem(FilesystemBackend::Command(config.spec.tools.clone()));
    let event_bus = Arc::new(EventBus::with_default_capacity());

    let service = StandardMigrationService::new(
        filesystem,
        repository,
        event_bus.clone(),
        config.spec.migration.clone(),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    // subscribe before the run starts so RunFinished cannot be missed
    let printer = (!args.json).then(|| tokio::spawn(print_progress(event_bus.subscribe())));

    if !args.json {
        println!(
            "Migrating {} → {}",
            args.source.display().to_string().bold(),
            args.dest.display().to_string().bold()
        );
    }

    let result = service.run(&args.source, &args.dest, cancel).await;

    let report = match result {
        Ok(report) => {
            if let Some(printer) = printer {
                let _ = printer.await;
            }
            report
        }
        Err(e) => {
            if let Some(printer) = printer {
                printer.abort();
            }
            return Err(e).context("Migration aborted before any item was processed");
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(exit_code(report.outcome))
}

/// Cancel the run on Ctrl+C or SIGTERM
async fn cancel_on_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, finishing in-flight items");
        },
        _ = terminate => {
            info!("Received SIGTERM signal, finishing in-flight items");
        },
    }
    cancel.cancel();
}

/// Echo failures as they happen and a running count until the run finishes
async fn print_progress(mut events: EventReceiver) {
    let mut completed: u64 = 0;

    loop {
        match events.recv().await {
            Ok(MigrationEvent::ItemCompleted {
                source_path,
                status,
                error_kind,
                ..
            }) => {
                completed += 1;
                if status == MigrationStatus::Failed {
                    println!(
                        "  {} {} [{}]",
                        format_status(status),
                        source_path.display(),
                        error_kind.as_deref().unwrap_or("unknown")
                    );
                }
                if completed % PROGRESS_EVERY == 0 {
                    println!("  {} items processed...", completed.to_string().bold());
                }
            }
            Ok(MigrationEvent::RunFinished { .. }) | Err(EventBusError::Closed) => break,
            Ok(MigrationEvent::RunStarted { .. }) | Err(_) => {}
        }
    }
}

fn format_outcome(outcome: RunOutcome) -> colored::ColoredString {
    match outcome {
        RunOutcome::Completed => outcome.as_str().green(),
        RunOutcome::CompletedWithFailures => outcome.as_str().yellow(),
        RunOutcome::Interrupted => outcome.as_str().red(),
    }
}

fn colorize_failed(failed: u64) -> colored::ColoredString {
    if failed == 0 {
        failed.to_string().normal()
    } else {
        failed.to_string().red().bold()
    }
}

fn print_report(report: &RunReport) {
    let summary = &report.summary;
    let elapsed = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;

    println!();
    println!("{} {}", "Migration finished:".bold(), format_outcome(report.outcome));
    println!("  Run ID:     {}", report.run_id);
    println!("  Enumerated: {}", summary.enumerated);
    println!("  Succeeded:  {}", summary.succeeded.to_string().green());
    println!("  Skipped:    {}", summary.skipped.to_string().blue());
    println!("  Failed:     {}", colorize_failed(summary.failed));
    println!("  Elapsed:    {:.1}s", elapsed);

    if summary.failures.is_empty() {
        return;
    }

    println!();
    println!("{}", "Failures:".bold());
    for failure in summary.failures.iter().take(FAILURES_SHOWN) {
        println!(
            "  {} {} [{}] {}",
            "✗".red(),
            failure.source_path.display(),
            failure.error_kind,
            failure.error_detail.dimmed()
        );
    }
    if summary.failures.len() > FAILURES_SHOWN {
        println!(
            "  ... and {} more (see `aclmig db failures`)",
            summary.failures.len() - FAILURES_SHOWN
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: MigrateArgs,
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(RunOutcome::Completed), 0);
        assert_eq!(exit_code(RunOutcome::CompletedWithFailures), 1);
        assert_eq!(exit_code(RunOutcome::Interrupted), 130);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = TestCli::parse_from([
            "aclmig",
            "-s",
            "/data/src",
            "-d",
            "/data/dst",
            "-w",
            "12",
            "--incremental",
            "--domain",
            "example.com",
            "--db",
            "/var/lib/aclmig/state.db",
        ]);

        let mut config = ConfigManifest::default();
        config.spec.migration.ownership = true;
        config.spec.database.backend = DatabaseBackend::Memory;
        cli.args.apply_overrides(&mut config);

        let migration = &config.spec.migration;
        assert_eq!(migration.workers, 12);
        assert!(migration.incremental);
        // file values survive when the flag is absent
        assert!(migration.ownership);
        assert!(!migration.folder_only);
        assert_eq!(migration.domain, "example.com");
        assert_eq!(config.spec.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(config.spec.database.path, PathBuf::from("/var/lib/aclmig/state.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_workers_fail_validation() {
        let cli = TestCli::parse_from(["aclmig", "-s", "/a", "-d", "/b", "--workers", "64"]);
        let mut config = ConfigManifest::default();
        cli.args.apply_overrides(&mut config);
        assert!(config.validate().is_err());
    }
}
