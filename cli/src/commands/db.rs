// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! State database maintenance commands
//!
//! Commands: stats, failures, reset, backup, restore

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use acl_migrator_core::{
    domain::{
        config::{ConfigManifest, DatabaseBackend},
        migration::MigrationStatus,
        repository::MigrationStateRepository,
    },
    infrastructure::repositories::SqliteMigrationStateRepository,
};

use super::format_status;

#[derive(Args)]
pub struct DbArgs {
    /// Path to the migration state database (default: from configuration)
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: DbCommand,
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// Show record counts by status
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the most recent failed items
    Failures {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Delete every migration record
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Write a point-in-time copy of the database
    Backup {
        /// Backup file to create (must not exist)
        #[arg(value_name = "FILE")]
        output: PathBuf,
    },

    /// Replace all records with the contents of a backup
    Restore {
        /// Backup file produced by `aclmig db backup`
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Confirm overwriting the current records
        #[arg(long)]
        yes: bool,
    },
}

pub async fn handle_command(args: DbArgs, config_override: Option<PathBuf>) -> Result<()> {
    let path = resolve_database_path(args.db, config_override)?;

    match args.command {
        DbCommand::Stats { json } => stats(&path, json).await,
        DbCommand::Failures { limit } => failures(&path, limit).await,
        DbCommand::Reset { yes } => reset(&path, yes).await,
        DbCommand::Backup { output } => backup(&path, &output).await,
        DbCommand::Restore { input, yes } => restore(&path, &input, yes).await,
    }
}

/// `--db` wins over the configured sqlite path
pub fn resolve_database_path(
    db_override: Option<PathBuf>,
    config_override: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(path) = db_override {
        return Ok(path);
    }

    let config = ConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    if config.spec.database.backend == DatabaseBackend::Memory {
        anyhow::bail!(
            "The configured state store is in-memory; pass --db to inspect a database file"
        );
    }
    Ok(config.spec.database.path)
}

/// Open an existing database; inspection never creates an empty one
async fn open_existing(path: &Path) -> Result<SqliteMigrationStateRepository> {
    if !path.is_file() {
        anyhow::bail!("No migration state database at {}", path.display());
    }
    SqliteMigrationStateRepository::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))
}

async fn stats(path: &Path, json: bool) -> Result<()> {
    let repo = open_existing(path).await?;
    let stats = repo.stats().await.context("Failed to read statistics")?;
    repo.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{} {}", "Migration state:".bold(), path.display());
    println!("  {}: {}", format_status(MigrationStatus::Success), stats.success_count);
    println!("  {}: {}", format_status(MigrationStatus::Skipped), stats.skipped_count);
    println!("  {}: {}", format_status(MigrationStatus::Failed), stats.failed_count);
    println!("  total: {}", stats.total_count.to_string().bold());

    Ok(())
}

async fn failures(path: &Path, limit: usize) -> Result<()> {
    let repo = open_existing(path).await?;
    let failed = repo
        .list_failed(limit)
        .await
        .context("Failed to list failed records")?;
    repo.close().await;

    if failed.is_empty() {
        println!("{}", "No failed items".green());
        return Ok(());
    }

    println!("{} failed items (most recent first):", failed.len());
    println!("{:<25} {:<22} {}", "LAST ATTEMPT", "KIND", "DESTINATION");
    for entry in failed {
        let record = entry.record;
        println!(
            "{:<25} {:<22} {}",
            record.last_attempt_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            record.error_kind.as_deref().unwrap_or("unknown").red(),
            entry.dest_path.display()
        );
        if let Some(detail) = record.error_detail {
            println!("{:<25} {}", "", detail.dimmed());
        }
    }

    Ok(())
}

async fn reset(path: &Path, yes: bool) -> Result<()> {
    if !path.is_file() {
        println!("{}", format!("Nothing to reset: {} does not exist", path.display()).yellow());
        return Ok(());
    }
    if !yes {
        anyhow::bail!(
            "Resetting deletes every migration record in {}; re-run with --yes to confirm",
            path.display()
        );
    }

    let repo = open_existing(path).await?;
    let removed = repo.reset().await.context("Failed to reset database")?;
    repo.close().await;

    println!(
        "{}",
        format!("✓ Removed {} migration records", removed).green()
    );
    Ok(())
}

async fn backup(path: &Path, output: &Path) -> Result<()> {
    let repo = open_existing(path).await?;
    repo.backup(output)
        .await
        .with_context(|| format!("Failed to back up to {}", output.display()))?;
    repo.close().await;

    println!(
        "{}",
        format!("✓ Backup written: {}", output.display()).green()
    );
    Ok(())
}

async fn restore(path: &Path, input: &Path, yes: bool) -> Result<()> {
    if path.is_file() && !yes {
        anyhow::bail!(
            "Restoring replaces every record in {}; re-run with --yes to confirm",
            path.display()
        );
    }

    let repo = SqliteMigrationStateRepository::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let restored = repo
        .restore(input)
        .await
        .with_context(|| format!("Failed to restore from {}", input.display()))?;
    repo.close().await;

    println!(
        "{}",
        format!("✓ Restored {} migration records from {}", restored, input.display()).green()
    );
    Ok(())
}
