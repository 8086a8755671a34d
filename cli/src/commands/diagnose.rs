// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `aclmig diagnose`
//!
//! Pre-flight checks for a migration host plus a dry translation of a single
//! path. With `--apply --dest` the translated ACL is written to the
//! destination and read back with `nfs4_getfacl`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use acl_migrator_core::{
    domain::{
        acl::NfsAce,
        config::{ConfigManifest, DatabaseBackend},
        filesystem::AclFilesystem,
        migration::ItemType,
        repository::MigrationStateRepository,
        translator::translate,
    },
    infrastructure::{
        filesystem::CommandAclFilesystem, repositories::SqliteMigrationStateRepository,
    },
};

#[derive(Args, Debug, Clone)]
pub struct DiagnoseArgs {
    /// Source path whose POSIX ACL should be translated
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Destination path for --apply
    #[arg(short, long, value_name = "PATH", requires = "path")]
    pub dest: Option<PathBuf>,

    /// Write the translated ACL to --dest and show the result
    #[arg(long, requires = "dest")]
    pub apply: bool,

    /// NFSv4 domain appended to named principals
    #[arg(long)]
    pub domain: Option<String>,
}

pub async fn execute(args: DiagnoseArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config =
        ConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    let domain = args
        .domain
        .clone()
        .unwrap_or_else(|| config.spec.migration.domain.clone());
    let fs = CommandAclFilesystem::new(config.spec.tools.clone());

    let tools_ok = check_tools(&fs).await;
    check_database(&config).await;

    let Some(path) = args.path else {
        if !tools_ok {
            anyhow::bail!("One or more required tools are unavailable");
        }
        return Ok(());
    };

    let aces = preview(&fs, &path, &domain).await?;

    if let (true, Some(dest)) = (args.apply, args.dest) {
        apply(&fs, &dest, &aces).await?;
    }

    Ok(())
}

async fn check_tools(fs: &CommandAclFilesystem) -> bool {
    println!("{}", "Tools:".bold());
    let mut all_ok = true;
    for check in fs.check_tools().await {
        if check.available {
            println!(
                "  {} {:<13} {} {}",
                "✓".green(),
                check.name,
                check.program,
                check.detail.dimmed()
            );
        } else {
            // nfs4_getfacl only serves this command
            if check.name != "nfs4_getfacl" {
                all_ok = false;
            }
            println!("  {} {:<13} {}", "✗".red(), check.name, check.detail.red());
        }
    }
    println!();
    all_ok
}

async fn check_database(config: &ConfigManifest) {
    println!("{}", "State database:".bold());
    let database = &config.spec.database;

    if database.backend == DatabaseBackend::Memory {
        println!("  in-memory (records are lost when the process exits)");
    } else if !database.path.is_file() {
        println!(
            "  {} {} (created on first migrate)",
            database.path.display(),
            "not found".yellow()
        );
    } else {
        match SqliteMigrationStateRepository::open(&database.path).await {
            Ok(repo) => {
                match repo.stats().await {
                    Ok(stats) => println!(
                        "  {} {} records ({} success, {} skipped, {} failed)",
                        database.path.display(),
                        stats.total_count,
                        stats.success_count,
                        stats.skipped_count,
                        stats.failed_count
                    ),
                    Err(e) => println!("  {} {}", database.path.display(), e.to_string().red()),
                }
                repo.close().await;
            }
            Err(e) => println!("  {} {}", database.path.display(), e.to_string().red()),
        }
    }
    println!();
}

/// Print the source ACL and its translation
async fn preview(fs: &CommandAclFilesystem, path: &Path, domain: &str) -> Result<Vec<NfsAce>> {
    let snapshot = fs
        .read_posix_acl(path)
        .await
        .with_context(|| format!("Failed to read POSIX ACL of {}", path.display()))?;

    let is_directory = snapshot.item_type == ItemType::Directory;
    println!(
        "{} {} ({})",
        "POSIX ACL:".bold(),
        path.display(),
        snapshot.item_type
    );
    println!("  owner: {}", snapshot.ownership.owner);
    println!("  group: {}", snapshot.ownership.group);
    for entry in &snapshot.entries {
        println!("  {}", entry);
    }
    println!();

    let aces = match translate(&snapshot.entries, is_directory, domain) {
        Ok(aces) => aces,
        Err(e) => {
            println!("{} {}", "✗ Translation failed:".red(), e);
            return Err(e.into());
        }
    };

    println!("{}", "NFSv4 ACL:".bold());
    for ace in &aces {
        println!("  {}", ace);
    }
    println!();

    Ok(aces)
}

async fn apply(fs: &CommandAclFilesystem, dest: &Path, aces: &[NfsAce]) -> Result<()> {
    println!("Applying to {}...", dest.display().to_string().bold());
    match fs.apply_nfs_acl(dest, aces).await {
        Ok(()) => println!("  {}", "✓ Applied".green()),
        Err(e) => {
            println!("  {} [{}] {}", "✗".red(), e.kind(), e);
            return Err(e.into());
        }
    }

    let current = fs
        .read_nfs_acl(dest)
        .await
        .with_context(|| format!("Failed to read back NFSv4 ACL of {}", dest.display()))?;
    println!();
    println!("{}", "Current NFSv4 ACL:".bold());
    for ace in &current {
        println!("  {}", ace);
    }

    let missing: Vec<&NfsAce> = aces.iter().filter(|ace| !current.contains(ace)).collect();
    if !missing.is_empty() {
        println!();
        println!("{}", "Entries not reported back by the server:".yellow());
        for ace in missing {
            println!("  {}", ace);
        }
    }

    Ok(())
}
