// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # aclmig
//!
//! Migrates POSIX ACLs (and optionally ownership) from a source tree onto an
//! NFSv4 destination tree.
//!
//! ## Commands
//!
//! - `aclmig migrate -s SRC -d DST` - Run a migration
//! - `aclmig db stats|failures|reset|backup|restore` - Inspect the state database
//! - `aclmig diagnose [PATH]` - Check tools and preview one translation
//! - `aclmig config show|validate|generate` - Configuration management
//!
//! ## Exit codes
//!
//! `0` clean run, `1` run finished with failed items, `130` interrupted,
//! `2` run aborted before any item was processed.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use acl_migrator::commands::{self, ConfigCommand, DbArgs, DiagnoseArgs, MigrateArgs};
use acl_migrator_core::domain::config::ConfigManifest;

/// POSIX ACL to NFSv4 ACL migrator
#[derive(Parser)]
#[command(name = "aclmig")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "ACLMIG_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file value
    #[arg(long, global = true, env = "ACLMIG_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate ACLs from a source tree onto a destination tree
    #[command(name = "migrate")]
    Migrate(MigrateArgs),

    /// Inspect and maintain the migration state database
    #[command(name = "db")]
    Db(DbArgs),

    /// Check tool availability and preview the translation of one path
    #[command(name = "diagnose")]
    Diagnose(DiagnoseArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match &cli.log_level {
        Some(level) => level.clone(),
        None => ConfigManifest::load_or_default(cli.config.clone())
            .map(|config| config.spec.logging.level)
            .unwrap_or_else(|_| "info".to_string()),
    };
    init_logging(&level)?;

    match cli.command {
        Some(Commands::Migrate(args)) => match commands::migrate::execute(args, cli.config).await {
            Ok(code) => std::process::exit(code),
            Err(e) => {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
                std::process::exit(commands::migrate::EXIT_FATAL);
            }
        },
        Some(Commands::Db(args)) => commands::db::handle_command(args, cli.config).await,
        Some(Commands::Diagnose(args)) => commands::diagnose::execute(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
