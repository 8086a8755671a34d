// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use acl_migrator_core::domain::config::{ConfigManifest, DatabaseBackend};

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./aclmig-config.yaml)
        #[arg(short, long, default_value = "./aclmig-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate {
            output,
            examples,
            force,
        } => generate(output, examples, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = ConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. ACLMIG_CONFIG_PATH: {}",
            std::env::var("ACLMIG_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aclmig-config.yaml");
        println!("  4. ~/.aclmig/config.yaml");
        println!("  5. /etc/aclmig/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    println!("{} {}", "Current configuration:".bold(), config.metadata.name);
    println!();

    let migration = &config.spec.migration;
    println!("{}", "Migration:".bold());
    println!("  Workers: {}", migration.workers);
    println!("  Incremental: {}", migration.incremental);
    println!("  Ownership: {}", migration.ownership);
    println!("  Folder only: {}", migration.folder_only);
    if migration.domain.is_empty() {
        println!("  Domain: {}", "(none)".dimmed());
    } else {
        println!("  Domain: {}", migration.domain);
        println!("  Qualify ownership: {}", migration.qualify_ownership);
    }
    println!();

    println!("{}", "State database:".bold());
    match config.spec.database.backend {
        DatabaseBackend::Sqlite => println!("  SQLite: {}", config.spec.database.path.display()),
        DatabaseBackend::Memory => println!("  In-memory"),
    }
    println!();

    let tools = &config.spec.tools;
    println!("{}", "Tools:".bold());
    println!("  getfacl: {}", tools.getfacl);
    println!("  nfs4_setfacl: {}", tools.nfs4_setfacl);
    println!("  nfs4_getfacl: {}", tools.nfs4_getfacl);
    println!("  chown: {}", tools.chown);
    println!("  Timeout: {}s", tools.timeout_seconds);
    println!();

    println!("{}", "Logging:".bold());
    println!("  Level: {}", config.spec.logging.level);

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid_manifests() {
        for template in [MINIMAL_TEMPLATE, EXAMPLES_TEMPLATE] {
            let config = ConfigManifest::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_minimal_template_matches_defaults() {
        let config = ConfigManifest::from_yaml_str(MINIMAL_TEMPLATE).unwrap();
        assert_eq!(config.spec, ConfigManifest::default().spec);
    }

    #[tokio::test]
    async fn test_generate_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("aclmig-config.yaml");

        generate(output.clone(), false, false).await.unwrap();
        assert!(generate(output.clone(), true, false).await.is_err());
        generate(output.clone(), true, true).await.unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written, EXAMPLES_TEMPLATE);
    }
}
