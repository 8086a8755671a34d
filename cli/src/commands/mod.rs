// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the aclmig CLI

pub mod config;
pub mod db;
pub mod diagnose;
pub mod migrate;

pub use self::config::ConfigCommand;
pub use self::db::{DbArgs, DbCommand};
pub use self::diagnose::DiagnoseArgs;
pub use self::migrate::MigrateArgs;

use colored::Colorize;
use acl_migrator_core::domain::migration::MigrationStatus;

/// Colored rendering shared by the migrate and db commands
fn format_status(status: MigrationStatus) -> colored::ColoredString {
    match status {
        MigrationStatus::Success => status.as_str().green(),
        MigrationStatus::Skipped => status.as_str().blue(),
        MigrationStatus::Failed => status.as_str().red(),
    }
}
