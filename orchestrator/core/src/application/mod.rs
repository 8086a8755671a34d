// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod migration_service;
pub mod reporting;
pub mod repository_factory;

// Re-export use cases for convenience
pub use migration_service::{MigrationService, RunReport, StandardMigrationService};
pub use reporting::{FailedItem, MigrationReporter, RunSummary};
pub use repository_factory::create_state_repository;
