// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the state store abstraction defined in
//! the domain layer, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve per-path migration records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **SqliteMigrationStateRepository** - durable store used by every real run
//! - **InMemoryMigrationStateRepository** - HashMap-backed store for tests
//!
//! # Design Principles
//!
//! 1. **Technology Agnostic**: Domain layer has no knowledge of persistence
//! 2. **Error Mapping**: Infrastructure errors mapped to domain RepositoryError

pub mod sqlite_state;

pub use sqlite_state::SqliteMigrationStateRepository;

use crate::domain::migration::{MigrationRecord, MigrationStatus};
use crate::domain::repository::{
    FailedRecord, MigrationStateRepository, RepositoryError, StateStats,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryMigrationStateRepository {
    records: Arc<RwLock<HashMap<PathBuf, MigrationRecord>>>,
}

impl InMemoryMigrationStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MigrationStateRepository for InMemoryMigrationStateRepository {
    async fn lookup(&self, dest_path: &Path) -> Result<Option<MigrationRecord>, RepositoryError> {
        Ok(self.records.read().get(dest_path).cloned())
    }

    async fn record(
        &self,
        dest_path: &Path,
        record: &MigrationRecord,
    ) -> Result<(), RepositoryError> {
        self.records
            .write()
            .insert(dest_path.to_path_buf(), record.clone());
        Ok(())
    }

    async fn reset(&self) -> Result<u64, RepositoryError> {
        let mut records = self.records.write();
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }

    async fn stats(&self) -> Result<StateStats, RepositoryError> {
        let records = self.records.read();
        let mut stats = StateStats::default();
        for record in records.values() {
            match record.status {
                MigrationStatus::Success => stats.success_count += 1,
                MigrationStatus::Failed => stats.failed_count += 1,
                MigrationStatus::Skipped => stats.skipped_count += 1,
            }
            stats.total_count += 1;
        }
        Ok(stats)
    }

    async fn list_failed(&self, limit: usize) -> Result<Vec<FailedRecord>, RepositoryError> {
        let records = self.records.read();
        let mut failed: Vec<FailedRecord> = records
            .iter()
            .filter(|(_, record)| record.status == MigrationStatus::Failed)
            .map(|(dest_path, record)| FailedRecord {
                dest_path: dest_path.clone(),
                record: record.clone(),
            })
            .collect();
        failed.sort_by(|a, b| {
            b.record
                .last_attempt_time
                .cmp(&a.record.last_attempt_time)
                .then_with(|| a.dest_path.cmp(&b.dest_path))
        });
        failed.truncate(limit);
        Ok(failed)
    }
}
