// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for the migration state store. The interface is
//! defined in the domain layer and implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|-----------------|
//! | `MigrationStateRepository` | `MigrationRecord` | in-memory, SQLite |
//!
//! ## Storage Backend Abstraction
//!
//! The backend is selected at startup from configuration
//! (`aclmig-config.yaml`). In-memory storage is used for testing and dry
//! experiments; SQLite for every real run.

use crate::domain::migration::MigrationRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    Sqlite(SqliteConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    pub path: PathBuf,
}

/// Aggregate counts over every stored record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateStats {
    pub success_count: u64,
    pub failed_count: u64,
    pub skipped_count: u64,
    pub total_count: u64,
}

/// A failed record together with its key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub dest_path: PathBuf,
    pub record: MigrationRecord,
}

/// Durable mapping from destination path to last known outcome
#[async_trait]
pub trait MigrationStateRepository: Send + Sync {
    async fn lookup(&self, dest_path: &Path) -> Result<Option<MigrationRecord>, RepositoryError>;

    /// Atomic upsert. Concurrent writers to the same path: last writer wins.
    async fn record(
        &self,
        dest_path: &Path,
        record: &MigrationRecord,
    ) -> Result<(), RepositoryError>;

    /// Delete every record, returning how many were removed
    async fn reset(&self) -> Result<u64, RepositoryError>;

    async fn stats(&self) -> Result<StateStats, RepositoryError>;

    /// Most recent failures first
    async fn list_failed(&self, limit: usize) -> Result<Vec<FailedRecord>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                RepositoryError::Serialization(err.to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
