// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates the concrete state store implementation from the storage backend
//! configuration, keeping the domain layer free of infrastructure types.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select and open the migration state store

use std::sync::Arc;

use crate::domain::repository::{MigrationStateRepository, RepositoryError, StorageBackend};
use crate::infrastructure::repositories::{
    InMemoryMigrationStateRepository, SqliteMigrationStateRepository,
};

/// Creates a MigrationStateRepository implementation based on the configured backend
pub async fn create_state_repository(
    backend: &StorageBackend,
) -> Result<Arc<dyn MigrationStateRepository>, RepositoryError> {
    match backend {
        StorageBackend::InMemory => Ok(Arc::new(InMemoryMigrationStateRepository::new())),
        StorageBackend::Sqlite(config) => {
            let repo = SqliteMigrationStateRepository::open(&config.path).await?;
            Ok(Arc::new(repo))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::SqliteConfig;

    #[tokio::test]
    async fn test_creates_each_backend() {
        let memory = create_state_repository(&StorageBackend::InMemory).await.unwrap();
        assert_eq!(memory.stats().await.unwrap().total_count, 0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let backend = StorageBackend::Sqlite(SqliteConfig { path: path.clone() });
        let sqlite = create_state_repository(&backend).await.unwrap();
        assert_eq!(sqlite.stats().await.unwrap().total_count, 0);
        assert!(path.exists());
    }
}
