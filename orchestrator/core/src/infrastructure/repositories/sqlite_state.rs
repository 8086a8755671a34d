// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SQLite Migration State Repository
//!
//! Production `MigrationStateRepository` backed by the `migration_records`
//! table. One row per destination path, upserted on every attempt. Paths are
//! stored as their raw bytes, so names that are not valid UTF-8 keep distinct
//! keys.
//!
//! ```text
//! migration_records(
//!     dest_path PK, source_path, fingerprint, status,
//!     last_attempt_time, error_kind, error_detail
//! )
//! ```

use crate::domain::migration::{Fingerprint, MigrationRecord, MigrationStatus};
use crate::domain::repository::{
    FailedRecord, MigrationStateRepository, RepositoryError, StateStats,
};
use crate::infrastructure::db::Database;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, Row};
use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS migration_records (
        dest_path BLOB PRIMARY KEY NOT NULL,
        source_path BLOB NOT NULL,
        fingerprint TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('success', 'failed', 'skipped')),
        last_attempt_time TEXT NOT NULL,
        error_kind TEXT,
        error_detail TEXT
    )
"#;

const CREATE_STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_migration_records_status ON migration_records (status)";

pub struct SqliteMigrationStateRepository {
    db: Database,
}

impl SqliteMigrationStateRepository {
    /// Wrap an open database, creating the schema if needed
    pub async fn new(db: Database) -> Result<Self, RepositoryError> {
        let repo = Self { db };
        repo.migrate().await?;
        Ok(repo)
    }

    pub async fn open(path: &Path) -> Result<Self, RepositoryError> {
        let db = Database::open(path)
            .await
            .map_err(|e| {
                RepositoryError::Database(format!("Failed to open {}: {}", path.display(), e))
            })?;
        tracing::debug!(path = %path.display(), "Opened migration state database");
        Self::new(db).await
    }

    pub async fn open_in_memory() -> Result<Self, RepositoryError> {
        let db = Database::in_memory()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Self::new(db).await
    }

    async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::query(CREATE_TABLE).execute(self.db.get_pool()).await?;
        sqlx::query(CREATE_STATUS_INDEX).execute(self.db.get_pool()).await?;
        Ok(())
    }

    /// Write a consistent point-in-time copy of the database to `target`
    pub async fn backup(&self, target: &Path) -> Result<(), RepositoryError> {
        if target.exists() {
            return Err(RepositoryError::Database(format!(
                "Backup target already exists: {}",
                target.display()
            )));
        }
        sqlx::query("VACUUM INTO ?")
            .bind(target.to_string_lossy().into_owned())
            .execute(self.db.get_pool())
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to back up state: {}", e)))?;
        tracing::info!(target = %target.display(), "Migration state backed up");
        Ok(())
    }

    /// Replace every record with the contents of a backup file.
    ///
    /// Returns the number of restored records.
    pub async fn restore(&self, backup: &Path) -> Result<u64, RepositoryError> {
        if !backup.is_file() {
            return Err(RepositoryError::NotFound(format!(
                "Backup file not found: {}",
                backup.display()
            )));
        }

        let mut conn = self.db.get_pool().acquire().await?;
        sqlx::query("ATTACH DATABASE ? AS backup")
            .bind(backup.to_string_lossy().into_owned())
            .execute(&mut *conn)
            .await?;

        let copied = async {
            let mut tx = conn.begin().await?;
            sqlx::query("DELETE FROM main.migration_records")
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query(
                r#"
                INSERT INTO main.migration_records (
                    dest_path, source_path, fingerprint, status,
                    last_attempt_time, error_kind, error_detail
                )
                SELECT
                    dest_path, source_path, fingerprint, status,
                    last_attempt_time, error_kind, error_detail
                FROM backup.migration_records
                "#,
            )
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok::<u64, sqlx::Error>(result.rows_affected())
        }
        .await;

        // Detach even when the copy failed so the pooled connection stays clean
        sqlx::query("DETACH DATABASE backup").execute(&mut *conn).await?;

        let copied = copied?;
        tracing::info!(source = %backup.display(), records = copied, "Migration state restored");
        Ok(copied)
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

fn parse_record_row(row: &SqliteRow) -> Result<MigrationRecord, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<MigrationStatus>()
        .map_err(RepositoryError::Serialization)?;
    let source_path: Vec<u8> = row.try_get("source_path")?;
    let fingerprint: String = row.try_get("fingerprint")?;
    let last_attempt_time: DateTime<Utc> = row.try_get("last_attempt_time")?;

    Ok(MigrationRecord {
        source_path: path_from_key(source_path),
        fingerprint: Fingerprint::from_stored(fingerprint),
        status,
        last_attempt_time,
        error_kind: row.try_get("error_kind")?,
        error_detail: row.try_get("error_detail")?,
    })
}

fn path_key(path: &Path) -> &[u8] {
    path.as_os_str().as_bytes()
}

fn path_from_key(key: Vec<u8>) -> PathBuf {
    PathBuf::from(OsString::from_vec(key))
}

#[async_trait]
impl MigrationStateRepository for SqliteMigrationStateRepository {
    async fn lookup(&self, dest_path: &Path) -> Result<Option<MigrationRecord>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT source_path, fingerprint, status, last_attempt_time, error_kind, error_detail
            FROM migration_records
            WHERE dest_path = ?
            "#,
        )
        .bind(path_key(dest_path))
        .fetch_optional(self.db.get_pool())
        .await?;

        row.as_ref().map(parse_record_row).transpose()
    }

    async fn record(
        &self,
        dest_path: &Path,
        record: &MigrationRecord,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO migration_records (
                dest_path, source_path, fingerprint, status,
                last_attempt_time, error_kind, error_detail
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (dest_path) DO UPDATE SET
                source_path = excluded.source_path,
                fingerprint = excluded.fingerprint,
                status = excluded.status,
                last_attempt_time = excluded.last_attempt_time,
                error_kind = excluded.error_kind,
                error_detail = excluded.error_detail
            "#,
        )
        .bind(path_key(dest_path))
        .bind(path_key(&record.source_path))
        .bind(record.fingerprint.as_str())
        .bind(record.status.as_str())
        .bind(record.last_attempt_time)
        .bind(record.error_kind.as_deref())
        .bind(record.error_detail.as_deref())
        .execute(self.db.get_pool())
        .await
        .map_err(|e| {
            RepositoryError::Database(format!("Failed to record {}: {}", dest_path.display(), e))
        })?;

        Ok(())
    }

    async fn reset(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM migration_records")
            .execute(self.db.get_pool())
            .await?;
        tracing::info!(removed = result.rows_affected(), "Migration state reset");
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<StateStats, RepositoryError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM migration_records GROUP BY status",
        )
        .fetch_all(self.db.get_pool())
        .await?;

        let mut stats = StateStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            let count = count.max(0) as u64;
            match status.parse::<MigrationStatus>().map_err(RepositoryError::Serialization)? {
                MigrationStatus::Success => stats.success_count = count,
                MigrationStatus::Failed => stats.failed_count = count,
                MigrationStatus::Skipped => stats.skipped_count = count,
            }
            stats.total_count += count;
        }
        Ok(stats)
    }

    async fn list_failed(&self, limit: usize) -> Result<Vec<FailedRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT dest_path, source_path, fingerprint, status,
                   last_attempt_time, error_kind, error_detail
            FROM migration_records
            WHERE status = 'failed'
            ORDER BY last_attempt_time DESC, dest_path ASC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.db.get_pool())
        .await?;

        rows.iter()
            .map(|row| {
                let dest_path: Vec<u8> = row.try_get("dest_path")?;
                Ok(FailedRecord {
                    dest_path: path_from_key(dest_path),
                    record: parse_record_row(row)?,
                })
            })
            .collect()
    }
}
