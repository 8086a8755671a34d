// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Behavioural contract shared by every state store backend, exercised
//! through `create_state_repository`.

use acl_migrator_core::application::create_state_repository;
use acl_migrator_core::domain::errors::MigrationError;
use acl_migrator_core::domain::migration::{Fingerprint, MigrationRecord, MigrationStatus};
use acl_migrator_core::domain::repository::{MigrationStateRepository, SqliteConfig, StorageBackend};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

async fn backends(dir: &Path) -> Vec<(&'static str, Arc<dyn MigrationStateRepository>)> {
    let sqlite = StorageBackend::Sqlite(SqliteConfig {
        path: dir.join("state.db"),
    });
    vec![
        ("memory", create_state_repository(&StorageBackend::InMemory).await.unwrap()),
        ("sqlite", create_state_repository(&sqlite).await.unwrap()),
    ]
}

fn unwritable(path: &str) -> MigrationError {
    MigrationError::UnwritableDest {
        path: PathBuf::from(path),
        reason: "Permission denied".to_string(),
    }
}

#[tokio::test]
async fn test_last_writer_wins_per_destination() {
    let dir = tempfile::tempdir().unwrap();
    for (name, repo) in backends(dir.path()).await {
        let dest = Path::new("/dst/report.pdf");
        let fp = Fingerprint::from_stored("abc");

        let source = PathBuf::from("/src/report.pdf");
        let failed = MigrationRecord::failed(source, fp.clone(), &unwritable("/dst/report.pdf"));
        repo.record(dest, &failed).await.unwrap();
        repo.record(dest, &MigrationRecord::succeeded(PathBuf::from("/src/report.pdf"), fp.clone()))
            .await
            .unwrap();

        let stored = repo.lookup(dest).await.unwrap().unwrap();
        assert_eq!(stored.status, MigrationStatus::Success, "{}", name);
        assert!(stored.error_kind.is_none(), "{}", name);
        assert!(stored.error_detail.is_none(), "{}", name);
        assert!(stored.permits_skip(&fp), "{}", name);
        assert_eq!(repo.stats().await.unwrap().total_count, 1, "{}", name);
    }
}

#[tokio::test]
async fn test_stats_and_failure_listing() {
    let dir = tempfile::tempdir().unwrap();
    for (name, repo) in backends(dir.path()).await {
        let fp = Fingerprint::from_stored("f");
        for i in 0..3 {
            let dest = PathBuf::from(format!("/dst/ok{}", i));
            let source = PathBuf::from(format!("/src/ok{}", i));
            repo.record(&dest, &MigrationRecord::succeeded(source, fp.clone()))
                .await
                .unwrap();
        }
        let skipped = MigrationRecord::skipped(PathBuf::from("/src/same"), fp.clone());
        repo.record(Path::new("/dst/same"), &skipped).await.unwrap();
        for i in 0..2 {
            let dest = format!("/dst/bad{}", i);
            let source = PathBuf::from(format!("/src/bad{}", i));
            let failed = MigrationRecord::failed(source, fp.clone(), &unwritable(&dest));
            repo.record(Path::new(&dest), &failed).await.unwrap();
        }

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.success_count, 3, "{}", name);
        assert_eq!(stats.skipped_count, 1, "{}", name);
        assert_eq!(stats.failed_count, 2, "{}", name);
        assert_eq!(stats.total_count, 6, "{}", name);

        let failed = repo.list_failed(10).await.unwrap();
        assert_eq!(failed.len(), 2, "{}", name);
        assert!(failed
            .iter()
            .all(|f| f.record.error_kind.as_deref() == Some("unwritable_dest")));
        assert_eq!(repo.list_failed(1).await.unwrap().len(), 1, "{}", name);

        assert_eq!(repo.reset().await.unwrap(), 6, "{}", name);
        assert_eq!(repo.stats().await.unwrap().total_count, 0, "{}", name);
        assert!(repo.lookup(Path::new("/dst/ok0")).await.unwrap().is_none(), "{}", name);
    }
}

#[tokio::test]
async fn test_non_utf8_paths_keep_distinct_records() {
    let dir = tempfile::tempdir().unwrap();
    for (name, repo) in backends(dir.path()).await {
        let first = Path::new(OsStr::from_bytes(b"/dst/report-\xff.pdf"));
        let second = Path::new(OsStr::from_bytes(b"/dst/report-\xfe.pdf"));
        let first_source = PathBuf::from(OsStr::from_bytes(b"/src/report-\xff.pdf"));
        let second_source = PathBuf::from(OsStr::from_bytes(b"/src/report-\xfe.pdf"));

        let succeeded =
            MigrationRecord::succeeded(first_source.clone(), Fingerprint::from_stored("a"));
        repo.record(first, &succeeded).await.unwrap();
        let failed = MigrationRecord::failed(
            second_source.clone(),
            Fingerprint::from_stored("b"),
            &unwritable("/dst"),
        );
        repo.record(second, &failed).await.unwrap();

        assert_eq!(repo.stats().await.unwrap().total_count, 2, "{}", name);
        let stored = repo.lookup(first).await.unwrap().unwrap();
        assert_eq!(stored.source_path, first_source, "{}", name);
        assert_eq!(stored.status, MigrationStatus::Success, "{}", name);
        let stored = repo.lookup(second).await.unwrap().unwrap();
        assert_eq!(stored.source_path, second_source, "{}", name);

        let failed = repo.list_failed(10).await.unwrap();
        assert_eq!(failed.len(), 1, "{}", name);
        assert_eq!(failed[0].dest_path, second, "{}", name);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_to_distinct_paths() {
    let dir = tempfile::tempdir().unwrap();
    for (name, repo) in backends(dir.path()).await {
        let mut handles = Vec::new();
        for worker in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let dest = PathBuf::from(format!("/dst/w{}/f{}", worker, i));
                    let fp = Fingerprint::from_stored("x");
                    let record = MigrationRecord::succeeded(PathBuf::from("/src"), fp);
                    repo.record(&dest, &record).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(repo.stats().await.unwrap().success_count, 200, "{}", name);
    }
}
