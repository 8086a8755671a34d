// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Orchestrator runs over a real directory tree through the command backend,
//! with shell stand-ins for the ACL tools.

use acl_migrator_core::application::{MigrationService, StandardMigrationService};
use acl_migrator_core::domain::config::{MigrationConfig, ToolsConfig};
use acl_migrator_core::domain::events::RunOutcome;
use acl_migrator_core::domain::repository::MigrationStateRepository;
use acl_migrator_core::infrastructure::event_bus::EventBus;
use acl_migrator_core::infrastructure::filesystem::CommandAclFilesystem;
use acl_migrator_core::infrastructure::repositories::SqliteMigrationStateRepository;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn write_tool(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

fn stub_tools(dir: &Path) -> ToolsConfig {
    std::fs::create_dir_all(dir).unwrap();
    ToolsConfig {
        getfacl: write_tool(
            dir,
            "getfacl",
            "printf '# owner: alice\\n# group: staff\\nuser::rw-\\ngroup::r--\\nother::r--\\n'",
        ),
        nfs4_setfacl: write_tool(dir, "nfs4_setfacl", "exit 0"),
        nfs4_getfacl: write_tool(dir, "nfs4_getfacl", "exit 0"),
        chown: write_tool(dir, "chown", "exit 0"),
        ..ToolsConfig::default()
    }
}

/// `path` spelled relative to the current directory
fn relative_to_cwd(path: &Path) -> PathBuf {
    let cwd = std::env::current_dir().unwrap();
    let mut relative = PathBuf::new();
    for _ in cwd.components().skip(1) {
        relative.push("..");
    }
    relative.join(path.strip_prefix("/").unwrap())
}

fn mirror_tree(root: &Path) {
    for side in ["src", "dst"] {
        std::fs::create_dir_all(root.join(side).join("docs")).unwrap();
        std::fs::write(root.join(side).join("docs/a.txt"), b"a").unwrap();
        std::fs::write(root.join(side).join("b.txt"), b"b").unwrap();
    }
}

#[tokio::test]
async fn test_root_spelling_does_not_change_state_keys() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    mirror_tree(&root);
    std::os::unix::fs::symlink(root.join("dst"), root.join("dst-link")).unwrap();

    let repo = Arc::new(
        SqliteMigrationStateRepository::open(&root.join("state.db"))
            .await
            .unwrap(),
    );
    let svc = StandardMigrationService::new(
        Arc::new(CommandAclFilesystem::new(stub_tools(&root.join("tools")))),
        repo.clone(),
        Arc::new(EventBus::new(256)),
        MigrationConfig {
            incremental: true,
            ..MigrationConfig::default()
        },
    );

    let first = svc
        .run(&root.join("src"), &root.join("dst"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.outcome, RunOutcome::Completed);
    assert_eq!(first.summary.succeeded, 3);

    let spellings = [
        (relative_to_cwd(&root.join("src")), relative_to_cwd(&root.join("dst"))),
        (root.join("src/docs/.."), root.join("dst-link")),
        (root.join("./src/"), relative_to_cwd(&root.join("dst-link/."))),
    ];
    for (src, dst) in spellings {
        let report = svc.run(&src, &dst, CancellationToken::new()).await.unwrap();
        assert_eq!(report.summary.skipped, 3, "{} -> {}", src.display(), dst.display());
        assert_eq!(report.summary.succeeded, 0, "{} -> {}", src.display(), dst.display());
    }

    let stats = repo.stats().await.unwrap();
    assert_eq!(stats.total_count, 3);
    let record = repo.lookup(&root.join("dst/docs/a.txt")).await.unwrap().unwrap();
    assert_eq!(record.source_path, root.join("src/docs/a.txt"));
}
