// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! External Tool Filesystem Adapter
//!
//! `AclFilesystem` implementation that drives the standard Linux ACL tools:
//!
//! - `getfacl --absolute-names <path>` reads the POSIX ACL; its `# owner:` and
//!   `# group:` headers give the ownership names
//! - `nfs4_setfacl -s <spec> <path>` replaces the destination NFSv4 ACL
//! - `chown owner:group <path>` migrates ownership
//!
//! Every invocation is bounded by the configured timeout and killed if it
//! overruns. Tool stderr is classified into the migration error taxonomy.
//!
//! Traversal uses `walkdir` on a blocking thread, handing entries to the
//! async side through a bounded channel so memory stays flat on huge trees.

use crate::domain::acl::{render_acl_spec, GetfaclListing, NfsAce};
use crate::domain::config::ToolsConfig;
use crate::domain::errors::MigrationError;
use crate::domain::filesystem::{AclFilesystem, WorkItemStream};
use crate::domain::migration::{ItemType, SourceSnapshot, WorkItem};
use crate::domain::ownership::OwnershipRecord;
use crate::domain::path_mapping::PathMapper;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use walkdir::WalkDir;

const ENUMERATION_BUFFER: usize = 1024;

/// Captured result of one tool invocation
struct ToolOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Availability of one configured tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCheck {
    pub name: &'static str,
    pub program: String,
    pub available: bool,
    /// First line of the tool's version output, or why it could not run
    pub detail: String,
}

pub struct CommandAclFilesystem {
    tools: ToolsConfig,
    timeout: Duration,
}

impl CommandAclFilesystem {
    pub fn new(tools: ToolsConfig) -> Self {
        let timeout = Duration::from_secs(tools.timeout_seconds.max(1));
        Self { tools, timeout }
    }

    /// Run `program` with `args`, returning a human readable reason on
    /// spawn failure or timeout
    async fn run_tool(
        &self,
        program: &str,
        args: &[&std::ffi::OsStr],
    ) -> Result<ToolOutput, String> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::trace!(program, ?args, "Invoking ACL tool");

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(ToolOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Ok(Err(e)) => Err(format!("failed to run {}: {}", program, e)),
            Err(_) => Err(format!(
                "{} timed out after {}s",
                program,
                self.timeout.as_secs()
            )),
        }
    }

    /// Check every configured tool. A tool counts as available when it can
    /// be spawned at all; several of them exit non-zero on `--version`.
    pub async fn check_tools(&self) -> Vec<ToolCheck> {
        let tools = [
            ("getfacl", &self.tools.getfacl),
            ("nfs4_setfacl", &self.tools.nfs4_setfacl),
            ("nfs4_getfacl", &self.tools.nfs4_getfacl),
            ("chown", &self.tools.chown),
        ];

        let mut checks = Vec::with_capacity(tools.len());
        for (name, program) in tools {
            let check = match self.run_tool(program, &["--version".as_ref()]).await {
                Ok(output) => {
                    let text = if output.stdout.trim().is_empty() {
                        output.stderr
                    } else {
                        output.stdout
                    };
                    ToolCheck {
                        name,
                        program: program.clone(),
                        available: true,
                        detail: text.lines().next().unwrap_or("").trim().to_string(),
                    }
                }
                Err(reason) => ToolCheck {
                    name,
                    program: program.clone(),
                    available: false,
                    detail: reason,
                },
            };
            checks.push(check);
        }
        checks
    }

    /// Current NFSv4 ACL of `path` as reported by `nfs4_getfacl`
    pub async fn read_nfs_acl(&self, path: &Path) -> Result<Vec<NfsAce>, MigrationError> {
        let unreadable = |reason: String| MigrationError::UnwritableDest {
            path: path.to_path_buf(),
            reason,
        };

        let output = self
            .run_tool(&self.tools.nfs4_getfacl, &[path.as_os_str()])
            .await
            .map_err(unreadable)?;
        if !output.success {
            return Err(unreadable(output.stderr));
        }

        output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::parse::<NfsAce>)
            .collect()
    }
}

#[async_trait]
impl AclFilesystem for CommandAclFilesystem {
    async fn item_type(&self, path: &Path) -> Result<Option<ItemType>, MigrationError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => Ok(Some(ItemType::Directory)),
            Ok(_) => Ok(Some(ItemType::File)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MigrationError::UnreadableSource {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    async fn canonicalize(&self, path: &Path) -> Result<Option<PathBuf>, MigrationError> {
        match tokio::fs::canonicalize(path).await {
            Ok(canonical) => Ok(Some(canonical)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MigrationError::UnreadableSource {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    async fn read_posix_acl(&self, path: &Path) -> Result<SourceSnapshot, MigrationError> {
        let unreadable = |reason: String| MigrationError::UnreadableSource {
            path: path.to_path_buf(),
            reason,
        };

        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        let modified: DateTime<Utc> = meta
            .modified()
            .map_err(|e| unreadable(format!("no modification time: {}", e)))?
            .into();
        let item_type = if meta.is_dir() {
            ItemType::Directory
        } else {
            ItemType::File
        };

        let output = self
            .run_tool(
                &self.tools.getfacl,
                &["--absolute-names".as_ref(), path.as_os_str()],
            )
            .await
            .map_err(unreadable)?;
        if !output.success {
            return Err(unreadable(output.stderr));
        }

        let listing = GetfaclListing::parse(&output.stdout)?;
        if listing.entries.is_empty() {
            return Err(unreadable("getfacl returned no ACL entries".to_string()));
        }

        // getfacl prints names when it can resolve them and ids otherwise
        let ownership = OwnershipRecord::new(
            listing.owner.unwrap_or_else(|| meta.uid().to_string()),
            listing.group.unwrap_or_else(|| meta.gid().to_string()),
        );

        Ok(SourceSnapshot {
            entries: listing.entries,
            ownership,
            modified,
            item_type,
        })
    }

    async fn apply_nfs_acl(&self, path: &Path, aces: &[NfsAce]) -> Result<(), MigrationError> {
        let spec = render_acl_spec(aces);
        let output = self
            .run_tool(
                &self.tools.nfs4_setfacl,
                &["-s".as_ref(), spec.as_ref(), path.as_os_str()],
            )
            .await
            .map_err(|reason| MigrationError::UnwritableDest {
                path: path.to_path_buf(),
                reason,
            })?;

        if output.success {
            tracing::debug!(path = %path.display(), aces = aces.len(), "Applied NFSv4 ACL");
            Ok(())
        } else {
            Err(classify_acl_failure(path, &output.stderr))
        }
    }

    async fn apply_ownership(
        &self,
        path: &Path,
        ownership: &OwnershipRecord,
    ) -> Result<(), MigrationError> {
        let spec = ownership.to_string();
        let output = self
            .run_tool(&self.tools.chown, &[spec.as_ref(), path.as_os_str()])
            .await
            .map_err(|reason| MigrationError::InsufficientPrivilege {
                path: path.to_path_buf(),
                reason,
            })?;

        if output.success {
            tracing::debug!(path = %path.display(), %ownership, "Applied ownership");
            Ok(())
        } else {
            Err(classify_chown_failure(path, ownership, &output.stderr))
        }
    }

    fn enumerate(&self, mapper: PathMapper, folder_only: bool) -> WorkItemStream {
        if mapper.is_single_file() {
            if folder_only {
                return futures::stream::empty().boxed();
            }
            let item = mapper.work_item(mapper.source_root().to_path_buf(), ItemType::File);
            return futures::stream::once(async move { item }).boxed();
        }

        let (tx, rx) = mpsc::channel(ENUMERATION_BUFFER);
        tokio::task::spawn_blocking(move || walk(mapper, folder_only, tx));
        ReceiverStream::new(rx).boxed()
    }
}

fn walk(mapper: PathMapper, folder_only: bool, tx: mpsc::Sender<Result<WorkItem, MigrationError>>) {
    let walker = WalkDir::new(mapper.source_root())
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        // d_type from readdir decides this; files are never stat'ed
        .filter_entry(|entry| !folder_only || entry.file_type().is_dir());

    for entry in walker {
        let item = match entry {
            Ok(entry) => {
                let file_type = entry.file_type();
                let item_type = if file_type.is_dir() {
                    ItemType::Directory
                } else if file_type.is_file() {
                    ItemType::File
                } else {
                    tracing::debug!(path = %entry.path().display(), "Skipping non-regular entry");
                    continue;
                };
                mapper.work_item(entry.into_path(), item_type)
            }
            Err(e) => Err(MigrationError::UnreadableSource {
                path: e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| mapper.source_root().to_path_buf()),
                reason: e.to_string(),
            }),
        };

        if tx.blocking_send(item).is_err() {
            // Consumer went away (cancellation)
            tracing::debug!("Enumeration receiver dropped, stopping walk");
            return;
        }
    }
}

/// Map `nfs4_setfacl` stderr onto the error taxonomy
pub fn classify_acl_failure(path: &Path, stderr: &str) -> MigrationError {
    let lower = stderr.to_lowercase();
    let reason = if stderr.is_empty() {
        "nfs4_setfacl failed without diagnostics".to_string()
    } else {
        stderr.to_string()
    };

    if lower.contains("invalid argument")
        || lower.contains("unknown user")
        || lower.contains("unknown group")
        || lower.contains("no such user")
        || lower.contains("no such group")
        || lower.contains("failed to map")
    {
        MigrationError::UnresolvedPrincipal {
            path: path.to_path_buf(),
            reason,
        }
    } else {
        MigrationError::UnwritableDest {
            path: path.to_path_buf(),
            reason,
        }
    }
}

/// Map `chown` stderr onto the error taxonomy
pub fn classify_chown_failure(
    path: &Path,
    ownership: &OwnershipRecord,
    stderr: &str,
) -> MigrationError {
    let lower = stderr.to_lowercase();
    let reason = if stderr.is_empty() {
        "chown failed without diagnostics".to_string()
    } else {
        stderr.to_string()
    };

    if lower.contains("invalid group") {
        MigrationError::UnknownIdentity {
            path: path.to_path_buf(),
            identity: ownership.group.clone(),
            reason,
        }
    } else if lower.contains("invalid user") || lower.contains("invalid spec") {
        MigrationError::UnknownIdentity {
            path: path.to_path_buf(),
            identity: ownership.owner.clone(),
            reason,
        }
    } else {
        MigrationError::InsufficientPrivilege {
            path: path.to_path_buf(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_failure_classification() {
        let path = Path::new("/dst/a.txt");

        let err = classify_acl_failure(path, "Failed setxattr operation: Operation not permitted");
        assert!(matches!(err, MigrationError::UnwritableDest { .. }));

        let err = classify_acl_failure(path, "Failed setxattr operation: Operation not supported");
        assert!(matches!(err, MigrationError::UnwritableDest { .. }));

        let err = classify_acl_failure(path, "Failed setxattr operation: Invalid argument");
        assert!(matches!(err, MigrationError::UnresolvedPrincipal { .. }));

        let err = classify_acl_failure(path, "");
        assert!(matches!(err, MigrationError::UnwritableDest { .. }));
    }

    #[test]
    fn test_chown_failure_classification() {
        let path = Path::new("/dst/a.txt");
        let ownership = OwnershipRecord::new("alice", "dev");

        let err = classify_chown_failure(path, &ownership, "chown: invalid user: 'alice:dev'");
        assert_eq!(
            err,
            MigrationError::UnknownIdentity {
                path: PathBuf::from("/dst/a.txt"),
                identity: "alice".to_string(),
                reason: "chown: invalid user: 'alice:dev'".to_string(),
            }
        );

        let err = classify_chown_failure(path, &ownership, "chown: invalid group: 'alice:dev'");
        assert!(matches!(
            err,
            MigrationError::UnknownIdentity { ref identity, .. } if identity == "dev"
        ));

        let err = classify_chown_failure(
            path,
            &ownership,
            "chown: changing ownership of '/dst/a.txt': Operation not permitted",
        );
        assert!(matches!(err, MigrationError::InsufficientPrivilege { .. }));
    }

    fn directory_mapper(src: &Path, dst: &Path) -> PathMapper {
        PathMapper::new(src, dst, ItemType::Directory, Some(ItemType::Directory)).unwrap()
    }

    #[tokio::test]
    async fn test_enumerate_visits_every_entry_below_root() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("sub/deeper")).unwrap();
        std::fs::write(src.path().join("a.txt"), b"a").unwrap();
        std::fs::write(src.path().join("sub/b.txt"), b"b").unwrap();

        let fs = CommandAclFilesystem::new(ToolsConfig::default());
        let items: Vec<WorkItem> = fs
            .enumerate(directory_mapper(src.path(), dst.path()), false)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|i| i.source_path != src.path()));
        let b = items
            .iter()
            .find(|i| i.source_path.ends_with("sub/b.txt"))
            .unwrap();
        assert_eq!(b.dest_path, dst.path().join("sub/b.txt"));
        assert_eq!(b.item_type, ItemType::File);
    }

    #[tokio::test]
    async fn test_enumerate_folder_only() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("x/y")).unwrap();
        std::fs::create_dir_all(src.path().join("z")).unwrap();
        std::fs::write(src.path().join("x/file.txt"), b"f").unwrap();

        let fs = CommandAclFilesystem::new(ToolsConfig::default());
        let items: Vec<WorkItem> = fs
            .enumerate(directory_mapper(src.path(), dst.path()), true)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(items.len(), 3);
        assert!(items.iter().all(WorkItem::is_directory));
    }

    #[tokio::test]
    async fn test_folder_only_single_file_root_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&src, b"a").unwrap();
        std::fs::write(&dst, b"b").unwrap();
        let mapper = PathMapper::new(&src, &dst, ItemType::File, Some(ItemType::File)).unwrap();

        let fs = CommandAclFilesystem::new(ToolsConfig::default());
        let items: Vec<_> = fs.enumerate(mapper.clone(), true).collect().await;
        assert!(items.is_empty());
        let items: Vec<_> = fs.enumerate(mapper, false).collect().await;
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_canonicalize_resolves_links_and_dot_segments() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(real.join("dst/sub")).unwrap();
        std::os::unix::fs::symlink(real.join("dst"), real.join("link")).unwrap();

        let fs = CommandAclFilesystem::new(ToolsConfig::default());
        let expected = Some(real.join("dst"));
        assert_eq!(fs.canonicalize(&real.join("dst")).await.unwrap(), expected);
        assert_eq!(fs.canonicalize(&real.join("link")).await.unwrap(), expected);
        assert_eq!(fs.canonicalize(&real.join("dst/sub/..")).await.unwrap(), expected);
        assert_eq!(fs.canonicalize(&real.join("./dst/.")).await.unwrap(), expected);
        assert_eq!(fs.canonicalize(&real.join("missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_item_type() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"").unwrap();

        let fs = CommandAclFilesystem::new(ToolsConfig::default());
        assert_eq!(fs.item_type(dir.path()).await.unwrap(), Some(ItemType::Directory));
        assert_eq!(fs.item_type(&file).await.unwrap(), Some(ItemType::File));
        assert_eq!(fs.item_type(&dir.path().join("missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_check_tools_reports_missing_programs() {
        let tools = ToolsConfig {
            nfs4_setfacl: "/nonexistent/nfs4_setfacl".to_string(),
            ..ToolsConfig::default()
        };
        let checks = CommandAclFilesystem::new(tools).check_tools().await;
        assert_eq!(checks.len(), 4);
        let setfacl = checks.iter().find(|c| c.name == "nfs4_setfacl").unwrap();
        assert!(!setfacl.available);
        assert!(setfacl.detail.contains("/nonexistent/nfs4_setfacl"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported_as_unreadable_source() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolsConfig {
            getfacl: "/nonexistent/getfacl".to_string(),
            ..ToolsConfig::default()
        };
        let fs = CommandAclFilesystem::new(tools);
        let err = fs.read_posix_acl(dir.path()).await.unwrap_err();
        assert!(matches!(err, MigrationError::UnreadableSource { .. }));
    }
}
