// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory ACL Filesystem
//!
//! Deterministic `AclFilesystem` used by tests and dry runs. Source and
//! destination trees share one path-keyed map. The fake counts metadata reads
//! and can inject failures per path or per principal.

use crate::domain::acl::{NfsAce, PosixAclEntry};
use crate::domain::errors::MigrationError;
use crate::domain::filesystem::{AclFilesystem, WorkItemStream};
use crate::domain::migration::{ItemType, SourceSnapshot};
use crate::domain::ownership::OwnershipRecord;
use crate::domain::path_mapping::PathMapper;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Node {
    item_type: ItemType,
    entries: Vec<PosixAclEntry>,
    ownership: OwnershipRecord,
    modified: DateTime<Utc>,
    nfs_acl: Option<Vec<NfsAce>>,
}

#[derive(Default)]
struct Faults {
    read: HashMap<PathBuf, MigrationError>,
    apply: HashMap<PathBuf, MigrationError>,
    unresolvable_principals: HashSet<String>,
    unknown_identities: HashSet<String>,
    deny_ownership: bool,
}

#[derive(Default)]
struct Counters {
    acl_reads: AtomicUsize,
    file_acl_reads: AtomicUsize,
    file_stats: AtomicUsize,
    acl_applies: AtomicUsize,
    ownership_applies: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct InMemoryAclFilesystem {
    nodes: Arc<RwLock<BTreeMap<PathBuf, Node>>>,
    /// Symlink-like aliases, alias -> target
    aliases: Arc<RwLock<HashMap<PathBuf, PathBuf>>>,
    faults: Arc<RwLock<Faults>>,
    counters: Arc<Counters>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl InMemoryAclFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        &self,
        path: PathBuf,
        item_type: ItemType,
        entries: Vec<PosixAclEntry>,
        ownership: OwnershipRecord,
    ) {
        self.nodes.write().insert(
            path,
            Node {
                item_type,
                entries,
                ownership,
                modified: Utc::now(),
                nfs_acl: None,
            },
        );
    }

    pub fn add_directory(
        &self,
        path: impl Into<PathBuf>,
        entries: Vec<PosixAclEntry>,
        ownership: OwnershipRecord,
    ) {
        self.insert(path.into(), ItemType::Directory, entries, ownership);
    }

    pub fn add_file(
        &self,
        path: impl Into<PathBuf>,
        entries: Vec<PosixAclEntry>,
        ownership: OwnershipRecord,
    ) {
        self.insert(path.into(), ItemType::File, entries, ownership);
    }

    /// Replace the POSIX ACL of an existing path and bump its mtime
    pub fn set_posix_acl(&self, path: &Path, entries: Vec<PosixAclEntry>) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(path) {
            Some(node) => {
                node.entries = entries;
                node.modified = node.modified + ChronoDuration::nanoseconds(1);
                true
            }
            None => false,
        }
    }

    /// Advance the mtime of a path without changing its ACL
    pub fn touch(&self, path: &Path) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(path) {
            Some(node) => {
                node.modified = node.modified + ChronoDuration::nanoseconds(1);
                true
            }
            None => false,
        }
    }

    /// Make `alias` resolve to `target`, like a directory symlink
    pub fn add_alias(&self, alias: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        self.aliases.write().insert(alias.into(), target.into());
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.nodes.write().remove(path).is_some()
    }

    pub fn nfs_acl(&self, path: &Path) -> Option<Vec<NfsAce>> {
        self.nodes.read().get(path).and_then(|n| n.nfs_acl.clone())
    }

    pub fn ownership(&self, path: &Path) -> Option<OwnershipRecord> {
        self.nodes.read().get(path).map(|n| n.ownership.clone())
    }

    pub fn fail_read(&self, path: impl Into<PathBuf>, error: MigrationError) {
        self.faults.write().read.insert(path.into(), error);
    }

    pub fn fail_apply(&self, path: impl Into<PathBuf>, error: MigrationError) {
        self.faults.write().apply.insert(path.into(), error);
    }

    pub fn clear_faults(&self) {
        *self.faults.write() = Faults::default();
    }

    /// Principals the destination cannot map
    pub fn unresolvable_principal(&self, principal: impl Into<String>) {
        self.faults.write().unresolvable_principals.insert(principal.into());
    }

    /// Owner or group names unknown to the destination
    pub fn unknown_identity(&self, name: impl Into<String>) {
        self.faults.write().unknown_identities.insert(name.into());
    }

    pub fn deny_ownership_changes(&self, deny: bool) {
        self.faults.write().deny_ownership = deny;
    }

    /// Delay added to every read and apply
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    pub fn acl_read_count(&self) -> usize {
        self.counters.acl_reads.load(Ordering::SeqCst)
    }

    /// ACL reads plus enumeration stats that targeted files
    pub fn file_metadata_read_count(&self) -> usize {
        self.counters.file_acl_reads.load(Ordering::SeqCst)
            + self.counters.file_stats.load(Ordering::SeqCst)
    }

    pub fn acl_apply_count(&self) -> usize {
        self.counters.acl_applies.load(Ordering::SeqCst)
    }

    pub fn ownership_apply_count(&self) -> usize {
        self.counters.ownership_applies.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl AclFilesystem for InMemoryAclFilesystem {
    async fn item_type(&self, path: &Path) -> Result<Option<ItemType>, MigrationError> {
        Ok(self.nodes.read().get(path).map(|n| n.item_type))
    }

    async fn canonicalize(&self, path: &Path) -> Result<Option<PathBuf>, MigrationError> {
        let mut resolved = PathBuf::from("/");
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    if let Some(target) = self.aliases.read().get(&resolved) {
                        resolved = target.clone();
                    }
                }
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        Ok(self.nodes.read().contains_key(&resolved).then_some(resolved))
    }

    async fn read_posix_acl(&self, path: &Path) -> Result<SourceSnapshot, MigrationError> {
        self.simulate_latency().await;
        self.counters.acl_reads.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.faults.read().read.get(path) {
            return Err(error.clone());
        }

        let nodes = self.nodes.read();
        let node = nodes.get(path).ok_or_else(|| MigrationError::UnreadableSource {
            path: path.to_path_buf(),
            reason: "No such file or directory".to_string(),
        })?;
        if node.item_type == ItemType::File {
            self.counters.file_acl_reads.fetch_add(1, Ordering::SeqCst);
        }

        Ok(SourceSnapshot {
            entries: node.entries.clone(),
            ownership: node.ownership.clone(),
            modified: node.modified,
            item_type: node.item_type,
        })
    }

    async fn apply_nfs_acl(&self, path: &Path, aces: &[NfsAce]) -> Result<(), MigrationError> {
        self.simulate_latency().await;

        {
            let faults = self.faults.read();
            if let Some(error) = faults.apply.get(path) {
                return Err(error.clone());
            }
            if let Some(ace) = aces
                .iter()
                .find(|ace| faults.unresolvable_principals.contains(&ace.principal))
            {
                return Err(MigrationError::UnresolvedPrincipal {
                    path: path.to_path_buf(),
                    reason: format!("cannot map principal '{}'", ace.principal),
                });
            }
        }

        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(path).ok_or_else(|| MigrationError::UnwritableDest {
            path: path.to_path_buf(),
            reason: "No such file or directory".to_string(),
        })?;
        node.nfs_acl = Some(aces.to_vec());
        self.counters.acl_applies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn apply_ownership(
        &self,
        path: &Path,
        ownership: &OwnershipRecord,
    ) -> Result<(), MigrationError> {
        self.simulate_latency().await;

        {
            let faults = self.faults.read();
            if faults.deny_ownership {
                return Err(MigrationError::InsufficientPrivilege {
                    path: path.to_path_buf(),
                    reason: "Operation not permitted".to_string(),
                });
            }
            for identity in [&ownership.owner, &ownership.group] {
                if faults.unknown_identities.contains(identity) {
                    return Err(MigrationError::UnknownIdentity {
                        path: path.to_path_buf(),
                        identity: identity.clone(),
                        reason: "no such user or group".to_string(),
                    });
                }
            }
        }

        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(path).ok_or_else(|| MigrationError::UnwritableDest {
            path: path.to_path_buf(),
            reason: "No such file or directory".to_string(),
        })?;
        node.ownership = ownership.clone();
        self.counters.ownership_applies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn enumerate(&self, mapper: PathMapper, folder_only: bool) -> WorkItemStream {
        if mapper.is_single_file() {
            if folder_only {
                return futures::stream::empty().boxed();
            }
            let item = mapper.work_item(mapper.source_root().to_path_buf(), ItemType::File);
            return futures::stream::once(async move { item }).boxed();
        }

        let nodes = self.nodes.read();
        let root = mapper.source_root().to_path_buf();
        let mut items = Vec::new();
        for (path, node) in nodes.range(root.clone()..) {
            if !path.starts_with(&root) {
                break;
            }
            if path == &root {
                continue;
            }
            if folder_only && node.item_type == ItemType::File {
                // pruned by type, never stat'ed
                continue;
            }
            if node.item_type == ItemType::File {
                self.counters.file_stats.fetch_add(1, Ordering::SeqCst);
            }
            items.push(mapper.work_item(path.clone(), node.item_type));
        }

        futures::stream::iter(items).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::acl::Permissions;

    fn base_acl() -> Vec<PosixAclEntry> {
        vec![
            PosixAclEntry::owner(Permissions::ALL),
            PosixAclEntry::group(Permissions::new(true, false, true)),
            PosixAclEntry::other(Permissions::NONE),
        ]
    }

    #[tokio::test]
    async fn test_enumeration_is_scoped_to_root() {
        let fs = InMemoryAclFilesystem::new();
        let owner = OwnershipRecord::new("root", "root");
        fs.add_directory("/src", base_acl(), owner.clone());
        fs.add_file("/src/a.txt", base_acl(), owner.clone());
        fs.add_directory("/src/d", base_acl(), owner.clone());
        fs.add_file("/src/d/b.txt", base_acl(), owner.clone());
        fs.add_file("/srcx/other.txt", base_acl(), owner.clone());
        fs.add_directory("/dst", base_acl(), owner);

        let mapper =
            PathMapper::new("/src", "/dst", ItemType::Directory, Some(ItemType::Directory))
                .unwrap();
        let items: Vec<_> = fs.enumerate(mapper.clone(), false).collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(fs.file_metadata_read_count(), 2);

        let folders: Vec<_> = fs.enumerate(mapper, true).collect().await;
        assert_eq!(folders.len(), 1);
        // folder-only adds no file stats
        assert_eq!(fs.file_metadata_read_count(), 2);
    }

    #[tokio::test]
    async fn test_folder_only_single_file_root_yields_nothing() {
        let fs = InMemoryAclFilesystem::new();
        let owner = OwnershipRecord::new("root", "root");
        fs.add_file("/src/a.txt", base_acl(), owner.clone());
        fs.add_file("/dst/a.txt", base_acl(), owner);

        let mapper =
            PathMapper::new("/src/a.txt", "/dst/a.txt", ItemType::File, Some(ItemType::File))
                .unwrap();
        let items: Vec<_> = fs.enumerate(mapper.clone(), true).collect().await;
        assert!(items.is_empty());
        assert_eq!(fs.enumerate(mapper, false).collect::<Vec<_>>().await.len(), 1);
    }

    #[tokio::test]
    async fn test_canonicalize_follows_aliases() {
        let fs = InMemoryAclFilesystem::new();
        let owner = OwnershipRecord::new("root", "root");
        fs.add_directory("/mnt/nfs/dst", base_acl(), owner);
        fs.add_alias("/dst", "/mnt/nfs/dst");

        let expected = Some(PathBuf::from("/mnt/nfs/dst"));
        assert_eq!(fs.canonicalize(Path::new("/dst")).await.unwrap(), expected);
        assert_eq!(fs.canonicalize(Path::new("/dst/./x/..")).await.unwrap(), expected);
        assert_eq!(fs.canonicalize(Path::new("/mnt/nfs/dst/")).await.unwrap(), expected);
        assert_eq!(fs.canonicalize(Path::new("/missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_apply_to_missing_destination() {
        let fs = InMemoryAclFilesystem::new();
        let err = fs
            .apply_nfs_acl(Path::new("/dst/none"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::UnwritableDest { .. }));
    }

    #[tokio::test]
    async fn test_touch_changes_mtime() {
        let fs = InMemoryAclFilesystem::new();
        fs.add_file("/src/a", base_acl(), OwnershipRecord::new("a", "b"));
        let before = fs.read_posix_acl(Path::new("/src/a")).await.unwrap().modified;
        assert!(fs.touch(Path::new("/src/a")));
        let after = fs.read_posix_acl(Path::new("/src/a")).await.unwrap().modified;
        assert!(after > before);
    }
}
