// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Filesystem Access Adapter
//!
//! Abstract boundary between the migration core and the filesystems it
//! reads from and writes to. Implementations live in
//! `crate::infrastructure::filesystem`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** ACL/ownership read, ACE/ownership write and tree enumeration contract

use crate::domain::acl::NfsAce;
use crate::domain::errors::MigrationError;
use crate::domain::migration::{ItemType, SourceSnapshot, WorkItem};
use crate::domain::ownership::OwnershipRecord;
use crate::domain::path_mapping::PathMapper;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};

/// Lazily produced work items. Per-entry traversal errors are yielded in-band.
pub type WorkItemStream = BoxStream<'static, Result<WorkItem, MigrationError>>;

#[async_trait]
pub trait AclFilesystem: Send + Sync {
    /// Shape of `path`, `None` if it does not exist
    async fn item_type(&self, path: &Path) -> Result<Option<ItemType>, MigrationError>;

    /// Absolute form of `path` with symlinks, `.` and `..` resolved, `None`
    /// if it does not exist. Migration roots pass through this before any
    /// destination path is derived, so state records are keyed canonically.
    async fn canonicalize(&self, path: &Path) -> Result<Option<PathBuf>, MigrationError>;

    /// Read POSIX ACL, ownership and modification time of a source path
    ///
    /// Fails with `UnreadableSource` if the path is missing, unreadable or
    /// lives on a filesystem without ACL support.
    async fn read_posix_acl(&self, path: &Path) -> Result<SourceSnapshot, MigrationError>;

    /// Replace the NFSv4 ACL of a destination path. Idempotent.
    async fn apply_nfs_acl(&self, path: &Path, aces: &[NfsAce]) -> Result<(), MigrationError>;

    async fn apply_ownership(
        &self,
        path: &Path,
        ownership: &OwnershipRecord,
    ) -> Result<(), MigrationError>;

    /// Every file and directory strictly below the source root, each exactly once.
    ///
    /// A single-file mapper yields its root. With `folder_only` set, files
    /// are pruned during traversal and never stat'ed.
    fn enumerate(&self, mapper: PathMapper, folder_only: bool) -> WorkItemStream;
}
