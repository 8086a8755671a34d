// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Mapping Domain Service
//!
//! Maps every source path below the source root onto the matching
//! destination path by relative-path substitution, and validates that the
//! two roots have the same shape.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Source → destination path substitution with traversal rejection

use crate::domain::errors::MigrationError;
use crate::domain::migration::{ItemType, WorkItem};
use std::path::{Component, Path, PathBuf};

/// Validated pair of migration roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    source_root: PathBuf,
    dest_root: PathBuf,
    root_type: ItemType,
}

impl PathMapper {
    /// Validate the roots of a run.
    ///
    /// # Arguments
    /// * `source_type` - shape of the source root
    /// * `dest_type` - shape of the destination root, `None` when it does not exist
    ///
    /// # Returns
    /// * `Err(MigrationError::PathShapeMismatch)` - file mapped onto directory or vice versa
    /// * `Err(MigrationError::UnwritableDest)` - destination root is missing
    pub fn new(
        source_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
        source_type: ItemType,
        dest_type: Option<ItemType>,
    ) -> Result<Self, MigrationError> {
        let source_root = normalize(source_root.into())?;
        let dest_root = normalize(dest_root.into())?;

        let dest_type = dest_type.ok_or_else(|| MigrationError::UnwritableDest {
            path: dest_root.clone(),
            reason: "destination root does not exist".to_string(),
        })?;

        if source_type != dest_type {
            tracing::warn!(
                source = %source_root.display(),
                dest = %dest_root.display(),
                %source_type,
                %dest_type,
                "Migration roots have different shapes"
            );
            return Err(MigrationError::PathShapeMismatch {
                source_path: source_root,
                dest_path: dest_root,
                source_type,
                dest_type,
            });
        }

        Ok(Self {
            source_root,
            dest_root,
            root_type: source_type,
        })
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Single-file runs map exactly one item: the source root itself
    pub fn is_single_file(&self) -> bool {
        self.root_type == ItemType::File
    }

    /// Destination path for `source_path`
    pub fn map(&self, source_path: &Path) -> Result<PathBuf, MigrationError> {
        if self.is_single_file() {
            return if source_path == self.source_root {
                Ok(self.dest_root.clone())
            } else {
                Err(outside_root(source_path))
            };
        }

        let relative = source_path
            .strip_prefix(&self.source_root)
            .map_err(|_| outside_root(source_path))?;

        let mut dest = self.dest_root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => dest.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    tracing::warn!(
                        path = %source_path.display(),
                        "Path traversal attempt detected: relative path escapes the source root"
                    );
                    return Err(outside_root(source_path));
                }
            }
        }
        Ok(dest)
    }

    pub fn work_item(
        &self,
        source_path: PathBuf,
        item_type: ItemType,
    ) -> Result<WorkItem, MigrationError> {
        let dest_path = self.map(&source_path)?;
        Ok(WorkItem {
            source_path,
            dest_path,
            item_type,
        })
    }
}

fn outside_root(path: &Path) -> MigrationError {
    MigrationError::UnreadableSource {
        path: path.to_path_buf(),
        reason: "path is outside the source root".to_string(),
    }
}

/// Drop `.` components and reject `..` in a root
fn normalize(path: PathBuf) -> Result<PathBuf, MigrationError> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                normalized.push(component)
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(MigrationError::Configuration(format!(
                    "migration root must not contain '..': {}",
                    path.display()
                )));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs() -> PathMapper {
        PathMapper::new("/src", "/dst/", ItemType::Directory, Some(ItemType::Directory)).unwrap()
    }

    #[test]
    fn test_relative_substitution() {
        let mapper = dirs();
        assert_eq!(mapper.map(Path::new("/src/a/b.txt")).unwrap(), PathBuf::from("/dst/a/b.txt"));
        assert_eq!(mapper.map(Path::new("/src/./a")).unwrap(), PathBuf::from("/dst/a"));
    }

    #[test]
    fn test_rejects_paths_outside_root() {
        let mapper = dirs();
        assert!(mapper.map(Path::new("/other/a.txt")).is_err());
        assert!(mapper.map(Path::new("/src/../etc/passwd")).is_err());
    }

    #[test]
    fn test_single_file_maps_root_to_root() {
        let mapper =
            PathMapper::new("/src/a.txt", "/dst/a.nfs", ItemType::File, Some(ItemType::File))
                .unwrap();
        assert!(mapper.is_single_file());
        let item = mapper.work_item(PathBuf::from("/src/a.txt"), ItemType::File).unwrap();
        assert_eq!(item.dest_path, PathBuf::from("/dst/a.nfs"));
        assert!(mapper.map(Path::new("/src/b.txt")).is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let err =
            PathMapper::new("/src/a.txt", "/dst", ItemType::File, Some(ItemType::Directory))
                .unwrap_err();
        assert!(matches!(err, MigrationError::PathShapeMismatch { .. }));
        assert!(err.is_fatal());

        let err =
            PathMapper::new("/src", "/dst/a.txt", ItemType::Directory, Some(ItemType::File))
                .unwrap_err();
        assert!(matches!(err, MigrationError::PathShapeMismatch { .. }));
    }

    #[test]
    fn test_missing_destination_root() {
        let err = PathMapper::new("/src", "/missing", ItemType::Directory, None).unwrap_err();
        assert!(matches!(err, MigrationError::UnwritableDest { .. }));
    }

    #[test]
    fn test_root_with_parent_component_rejected() {
        let err = PathMapper::new(
            "/src/../etc",
            "/dst",
            ItemType::Directory,
            Some(ItemType::Directory),
        )
        .unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(_)));
    }
}
