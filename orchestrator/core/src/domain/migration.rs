// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Migration
//!
//! Work items, persisted per-path records and the change fingerprint that
//! drives incremental runs.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Migration aggregate types shared by orchestrator and state store

use crate::domain::acl::PosixAclEntry;
use crate::domain::errors::MigrationError;
use crate::domain::ownership::OwnershipRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a single orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    File,
    Directory,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::File => write!(f, "file"),
            ItemType::Directory => write!(f, "directory"),
        }
    }
}

/// A pending unit of work produced by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub item_type: ItemType,
}

impl WorkItem {
    pub fn is_directory(&self) -> bool {
        self.item_type == ItemType::Directory
    }
}

/// Everything read from one source path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub entries: Vec<PosixAclEntry>,
    pub ownership: OwnershipRecord,
    pub modified: DateTime<Utc>,
    pub item_type: ItemType,
}

/// Hex SHA-256 over the serialized ACL, ownership, modification time and
/// the output profile the item was migrated with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `profile` is `MigrationConfig::output_profile` of the run
    pub fn compute(snapshot: &SourceSnapshot, profile: &str) -> Self {
        let mut hasher = Sha256::new();
        for entry in &snapshot.entries {
            hasher.update(entry.to_string().as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(format!("owner:{}\n", snapshot.ownership).as_bytes());
        hasher.update(
            format!(
                "mtime:{}.{:09}\n",
                snapshot.modified.timestamp(),
                snapshot.modified.timestamp_subsec_nanos()
            )
            .as_bytes(),
        );
        hasher.update(format!("profile:{}\n", profile).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Placeholder for items that failed before their source could be read
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Success,
    Failed,
    Skipped,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Success => "success",
            MigrationStatus::Failed => "failed",
            MigrationStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(MigrationStatus::Success),
            "failed" => Ok(MigrationStatus::Failed),
            "skipped" => Ok(MigrationStatus::Skipped),
            other => Err(format!("unknown migration status '{}'", other)),
        }
    }
}

/// Last known outcome for one destination path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub source_path: PathBuf,
    pub fingerprint: Fingerprint,
    pub status: MigrationStatus,
    pub last_attempt_time: DateTime<Utc>,
    /// Present iff `status == Failed`
    pub error_kind: Option<String>,
    /// Present iff `status == Failed`
    pub error_detail: Option<String>,
}

impl MigrationRecord {
    pub fn succeeded(source_path: PathBuf, fingerprint: Fingerprint) -> Self {
        Self::outcome(source_path, fingerprint, MigrationStatus::Success)
    }

    pub fn skipped(source_path: PathBuf, fingerprint: Fingerprint) -> Self {
        Self::outcome(source_path, fingerprint, MigrationStatus::Skipped)
    }

    pub fn failed(source_path: PathBuf, fingerprint: Fingerprint, error: &MigrationError) -> Self {
        Self {
            source_path,
            fingerprint,
            status: MigrationStatus::Failed,
            last_attempt_time: Utc::now(),
            error_kind: Some(error.kind().to_string()),
            error_detail: Some(error.to_string()),
        }
    }

    fn outcome(source_path: PathBuf, fingerprint: Fingerprint, status: MigrationStatus) -> Self {
        Self {
            source_path,
            fingerprint,
            status,
            last_attempt_time: Utc::now(),
            error_kind: None,
            error_detail: None,
        }
    }

    /// Incremental skip rule.
    ///
    /// A skipped record is only ever written when the stored fingerprint was
    /// already confirmed by a successful apply, so it certifies success too.
    /// Failed records never permit a skip.
    pub fn permits_skip(&self, fresh: &Fingerprint) -> bool {
        matches!(self.status, MigrationStatus::Success | MigrationStatus::Skipped)
            && !fresh.is_empty()
            && self.fingerprint == *fresh
    }
}
