// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Migration error taxonomy.
//!
//! Per-item errors are caught at the orchestrator's worker boundary and
//! recorded against the item; run-level errors abort the run before any item
//! is touched. Operator cancellation is not an error: it ends the run with
//! `RunOutcome::Interrupted`.

use crate::domain::migration::ItemType;
use crate::domain::repository::RepositoryError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("Malformed ACL: {0}")]
    MalformedAcl(String),

    #[error("Unreadable source {path}: {reason}")]
    UnreadableSource { path: PathBuf, reason: String },

    #[error("Unwritable destination {path}: {reason}")]
    UnwritableDest { path: PathBuf, reason: String },

    #[error("Unresolved principal on {path}: {reason}")]
    UnresolvedPrincipal { path: PathBuf, reason: String },

    #[error("Insufficient privilege to change ownership of {path}: {reason}")]
    InsufficientPrivilege { path: PathBuf, reason: String },

    #[error("Unknown identity '{identity}' for {path}: {reason}")]
    UnknownIdentity {
        path: PathBuf,
        identity: String,
        reason: String,
    },

    #[error(
        "Path shape mismatch: source {source_path} is a {source_type}, \
         destination {dest_path} is a {dest_type}"
    )]
    PathShapeMismatch {
        source_path: PathBuf,
        dest_path: PathBuf,
        source_type: ItemType,
        dest_type: ItemType,
    },

    #[error("State store error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MigrationError {
    /// Stable identifier persisted alongside failed records
    pub fn kind(&self) -> &'static str {
        match self {
            MigrationError::MalformedAcl(_) => "malformed_acl",
            MigrationError::UnreadableSource { .. } => "unreadable_source",
            MigrationError::UnwritableDest { .. } => "unwritable_dest",
            MigrationError::UnresolvedPrincipal { .. } => "unresolved_principal",
            MigrationError::InsufficientPrivilege { .. } => "insufficient_privilege",
            MigrationError::UnknownIdentity { .. } => "unknown_identity",
            MigrationError::PathShapeMismatch { .. } => "path_shape_mismatch",
            MigrationError::Repository(_) => "repository",
            MigrationError::Configuration(_) => "configuration",
        }
    }

    /// Errors that make every remaining item unresolvable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrationError::PathShapeMismatch { .. } | MigrationError::Configuration(_)
        )
    }
}
