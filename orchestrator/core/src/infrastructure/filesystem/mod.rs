// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Filesystem Infrastructure Module
//!
//! Concrete implementations of the `AclFilesystem` adapter.

pub mod command;
pub mod memory;

pub use command::{CommandAclFilesystem, ToolCheck};
pub use memory::InMemoryAclFilesystem;

use crate::domain::config::ToolsConfig;
use crate::domain::filesystem::AclFilesystem;
use std::sync::Arc;

/// Filesystem backend configuration
#[derive(Clone)]
pub enum FilesystemBackend {
    /// getfacl / nfs4_setfacl / chown on the local host (production)
    Command(ToolsConfig),

    /// Shared in-memory tree for testing
    InMemory(InMemoryAclFilesystem),
}

/// Factory function to create the ACL filesystem adapter from configuration
pub fn create_acl_filesystem(backend: FilesystemBackend) -> Arc<dyn AclFilesystem> {
    match backend {
        FilesystemBackend::Command(tools) => Arc::new(CommandAclFilesystem::new(tools)),
        FilesystemBackend::InMemory(fs) => Arc::new(fs),
    }
}
