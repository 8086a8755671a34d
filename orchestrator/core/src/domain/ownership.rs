// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Ownership record of a filesystem object and its destination rendering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner and group of a path, by name or numeric id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub owner: String,
    pub group: String,
}

impl OwnershipRecord {
    pub fn new(owner: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            group: group.into(),
        }
    }

    /// Render for the destination, appending `@domain` to symbolic names.
    ///
    /// Numeric ids are left untouched since an id mapper cannot qualify them.
    pub fn with_domain(&self, domain: &str) -> OwnershipRecord {
        if domain.is_empty() {
            return self.clone();
        }
        OwnershipRecord {
            owner: qualify(&self.owner, domain),
            group: qualify(&self.group, domain),
        }
    }
}

impl fmt::Display for OwnershipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.group)
    }
}

/// Render a principal name with an optional NFSv4 domain suffix
pub fn qualify(name: &str, domain: &str) -> String {
    if domain.is_empty() || name.contains('@') || name.chars().all(|c| c.is_ascii_digit()) {
        name.to_string()
    } else {
        format!("{}@{}", name, domain)
    }
}
