// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! ACL Model
//!
//! Value types for both sides of the migration:
//! - POSIX ACL entries as printed by `getfacl` (source side)
//! - NFSv4 access control entries as accepted by `nfs4_setfacl` (destination side)
//!
//! Both types round-trip through their textual forms so that adapters can
//! shell out to the standard tools without any intermediate representation.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** ACL value objects and their text codecs

use crate::domain::errors::MigrationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// NFSv4 special principal for the file owner
pub const OWNER_PRINCIPAL: &str = "OWNER@";
/// NFSv4 special principal for the owning group
pub const GROUP_PRINCIPAL: &str = "GROUP@";
/// NFSv4 special principal for everyone else
pub const EVERYONE_PRINCIPAL: &str = "EVERYONE@";

/// Simplified permission set shared by both ACL models (r, w, x)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Permissions {
    pub const NONE: Permissions = Permissions { read: false, write: false, execute: false };
    pub const ALL: Permissions = Permissions { read: true, write: true, execute: true };

    pub fn new(read: bool, write: bool, execute: bool) -> Self {
        Self { read, write, execute }
    }

    /// Permissions granted by both sets (POSIX mask semantics)
    pub fn intersect(self, other: Permissions) -> Permissions {
        Permissions {
            read: self.read && other.read,
            write: self.write && other.write,
            execute: self.execute && other.execute,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.read || self.write || self.execute)
    }

    /// Parse the fixed-width POSIX form (`rwx`, `r-x`, `---`)
    pub fn parse_posix(text: &str) -> Result<Self, MigrationError> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() != 3 {
            return Err(MigrationError::MalformedAcl(format!(
                "permission string '{}' must be exactly three characters",
                text
            )));
        }

        let slot = |c: char, letter: char| -> Result<bool, MigrationError> {
            match c {
                c if c == letter => Ok(true),
                '-' => Ok(false),
                other => Err(MigrationError::MalformedAcl(format!(
                    "invalid permission letter '{}' in '{}'",
                    other, text
                ))),
            }
        };

        Ok(Self {
            read: slot(chars[0], 'r')?,
            write: slot(chars[1], 'w')?,
            execute: slot(chars[2], 'x')?,
        })
    }

    /// Parse NFSv4 permission letters.
    ///
    /// Only `r`, `w` and `x` carry meaning in this model. The remaining
    /// letters `nfs4_getfacl` may print are accepted and dropped.
    pub fn parse_nfs_letters(text: &str) -> Result<Self, MigrationError> {
        let mut perms = Permissions::NONE;
        for c in text.chars() {
            match c {
                'r' => perms.read = true,
                'w' => perms.write = true,
                'x' => perms.execute = true,
                'a' | 'D' | 'd' | 't' | 'T' | 'n' | 'N' | 'c' | 'C' | 'o' | 'y' | 'e' => {}
                other => {
                    return Err(MigrationError::MalformedAcl(format!(
                        "invalid NFSv4 permission letter '{}' in '{}'",
                        other, text
                    )))
                }
            }
        }
        Ok(perms)
    }

    pub fn to_posix_string(&self) -> String {
        let mut s = String::with_capacity(3);
        s.push(if self.read { 'r' } else { '-' });
        s.push(if self.write { 'w' } else { '-' });
        s.push(if self.execute { 'x' } else { '-' });
        s
    }

    pub fn to_nfs_letters(&self) -> String {
        let mut s = String::with_capacity(3);
        if self.read {
            s.push('r');
        }
        if self.write {
            s.push('w');
        }
        if self.execute {
            s.push('x');
        }
        s
    }
}

/// Kind of a POSIX ACL entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PosixEntryKind {
    /// `user::` - the file owner
    Owner,
    /// `group::` - the owning group
    Group,
    /// `other::`
    Other,
    /// `user:<name>:`
    NamedUser,
    /// `group:<name>:`
    NamedGroup,
    /// `mask::`
    Mask,
}

impl PosixEntryKind {
    pub fn is_named(&self) -> bool {
        matches!(self, PosixEntryKind::NamedUser | PosixEntryKind::NamedGroup)
    }

    fn tag(&self) -> &'static str {
        match self {
            PosixEntryKind::Owner | PosixEntryKind::NamedUser => "user",
            PosixEntryKind::Group | PosixEntryKind::NamedGroup => "group",
            PosixEntryKind::Other => "other",
            PosixEntryKind::Mask => "mask",
        }
    }
}

/// One line of a POSIX ACL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PosixAclEntry {
    pub kind: PosixEntryKind,
    /// User or group name, present only for named entries
    pub qualifier: Option<String>,
    pub permissions: Permissions,
    /// Entry belongs to the default (inherited) ACL of a directory
    pub is_default: bool,
}

impl PosixAclEntry {
    pub fn new(kind: PosixEntryKind, qualifier: Option<&str>, permissions: Permissions) -> Self {
        Self {
            kind,
            qualifier: qualifier.map(str::to_string),
            permissions,
            is_default: false,
        }
    }

    pub fn owner(permissions: Permissions) -> Self {
        Self::new(PosixEntryKind::Owner, None, permissions)
    }

    pub fn group(permissions: Permissions) -> Self {
        Self::new(PosixEntryKind::Group, None, permissions)
    }

    pub fn other(permissions: Permissions) -> Self {
        Self::new(PosixEntryKind::Other, None, permissions)
    }

    pub fn mask(permissions: Permissions) -> Self {
        Self::new(PosixEntryKind::Mask, None, permissions)
    }

    pub fn named_user(name: &str, permissions: Permissions) -> Self {
        Self::new(PosixEntryKind::NamedUser, Some(name), permissions)
    }

    pub fn named_group(name: &str, permissions: Permissions) -> Self {
        Self::new(PosixEntryKind::NamedGroup, Some(name), permissions)
    }

    /// Turn this entry into its default-ACL counterpart
    pub fn into_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

impl fmt::Display for PosixAclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default {
            write!(f, "default:")?;
        }
        write!(
            f,
            "{}:{}:{}",
            self.kind.tag(),
            self.qualifier.as_deref().unwrap_or(""),
            self.permissions.to_posix_string()
        )
    }
}

impl FromStr for PosixAclEntry {
    type Err = MigrationError;

    /// Parse a single getfacl line such as `default:user:bob:rw-`.
    ///
    /// Trailing `#effective:` annotations are ignored; the effective value is
    /// recomputed from the mask during translation.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let content = line.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            return Err(MigrationError::MalformedAcl("empty ACL entry".to_string()));
        }

        let (is_default, body) = match content
            .strip_prefix("default:")
            .or_else(|| content.strip_prefix("d:"))
        {
            Some(rest) => (true, rest),
            None => (false, content),
        };

        let parts: Vec<&str> = body.split(':').collect();
        if parts.len() != 3 {
            return Err(MigrationError::MalformedAcl(format!(
                "expected 'kind:qualifier:perms', got '{}'",
                content
            )));
        }

        let qualifier = parts[1].trim();
        let kind = match (parts[0].trim(), qualifier.is_empty()) {
            ("user" | "u", true) => PosixEntryKind::Owner,
            ("user" | "u", false) => PosixEntryKind::NamedUser,
            ("group" | "g", true) => PosixEntryKind::Group,
            ("group" | "g", false) => PosixEntryKind::NamedGroup,
            ("other" | "o", _) => PosixEntryKind::Other,
            ("mask" | "m", _) => PosixEntryKind::Mask,
            (unknown, _) => {
                return Err(MigrationError::MalformedAcl(format!(
                    "unknown ACL entry kind '{}'",
                    unknown
                )))
            }
        };

        if matches!(kind, PosixEntryKind::Other | PosixEntryKind::Mask) && !qualifier.is_empty() {
            return Err(MigrationError::MalformedAcl(format!(
                "{} entry must not carry a qualifier: '{}'",
                kind.tag(),
                content
            )));
        }

        Ok(Self {
            kind,
            qualifier: (!qualifier.is_empty()).then(|| qualifier.to_string()),
            permissions: Permissions::parse_posix(parts[2].trim())?,
            is_default,
        })
    }
}

/// Parsed output of `getfacl --absolute-names <path>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetfaclListing {
    /// Value of the `# owner:` header, if printed
    pub owner: Option<String>,
    /// Value of the `# group:` header, if printed
    pub group: Option<String>,
    pub entries: Vec<PosixAclEntry>,
}

impl GetfaclListing {
    pub fn parse(output: &str) -> Result<Self, MigrationError> {
        let mut listing = GetfaclListing::default();

        for raw in output.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('#') {
                let header = header.trim();
                if let Some(owner) = header.strip_prefix("owner:") {
                    listing.owner = Some(owner.trim().to_string());
                } else if let Some(group) = header.strip_prefix("group:") {
                    listing.group = Some(group.trim().to_string());
                }
                // "# file:" and "# flags:" carry nothing we migrate
                continue;
            }
            listing.entries.push(line.parse()?);
        }

        Ok(listing)
    }
}

/// NFSv4 ACE type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AceAction {
    Allow,
    Deny,
}

impl AceAction {
    fn letter(&self) -> char {
        match self {
            AceAction::Allow => 'A',
            AceAction::Deny => 'D',
        }
    }
}

/// NFSv4 inheritance flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InheritFlags {
    pub directory_inherit: bool,
    pub file_inherit: bool,
    pub inherit_only: bool,
}

impl InheritFlags {
    pub const NONE: InheritFlags = InheritFlags {
        directory_inherit: false,
        file_inherit: false,
        inherit_only: false,
    };

    /// Flags carried by every ACE derived from a POSIX default entry
    pub const DEFAULT_ENTRY: InheritFlags = InheritFlags {
        directory_inherit: true,
        file_inherit: true,
        inherit_only: true,
    };

    pub fn is_inherited(&self) -> bool {
        self.directory_inherit || self.file_inherit
    }
}

/// One NFSv4 access control entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NfsAce {
    pub action: AceAction,
    /// User or group identifier, optionally `name@domain`
    pub principal: String,
    pub is_group_principal: bool,
    pub inherit_flags: InheritFlags,
    pub permissions: Permissions,
}

impl NfsAce {
    pub fn allow(
        principal: impl Into<String>,
        is_group_principal: bool,
        permissions: Permissions,
    ) -> Self {
        Self {
            action: AceAction::Allow,
            principal: principal.into(),
            is_group_principal,
            inherit_flags: InheritFlags::NONE,
            permissions,
        }
    }

    pub fn with_inherit_flags(mut self, flags: InheritFlags) -> Self {
        self.inherit_flags = flags;
        self
    }

    fn flag_letters(&self) -> String {
        let mut flags = String::new();
        if self.inherit_flags.file_inherit {
            flags.push('f');
        }
        if self.inherit_flags.directory_inherit {
            flags.push('d');
        }
        if self.inherit_flags.inherit_only {
            flags.push('i');
        }
        if self.is_group_principal {
            flags.push('g');
        }
        flags
    }
}

impl fmt::Display for NfsAce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.action.letter(),
            self.flag_letters(),
            self.principal,
            self.permissions.to_nfs_letters()
        )
    }
}

impl FromStr for NfsAce {
    type Err = MigrationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 4 {
            return Err(MigrationError::MalformedAcl(format!(
                "expected 'action:flags:principal:perms', got '{}'",
                text
            )));
        }

        let action = match parts[0] {
            "A" => AceAction::Allow,
            "D" => AceAction::Deny,
            other => {
                return Err(MigrationError::MalformedAcl(format!(
                    "unsupported ACE type '{}'",
                    other
                )))
            }
        };

        let mut ace = NfsAce {
            action,
            principal: parts[2].to_string(),
            is_group_principal: false,
            inherit_flags: InheritFlags::NONE,
            permissions: Permissions::parse_nfs_letters(parts[3])?,
        };
        for flag in parts[1].chars() {
            match flag {
                'f' => ace.inherit_flags.file_inherit = true,
                'd' => ace.inherit_flags.directory_inherit = true,
                'i' => ace.inherit_flags.inherit_only = true,
                'g' => ace.is_group_principal = true,
                // successful-access / failed-access audit and no-propagate flags
                'S' | 'F' | 'n' => {}
                other => {
                    return Err(MigrationError::MalformedAcl(format!(
                        "unsupported ACE flag '{}' in '{}'",
                        other, text
                    )))
                }
            }
        }
        if ace.principal.is_empty() {
            return Err(MigrationError::MalformedAcl(format!("ACE without principal: '{}'", text)));
        }

        Ok(ace)
    }
}

/// Render an ACE list as the comma-separated spec accepted by `nfs4_setfacl -s`
pub fn render_acl_spec(aces: &[NfsAce]) -> String {
    aces.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
