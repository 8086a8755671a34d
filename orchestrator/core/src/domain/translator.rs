// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! POSIX ACL → NFSv4 ACE translation
//!
//! Pure function of its input. The emitted order is:
//!
//! 1. effective ACEs: owner, named users, named groups, owning group, other
//! 2. default ACEs (directories only) in the same order, flagged
//!    file-inherit + directory-inherit + inherit-only
//!
//! Named entries are intersected with the mask of their scope before
//! rendering, so the NFSv4 result grants exactly the POSIX effective rights.

use crate::domain::acl::{
    InheritFlags, NfsAce, Permissions, PosixAclEntry, PosixEntryKind, EVERYONE_PRINCIPAL,
    GROUP_PRINCIPAL, OWNER_PRINCIPAL,
};
use crate::domain::errors::MigrationError;
use crate::domain::ownership::qualify;

/// Translate a POSIX ACL into an ordered NFSv4 ACE list.
///
/// # Arguments
/// * `entries` - POSIX entries in the order they were read
/// * `is_directory` - whether the ACL belongs to a directory
/// * `domain` - NFSv4 domain suffix for named principals, empty for none
///
/// # Returns
/// * `Ok(Vec<NfsAce>)` - deterministic ACE list
/// * `Err(MigrationError::MalformedAcl)` - input violates the POSIX ACL invariants
pub fn translate(
    entries: &[PosixAclEntry],
    is_directory: bool,
    domain: &str,
) -> Result<Vec<NfsAce>, MigrationError> {
    let (defaults, effective): (Vec<&PosixAclEntry>, Vec<&PosixAclEntry>) =
        entries.iter().partition(|e| e.is_default);

    if !defaults.is_empty() && !is_directory {
        return Err(MigrationError::MalformedAcl(
            "default ACL entries are only valid on directories".to_string(),
        ));
    }

    let mut aces = Scope::collect("access", &effective)?.render(domain, InheritFlags::NONE);

    if !defaults.is_empty() {
        let default_aces =
            Scope::collect("default", &defaults)?.render(domain, InheritFlags::DEFAULT_ENTRY);
        aces.extend(default_aces);
    }

    Ok(aces)
}

/// One validated POSIX scope (access or default)
struct Scope<'a> {
    owner: Permissions,
    group: Permissions,
    other: Permissions,
    mask: Option<Permissions>,
    users: Vec<(&'a str, Permissions)>,
    groups: Vec<(&'a str, Permissions)>,
}

impl<'a> Scope<'a> {
    fn collect(name: &str, entries: &[&'a PosixAclEntry]) -> Result<Self, MigrationError> {
        let mut owner = None;
        let mut group = None;
        let mut other = None;
        let mut mask = None;
        let mut users = Vec::new();
        let mut groups = Vec::new();

        for entry in entries {
            let qualifier = entry.qualifier.as_deref();
            match (entry.kind, qualifier) {
                (PosixEntryKind::NamedUser, Some(q)) => {
                    users.push((validate_qualifier(q)?, entry.permissions))
                }
                (PosixEntryKind::NamedGroup, Some(q)) => {
                    groups.push((validate_qualifier(q)?, entry.permissions))
                }
                (PosixEntryKind::NamedUser | PosixEntryKind::NamedGroup, None) => {
                    return Err(MigrationError::MalformedAcl(format!(
                        "{} entry without qualifier in {} ACL",
                        if entry.kind == PosixEntryKind::NamedUser {
                            "named-user"
                        } else {
                            "named-group"
                        },
                        name
                    )));
                }
                (kind, Some(q)) => {
                    return Err(MigrationError::MalformedAcl(format!(
                        "{:?} entry must not carry qualifier '{}' in {} ACL",
                        kind, q, name
                    )));
                }
                (PosixEntryKind::Owner, None) => {
                    set_once(&mut owner, entry.permissions, "owner", name)?
                }
                (PosixEntryKind::Group, None) => {
                    set_once(&mut group, entry.permissions, "group", name)?
                }
                (PosixEntryKind::Other, None) => {
                    set_once(&mut other, entry.permissions, "other", name)?
                }
                (PosixEntryKind::Mask, None) => {
                    set_once(&mut mask, entry.permissions, "mask", name)?
                }
            }
        }

        let missing = |what: &str| {
            MigrationError::MalformedAcl(format!("{} ACL has no {} entry", name, what))
        };
        let owner = owner.ok_or_else(|| missing("owner"))?;
        let group = group.ok_or_else(|| missing("group"))?;
        let other = other.ok_or_else(|| missing("other"))?;

        if mask.is_none() && !(users.is_empty() && groups.is_empty()) {
            return Err(MigrationError::MalformedAcl(format!(
                "{} ACL has named entries but no mask entry",
                name
            )));
        }

        Ok(Self { owner, group, other, mask, users, groups })
    }

    fn effective(&self, permissions: Permissions) -> Permissions {
        match self.mask {
            Some(mask) => permissions.intersect(mask),
            None => permissions,
        }
    }

    fn render(&self, domain: &str, flags: InheritFlags) -> Vec<NfsAce> {
        let mut aces = Vec::with_capacity(3 + self.users.len() + self.groups.len());

        aces.push(NfsAce::allow(OWNER_PRINCIPAL, false, self.owner));
        for (name, permissions) in &self.users {
            aces.push(NfsAce::allow(qualify(name, domain), false, self.effective(*permissions)));
        }
        for (name, permissions) in &self.groups {
            aces.push(NfsAce::allow(qualify(name, domain), true, self.effective(*permissions)));
        }
        aces.push(NfsAce::allow(GROUP_PRINCIPAL, true, self.group));
        aces.push(NfsAce::allow(EVERYONE_PRINCIPAL, false, self.other));

        aces.into_iter().map(|ace| ace.with_inherit_flags(flags)).collect()
    }
}

fn set_once(
    slot: &mut Option<Permissions>,
    permissions: Permissions,
    what: &str,
    scope: &str,
) -> Result<(), MigrationError> {
    if slot.replace(permissions).is_some() {
        return Err(MigrationError::MalformedAcl(format!(
            "duplicate {} entry in {} ACL",
            what, scope
        )));
    }
    Ok(())
}

/// Qualifiers end up inside the colon/comma separated ACE spec
fn validate_qualifier(qualifier: &str) -> Result<&str, MigrationError> {
    let reserved = |c: char| c == ':' || c == ',' || c.is_whitespace();
    if qualifier.is_empty() || qualifier.chars().any(reserved) {
        return Err(MigrationError::MalformedAcl(format!(
            "invalid principal name '{}'",
            qualifier
        )));
    }
    Ok(qualifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::acl::render_acl_spec;

    fn perms(s: &str) -> Permissions {
        Permissions::parse_posix(s).unwrap()
    }

    fn parse(lines: &[&str]) -> Vec<PosixAclEntry> {
        lines.iter().map(|l| l.parse().unwrap()).collect()
    }

    #[test]
    fn test_minimal_acl_yields_three_allow_aces() {
        let entries = parse(&["user::rwx", "group::r-x", "other::r--"]);
        let aces = translate(&entries, false, "").unwrap();
        assert_eq!(
            render_acl_spec(&aces),
            "A::OWNER@:rwx,A:g:GROUP@:rx,A::EVERYONE@:r"
        );
    }

    #[test]
    fn test_mask_limits_named_user() {
        let entries = parse(&[
            "user::rwx",
            "user:bob:rwx",
            "group::r-x",
            "mask::r--",
            "other::---",
        ]);
        let aces = translate(&entries, false, "").unwrap();
        let bob = aces.iter().find(|a| a.principal == "bob").unwrap();
        assert_eq!(bob.permissions, perms("r--"));
        // owner is not subject to the mask
        assert_eq!(aces[0].permissions, perms("rwx"));
    }

    #[test]
    fn test_mask_limits_named_group() {
        let entries = parse(&[
            "user::rwx",
            "group::r-x",
            "group:dev:rwx",
            "mask::rw-",
            "other::---",
        ]);
        let aces = translate(&entries, false, "").unwrap();
        let dev = aces.iter().find(|a| a.principal == "dev").unwrap();
        assert!(dev.is_group_principal);
        assert_eq!(dev.permissions, perms("rw-"));
    }

    #[test]
    fn test_domain_suffix() {
        let entries = parse(&[
            "user::rwx",
            "user:john:rwx",
            "group::---",
            "mask::rwx",
            "other::---",
        ]);

        let qualified = translate(&entries, false, "example.com").unwrap();
        assert_eq!(qualified[1].principal, "john@example.com");
        assert_eq!(qualified[1].to_string(), "A::john@example.com:rwx");
        // special principals are never qualified
        assert_eq!(qualified[0].principal, OWNER_PRINCIPAL);

        let bare = translate(&entries, false, "").unwrap();
        assert_eq!(bare[1].principal, "john");
    }

    #[test]
    fn test_numeric_qualifiers_keep_no_domain() {
        // getfacl prints ids it cannot resolve to names
        let entries = parse(&[
            "user::rwx",
            "user:1001:rwx",
            "group::r-x",
            "group:2000:r-x",
            "mask::rwx",
            "other::---",
        ]);

        let aces = translate(&entries, false, "example.com").unwrap();
        let principals: Vec<&str> = aces.iter().map(|a| a.principal.as_str()).collect();
        assert_eq!(principals, vec!["OWNER@", "1001", "2000", "GROUP@", "EVERYONE@"]);
        assert_eq!(aces[1].to_string(), "A::1001:rwx");
        assert_eq!(aces[2].to_string(), "A:g:2000:rx");
    }

    #[test]
    fn test_effective_order() {
        let entries = parse(&[
            "other::r--",
            "group:ops:r--",
            "user:zed:rw-",
            "group::r-x",
            "mask::rwx",
            "user:amy:r--",
            "user::rwx",
        ]);
        let aces = translate(&entries, false, "").unwrap();
        let principals: Vec<&str> = aces.iter().map(|a| a.principal.as_str()).collect();
        assert_eq!(principals, vec!["OWNER@", "zed", "amy", "ops", "GROUP@", "EVERYONE@"]);
    }

    #[test]
    fn test_default_entries_are_inherit_only_and_last() {
        let entries = parse(&[
            "user::rwx",
            "group::r-x",
            "other::---",
            "default:user::rwx",
            "default:user:bob:rwx",
            "default:group::r-x",
            "default:mask::r-x",
            "default:other::---",
        ]);
        let aces = translate(&entries, true, "").unwrap();
        assert_eq!(aces.len(), 3 + 4);

        for ace in &aces[..3] {
            assert_eq!(ace.inherit_flags, InheritFlags::NONE);
        }
        for ace in &aces[3..] {
            assert!(ace.inherit_flags.directory_inherit);
            assert!(ace.inherit_flags.file_inherit);
            assert!(ace.inherit_flags.inherit_only);
        }

        // default mask applies to default named entries
        let bob = aces.iter().find(|a| a.principal == "bob").unwrap();
        assert_eq!(bob.permissions, perms("r-x"));
        assert_eq!(bob.to_string(), "A:fdi:bob:rx");
    }

    #[test]
    fn test_default_entries_rejected_on_files() {
        let entries = parse(&["user::rwx", "group::r-x", "other::---", "default:user::rwx"]);
        assert!(matches!(
            translate(&entries, false, ""),
            Err(MigrationError::MalformedAcl(_))
        ));
    }

    #[test]
    fn test_malformed_inputs() {
        // named entry without mask
        let no_mask = parse(&["user::rwx", "user:bob:rw-", "group::r-x", "other::---"]);
        assert!(translate(&no_mask, false, "").is_err());

        // missing other
        let no_other = parse(&["user::rwx", "group::r-x"]);
        assert!(translate(&no_other, false, "").is_err());

        // duplicate owner
        let dup = parse(&["user::rwx", "user::r--", "group::r-x", "other::---"]);
        assert!(translate(&dup, false, "").is_err());

        // named user missing its qualifier
        let mut missing_qualifier = parse(&["user::rwx", "group::r-x", "mask::rwx", "other::---"]);
        missing_qualifier.push(PosixAclEntry::new(
            PosixEntryKind::NamedUser,
            None,
            Permissions::ALL,
        ));
        assert!(translate(&missing_qualifier, false, "").is_err());

        // default scope incomplete
        let partial_default =
            parse(&["user::rwx", "group::r-x", "other::---", "default:user::rwx"]);
        assert!(translate(&partial_default, true, "").is_err());
    }

    #[test]
    fn test_lone_mask_is_accepted() {
        let entries = parse(&["user::rwx", "group::r-x", "mask::r--", "other::---"]);
        let aces = translate(&entries, false, "").unwrap();
        assert_eq!(aces.len(), 3);
    }

    #[test]
    fn test_translation_is_deterministic() {
        let entries = parse(&[
            "user::rwx",
            "user:bob:rw-",
            "group::r-x",
            "group:dev:r--",
            "mask::rw-",
            "other::r--",
        ]);
        let first = translate(&entries, false, "example.com").unwrap();
        for _ in 0..10 {
            assert_eq!(translate(&entries, false, "example.com").unwrap(), first);
        }
    }
}
