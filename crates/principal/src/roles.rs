//! Role normalization.
//!
//! Declared grants may leave their database out; the server always
//! reports one. [`resolve`] fills the gap on the way out and
//! [`diff_for_readback`] puts it back on the way in, so a grant that was
//! declared without a database does not show up as drift.
//!
//! Read-back pairs grants by position. It relies on the server returning
//! roles in the order they were granted; if the server reorders them,
//! the re-elision stops matching and the grants show up as drift.

use crate::types::{GrantDatabase, ResolvedGrant, RoleGrant};

/// Resolve declared grants against the owning user's database, keeping order.
pub fn resolve(declared: &[RoleGrant], owner_database: &str) -> Vec<ResolvedGrant> {
    declared
        .iter()
        .map(|grant| ResolvedGrant::new(&grant.role, grant.database.resolve(owner_database)))
        .collect()
}

/// Rebuild the declared-shape grant list from what the server returned.
///
/// `declared[i]` is paired with `returned[i]`. When the role names match
/// and the declared database was not given, the returned database is
/// dropped again. Every other grant keeps the server's explicit database,
/// including returned grants past the end of `declared`.
pub fn diff_for_readback(declared: &[RoleGrant], returned: &[ResolvedGrant]) -> Vec<RoleGrant> {
    returned
        .iter()
        .enumerate()
        .map(|(i, grant)| {
            let database = match declared.get(i) {
                Some(prior) if prior.role == grant.role && prior.database.inherits() => {
                    prior.database.clone()
                }
                _ => GrantDatabase::named(&grant.db),
            };
            RoleGrant {
                role: grant.role.clone(),
                database,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_grants() -> Vec<RoleGrant> {
        vec![
            RoleGrant::inherited("readWrite"),
            RoleGrant::on("dbAdmin", "testing"),
            RoleGrant::on("read", "admin"),
        ]
    }

    #[test]
    fn test_resolve_substitutes_owner_database() {
        let resolved = resolve(&mixed_grants(), "testing");
        assert_eq!(
            resolved,
            vec![
                ResolvedGrant::new("readWrite", "testing"),
                ResolvedGrant::new("dbAdmin", "testing"),
                ResolvedGrant::new("read", "admin"),
            ]
        );
    }

    #[test]
    fn test_resolve_treats_empty_as_inherited() {
        let resolved = resolve(&[RoleGrant::on("read", "")], "testing");
        assert_eq!(resolved, vec![ResolvedGrant::new("read", "testing")]);
    }

    #[test]
    fn test_readback_re_elides_inherited_database() {
        let declared = vec![RoleGrant::inherited("readWrite")];
        let returned = vec![ResolvedGrant::new("readWrite", "testing")];

        assert_eq!(diff_for_readback(&declared, &returned), declared);
    }

    #[test]
    fn test_readback_keeps_explicit_database() {
        let declared = vec![RoleGrant::on("read", "admin")];
        let returned = vec![ResolvedGrant::new("read", "admin")];

        assert_eq!(diff_for_readback(&declared, &returned), declared);
    }

    #[test]
    fn test_readback_keeps_empty_spelling() {
        let declared = vec![RoleGrant::on("read", "")];
        let returned = vec![ResolvedGrant::new("read", "testing")];

        assert_eq!(diff_for_readback(&declared, &returned), declared);
    }

    #[test]
    fn test_readback_round_trips_mixed_grants() {
        let declared = mixed_grants();
        let returned = resolve(&declared, "testing");

        assert_eq!(diff_for_readback(&declared, &returned), declared);
    }

    #[test]
    fn test_readback_role_mismatch_keeps_server_database() {
        let declared = vec![RoleGrant::inherited("readWrite")];
        let returned = vec![ResolvedGrant::new("read", "testing")];

        assert_eq!(
            diff_for_readback(&declared, &returned),
            vec![RoleGrant::on("read", "testing")]
        );
    }

    #[test]
    fn test_readback_reordered_roles_report_drift() {
        let declared = vec![RoleGrant::inherited("readWrite"), RoleGrant::inherited("dbAdmin")];
        let returned = vec![
            ResolvedGrant::new("dbAdmin", "testing"),
            ResolvedGrant::new("readWrite", "testing"),
        ];

        let rebuilt = diff_for_readback(&declared, &returned);
        assert_eq!(
            rebuilt,
            vec![RoleGrant::on("dbAdmin", "testing"), RoleGrant::on("readWrite", "testing")]
        );
        assert_ne!(rebuilt, declared);
    }

    #[test]
    fn test_readback_extra_server_grants() {
        let declared = vec![RoleGrant::inherited("readWrite")];
        let returned = vec![
            ResolvedGrant::new("readWrite", "testing"),
            ResolvedGrant::new("read", "admin"),
        ];

        assert_eq!(
            diff_for_readback(&declared, &returned),
            vec![RoleGrant::inherited("readWrite"), RoleGrant::on("read", "admin")]
        );
    }

    #[test]
    fn test_readback_without_returned_grants() {
        let declared = mixed_grants();
        assert!(diff_for_readback(&declared, &[]).is_empty());
    }
}
