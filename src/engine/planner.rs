//! Change planning - declared users against recorded state and the server

use anyhow::{Context, Result};
use principal::{Password, Principal, PrincipalState, Reconciler, ResourceId, RoleGrant, Session};
use rayon::prelude::*;
use std::collections::HashSet;

use crate::config::DesiredUser;
use crate::state::{ManagedUser, UserctlState};

/// What applying a change does to one user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    /// Recorded but gone from the server; created again
    Replace,
    Delete,
}

impl Action {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
        }
    }
}

/// One planned change
#[derive(Debug, Clone)]
pub struct Change {
    pub id: ResourceId,
    pub action: Action,
    /// Why the change is needed, one entry per drifted attribute
    pub reasons: Vec<String>,
    /// Declared user; `None` for deletes
    pub desired: Option<DesiredUser>,
}

/// Ordered change set
#[derive(Debug, Default)]
pub struct Plan {
    pub changes: Vec<Change>,
    pub unchanged: Vec<ResourceId>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn count(&self, action: Action) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    /// Delete every recorded user
    pub fn destroy(state: &UserctlState) -> Result<Self> {
        let changes = state
            .users
            .keys()
            .map(|key| {
                Ok(Change {
                    id: ResourceId::parse(key)
                        .with_context(|| format!("Corrupt state entry {key:?}"))?,
                    action: Action::Delete,
                    reasons: Vec::new(),
                    desired: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            changes,
            unchanged: Vec::new(),
        })
    }
}

/// A recorded user and what the server has for it now
#[derive(Debug, Clone)]
pub struct Observed {
    pub id: ResourceId,
    pub recorded: ManagedUser,
    /// `None` when the server no longer has the user
    pub live: Option<PrincipalState>,
}

/// Read every recorded user back from the server.
///
/// Any failed read aborts the refresh; a plan built on a partial view
/// would delete or recreate users it could not see.
pub fn refresh<S: Session>(
    reconciler: &Reconciler<S>,
    state: &UserctlState,
    pool: &rayon::ThreadPool,
) -> Result<Vec<Observed>> {
    let recorded: Vec<(&String, &ManagedUser)> = state.users.iter().collect();

    pool.install(|| {
        recorded
            .par_iter()
            .map(|(key, user)| observe(reconciler, key, user))
            .collect()
    })
}

fn observe<S: Session>(
    reconciler: &Reconciler<S>,
    key: &str,
    user: &ManagedUser,
) -> Result<Observed> {
    let id = ResourceId::from_stored(key);
    let principal = Principal {
        database: user.database.clone(),
        name: user.username.clone(),
        secret: Password::default(),
        grants: user.grants.clone(),
    };
    let mut record = PrincipalState::managed(id.clone(), principal);
    reconciler
        .read(&mut record)
        .with_context(|| format!("Failed to refresh {id}"))?;

    Ok(Observed {
        id,
        recorded: user.clone(),
        live: record.exists().then_some(record),
    })
}

/// Compute the change set.
///
/// Declared users come first in declaration order, then deletes for
/// recorded users that are no longer declared.
pub fn plan(desired: &[DesiredUser], observed: &[Observed]) -> Plan {
    let mut result = Plan::default();

    for user in desired {
        let Some(seen) = observed.iter().find(|o| o.id == user.id) else {
            result.changes.push(Change {
                id: user.id.clone(),
                action: Action::Create,
                reasons: Vec::new(),
                desired: Some(user.clone()),
            });
            continue;
        };

        let Some(live) = &seen.live else {
            result.changes.push(Change {
                id: user.id.clone(),
                action: Action::Replace,
                reasons: vec!["missing on server".to_string()],
                desired: Some(user.clone()),
            });
            continue;
        };

        let mut reasons = Vec::new();
        if live.principal.grants != user.principal.grants {
            reasons.push(format!(
                "roles: {} → {}",
                describe(&live.principal.grants),
                describe(&user.principal.grants)
            ));
        }
        if seen.recorded.password_digest != user.password_digest {
            reasons.push("password changed".to_string());
        }

        if reasons.is_empty() {
            result.unchanged.push(user.id.clone());
        } else {
            result.changes.push(Change {
                id: user.id.clone(),
                action: Action::Update,
                reasons,
                desired: Some(user.clone()),
            });
        }
    }

    let declared: HashSet<&ResourceId> = desired.iter().map(|u| &u.id).collect();
    for seen in observed.iter().filter(|o| !declared.contains(&o.id)) {
        let reasons = if seen.live.is_none() {
            vec!["already gone on server".to_string()]
        } else {
            Vec::new()
        };
        result.changes.push(Change {
            id: seen.id.clone(),
            action: Action::Delete,
            reasons,
            desired: None,
        });
    }

    result
}

fn describe(grants: &[RoleGrant]) -> String {
    if grants.is_empty() {
        return "(none)".to_string();
    }
    grants
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Tests
// ============================================================================
