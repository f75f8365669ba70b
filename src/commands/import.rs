use anyhow::{Context as AnyhowContext, Result, bail};
use principal::{Reconciler, ResourceId, Session};
use std::path::Path;

use crate::Context;
use crate::state::{ManagedUser, UserctlState};
use crate::ui;

pub fn run(ctx: &Context, raw_id: &str) -> Result<()> {
    let reconciler = crate::commands::connect(ctx)?;
    let entry = import(&reconciler, &ctx.state_path, raw_id)?;

    ui::success(&format!("Imported {}@{}", entry.username, entry.database));
    for grant in &entry.grants {
        ui::kv("role", &grant.to_string());
    }
    ui::dim("Declare it in the users file; the next apply sets its password.");
    Ok(())
}

/// Read an existing user and record it in the state file.
fn import<S: Session>(
    reconciler: &Reconciler<S>,
    state_path: &Path,
    raw_id: &str,
) -> Result<ManagedUser> {
    let id = ResourceId::parse(raw_id)
        .with_context(|| format!("Cannot import {raw_id:?}"))?;

    let mut state = UserctlState::load(state_path)?;
    if state.get(&id).is_some() {
        bail!("{id} is already managed");
    }

    let Some(record) = reconciler
        .import(&id)
        .with_context(|| format!("Failed to read {id}"))?
    else {
        bail!("{id} does not exist on the server");
    };

    // No digest: the password is unknown until the next apply sets it
    let entry = ManagedUser::from_applied(&record, String::new());
    state.record(&id, entry.clone());
    state.touch(state_path)?;
    Ok(entry)
}
