//! Declarative commands
//!
//! - `plan` - Show what apply would change
//! - `apply` - Make the server match the users file
//! - `destroy` - Drop every managed user

use anyhow::{Result, bail};
use principal::{Reconciler, Session};

use crate::Context;
use crate::cli::{ApplyArgs, DestroyArgs};
use crate::config::{DesiredUser, UsersConfig};
use crate::engine::{self, ExecuteOptions, Plan, differ, planner};
use crate::progress;
use crate::state::UserctlState;
use crate::ui;

fn load_desired(ctx: &Context) -> Result<Vec<DesiredUser>> {
    let desired = UsersConfig::load(&ctx.config_path)?.into_desired(|var| std::env::var(var).ok())?;
    log::info!("{} users declared in {}", desired.len(), ctx.config_path.display());
    Ok(desired)
}

fn build_plan(
    ctx: &Context,
    reconciler: &Reconciler<impl Session>,
    state: &UserctlState,
    pool: &rayon::ThreadPool,
) -> Result<Plan> {
    let desired = load_desired(ctx)?;

    let spinner = progress::spinner(&format!("Refreshing {} managed users...", state.users.len()));
    let observed = planner::refresh(reconciler, state, pool);
    spinner.finish_and_clear();

    Ok(planner::plan(&desired, &observed?))
}

pub fn plan(ctx: &Context, jobs: usize) -> Result<()> {
    let state = UserctlState::load(&ctx.state_path)?;
    let reconciler = crate::commands::connect(ctx)?;
    let pool = engine::thread_pool(jobs)?;

    let plan = build_plan(ctx, &reconciler, &state, &pool)?;
    differ::display_plan(&plan);
    Ok(())
}

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let mut state = UserctlState::load(&ctx.state_path)?;
    let reconciler = crate::commands::connect(ctx)?;
    let pool = engine::thread_pool(args.jobs)?;

    let plan = build_plan(ctx, &reconciler, &state, &pool)?;
    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        yes: args.yes,
    };
    let summary = engine::execute(&plan, &reconciler, &mut state, &ctx.state_path, &pool, &opts)?;

    if !summary.is_success() {
        bail!("{} of {} changes failed", summary.failed, plan.changes.len());
    }
    Ok(())
}

pub fn destroy(ctx: &Context, args: &DestroyArgs) -> Result<()> {
    let mut state = UserctlState::load(&ctx.state_path)?;
    if state.users.is_empty() {
        ui::info("No managed users");
        return Ok(());
    }

    let reconciler = crate::commands::connect(ctx)?;
    let pool = engine::thread_pool(args.jobs)?;
    let plan = Plan::destroy(&state)?;
    let opts = ExecuteOptions {
        dry_run: false,
        yes: args.yes,
    };
    let summary = engine::execute(&plan, &reconciler, &mut state, &ctx.state_path, &pool, &opts)?;

    if !summary.is_success() {
        bail!("{} of {} users could not be dropped", summary.failed, plan.changes.len());
    }
    Ok(())
}
