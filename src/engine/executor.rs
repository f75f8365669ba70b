//! Execution engine - applies a plan with UI integration

use anyhow::Result;
use colored::Colorize;
use principal::{Error, ErrorCategory, PrincipalState, Reconciler, ResourceId, Session};
use rayon::prelude::*;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::config::DesiredUser;
use crate::progress;
use crate::state::{ManagedUser, UserctlState};

use super::differ::display_plan;
use super::planner::{Action, Change, Plan};

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip confirmation prompts
    pub yes: bool,
}

/// Result of applying one change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    Created,
    Modified,
    Removed,
    Failed {
        error: String,
        category: Option<ErrorCategory>,
    },
}

/// Summary of execution results
#[derive(Debug, Default)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// What a change means for the user's state entry
#[derive(Debug, Clone, PartialEq, Eq)]
enum StateChange {
    Record(ManagedUser),
    Forget,
    Keep,
}

/// Where the state lives while changes run in parallel
struct StateSink<'a> {
    state: Mutex<UserctlState>,
    path: &'a Path,
}

impl StateSink<'_> {
    fn lock(&self) -> MutexGuard<'_, UserctlState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record the outcome of one change and persist it
    fn commit(&self, id: &ResourceId, change: StateChange) -> Result<()> {
        let mut state = self.lock();
        match change {
            StateChange::Record(entry) => state.record(id, entry),
            StateChange::Forget => {
                state.forget(id);
            }
            StateChange::Keep => return Ok(()),
        }
        state.touch(self.path)
    }

    fn into_inner(self) -> UserctlState {
        match self.state.into_inner() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Show the plan, confirm, then apply it.
///
/// The state is saved after every completed change, so an interrupted or
/// partially failed run leaves it matching the server.
pub fn execute<S: Session>(
    plan: &Plan,
    reconciler: &Reconciler<S>,
    state: &mut UserctlState,
    state_path: &Path,
    pool: &rayon::ThreadPool,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    display_plan(plan);

    if plan.is_empty() {
        return Ok(ExecuteSummary::default());
    }

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(ExecuteSummary::default());
    }

    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: plan.changes.len(),
            ..Default::default()
        });
    }

    println!();
    println!(
        "  {} Applying {} changes...",
        "→".cyan(),
        plan.changes.len()
    );

    let sink = StateSink {
        state: Mutex::new(std::mem::take(state)),
        path: state_path,
    };
    let outcomes = execute_parallel(&plan.changes, reconciler, &sink, pool);
    *state = sink.into_inner();

    let summary = summarize(&outcomes);
    print_failures(&outcomes);
    print_summary(&summary);

    Ok(summary)
}

/// Execute changes in parallel
fn execute_parallel<S: Session>(
    changes: &[Change],
    reconciler: &Reconciler<S>,
    sink: &StateSink<'_>,
    pool: &rayon::ThreadPool,
) -> Vec<(ResourceId, ApplyResult)> {
    let pb = progress::bar(changes.len(), "Applying");

    let outcomes = pool.install(|| {
        changes
            .par_iter()
            .map(|change| {
                let (applied, state_change) = apply_change(reconciler, change);
                let saved = sink.commit(&change.id, state_change);
                let result = match (applied, saved) {
                    (Ok(result), Ok(())) => result,
                    (Ok(_), Err(e)) => ApplyResult::Failed {
                        error: format!("applied, but the state file was not saved: {e:#}"),
                        category: None,
                    },
                    (Err(e), saved) => {
                        if let Err(save_err) = saved {
                            log::warn!("state file was not saved after {}: {save_err:#}", change.id);
                        }
                        ApplyResult::Failed {
                            error: e.to_string(),
                            category: Some(e.category()),
                        }
                    }
                };

                let symbol = match &result {
                    ApplyResult::Failed { .. } => "✗",
                    _ => "✓",
                };
                pb.set_message(format!("{} {}", symbol, change.id));
                pb.inc(1);

                (change.id.clone(), result)
            })
            .collect()
    });

    pb.finish_and_clear();
    outcomes
}

/// Apply one change.
///
/// The state change is returned even when the change failed: a create
/// whose read-back failed still left a user on the server, and that user
/// stays tracked.
fn apply_change<S: Session>(
    reconciler: &Reconciler<S>,
    change: &Change,
) -> (principal::Result<ApplyResult>, StateChange) {
    let user = match change.action {
        Action::Delete => {
            return match reconciler.delete(&change.id) {
                Ok(()) => (Ok(ApplyResult::Removed), StateChange::Forget),
                Err(e) => (Err(e), StateChange::Keep),
            };
        }
        Action::Create | Action::Replace | Action::Update => match declared(change) {
            Ok(user) => user,
            Err(e) => return (Err(e), StateChange::Keep),
        },
    };

    if change.action == Action::Update {
        let mut record = PrincipalState::managed(change.id.clone(), user.principal.clone());
        return match reconciler.update(&mut record) {
            Ok(()) if !record.exists() => {
                log::warn!("{} disappeared right after its update", change.id);
                (Ok(ApplyResult::Modified), StateChange::Forget)
            }
            Ok(()) => (Ok(ApplyResult::Modified), entry(&record, user)),
            Err(e) => (Err(e), StateChange::Keep),
        };
    }

    let mut record = PrincipalState::unmanaged(user.principal.clone());
    let created = reconciler.create(&mut record);
    if let Err(e) = &created {
        if record.exists() {
            log::warn!("{} was created but could not be read back: {e}", change.id);
        }
    }
    let state_change = if record.exists() {
        entry(&record, user)
    } else {
        StateChange::Keep
    };
    (created.map(|()| ApplyResult::Created), state_change)
}

fn entry(record: &PrincipalState, user: &DesiredUser) -> StateChange {
    StateChange::Record(ManagedUser::from_applied(
        record,
        user.password_digest.clone(),
    ))
}

fn declared(change: &Change) -> principal::Result<&DesiredUser> {
    change.desired.as_ref().ok_or_else(|| Error::InvalidInput {
        field: "plan",
        message: format!("{} has no declared user", change.id),
    })
}

fn summarize(outcomes: &[(ResourceId, ApplyResult)]) -> ExecuteSummary {
    let mut summary = ExecuteSummary::default();
    for (_, result) in outcomes {
        match result {
            ApplyResult::Created => summary.created += 1,
            ApplyResult::Modified => summary.modified += 1,
            ApplyResult::Removed => summary.removed += 1,
            ApplyResult::Failed { .. } => summary.failed += 1,
        }
    }
    summary
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(false)
        .interact()?;

    Ok(confirmed)
}

fn print_failures(outcomes: &[(ResourceId, ApplyResult)]) {
    for (id, result) in outcomes {
        if let ApplyResult::Failed { error, category } = result {
            println!("    {} {}: {}", "✗".red(), id, error);
            if let Some(category) = category {
                let hint = format!("{}. {}", category.description(), category.advice());
                println!("      {}", hint.dimmed());
            }
        }
    }
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!(
            "  {} {} changes applied successfully!",
            "✓".green().bold(),
            summary.total_changes()
        );
    } else {
        println!("  {} Users reconciled with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} users created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} users updated", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} users dropped", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} changes skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "changes".red());
    }
}
