use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::state::UserctlState;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let state = UserctlState::load(&ctx.state_path)?;

    if state.users.is_empty() {
        ui::info("No managed users");
        ui::dim(&format!("State file: {}", ctx.state_path.display()));
        return Ok(());
    }

    ui::header(&format!("Managed users ({})", state.users.len()));
    for (id, user) in &state.users {
        println!();
        println!("  {}", id.bold());
        let roles = if user.grants.is_empty() {
            "(none)".to_string()
        } else {
            user.grants
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        ui::kv("roles", &roles);
        if user.password_digest.is_empty() {
            ui::kv("password", &"not set by userctl".yellow().to_string());
        }
        ui::kv(
            "last applied",
            &user.last_applied.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
    }

    if !ctx.quiet {
        println!();
        ui::dim(&format!("State file: {}", ctx.state_path.display()));
    }
    Ok(())
}
