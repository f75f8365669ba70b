//! Plan display

use colored::{ColoredString, Colorize};

use super::planner::{Action, Plan};

fn colored_symbol(action: Action) -> ColoredString {
    match action {
        Action::Create => action.symbol().green(),
        Action::Update => action.symbol().yellow(),
        Action::Replace => action.symbol().magenta(),
        Action::Delete => action.symbol().red(),
    }
}

/// Display a plan in a user-friendly format
pub fn display_plan(plan: &Plan) {
    if plan.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        if !plan.unchanged.is_empty() {
            println!("    {} users up to date", plan.unchanged.len());
        }
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "User Changes".bold()
    );
    println!("│");

    for change in &plan.changes {
        let detail = if change.reasons.is_empty() {
            String::new()
        } else {
            change.reasons.join("; ")
        };
        println!(
            "│   {:<3} {:<30} {}",
            colored_symbol(change.action),
            change.id.to_string(),
            detail.dimmed()
        );
    }
    println!("│");

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to replace, {} to delete",
        plan.count(Action::Create).to_string().green(),
        plan.count(Action::Update).to_string().yellow(),
        plan.count(Action::Replace).to_string().magenta(),
        plan.count(Action::Delete).to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}
