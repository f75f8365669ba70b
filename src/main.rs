mod cli;
mod commands;
mod config;
mod engine;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, ConnectionArgs};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub config_path: PathBuf,
    pub state_path: PathBuf,
    pub connection: ConnectionArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "userctl", &mut io::stdout());
        return Ok(());
    }

    let ctx = Context {
        quiet: cli.quiet,
        config_path: match cli.config.as_deref() {
            Some(path) => config::expand_path(path),
            None => config::default_config_path()?,
        },
        state_path: match cli.state.as_deref() {
            Some(path) => config::expand_path(path),
            None => state::UserctlState::default_path()?,
        },
        connection: cli.connection,
    };

    match cli.command {
        Command::Plan(args) => commands::reconcile::plan(&ctx, args.jobs),
        Command::Apply(args) => commands::reconcile::apply(&ctx, &args),
        Command::Destroy(args) => commands::reconcile::destroy(&ctx, &args),
        Command::Import { id } => commands::import::run(&ctx, &id),
        Command::Show => commands::show::run(&ctx),
        Command::Completions { .. } => Ok(()),
    }
}
