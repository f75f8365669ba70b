use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "userctl")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative MongoDB users and role grants", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Users file [default: ~/.config/userctl/users.toml]
    #[arg(long, global = true, env = "USERCTL_CONFIG")]
    pub config: Option<String>,

    /// State file [default: ~/.local/state/userctl/state.toml]
    #[arg(long, global = true, env = "USERCTL_STATE")]
    pub state: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// How to reach the server
#[derive(Args)]
pub struct ConnectionArgs {
    /// Server URI
    #[arg(
        long,
        global = true,
        env = "MONGODB_URL",
        default_value = principal::session::mongosh::DEFAULT_URI
    )]
    pub uri: String,

    /// Administrative user to authenticate as
    #[arg(long, global = true, env = "MONGODB_USERNAME")]
    pub username: Option<String>,

    /// Password of the administrative user
    #[arg(long, global = true, env = "MONGODB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database the administrative user is defined in
    #[arg(long, global = true, default_value = "admin")]
    pub auth_database: String,

    /// Path to the mongosh executable [default: found on PATH]
    #[arg(long, global = true, env = "MONGOSH_PATH")]
    pub mongosh: Option<String>,

    /// Seconds allowed per round trip (1 to 86400)
    #[arg(
        long,
        global = true,
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..=86_400)
    )]
    pub timeout: u64,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Create, update and drop users to match the users file
    Apply(ApplyArgs),

    /// Drop every user in the state file
    Destroy(DestroyArgs),

    /// Start managing an existing user
    Import {
        /// Identifier as <database>.<username>
        id: String,
    },

    /// List managed users
    Show,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct PlanArgs {
    /// Number of parallel jobs
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Show what would be done without doing it
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel jobs
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel jobs
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}
