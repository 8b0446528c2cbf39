use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use nodekit::{DEFAULT_GROUP, Role};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackup")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision a database, two web servers and a load balancer, then configure them", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create every node and configure its role
    Up(UpArgs),

    /// Destroy every node in a group
    Down(DownArgs),

    /// Print the configuration script for one role
    Render(RenderArgs),

    /// List the roles of the topology
    Roles(RolesArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Where to find the provider and its keys
#[derive(Args, Clone)]
pub struct ProviderArgs {
    /// Provider file (default: ~/.config/stackup/provider.toml)
    #[arg(short, long, env = "STACKUP_CONFIG")]
    pub config: Option<String>,

    /// Directory holding <group>.pub and <group>.key (default: next to the provider file)
    #[arg(short, long, env = "STACKUP_KEYS_DIR")]
    pub keys_dir: Option<String>,

    /// Group tag shared by every node
    #[arg(short, long, default_value = DEFAULT_GROUP)]
    pub group: String,
}

// ============================================================================
// Up
// ============================================================================

#[derive(Args)]
pub struct UpArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Configure the database and web servers concurrently with this many jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Fail instead of binding nodes by position when no name matches
    #[arg(long)]
    pub strict_names: bool,

    /// Per-script timeout in seconds
    #[arg(long, default_value = "1200")]
    pub timeout: u64,

    /// Start scripts in the background instead of waiting for them
    #[arg(long)]
    pub no_block: bool,

    /// MySQL root password to pre-seed
    #[arg(long, env = "STACKUP_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Show what would be created and run, using an in-memory provider
    #[arg(short, long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

// ============================================================================
// Down
// ============================================================================

#[derive(Args)]
pub struct DownArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Render
// ============================================================================

#[derive(Args)]
pub struct RenderArgs {
    /// Role to render (db, web-1, web-2, lb)
    pub role: Role,

    /// Private address of the database node
    #[arg(long)]
    pub private: Option<String>,

    /// Public address of the web-server node
    #[arg(long)]
    pub public: Option<String>,

    /// Load-balancer backend as NAME=ADDRESS (repeatable, in order)
    #[arg(long = "backend", value_name = "NAME=ADDRESS")]
    pub backends: Vec<String>,

    /// MySQL root password to pre-seed
    #[arg(long, env = "STACKUP_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,
}

// ============================================================================
// Roles
// ============================================================================

#[derive(Args)]
pub struct RolesArgs {
    /// Group tag used to show node names
    #[arg(short, long, default_value = DEFAULT_GROUP)]
    pub group: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_up() {
        let cli = Cli::try_parse_from([
            "stackup", "up", "--group", "demo", "--jobs", "3", "--dry-run", "-y",
        ])
        .unwrap();
        let Command::Up(args) = cli.command else {
            panic!("expected up");
        };
        assert_eq!(args.provider.group, "demo");
        assert_eq!(args.jobs, Some(3));
        assert!(args.dry_run);
        assert!(args.yes);
        assert_eq!(args.timeout, 1200);
    }

    #[test]
    fn test_parse_render_role() {
        let cli = Cli::try_parse_from([
            "stackup",
            "render",
            "lb",
            "--backend",
            "a=10.0.0.1",
            "--backend",
            "b=10.0.0.2",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.role, Role::LoadBalancer);
        assert_eq!(args.backends.len(), 2);
    }

    #[test]
    fn test_render_rejects_unknown_role() {
        assert!(Cli::try_parse_from(["stackup", "render", "cache"]).is_err());
    }
}
