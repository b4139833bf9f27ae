use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "steward")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge this machine to its declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/steward/config.toml)
    #[arg(long, global = true, env = "STEWARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge every resource in the manifest
    Apply(ApplyArgs),

    /// Show what apply would change, without changing anything
    Status(StatusArgs),

    /// Set the machine's names directly
    Hostname(HostnameArgs),

    /// Show the report of the last apply
    Report {
        /// Print the raw JSON report
        #[arg(long)]
        json: bool,
    },

    /// List resource types with their properties and actions
    Resources,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Manifest to apply (default: ~/.config/steward/manifest.toml)
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Evaluate guards and report, but change nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser)]
pub struct StatusArgs {
    /// Manifest to check (default: ~/.config/steward/manifest.toml)
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Number of resources checked in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,
}

#[derive(Parser)]
pub struct HostnameArgs {
    /// Which names to set
    #[arg(value_enum)]
    pub action: HostnameActionArg,

    /// The hostname
    pub name: String,

    /// Computer name, if different from the hostname
    #[arg(long)]
    pub computername: Option<String>,

    /// Bonjour local hostname, if different from the hostname
    #[arg(long)]
    pub localhostname: Option<String>,

    /// Report what would change without changing it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum HostnameActionArg {
    /// HostName, ComputerName and LocalHostName
    Set,
    /// LocalHostName only
    Local,
    /// ComputerName only
    ComputerName,
    /// HostName only
    Host,
}
