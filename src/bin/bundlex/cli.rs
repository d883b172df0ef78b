//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// bundlex - native code build orchestration for Erlang/Elixir applications
#[derive(Parser)]
#[command(name = "bundlex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the host target and platform family
    Target(TargetArgs),

    /// Resolve the build plan of an application
    Plan(PlanArgs),

    /// Show compile/link flags of a unit
    Flags(FlagsArgs),

    /// Build the natives and libs of an application
    Build(BuildArgs),

    /// Remove build outputs
    Clean(CleanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct TargetArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Selection shared by commands working on units.
#[derive(Args, Clone, Default)]
pub struct UnitSelection {
    /// Application to work on (defaults to the project in the current directory)
    #[arg(short, long)]
    pub app: Option<String>,

    /// Only these units
    #[arg(short, long = "unit")]
    pub units: Vec<String>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Don't download precompiled dependencies
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub selection: UnitSelection,

    /// Output the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct FlagsArgs {
    /// Unit to show flags for
    pub unit: String,

    /// Interface variant (nif, cnode, port)
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Application declaring the unit
    #[arg(short, long)]
    pub app: Option<String>,

    /// Show compile flags only
    #[arg(long)]
    pub compile: bool,

    /// Show link flags only
    #[arg(long)]
    pub link: bool,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub selection: UnitSelection,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Only clean outputs of this application
    #[arg(short, long)]
    pub app: Option<String>,

    /// Also remove cached precompiled archives
    #[arg(long)]
    pub precompiled: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
