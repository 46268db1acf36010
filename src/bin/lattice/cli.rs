//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell as CompletionShell;

use lattice::core::Compiler;

/// Lattice - build every CMake preset variant of a project from one command
#[derive(Parser)]
#[command(name = "lattice")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (streams tool output, debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors and the final outcome table
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Output format for messages
    #[arg(long, global = true, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure and build a matrix of presets
    Build(BuildArgs),

    /// Print the preset name for one combination of dimensions
    Resolve(ResolveArgs),

    /// List the configure presets declared by the project
    Presets(PresetsArgs),

    /// Show the detected host toolchain
    Toolchain(ToolchainArgs),

    /// Remove the shared build and install output of every preset
    Clean(CleanArgs),

    /// Clone and bootstrap vcpkg
    FetchVcpkg(FetchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct MatrixArgs {
    /// Configuration: debug, release or both
    #[arg(short, long, default_value = "debug")]
    pub config: String,

    /// Target platform: host, cross or all
    #[arg(long, default_value = "host")]
    pub platform: String,

    /// Architectures, comma separated, or `all`
    #[arg(long, value_delimiter = ',', default_value = "x64")]
    pub arch: Vec<String>,

    /// Compiler: default, clang or gcc
    #[arg(long, default_value = "default")]
    pub compiler: Compiler,

    /// Also build the auxiliary tools (needs vcpkg)
    #[arg(long)]
    pub build_tools: bool,

    /// Presets file (defaults to CMakePresets.json in the project root)
    #[arg(long)]
    pub presets: Option<PathBuf>,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub matrix: MatrixArgs,

    /// Remove the whole output root first (affects every preset)
    #[arg(long)]
    pub clean: bool,

    /// Run the install stage
    #[arg(long)]
    pub install: bool,

    /// Run the test stage
    #[arg(long)]
    pub test: bool,

    /// Number of presets to build at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Ignore the saved toolchain environment and detect again
    #[arg(long)]
    pub redetect: bool,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Configuration: debug or release
    #[arg(short, long, default_value = "debug")]
    pub config: String,

    /// Target platform: host or cross
    #[arg(long, default_value = "host")]
    pub platform: String,

    /// Architecture
    #[arg(long, default_value = "x64")]
    pub arch: String,

    /// Compiler: default, clang or gcc
    #[arg(long, default_value = "default")]
    pub compiler: Compiler,

    /// Include the auxiliary tools feature
    #[arg(long)]
    pub build_tools: bool,

    /// Presets file (defaults to CMakePresets.json in the project root)
    #[arg(long)]
    pub presets: Option<PathBuf>,

    /// Also check that the host has the tools the preset needs
    #[arg(long)]
    pub check_tools: bool,
}

#[derive(Args)]
pub struct PresetsArgs {
    /// Presets file (defaults to CMakePresets.json in the project root)
    #[arg(long)]
    pub presets: Option<PathBuf>,
}

#[derive(Args)]
pub struct ToolchainArgs {
    /// Inspect the host even if a saved environment exists
    #[arg(long)]
    pub redetect: bool,

    /// Write the result to .lattice/toolchain.env
    #[arg(long)]
    pub save: bool,
}

#[derive(Args)]
pub struct CleanArgs {}

#[derive(Args)]
pub struct FetchArgs {
    /// Where to clone vcpkg (defaults to ~/.lattice/vcpkg)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: CompletionShell,
}
