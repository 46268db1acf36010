//! Lattice CLI - a preset-driven build matrix orchestrator for CMake

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, MessageFormat};
use lattice::builder::BuildEvent;
use lattice::util::diagnostic::emit;
use lattice::util::shell::{ColorChoice, Shell};
use lattice::LatticeError;

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("lattice=debug")
    } else {
        EnvFilter::new("lattice=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let color = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let shell = Arc::new(Shell::from_flags(
        cli.quiet,
        cli.verbose,
        color,
        cli.message_format == MessageFormat::Json,
    ));

    match run(cli.command, &shell) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            report_error(&e, &shell);
            std::process::exit(1);
        }
    }
}

/// Returns whether the command succeeded.
fn run(command: Commands, shell: &Arc<Shell>) -> Result<bool> {
    match command {
        Commands::Build(args) => commands::build::execute(args, shell),
        Commands::Resolve(args) => commands::resolve::execute(args, shell),
        Commands::Presets(args) => commands::presets::execute(args, shell),
        Commands::Toolchain(args) => commands::toolchain::execute(args, shell),
        Commands::Clean(args) => commands::clean::execute(args, shell),
        Commands::FetchVcpkg(args) => commands::fetch::execute(args, shell),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

fn report_error(err: &anyhow::Error, shell: &Shell) {
    let Some(lattice_err) = err.downcast_ref::<LatticeError>() else {
        eprintln!("error: {:#}", err);
        return;
    };

    if shell.is_json() {
        shell.json_event(&BuildEvent::diagnostic("error", lattice_err.to_string()).to_value());
    } else {
        emit(&lattice_err.to_diagnostic(), shell.use_color());
    }
}
