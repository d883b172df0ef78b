//! bundlex CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use bundlex::core::errors::BundlexError;
use bundlex::util::diagnostic::{emit, Diagnostic};
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color;

    let filter = if cli.verbose {
        EnvFilter::new("bundlex=debug")
    } else {
        EnvFilter::new("bundlex=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    if let Err(e) = run(cli) {
        report(&e, color);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Target(args) => commands::target::execute(args),
        Commands::Plan(args) => commands::plan::execute(args),
        Commands::Flags(args) => commands::flags::execute(args),
        Commands::Build(args) => commands::build::execute(args),
        Commands::Clean(args) => commands::clean::execute(args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Print an error, as a diagnostic when it carries a `BundlexError`.
fn report(err: &anyhow::Error, color: bool) {
    let Some(cause) = err.chain().find_map(|e| e.downcast_ref::<BundlexError>()) else {
        eprintln!("error: {:#}", err);
        return;
    };

    let mut diagnostic: Diagnostic = cause.to_diagnostic();
    for outer in err.chain().take_while(|e| e.downcast_ref::<BundlexError>().is_none()) {
        diagnostic = diagnostic.with_context(outer.to_string());
    }
    emit(&diagnostic, color);
}
