//! Tally backup CLI
//!
//! Command-line front end for the Tally backup subsystem: local snapshots,
//! restore, and cloud sync, all driven through the repository façade.

mod cli;
mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23 requires a process-level crypto provider before any TLS use.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Backup(args) => commands::backup::run(args, &cli.globals).await,
        Commands::List(args) => commands::list::run(args, &cli.globals).await,
        Commands::Delete(args) => commands::delete::run(args, &cli.globals).await,
        Commands::Restore(args) => commands::restore::run(args, &cli.globals).await,
        Commands::Sync(args) => commands::sync::run(args, &cli.globals).await,
        Commands::Verify => commands::verify::run(&cli.globals).await,
        Commands::Status(args) => commands::status::run(args, &cli.globals).await,
        Commands::Settings(args) => commands::settings::run(args, &cli.globals).await,
    }
}

/// Wire up the tracing subscriber from the verbosity flags.
fn init_tracing(verbose: u8, quiet: bool) {
    let directive = match (quiet, verbose) {
        (true, _) => "error",
        // Info by default so restore and sync stages are visible;
        // --quiet suppresses, -v/-vv add detail.
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::new(directive))
        .init();
}
