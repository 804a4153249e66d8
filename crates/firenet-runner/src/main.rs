//! `firenet` binary entry point.

use clap::Parser;
use firenet_runner::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    firenet_metrics::describe_metrics();

    if let Err(e) = firenet_runner::run(cli.command) {
        tracing::error!(error = %e, "firenet exited with an error");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .compact()
        .with_writer(std::io::stderr)
        .init();
}
