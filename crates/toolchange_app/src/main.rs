mod cli;
mod commands;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use toolchange_engine::{Environment, TrackerConfig};
use tracker_logging::{tracker_error, Verbosity};

use crate::cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = cli.command.logging();
    let verbosity = if logging.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Quiet
    };
    tracker_logging::initialize(verbosity, logging.log_file.as_deref());

    let config = TrackerConfig::resolve(&Environment::from_process());
    let stdout = io::stdout();
    match commands::run(&cli.command, &config, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // The printer host relays stdout to the operator console.
            tracker_error!("{:#}", err);
            println!("ERROR: {err:#}");
            ExitCode::FAILURE
        }
    }
}
