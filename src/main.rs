//! Main entry point for rowdiff CLI

use clap::Parser;
use log::LevelFilter;
use rowdiff::cli::Cli;
use rowdiff::commands::execute_command;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Err(e) = execute_command(cli.command, !cli.quiet) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
