//! # butterfly-water CLI
//!
//! Builds, inspects and queries `water.idx` land/water/coast indexes.

use clap::Parser;
use log::error;

mod cli;

fn main() {
    let cli = cli::Cli::parse();

    // Initialize logging to stderr, RUST_LOG overrides the default level
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = cli::run(cli) {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}
