//! mibd CLI Binary
//!
//! Hosts the telemetry agent and talks to running ones.

use anyhow::Context;
use clap::Parser;
use mibd::cli::{Cli, CliContext};
use mibd::logging::init_logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut context =
        CliContext::new(cli.config.clone()).context("Failed to load configuration")?;
    context.apply_log_overrides(&cli);
    init_logging(Some(&context.config().logging)).context("Failed to initialize logging")?;

    let output = context.execute(&cli.command)?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
