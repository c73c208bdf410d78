//! CLI entry point for Custodian.
//!
//! This binary provides the `custodian` command with subcommands for
//! managing encrypted secrets and maintaining the audit chain. Settings
//! come from `CUSTODIAN_*` environment variables, optionally loaded from a
//! `.env` file in the working directory.

mod audit_commands;
mod cli;
mod helpers;
mod secret_commands;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // A missing .env file is normal; real environment variables win.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    helpers::init_tracing("info");

    match cli.command {
        Commands::Secret { action } => secret_commands::run(action, cli.actor),
        Commands::Audit { action } => audit_commands::run(action, cli.actor),
    }
}
