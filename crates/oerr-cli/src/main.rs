//! oerr CLI - Offline lookup of Oracle error messages
//!
//! This is the main entry point for the oerr command-line interface.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use oerr_core::resolve_store_path;
use std::process::ExitCode;

mod cli;
mod commands;
mod error;
mod utils;

use cli::{Cli, Commands};
use error::exit_code_from_error;
use utils::initialize_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(&cli) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match execute_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code_from_error(&e))
        },
    }
}

async fn execute_command(cli: Cli) -> Result<()> {
    let store = resolve_store_path(cli.db.as_deref());
    match cli.command {
        Some(Commands::Download { url, concurrency }) => {
            commands::download(&url, concurrency, cli.config.as_deref(), &store, cli.quiet).await
        },
        Some(Commands::Get { id, json }) => commands::get(&id, &store, json),
        None => match cli.id {
            Some(id) => commands::get(&id, &store, false),
            None => {
                Cli::command().print_help()?;
                Ok(())
            },
        },
    }
}
