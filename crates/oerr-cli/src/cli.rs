//! # CLI Structure and Argument Parsing
//!
//! ```bash
//! # Harvest the reference into the default store
//! oerr download
//!
//! # Look up a message (bare identifier is shorthand for `get`)
//! oerr ORA-00942
//! oerr get tns-12541 --json
//! ```

use clap::{Parser, Subcommand};
use oerr_core::config::{DEFAULT_TOC_URL, STORE_PATH_ENV};
use std::path::PathBuf;

/// Main CLI structure for the `oerr` command
#[derive(Parser, Clone, Debug)]
#[command(name = "oerr")]
#[command(version)]
#[command(about = "oerr - Offline lookup of Oracle error messages", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
#[command(override_usage = "oerr [OPTIONS] <COMMAND>\n       oerr [OPTIONS] <ID>")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Message to look up when no command is given, e.g. ORA-00942
    #[arg(value_name = "ID")]
    pub id: Option<String>,

    /// Path of the message store
    #[arg(short = 'D', long, global = true, env = STORE_PATH_ENV, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// TOML file with harvest settings
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Harvest the error-message reference into a fresh store
    ///
    /// Any existing store at the target path is replaced.
    Download {
        /// Table-of-contents page to start from
        #[arg(long, default_value = DEFAULT_TOC_URL, value_name = "URL")]
        url: String,

        /// Maximum number of pages fetched at once, 1 to 8 (overrides the config file)
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
    },

    /// Print the explanation stored for one message
    Get {
        /// Message identifier: ORA-00001, tns-12541, or a bare code (ORA assumed)
        #[arg(value_name = "ID")]
        id: String,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
}
