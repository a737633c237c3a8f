//! Shared helpers for the CLI commands.

pub mod logging;

pub use logging::initialize_logging;
