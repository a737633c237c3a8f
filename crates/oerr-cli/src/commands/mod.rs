//! Command implementations for the oerr CLI.

mod download;
mod get;

pub use download::execute as download;
pub use get::execute as get;
