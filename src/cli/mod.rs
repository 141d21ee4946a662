//! Command line interface.

pub mod args;
pub mod commands;
pub mod errors;
pub mod io;

pub use args::Cli;
pub use commands::run;
pub use errors::{CliError, CliResult};
