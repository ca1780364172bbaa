//! CLI module for the storage service
//!
//! Provides command-line interface for:
//! - serve: Start the HTTP server
//! - search: One-shot search execution over stdin/stdout

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{run, run_command, search, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_request, read_request_from, write_error, write_response};
