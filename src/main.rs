//! backend-storage CLI entry point
//!
//! Parses arguments, dispatches through `cli::run`, prints errors to stderr
//! and exits non-zero on failure. All logic lives in the CLI module.

use backend_storage::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
