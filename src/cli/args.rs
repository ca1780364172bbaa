//! CLI argument definitions using clap
//!
//! Commands:
//! - backend-storage serve --config <path>
//! - backend-storage search --config <path> --tid <id>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

/// Collection storage service with a join-query engine
#[derive(Parser, Debug)]
#[command(name = "backend-storage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Run one search request read from stdin and exit
    Search {
        /// Path to configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Transaction id to bind the search to
        #[arg(long)]
        tid: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["backend-storage", "serve"]).unwrap();
        match cli.command {
            Command::Serve { config } => assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_PATH)),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_search_with_tid() {
        let cli = Cli::try_parse_from([
            "backend-storage",
            "search",
            "--config",
            "/etc/storage.json",
            "--tid",
            "t1",
        ])
        .unwrap();
        match cli.command {
            Command::Search { config, tid } => {
                assert_eq!(config, PathBuf::from("/etc/storage.json"));
                assert_eq!(tid.as_deref(), Some("t1"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
