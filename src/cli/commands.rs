//! CLI command implementations
//!
//! Both commands load the configuration, apply its log level and build the
//! collection registry before doing anything else.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::collection::CollectionRegistry;
use crate::config::Config;
use crate::executor::{execute_search, SearchRequest};
use crate::http_server::HttpServer;
use crate::observability::{log_event_with_fields, Event, Logger};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(&config),
        Command::Search { config, tid } => search(&config, tid.as_deref()),
    }
}

/// Load the configuration and prepare the process around it
fn boot(config_path: &Path) -> CliResult<(Config, Arc<CollectionRegistry>, Runtime)> {
    let config = Config::load_or_default(config_path)?;
    Logger::set_min_severity(config.severity()?);

    let path = config_path.display().to_string();
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("path", path.as_str()),
            ("data_dir", config.data_dir.as_str()),
            ("default_type", config.default_collection_type.as_str()),
        ],
    );

    let registry = Arc::new(CollectionRegistry::new(
        config.data_path(),
        config.default_collection_type,
    ));

    let rt = Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    Ok((config, registry, rt))
}

/// Start the HTTP server and serve until it fails
pub fn serve(config_path: &Path) -> CliResult<()> {
    let (config, registry, rt) = boot(config_path)?;
    let server = HttpServer::new(&config, registry);

    rt.block_on(async {
        server
            .start()
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
    })
}

/// Execute one search request read from stdin
///
/// Request failures are reported on stdout as an error response; only
/// configuration and I/O failures make the command itself fail.
pub fn search(config_path: &Path, tid: Option<&str>) -> CliResult<()> {
    let (_config, registry, rt) = boot(config_path)?;

    let request = read_request()?;
    let request: SearchRequest = match serde_json::from_value(request) {
        Ok(request) => request,
        Err(e) => return write_error("STORAGE_INVALID_REQUEST", &e.to_string()),
    };

    match rt.block_on(execute_search(&registry, &request, tid)) {
        Ok(output) => write_response(serde_json::to_value(output)?),
        Err(err) => write_error(err.code(), &err.to_string()),
    }
}
