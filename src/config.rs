//! Service configuration
//!
//! Loaded from a JSON file by the CLI. Every field has a default, so an empty
//! object (or no file at the default path) yields a runnable configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::{CliError, CliResult};
use crate::collection::CollectionType;
use crate::observability::Severity;

/// Path used when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "./backend-storage.json";

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 10001)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix the storage routes are nested under (default: "/storage")
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,

    /// Directory for file collections and the SQLite database
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Collection type used when a request names none
    #[serde(default = "default_collection_type")]
    pub default_collection_type: CollectionType,

    /// CORS allowed origins; empty means permissive
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Minimum log severity (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10001
}

fn default_route_prefix() -> String {
    "/storage".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_collection_type() -> CollectionType {
    CollectionType::Sql
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            route_prefix: default_route_prefix(),
            data_dir: default_data_dir(),
            default_collection_type: default_collection_type(),
            cors_origins: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Load `path`, falling back to defaults when the default path is absent
    ///
    /// An explicitly named file that does not exist is still an error.
    pub fn load_or_default(path: &Path) -> CliResult<Self> {
        if path == Path::new(DEFAULT_CONFIG_PATH) && !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parse and validate a JSON document
    pub fn parse(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.host.trim().is_empty() {
            return Err(CliError::config_error("host must not be empty"));
        }

        if self.port == 0 {
            return Err(CliError::config_error("port must be > 0"));
        }

        if !self.route_prefix.starts_with('/') || self.route_prefix.len() < 2 {
            return Err(CliError::config_error(format!(
                "Invalid route_prefix: '{}'. Must start with '/' and name a path.",
                self.route_prefix
            )));
        }

        if self.route_prefix.ends_with('/') {
            return Err(CliError::config_error(format!(
                "Invalid route_prefix: '{}'. Must not end with '/'.",
                self.route_prefix
            )));
        }

        if self.data_dir.trim().is_empty() {
            return Err(CliError::config_error("data_dir must not be empty"));
        }

        self.severity()?;

        Ok(())
    }

    /// Configured minimum log severity
    pub fn severity(&self) -> CliResult<Severity> {
        self.log_level
            .parse()
            .map_err(|e| CliError::config_error(format!("Invalid log_level: {}", e)))
    }

    /// Get data directory as Path
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.socket_addr(), "0.0.0.0:10001");
        assert_eq!(config.route_prefix, "/storage");
        assert_eq!(config.default_collection_type, CollectionType::Sql);
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.severity().unwrap(), Severity::Info);
    }

    #[test]
    fn test_overrides() {
        let config = Config::parse(
            r#"{"port": 8080, "default_collection_type": "memory", "log_level": "trace"}"#,
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.default_collection_type, CollectionType::Memory);
        assert_eq!(config.severity().unwrap(), Severity::Trace);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::parse(r#"{"port": 0}"#).is_err());
        assert!(Config::parse(r#"{"route_prefix": "storage"}"#).is_err());
        assert!(Config::parse(r#"{"route_prefix": "/storage/"}"#).is_err());
        assert!(Config::parse(r#"{"log_level": "loud"}"#).is_err());
        assert!(Config::parse(r#"{"default_collection_type": "mongo"}"#).is_err());
        assert!(Config::parse(r#"{"unknown": true}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"data_dir": "/tmp/storage"}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.data_path(), PathBuf::from("/tmp/storage"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Config::load_or_default(Path::new("/nonexistent/backend-storage.json"))
            .unwrap_err();
        assert_eq!(err.code_str(), "STORAGE_CLI_CONFIG_ERROR");
    }
}
