//! Server configuration module.
//!
//! This module provides configuration loading for the server from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `STRINGDB_DATA_DIRECTORY`: Directory holding the commit log (default: `./data`)
//! - `STRINGDB_LISTEN_PORT`: Port to listen on (default: `9042`)
//! - `STRINGDB_SYNC_COMMIT_LOG`: Whether every commit log append is synced
//!   to disk before it is acknowledged (default: `true`)
//!
//! # Invariants
//!
//! - `data_directory` is always a valid path (may not exist yet)
//! - `listen_port` is always a valid, nonzero port number

use std::path::PathBuf;

const DATA_DIRECTORY_VAR: &str = "STRINGDB_DATA_DIRECTORY";
const LISTEN_PORT_VAR: &str = "STRINGDB_LISTEN_PORT";
const SYNC_COMMIT_LOG_VAR: &str = "STRINGDB_SYNC_COMMIT_LOG";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Directory where the commit log is stored.
    pub data_directory: PathBuf,
    /// Port to listen on for WebSocket connections.
    pub listen_port: u16,
    /// Sync each commit log append before acknowledging the write.
    pub sync_commit_log: bool,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    /// Default port for the server.
    pub const DEFAULT_PORT: u16 = 9042;
    /// Default data directory.
    pub const DEFAULT_DATA_DIRECTORY: &'static str = "./data";
    /// File name of the commit log inside the data directory.
    pub const COMMIT_LOG_FILE: &'static str = "commitlog.db";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `STRINGDB_LISTEN_PORT` or
    /// `STRINGDB_SYNC_COMMIT_LOG` is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_directory = lookup(DATA_DIRECTORY_VAR)
            .filter(|value| !value.is_empty())
            .map_or_else(|| PathBuf::from(Self::DEFAULT_DATA_DIRECTORY), PathBuf::from);
        let listen_port = Self::parse_listen_port(lookup(LISTEN_PORT_VAR))?;
        let sync_commit_log = Self::parse_sync_commit_log(lookup(SYNC_COMMIT_LOG_VAR))?;

        Ok(Self {
            data_directory,
            listen_port,
            sync_commit_log,
        })
    }

    /// Path of the commit log file.
    #[must_use]
    pub fn commit_log_path(&self) -> PathBuf {
        self.data_directory.join(Self::COMMIT_LOG_FILE)
    }

    fn parse_listen_port(value: Option<String>) -> Result<u16, ConfigError> {
        let Some(value) = value else {
            return Ok(Self::DEFAULT_PORT);
        };
        match value.parse::<u16>() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(ConfigError::InvalidValue {
                name: LISTEN_PORT_VAR.to_string(),
                message: format!("'{value}' is not a valid port number (must be 1-65535)"),
            }),
        }
    }

    fn parse_sync_commit_log(value: Option<String>) -> Result<bool, ConfigError> {
        let Some(value) = value else {
            return Ok(true);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                name: SYNC_COMMIT_LOG_VAR.to_string(),
                message: format!("'{value}' is not a boolean"),
            }),
        }
    }
}
