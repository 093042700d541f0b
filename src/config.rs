//! Application configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::errors::GpsLoggerError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// What to do when the networked store cannot be reached
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Serve the call from the embedded store. Rows written meanwhile are
    /// not copied to the networked store later.
    #[default]
    Embedded,
    /// Fail the call with a 503
    FailClosed,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Networked store descriptor; absent selects the embedded store
    pub url: Option<String>,
    /// Embedded store file
    pub path: PathBuf,
    /// Bound on each connection attempt and each statement
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
    pub fallback: FallbackPolicy,
}

impl AppConfig {
    /// Load configuration
    ///
    /// Sources, later ones winning: built-in defaults, `config/default.*`,
    /// `GPSLOGGER__*` environment variables, then the bare `DATABASE_URL`
    /// and `PORT` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("database.path", "gps.db")?
            .set_default("database.timeout", 10)?
            .set_default("database.fallback", "embedded")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("GPSLOGGER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .build()?;

        config.try_deserialize()
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, GpsLoggerError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GpsLoggerError::ConfigurationError {
                message: format!("Invalid listen address {}:{}: {}", self.host, self.port, e),
            })
    }
}

impl DatabaseConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), GpsLoggerError> {
        self.validate_path()?;
        self.validate_timeout()?;
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.ensure_directory_exists(dir)?;
        }
        Ok(())
    }

    fn validate_path(&self) -> Result<(), GpsLoggerError> {
        if self.path.as_os_str().is_empty() {
            return Err(GpsLoggerError::ConfigurationError {
                message: "Database path cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    fn validate_timeout(&self) -> Result<(), GpsLoggerError> {
        if self.timeout.is_zero() {
            return Err(GpsLoggerError::ConfigurationError {
                message: "Database timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_directory_exists(&self, dir: &Path) -> Result<(), GpsLoggerError> {
        if !dir.exists() {
            warn!("Database directory does not exist, attempting to create it");
            std::fs::create_dir_all(dir).map_err(|e| GpsLoggerError::ConfigurationError {
                message: format!("Could not create database directory: {}", e),
            })?;
        }
        Ok(())
    }
}
