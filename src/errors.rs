//! Errors for the GPS logger
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpsLoggerError {
    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl(#[source] sqlx::Error),

    /// Opening a connection failed. This is the only storage error that
    /// triggers fallback to the embedded backend.
    #[error("Database connection error: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Storage call exceeded {0:?}")]
    Timeout(Duration),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),
}

/// Client input that cannot be turned into a location record.
///
/// The `Display` text is the reason returned to the client.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("missing/invalid coordinates")]
    MissingCoordinates,

    #[error("not a location payload")]
    NotLocationPayload,

    #[error("invalid lat/lon")]
    InvalidLatLon,

    #[error("invalid {0}")]
    InvalidMetric(&'static str),
}
