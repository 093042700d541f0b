// src/database.rs
//! Location storage
//!
//! Two backends sit behind [`LocationStore`]: a networked PostgreSQL store and
//! an embedded SQLite file. [`Storage`] picks one at startup and, depending on
//! [`FallbackPolicy`], degrades to the embedded file when the networked store
//! cannot be reached.

pub mod models;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{ConnectOptions, Connection};
use tracing::{info, warn};

use crate::{
    config::{DatabaseConfig, FallbackPolicy},
    errors::GpsLoggerError,
    models::LocationRecord,
};
use models::{ExportRow, RecentPoint, TrackPoint};
use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
use postgres::PostgresStore;
#[cfg(feature = "postgres")]
use tracing::error;

/// Storage operations shared by all backends
///
/// Each call opens its own connection and closes it before returning.
#[allow(async_fn_in_trait)]
pub trait LocationStore {
    /// Create the `locations` table and its index if absent
    async fn ensure_schema(&self) -> Result<(), GpsLoggerError>;

    /// Append one record
    async fn insert(&self, record: &LocationRecord) -> Result<(), GpsLoggerError>;

    /// Points at or after `cutoff`, oldest first. `None` returns the full history.
    async fn query_window(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<TrackPoint>, GpsLoggerError>;

    /// The `n` most recently inserted points, newest first
    async fn query_last_n(&self, n: u32) -> Result<Vec<RecentPoint>, GpsLoggerError>;

    /// Every row, oldest event first
    async fn query_all_for_export(&self) -> Result<Vec<ExportRow>, GpsLoggerError>;
}

/// Cutoff in the stored text form, comparable with `ts_utc`
pub(crate) fn cutoff_text(cutoff: DateTime<Utc>) -> String {
    cutoff.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Open a connection, giving up after `limit`
///
/// A timeout is reported as a connection failure.
pub(crate) async fn connect_bounded<O: ConnectOptions>(
    options: &O,
    limit: Duration,
) -> Result<O::Connection, GpsLoggerError>
where
    O::Connection: Sized,
{
    match tokio::time::timeout(limit, options.connect()).await {
        Ok(conn) => conn.map_err(GpsLoggerError::Connect),
        Err(_) => Err(GpsLoggerError::Connect(sqlx::Error::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connection attempt exceeded {:?}", limit),
        )))),
    }
}

/// Run a storage call, giving up after `limit`
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, GpsLoggerError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(GpsLoggerError::Timeout(limit)),
    }
}

pub(crate) async fn close<C: Connection>(conn: C) {
    if let Err(e) = conn.close().await {
        warn!("Failed to close database connection: {}", e);
    }
}

/// Backend selector
///
/// Built once at startup by [`Storage::from_config`] and shared by all
/// request handlers.
pub struct Storage {
    #[cfg(feature = "postgres")]
    networked: Option<PostgresStore>,
    embedded: SqliteStore,
    #[cfg_attr(not(feature = "postgres"), allow(dead_code))]
    fallback: FallbackPolicy,
}

impl Storage {
    /// Select the backend from configuration
    ///
    /// A configured URL selects the networked backend, otherwise the embedded
    /// file at `config.path` is used.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, GpsLoggerError> {
        let embedded = SqliteStore::new(&config.path, config.timeout);

        #[cfg(feature = "postgres")]
        let networked = match config.url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => Some(PostgresStore::from_url(url, config.timeout)?),
            None => None,
        };

        #[cfg(not(feature = "postgres"))]
        if config.url.as_deref().is_some_and(|url| !url.is_empty()) {
            warn!(
                "Built without PostgreSQL support, using embedded store at {}",
                config.path.display()
            );
        }

        Ok(Self {
            #[cfg(feature = "postgres")]
            networked,
            embedded,
            fallback: config.fallback,
        })
    }

    /// Embedded-only storage at `path`
    pub fn embedded(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            #[cfg(feature = "postgres")]
            networked: None,
            embedded: SqliteStore::new(&path.into(), timeout),
            fallback: FallbackPolicy::Embedded,
        }
    }

    /// Human readable description of the primary backend, without credentials
    pub fn describe(&self) -> String {
        #[cfg(feature = "postgres")]
        if let Some(networked) = &self.networked {
            return networked.describe();
        }
        self.embedded.describe()
    }

    /// Prepare the schema at process start
    ///
    /// On the embedded backend a corrupt store file is moved aside and
    /// recreated. Any other schema error is returned.
    pub async fn initialize(&self) -> Result<(), GpsLoggerError> {
        #[cfg(feature = "postgres")]
        if self.networked.is_some() {
            return self.ensure_schema().await;
        }

        if let Some(moved) = self.embedded.ensure_schema_or_quarantine().await? {
            warn!(
                "Corrupt store quarantined at {}, started with an empty store",
                moved.display()
            );
        }
        info!("Schema ready on {}", self.describe());
        Ok(())
    }

    /// Handle a failed networked connection according to the fallback policy
    ///
    /// Returns `Ok` when the caller should continue on the embedded store.
    #[cfg(feature = "postgres")]
    async fn degrade(&self, op: &str, err: sqlx::Error) -> Result<(), GpsLoggerError> {
        match self.fallback {
            FallbackPolicy::FailClosed => {
                error!("Networked store unreachable during {}: {}", op, err);
                Err(GpsLoggerError::StorageUnavailable(err.to_string()))
            }
            FallbackPolicy::Embedded => {
                warn!(
                    "Networked store unreachable during {}, falling back to {}: {}",
                    op,
                    self.embedded.describe(),
                    err
                );
                self.embedded.ensure_schema().await
            }
        }
    }
}

impl LocationStore for Storage {
    async fn ensure_schema(&self) -> Result<(), GpsLoggerError> {
        #[cfg(feature = "postgres")]
        if let Some(networked) = &self.networked {
            match networked.ensure_schema().await {
                Err(GpsLoggerError::Connect(e)) => self.degrade("ensure_schema", e).await?,
                result => return result,
            }
        }
        self.embedded.ensure_schema().await
    }

    async fn insert(&self, record: &LocationRecord) -> Result<(), GpsLoggerError> {
        #[cfg(feature = "postgres")]
        if let Some(networked) = &self.networked {
            match networked.insert(record).await {
                Err(GpsLoggerError::Connect(e)) => self.degrade("insert", e).await?,
                result => return result,
            }
        }
        self.embedded.insert(record).await
    }

    async fn query_window(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<TrackPoint>, GpsLoggerError> {
        #[cfg(feature = "postgres")]
        if let Some(networked) = &self.networked {
            match networked.query_window(cutoff).await {
                Err(GpsLoggerError::Connect(e)) => self.degrade("query_window", e).await?,
                result => return result,
            }
        }
        self.embedded.query_window(cutoff).await
    }

    async fn query_last_n(&self, n: u32) -> Result<Vec<RecentPoint>, GpsLoggerError> {
        #[cfg(feature = "postgres")]
        if let Some(networked) = &self.networked {
            match networked.query_last_n(n).await {
                Err(GpsLoggerError::Connect(e)) => self.degrade("query_last_n", e).await?,
                result => return result,
            }
        }
        self.embedded.query_last_n(n).await
    }

    async fn query_all_for_export(&self) -> Result<Vec<ExportRow>, GpsLoggerError> {
        #[cfg(feature = "postgres")]
        if let Some(networked) = &self.networked {
            match networked.query_all_for_export().await {
                Err(GpsLoggerError::Connect(e)) => {
                    self.degrade("query_all_for_export", e).await?
                }
                result => return result,
            }
        }
        self.embedded.query_all_for_export().await
    }
}
