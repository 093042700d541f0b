// src/database/sqlite.rs
//! Embedded backend on a local SQLite file

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::SqliteConnection;
use tracing::{error, info};

use super::{
    bounded, close, connect_bounded, cutoff_text,
    models::{ExportRow, RecentPoint, TrackPoint},
    LocationStore,
};
use crate::{errors::GpsLoggerError, models::LocationRecord};

/// SQLite result codes that mean the file is not a usable database
const CORRUPTION_CODES: &[&str] = &["11", "26"];

pub struct SqliteStore {
    path: PathBuf,
    options: SqliteConnectOptions,
    timeout: Duration,
}

impl SqliteStore {
    pub fn new(path: &Path, timeout: Duration) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(timeout);

        Self {
            path: path.to_path_buf(),
            options,
            timeout,
        }
    }

    pub fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    async fn connect(&self) -> Result<SqliteConnection, GpsLoggerError> {
        connect_bounded(&self.options, self.timeout).await
    }

    /// Create the schema, quarantining a corrupt store file first if needed
    ///
    /// Returns where the corrupt file was moved, if it was.
    pub async fn ensure_schema_or_quarantine(&self) -> Result<Option<PathBuf>, GpsLoggerError> {
        match self.ensure_schema().await {
            Ok(()) => Ok(None),
            Err(e) if is_corruption(&e) => {
                error!("Store at {} is corrupt: {}", self.path.display(), e);
                let moved = self.quarantine()?;
                self.ensure_schema().await?;
                Ok(Some(moved))
            }
            Err(e) => Err(e),
        }
    }

    /// Rename the store file and its WAL side files out of the way
    fn quarantine(&self) -> Result<PathBuf, GpsLoggerError> {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gps".to_string());
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let target = self.path.with_file_name(format!("{stem}_corrupt_{stamp}.db"));

        std::fs::rename(&self.path, &target)?;
        for suffix in ["-wal", "-shm"] {
            let side = with_suffix(&self.path, suffix);
            match std::fs::rename(&side, with_suffix(&target, suffix)) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }

        info!("Moved {} to {}", self.path.display(), target.display());
        Ok(target)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Whether an error says the store file is damaged or not a database
pub(crate) fn is_corruption(err: &GpsLoggerError) -> bool {
    let err = match err {
        GpsLoggerError::Connect(e) | GpsLoggerError::DatabaseError(e) => e,
        _ => return false,
    };
    if let sqlx::Error::Database(db) = err {
        if db
            .code()
            .is_some_and(|code| CORRUPTION_CODES.contains(&&*code))
        {
            return true;
        }
    }
    let message = err.to_string().to_lowercase();
    message.contains("malformed") || message.contains("not a database")
}

impl LocationStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<(), GpsLoggerError> {
        let mut conn = self.connect().await?;
        let result = bounded(self.timeout, create_tables_indices(&mut conn)).await;
        close(conn).await;
        result
    }

    async fn insert(&self, record: &LocationRecord) -> Result<(), GpsLoggerError> {
        let mut conn = self.connect().await?;
        let result = bounded(self.timeout, insert_location(&mut conn, record)).await;
        close(conn).await;
        result
    }

    async fn query_window(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<TrackPoint>, GpsLoggerError> {
        let mut conn = self.connect().await?;
        let result = bounded(self.timeout, select_window(&mut conn, cutoff)).await;
        close(conn).await;
        result
    }

    async fn query_last_n(&self, n: u32) -> Result<Vec<RecentPoint>, GpsLoggerError> {
        let mut conn = self.connect().await?;
        let result = bounded(
            self.timeout,
            sqlx::query_as::<_, RecentPoint>(
                "SELECT device_id, ts_kst, lat, lon, accuracy, speed, battery, provider
                FROM locations ORDER BY id DESC LIMIT ?1",
            )
            .bind(i64::from(n))
            .fetch_all(&mut conn),
        )
        .await;
        close(conn).await;
        result
    }

    async fn query_all_for_export(&self) -> Result<Vec<ExportRow>, GpsLoggerError> {
        let mut conn = self.connect().await?;
        let result = bounded(
            self.timeout,
            sqlx::query_as::<_, ExportRow>(
                "SELECT device_id, ts_utc, ts_kst, lat, lon, accuracy, speed, battery, provider
                FROM locations ORDER BY ts_utc ASC",
            )
            .fetch_all(&mut conn),
        )
        .await;
        close(conn).await;
        result
    }
}

/// Create table `locations` and its `ts_utc` index
async fn create_tables_indices(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT,
            ts_utc TEXT,
            ts_kst TEXT,
            lat REAL,
            lon REAL,
            accuracy REAL,
            speed REAL,
            battery REAL,
            provider TEXT
        )",
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_locations_ts_utc ON locations(ts_utc)")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn insert_location(
    conn: &mut SqliteConnection,
    record: &LocationRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO locations (
            device_id, ts_utc, ts_kst, lat, lon,
            accuracy, speed, battery, provider
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(record.device_id.as_str())
    .bind(record.ts_utc())
    .bind(record.ts_local())
    .bind(record.latitude)
    .bind(record.longitude)
    .bind(record.accuracy)
    .bind(record.speed)
    .bind(record.battery)
    .bind(record.provider.as_deref())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn select_window(
    conn: &mut SqliteConnection,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<TrackPoint>, sqlx::Error> {
    match cutoff {
        Some(cutoff) => {
            sqlx::query_as::<_, TrackPoint>(
                "SELECT ts_kst, lat, lon FROM locations
                WHERE ts_utc >= ?1 ORDER BY ts_utc ASC",
            )
            .bind(cutoff_text(cutoff))
            .fetch_all(&mut *conn)
            .await
        }
        None => {
            sqlx::query_as::<_, TrackPoint>(
                "SELECT ts_kst, lat, lon FROM locations ORDER BY ts_utc ASC",
            )
            .fetch_all(&mut *conn)
            .await
        }
    }
}
