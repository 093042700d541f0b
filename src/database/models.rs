// src/database/models.rs
use serde::Serialize;
use sqlx::{ColumnIndex, Decode, FromRow, Row, Type};

/// One point of a track, as read for the map views
///
/// Coordinates that do not decode as floats are `None` rather than an error,
/// so a single damaged row does not fail the whole query.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    /// Timestamp in the display timezone
    pub ts_local: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl<'r, R> FromRow<'r, R> for TrackPoint
where
    R: Row,
    &'r str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    f64: Decode<'r, R::Database> + Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        let ts_local: Option<String> = row.try_get("ts_kst")?;
        Ok(Self {
            ts_local: ts_local.unwrap_or_default(),
            lat: row.try_get::<Option<f64>, _>("lat").ok().flatten(),
            lon: row.try_get::<Option<f64>, _>("lon").ok().flatten(),
        })
    }
}

/// Recently inserted point, as returned by `/last`
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct RecentPoint {
    pub device_id: Option<String>,
    pub ts_kst: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub battery: Option<f64>,
    pub provider: Option<String>,
}

/// Full row for CSV export
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ExportRow {
    pub device_id: Option<String>,
    pub ts_utc: Option<String>,
    pub ts_kst: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub battery: Option<f64>,
    pub provider: Option<String>,
}
