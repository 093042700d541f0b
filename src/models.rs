//! Data models.

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Offset of the display timezone (KST, UTC+9) in seconds
pub const LOCAL_OFFSET_SECS: i32 = 9 * 3600;

/// Device identifier used when a generic payload carries none
pub const DEFAULT_DEVICE_ID: &str = "unknown";

/// Provider tag used when a generic payload carries none
pub const DEFAULT_PROVIDER: &str = "api";

/// Provider tag, and default device identifier, of OwnTracks payloads
pub const OWNTRACKS_PROVIDER: &str = "owntracks";

/// The display timezone
pub fn local_offset() -> FixedOffset {
    // 9h is well inside the +-24h range accepted by FixedOffset
    FixedOffset::east_opt(LOCAL_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Canonical location record
///
/// Every client format is normalized into this shape before it reaches
/// storage. Coordinates are always finite, and `timestamp_utc` has whole
/// second precision.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    /// Reporting device
    pub device_id: String,
    /// Instant of the fix
    pub timestamp_utc: DateTime<Utc>,
    /// Latitude in WGS84 decimal degrees
    pub latitude: f64,
    /// Longitude in WGS84 decimal degrees
    pub longitude: f64,
    /// Horizontal accuracy in meters
    pub accuracy: Option<f64>,
    /// Speed as reported by the client
    pub speed: Option<f64>,
    /// Battery level as reported by the client
    pub battery: Option<f64>,
    /// Ingestion source tag
    pub provider: Option<String>,
}

impl LocationRecord {
    /// UTC timestamp as stored, e.g. `2025-09-08T04:30:00+00:00`
    pub fn ts_utc(&self) -> String {
        self.timestamp_utc.to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    /// Same instant in the display timezone, e.g. `2025-09-08T13:30:00+09:00`
    pub fn ts_local(&self) -> String {
        self.timestamp_utc
            .with_timezone(&local_offset())
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

/// Generic JSON payload posted to `/api/loc`
///
/// Fields are kept as raw JSON values, the normalizer decides what is
/// acceptable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenericPayload {
    pub lat: Option<Value>,
    pub lon: Option<Value>,
    pub device_id: Option<Value>,
    pub accuracy: Option<Value>,
    pub speed: Option<Value>,
    pub battery: Option<Value>,
    pub provider: Option<Value>,
    /// ISO-8601 timestamp
    pub ts: Option<Value>,
}

/// OwnTracks location payload posted to `/owntracks` or `/pub`
///
/// See: https://owntracks.org/booklet/tech/json/#_typelocation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OwnTracksPayload {
    /// Message type, only `location` is accepted
    #[serde(rename = "_type")]
    pub kind: Option<Value>,
    pub lat: Option<Value>,
    pub lon: Option<Value>,
    /// Tracker ID
    pub tid: Option<Value>,
    /// Accuracy in meters
    pub acc: Option<Value>,
    /// Velocity in km/h
    pub vel: Option<Value>,
    /// Battery level in percent
    pub batt: Option<Value>,
    /// Unix epoch timestamp in seconds
    pub tst: Option<Value>,
}

/// Client payload formats, collapsed into [`LocationRecord`] by the normalizer
#[derive(Debug, Clone)]
pub enum ClientPayload {
    Generic(GenericPayload),
    OwnTracks(OwnTracksPayload),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_at(ts: DateTime<Utc>) -> LocationRecord {
        LocationRecord {
            device_id: "test_phone".to_string(),
            timestamp_utc: ts,
            latitude: 36.3504,
            longitude: 127.3845,
            accuracy: None,
            speed: None,
            battery: None,
            provider: None,
        }
    }

    #[test]
    fn timestamps_render_in_both_zones() {
        let rec = record_at(Utc.with_ymd_and_hms(2025, 9, 8, 4, 30, 0).unwrap());
        assert_eq!(rec.ts_utc(), "2025-09-08T04:30:00+00:00");
        assert_eq!(rec.ts_local(), "2025-09-08T13:30:00+09:00");
    }

    #[test]
    fn local_rendering_crosses_midnight() {
        let rec = record_at(Utc.with_ymd_and_hms(2024, 12, 31, 20, 0, 5).unwrap());
        assert_eq!(rec.ts_local(), "2025-01-01T05:00:05+09:00");
    }

    #[test]
    fn payload_ignores_unknown_fields() {
        let s = r#"{"_type":"location","lat":60.1,"lon":24.9,"tst":1668075025,"conn":"w","t":"u"}"#;
        let payload: OwnTracksPayload = serde_json::from_str(s).unwrap();
        assert_eq!(payload.kind, Some(Value::from("location")));
        assert_eq!(payload.tst, Some(Value::from(1668075025)));
        assert!(payload.tid.is_none());
    }
}
