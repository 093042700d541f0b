//! Normalization of client payloads into [`LocationRecord`]

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde_json::Value;
use tracing::debug;

use crate::{
    errors::Rejection,
    models::{
        ClientPayload, GenericPayload, LocationRecord, OwnTracksPayload, DEFAULT_DEVICE_ID,
        DEFAULT_PROVIDER, OWNTRACKS_PROVIDER,
    },
};

/// Offset-carrying formats tried after RFC 3339
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Formats without offset, interpreted as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a raw request body into a payload of the given format
///
/// Bodies that are not a JSON object are treated as an empty mapping, so
/// they end up rejected by the normalizer with a client error.
pub fn parse_generic(body: &[u8]) -> GenericPayload {
    serde_json::from_slice(body).unwrap_or_default()
}

/// See [`parse_generic`]
pub fn parse_owntracks(body: &[u8]) -> OwnTracksPayload {
    serde_json::from_slice(body).unwrap_or_default()
}

/// Collapse any client payload into the canonical record
///
/// `now` is the fallback instant for payloads without a usable timestamp.
pub fn normalize(payload: ClientPayload, now: DateTime<Utc>) -> Result<LocationRecord, Rejection> {
    let record = match payload {
        ClientPayload::Generic(p) => normalize_generic(p, now)?,
        ClientPayload::OwnTracks(p) => normalize_owntracks(p, now)?,
    };
    debug!(
        "Normalized record: device={}, ts={}, lat={}, lon={}",
        record.device_id,
        record.ts_utc(),
        record.latitude,
        record.longitude
    );
    Ok(record)
}

fn normalize_generic(p: GenericPayload, now: DateTime<Utc>) -> Result<LocationRecord, Rejection> {
    let latitude = coordinate(p.lat.as_ref()).ok_or(Rejection::MissingCoordinates)?;
    let longitude = coordinate(p.lon.as_ref()).ok_or(Rejection::MissingCoordinates)?;

    let timestamp_utc = p
        .ts
        .as_ref()
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .and_then(parse_iso_timestamp)
        .filter(storable)
        .unwrap_or(now);

    let provider = scalar_text(p.provider.as_ref())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

    Ok(LocationRecord {
        device_id: scalar_text(p.device_id.as_ref())
            .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
        timestamp_utc: whole_seconds(timestamp_utc),
        latitude,
        longitude,
        accuracy: metric(p.accuracy.as_ref(), "accuracy")?,
        speed: metric(p.speed.as_ref(), "speed")?,
        battery: metric(p.battery.as_ref(), "battery")?,
        provider: Some(provider),
    })
}

fn normalize_owntracks(
    p: OwnTracksPayload,
    now: DateTime<Utc>,
) -> Result<LocationRecord, Rejection> {
    if p.kind.as_ref().and_then(Value::as_str) != Some("location") {
        return Err(Rejection::NotLocationPayload);
    }

    let latitude = coordinate(p.lat.as_ref()).ok_or(Rejection::InvalidLatLon)?;
    let longitude = coordinate(p.lon.as_ref()).ok_or(Rejection::InvalidLatLon)?;

    let timestamp_utc = p
        .tst
        .as_ref()
        .and_then(epoch_seconds)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .filter(storable)
        .unwrap_or(now);

    Ok(LocationRecord {
        device_id: scalar_text(p.tid.as_ref()).unwrap_or_else(|| OWNTRACKS_PROVIDER.to_string()),
        timestamp_utc: whole_seconds(timestamp_utc),
        latitude,
        longitude,
        accuracy: metric(p.acc.as_ref(), "accuracy")?,
        speed: metric(p.vel.as_ref(), "speed")?,
        battery: metric(p.batt.as_ref(), "battery")?,
        provider: Some(OWNTRACKS_PROVIDER.to_string()),
    })
}

/// Parse an ISO-8601 timestamp, trying progressively looser forms
///
/// A trailing `Z` means UTC. Values without offset are taken as UTC, a bare
/// date as midnight UTC.
pub fn parse_iso_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    let s = match s.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{rest}+00:00"),
        None => s.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&s, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Stored timestamps only order correctly as text with four-digit years
fn storable(dt: &DateTime<Utc>) -> bool {
    (1..=9999).contains(&dt.year())
}

fn whole_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// Coerce a JSON number or numeric string to a float
///
/// Booleans, containers and non-finite values are not numbers here.
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    value.and_then(number)
}

/// Optional metric: absent or null is `None`, anything else must be numeric
fn metric(value: Option<&Value>, field: &'static str) -> Result<Option<f64>, Rejection> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => number(v).map(Some).ok_or(Rejection::InvalidMetric(field)),
    }
}

/// Text form of a scalar: strings as-is, other non-null values as JSON text
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Unix epoch seconds from an integer, a float (truncated) or an integer string
fn epoch_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
    }

    fn generic(value: Value) -> Result<LocationRecord, Rejection> {
        let payload = parse_generic(value.to_string().as_bytes());
        normalize(ClientPayload::Generic(payload), now())
    }

    fn owntracks(value: Value) -> Result<LocationRecord, Rejection> {
        let payload = parse_owntracks(value.to_string().as_bytes());
        normalize(ClientPayload::OwnTracks(payload), now())
    }

    #[test]
    fn generic_full_payload() {
        let rec = generic(json!({
            "device_id": "test_phone",
            "lat": 36.3504,
            "lon": 127.3845,
            "accuracy": 10.0,
            "speed": 1.5,
            "battery": 87,
            "ts": "2025-09-08T13:30:00+09:00",
            "provider": "manual"
        }))
        .unwrap();

        assert_eq!(rec.device_id, "test_phone");
        assert_eq!(rec.latitude, 36.3504);
        assert_eq!(rec.longitude, 127.3845);
        assert_eq!(rec.accuracy, Some(10.0));
        assert_eq!(rec.speed, Some(1.5));
        assert_eq!(rec.battery, Some(87.0));
        assert_eq!(rec.provider.as_deref(), Some("manual"));
        assert_eq!(rec.ts_utc(), "2025-09-08T04:30:00+00:00");
        assert_eq!(rec.ts_local(), "2025-09-08T13:30:00+09:00");
    }

    #[test]
    fn generic_defaults() {
        let rec = generic(json!({"lat": 1.0, "lon": 2.0})).unwrap();
        assert_eq!(rec.device_id, "unknown");
        assert_eq!(rec.provider.as_deref(), Some("api"));
        assert_eq!(rec.timestamp_utc, now());
        assert_eq!(rec.accuracy, None);
        assert_eq!(rec.speed, None);
        assert_eq!(rec.battery, None);
    }

    #[test]
    fn generic_null_and_empty_fields_fall_back() {
        let rec = generic(json!({
            "lat": 1.0, "lon": 2.0,
            "device_id": null, "provider": "", "accuracy": null, "ts": ""
        }))
        .unwrap();
        assert_eq!(rec.device_id, "unknown");
        assert_eq!(rec.provider.as_deref(), Some("api"));
        assert_eq!(rec.accuracy, None);
        assert_eq!(rec.timestamp_utc, now());
    }

    #[test]
    fn generic_numeric_strings_are_accepted() {
        let rec = generic(json!({"lat": "36.5", "lon": " 127.25 ", "speed": "3"})).unwrap();
        assert_eq!(rec.latitude, 36.5);
        assert_eq!(rec.longitude, 127.25);
        assert_eq!(rec.speed, Some(3.0));
    }

    #[test]
    fn generic_non_string_device_id_uses_json_text() {
        let rec = generic(json!({"lat": 1.0, "lon": 2.0, "device_id": 42})).unwrap();
        assert_eq!(rec.device_id, "42");
    }

    #[test]
    fn generic_rejects_bad_coordinates() {
        for payload in [
            json!({}),
            json!({"lat": 1.0}),
            json!({"lon": 1.0}),
            json!({"lat": "abc", "lon": 1.0}),
            json!({"lat": 1.0, "lon": null}),
            json!({"lat": "NaN", "lon": 1.0}),
            json!({"lat": "inf", "lon": 1.0}),
            json!({"lat": true, "lon": 1.0}),
            json!({"lat": [1.0], "lon": 1.0}),
        ] {
            assert_eq!(
                generic(payload.clone()),
                Err(Rejection::MissingCoordinates),
                "{payload}"
            );
        }
    }

    #[test]
    fn generic_rejects_non_object_body() {
        let payload = parse_generic(b"not json at all");
        assert_eq!(
            normalize(ClientPayload::Generic(payload), now()),
            Err(Rejection::MissingCoordinates)
        );
        let payload = parse_generic(b"[1, 2]");
        assert_eq!(
            normalize(ClientPayload::Generic(payload), now()),
            Err(Rejection::MissingCoordinates)
        );
    }

    #[test]
    fn generic_rejects_non_numeric_metric() {
        assert_eq!(
            generic(json!({"lat": 1.0, "lon": 2.0, "battery": "full"})),
            Err(Rejection::InvalidMetric("battery"))
        );
    }

    #[test]
    fn generic_unparseable_ts_uses_now() {
        let rec = generic(json!({"lat": 1.0, "lon": 2.0, "ts": "yesterday"})).unwrap();
        assert_eq!(rec.timestamp_utc, now());
        let rec = generic(json!({"lat": 1.0, "lon": 2.0, "ts": 1700000000})).unwrap();
        assert_eq!(rec.timestamp_utc, now());
    }

    #[test]
    fn iso_strategies() {
        let expected = Utc.with_ymd_and_hms(2025, 9, 8, 4, 30, 0).unwrap();
        for s in [
            "2025-09-08T04:30:00Z",
            "2025-09-08T04:30:00+00:00",
            "2025-09-08T13:30:00+09:00",
            "2025-09-08 13:30:00+09:00",
            "2025-09-08T13:30+09:00",
            "2025-09-08T04:30:00",
            "2025-09-08 04:30:00",
            "2025-09-08T04:30",
        ] {
            assert_eq!(parse_iso_timestamp(s), Some(expected), "{s}");
        }
        assert_eq!(
            parse_iso_timestamp("2025-09-08"),
            Some(Utc.with_ymd_and_hms(2025, 9, 8, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_iso_timestamp("08/09/2025"), None);
    }

    #[test]
    fn generic_out_of_range_ts_uses_now() {
        let rec = generic(json!({"lat": 1.0, "lon": 2.0, "ts": "+10000-01-01T00:00:00"}))
            .unwrap();
        assert_eq!(rec.timestamp_utc, now());
        let rec = generic(json!({"lat": 1.0, "lon": 2.0, "ts": "9999-12-31T23:59:59Z"})).unwrap();
        assert_eq!(rec.ts_utc(), "9999-12-31T23:59:59+00:00");
    }

    #[test]
    fn fractional_seconds_are_truncated() {
        let rec = generic(json!({"lat": 1.0, "lon": 2.0, "ts": "2025-09-08T04:30:00.987Z"})).unwrap();
        assert_eq!(rec.ts_utc(), "2025-09-08T04:30:00+00:00");
    }

    #[test]
    fn owntracks_full_payload() {
        let rec = owntracks(json!({
            "_type": "location",
            "tid": "ph",
            "lat": 60.192059,
            "lon": 24.945831,
            "acc": 12,
            "vel": 4,
            "batt": 55,
            "tst": 1668075025
        }))
        .unwrap();

        assert_eq!(rec.device_id, "ph");
        assert_eq!(rec.latitude, 60.192059);
        assert_eq!(rec.longitude, 24.945831);
        assert_eq!(rec.accuracy, Some(12.0));
        assert_eq!(rec.speed, Some(4.0));
        assert_eq!(rec.battery, Some(55.0));
        assert_eq!(rec.provider.as_deref(), Some("owntracks"));
        assert_eq!(rec.timestamp_utc, DateTime::from_timestamp(1668075025, 0).unwrap());
    }

    #[test]
    fn owntracks_defaults() {
        let rec = owntracks(json!({"_type": "location", "lat": 1.0, "lon": 2.0})).unwrap();
        assert_eq!(rec.device_id, "owntracks");
        assert_eq!(rec.timestamp_utc, now());
        assert_eq!(rec.accuracy, None);
    }

    #[test]
    fn owntracks_tst_forms() {
        let expected = DateTime::from_timestamp(1668075025, 0).unwrap();
        for tst in [json!(1668075025), json!(1668075025.9), json!("1668075025")] {
            let rec = owntracks(json!({"_type": "location", "lat": 1.0, "lon": 2.0, "tst": tst}))
                .unwrap();
            assert_eq!(rec.timestamp_utc, expected);
        }
        // year 10000 and year 0 have no four-digit text form
        for tst in [
            json!("soon"),
            json!(i64::MAX),
            json!(true),
            json!(253402300800i64),
            json!(-62135596801i64),
        ] {
            let rec = owntracks(json!({"_type": "location", "lat": 1.0, "lon": 2.0, "tst": tst}))
                .unwrap();
            assert_eq!(rec.timestamp_utc, now());
        }
    }

    #[test]
    fn owntracks_rejects_other_types() {
        for payload in [
            json!({"_type": "transition", "lat": 1.0, "lon": 2.0}),
            json!({"lat": 1.0, "lon": 2.0}),
            json!({"_type": 1, "lat": 1.0, "lon": 2.0}),
        ] {
            assert_eq!(owntracks(payload), Err(Rejection::NotLocationPayload));
        }
    }

    #[test]
    fn owntracks_rejects_bad_coordinates() {
        assert_eq!(
            owntracks(json!({"_type": "location", "lat": 1.0})),
            Err(Rejection::InvalidLatLon)
        );
        assert_eq!(
            owntracks(json!({"_type": "location", "lat": "x", "lon": 2.0})),
            Err(Rejection::InvalidLatLon)
        );
    }

    #[test]
    fn rejection_reasons() {
        assert_eq!(Rejection::MissingCoordinates.to_string(), "missing/invalid coordinates");
        assert_eq!(Rejection::NotLocationPayload.to_string(), "not a location payload");
        assert_eq!(Rejection::InvalidLatLon.to_string(), "invalid lat/lon");
        assert_eq!(Rejection::InvalidMetric("speed").to_string(), "invalid speed");
    }
}
