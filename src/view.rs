//! Track summary shared by the map views

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::{database::models::TrackPoint, geo};

/// Days shown when the request does not say
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Requested time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// The last `n` days
    Days(i64),
    /// Full history
    All,
}

impl Window {
    /// Build from the `days` and `all` query parameters
    ///
    /// `days` falls back to 7 when absent or not an integer. `all` accepts
    /// `1`, `true` or `yes` in any case.
    pub fn from_params(days: Option<&str>, all: Option<&str>) -> Self {
        let all = all
            .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        if all {
            return Window::All;
        }
        let days = days
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_WINDOW_DAYS);
        Window::Days(days)
    }

    /// Lower bound on `ts_utc`, `None` for full history
    ///
    /// A window reaching past the representable range is full history.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Window::All => None,
            Window::Days(days) => TimeDelta::try_days(*days).and_then(|d| now.checked_sub_signed(d)),
        }
    }

    /// Days to suggest in hints, 7 for full history
    pub fn days_hint(&self) -> i64 {
        match self {
            Window::Days(days) => *days,
            Window::All => DEFAULT_WINDOW_DAYS,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Days(days) => write!(f, "last {} days", days),
            Window::All => f.write_str("all"),
        }
    }
}

/// Point of an assembled path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathPoint {
    pub ts: String,
    pub lat: f64,
    pub lon: f64,
}

/// Why no view could be assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyTrack {
    /// The window holds no rows
    NoRows,
    /// Rows exist but none has usable coordinates
    NoValidCoordinates,
}

/// Everything the map renderers need
#[derive(Debug, Clone, PartialEq)]
pub struct TrackView {
    pub path: Vec<PathPoint>,
    /// Path length in kilometers, rounded to 2 decimals
    pub distance_km: f64,
    pub window: Window,
}

impl TrackView {
    /// Assemble the view from rows ordered by `ts_utc`
    ///
    /// Rows without usable coordinates are skipped.
    pub fn assemble(rows: Vec<TrackPoint>, window: Window) -> Result<Self, EmptyTrack> {
        if rows.is_empty() {
            return Err(EmptyTrack::NoRows);
        }

        let path: Vec<PathPoint> = rows
            .into_iter()
            .filter_map(|row| match (row.lat, row.lon) {
                (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some(PathPoint {
                    ts: row.ts_local,
                    lat,
                    lon,
                }),
                _ => None,
            })
            .collect();

        if path.is_empty() {
            return Err(EmptyTrack::NoValidCoordinates);
        }

        let meters: f64 = path
            .windows(2)
            .map(|pair| geo::distance(pair[0].lat, pair[0].lon, pair[1].lat, pair[1].lon))
            .sum();

        Ok(Self {
            path,
            distance_km: (meters / 1000.0 * 100.0).round() / 100.0,
            window,
        })
    }

    pub fn point_count(&self) -> usize {
        self.path.len()
    }

    pub fn start(&self) -> &PathPoint {
        // assemble() guarantees a non-empty path
        &self.path[0]
    }

    pub fn end(&self) -> &PathPoint {
        &self.path[self.path.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(ts: &str, lat: Option<f64>, lon: Option<f64>) -> TrackPoint {
        TrackPoint {
            ts_local: ts.to_string(),
            lat,
            lon,
        }
    }

    #[test]
    fn window_params() {
        assert_eq!(Window::from_params(None, None), Window::Days(7));
        assert_eq!(Window::from_params(Some("30"), None), Window::Days(30));
        assert_eq!(Window::from_params(Some("abc"), None), Window::Days(7));
        assert_eq!(Window::from_params(Some("3"), Some("YES")), Window::All);
        assert_eq!(Window::from_params(Some("3"), Some("true")), Window::All);
        assert_eq!(Window::from_params(Some("3"), Some("1")), Window::All);
        assert_eq!(Window::from_params(Some("3"), Some("0")), Window::Days(3));
    }

    #[test]
    fn window_cutoff() {
        let now = Utc.with_ymd_and_hms(2025, 9, 8, 4, 30, 0).unwrap();
        assert_eq!(
            Window::Days(7).cutoff(now),
            Some(Utc.with_ymd_and_hms(2025, 9, 1, 4, 30, 0).unwrap())
        );
        assert_eq!(Window::All.cutoff(now), None);
        assert_eq!(Window::Days(i64::MAX).cutoff(now), None);
    }

    #[test]
    fn window_display() {
        assert_eq!(Window::Days(7).to_string(), "last 7 days");
        assert_eq!(Window::All.to_string(), "all");
    }

    #[test]
    fn empty_rows() {
        assert_eq!(
            TrackView::assemble(vec![], Window::Days(7)),
            Err(EmptyTrack::NoRows)
        );
    }

    #[test]
    fn rows_without_coordinates() {
        let rows = vec![row("a", None, Some(1.0)), row("b", Some(f64::NAN), Some(1.0))];
        assert_eq!(
            TrackView::assemble(rows, Window::All),
            Err(EmptyTrack::NoValidCoordinates)
        );
    }

    #[test]
    fn single_point_has_zero_distance() {
        let view = TrackView::assemble(vec![row("t0", Some(36.35), Some(127.38))], Window::All)
            .unwrap();
        assert_eq!(view.point_count(), 1);
        assert_eq!(view.distance_km, 0.0);
        assert_eq!(view.start(), view.end());
    }

    #[test]
    fn skips_bad_rows_and_sums_distance() {
        let rows = vec![
            row("t0", Some(0.0), Some(0.0)),
            row("bad", None, None),
            row("t1", Some(1.0), Some(0.0)),
            row("t2", Some(2.0), Some(0.0)),
        ];
        let view = TrackView::assemble(rows, Window::Days(3)).unwrap();

        assert_eq!(view.point_count(), 3);
        assert_eq!(view.start().ts, "t0");
        assert_eq!(view.end().ts, "t2");
        // two degrees of latitude
        assert_eq!(view.distance_km, 222.39);
        assert_eq!(view.window, Window::Days(3));
    }
}
