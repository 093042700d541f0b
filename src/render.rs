//! Output encodings: map pages and CSV export

use crate::{
    database::models::ExportRow,
    errors::GpsLoggerError,
    view::{EmptyTrack, TrackView, Window},
};

/// Header row of the CSV export
pub const CSV_HEADER: [&str; 9] = [
    "device_id",
    "ts_utc",
    "ts_kst",
    "lat",
    "lon",
    "accuracy",
    "speed",
    "battery",
    "provider",
];

const LEAFLET_HEAD: &str = r#"<meta charset="utf-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1.0"/>
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/leaflet@1.9.4/dist/leaflet.css"/>
<script src="https://cdn.jsdelivr.net/npm/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html,body,#map{height:100%;margin:0}</style>"#;

const TILE_LAYER: &str = r#"L.tileLayer('https://tile.openstreetmap.org/{z}/{x}/{y}.png',
    {maxZoom: 19, attribution: '&copy; OpenStreetMap'}).addTo(map);"#;

/// Plain-text empty state of `/map`
pub fn static_map_empty(reason: EmptyTrack, window: Window) -> String {
    match reason {
        EmptyTrack::NoRows => format!(
            "No location data yet. Send a point first (POST /api/loc or /owntracks). \
             TIP: adjust the window with /map?days={}",
            window.days_hint()
        ),
        EmptyTrack::NoValidCoordinates => {
            "Stored coordinates are invalid, cannot build the map.".to_string()
        }
    }
}

/// HTML empty state of `/map2`
pub fn interactive_map_empty(reason: EmptyTrack) -> String {
    match reason {
        EmptyTrack::NoRows => "<h3>No location data.</h3>".to_string(),
        EmptyTrack::NoValidCoordinates => "<h3>No valid coordinates.</h3>".to_string(),
    }
}

/// Map page with the path, markers and summary baked in on the server
pub fn static_map_page(view: &TrackView) -> String {
    let latlngs: Vec<[f64; 2]> = view.path.iter().map(|p| [p.lat, p.lon]).collect();
    let latlngs = serde_json::to_string(&latlngs).unwrap_or_else(|_| "[]".to_string());
    let start = js_string(&format!("Start {}", view.start().ts));
    let end = js_string(&format!("End {}", view.end().ts));

    format!(
        r#"<!doctype html>
<html>
<head>
<title>GPS Map</title>
{head}
</head>
<body>
<div id="map"></div>
<div style="position:absolute;top:10px;left:50px;z-index:1000;background:white;padding:8px;border:1px solid #ccc;border-radius:8px;font-size:12px;">
  <b>Summary</b><br/>
  Window: {window}<br/>
  Points: {count}<br/>
  Distance: {distance:.2} km
</div>
<script>
  const latlngs = {latlngs};
  const map = L.map('map').setView(latlngs[0], 14);
  {tiles}
  if (latlngs.length >= 2) L.polyline(latlngs, {{weight: 5, opacity: 0.8}}).addTo(map);
  L.marker(latlngs[0]).addTo(map).bindTooltip({start});
  L.marker(latlngs[latlngs.length - 1]).addTo(map).bindTooltip({end});
</script>
</body>
</html>"#,
        head = LEAFLET_HEAD,
        window = escape_html(&view.window.to_string()),
        count = view.point_count(),
        distance = view.distance_km,
        latlngs = latlngs,
        tiles = TILE_LAYER,
        start = start,
        end = end,
    )
}

/// Interactive page: points are shipped as JSON with per-point popups
pub fn interactive_map_page(view: &TrackView) -> String {
    let points =
        script_safe(serde_json::to_string(&view.path).unwrap_or_else(|_| "[]".to_string()));
    let summary = js_string(&format!(
        "<b>Summary</b><br/>Window: {}<br/>Points: {}<br/>Distance: {:.2} km",
        escape_html(&view.window.to_string()),
        view.point_count(),
        view.distance_km
    ));

    format!(
        r#"<!doctype html>
<html>
<head>
<title>GPS Map (Leaflet)</title>
{head}
</head>
<body>
<div id="map"></div>
<script>
  const pts = {points};
  const map = L.map('map').setView([pts[0].lat, pts[0].lon], 14);
  {tiles}
  const latlngs = pts.map(p => [p.lat, p.lon]);
  if (latlngs.length >= 2) L.polyline(latlngs, {{weight: 5}}).addTo(map);
  pts.forEach(p => L.circleMarker([p.lat, p.lon], {{radius: 3}}).addTo(map).bindPopup(p.ts));
  L.marker(latlngs[0]).addTo(map).bindTooltip({start});
  L.marker(latlngs[latlngs.length - 1]).addTo(map).bindTooltip({end});
  map.fitBounds(latlngs);

  const box = L.control({{position: 'topleft'}});
  box.onAdd = function () {{
    const div = L.DomUtil.create('div');
    div.style.cssText = 'background:#fff;padding:8px;border:1px solid #ccc;border-radius:8px;font-size:12px';
    div.innerHTML = {summary};
    return div;
  }};
  box.addTo(map);
</script>
</body>
</html>"#,
        head = LEAFLET_HEAD,
        points = points,
        tiles = TILE_LAYER,
        start = js_string(&format!("Start: {}", view.start().ts)),
        end = js_string(&format!("End: {}", view.end().ts)),
        summary = summary,
    )
}

/// CSV export body, oldest row first
///
/// Absent values are empty fields.
pub fn export_csv(rows: &[ExportRow]) -> Result<Vec<u8>, GpsLoggerError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(csv_error)?;

    for row in rows {
        writer
            .write_record([
                text(row.device_id.as_deref()),
                text(row.ts_utc.as_deref()),
                text(row.ts_kst.as_deref()),
                float(row.lat),
                float(row.lon),
                float(row.accuracy),
                float(row.speed),
                float(row.battery),
                text(row.provider.as_deref()),
            ])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| GpsLoggerError::IoError(e.into_error()))
}

fn csv_error(e: csv::Error) -> GpsLoggerError {
    GpsLoggerError::IoError(e.into())
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

/// Shortest round-trip form, integral values keep a trailing `.0`
fn float(value: Option<f64>) -> String {
    match value {
        None => String::new(),
        Some(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => format!("{:.1}", v),
        Some(v) => v.to_string(),
    }
}

/// Double-quoted JavaScript literal, safe inside a `<script>` element
fn js_string(s: &str) -> String {
    script_safe(serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()))
}

/// JSON text never contains `</` afterwards, so it cannot close the script
fn script_safe(json: String) -> String {
    json.replace("</", "<\\/")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
