//! Retrieval and parsing of packaged GTFS schedule archives.
//!
//! Stops, routes and trips are parsed fully. The stop_times table can
//! reach millions of rows, so it is geo-filtered: only rows for stops
//! within the configured radius of the reference point are retained, and
//! a hard row-scan cap aborts defensively while keeping partial data.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Seek};

use futures::StreamExt;
use tracing::{error, info, warn};

use crate::config::TransitConfig;
use crate::error::TransitError;
use crate::geo::haversine_km;
use crate::models::{
    BundleOrigin, Route, RouteType, ScheduleBundle, Stop, StopTimeEntry, Trip, DEFAULT_ROUTE_COLOR,
};

/// Maximum allowed archive download size (500 MB).
const MAX_DOWNLOAD_SIZE: u64 = 500 * 1024 * 1024;

/// Download a schedule archive and parse it into a bundle, keeping only
/// stop_times near `(lat, lon)`. Any fetch or archive-open failure logs
/// and returns `None`, signaling the caller to fall back.
pub async fn fetch_bundle(
    client: &reqwest::Client,
    url: &str,
    lat: f64,
    lon: f64,
    config: &TransitConfig,
) -> Option<ScheduleBundle> {
    info!(url, "Downloading schedule archive");

    let bytes = match download_archive(client, url, config.archive_timeout_secs).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(url, error = %e, "Schedule archive download failed");
            return None;
        }
    };
    info!(size_mb = bytes.len() / (1024 * 1024), "Downloaded schedule archive");

    let filter_radius_km = config.filter_radius_km;
    let max_scan_rows = config.max_scan_rows;
    let parsed = tokio::task::spawn_blocking(move || {
        load_bundle(Cursor::new(bytes), lat, lon, filter_radius_km, max_scan_rows)
    })
    .await;

    match parsed {
        Ok(Ok(bundle)) => Some(bundle),
        Ok(Err(e)) => {
            error!(url, error = %e, "Schedule archive could not be opened");
            None
        }
        Err(e) => {
            error!(url, error = %e, "Schedule parsing task failed");
            None
        }
    }
}

async fn download_archive(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: u64,
) -> Result<Vec<u8>, TransitError> {
    let response = client
        .get(url)
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(TransitError::NetworkMessage(format!(
            "archive download HTTP {}",
            response.status()
        )));
    }

    if let Some(content_length) = response.content_length() {
        if content_length > MAX_DOWNLOAD_SIZE {
            return Err(TransitError::NetworkMessage(format!(
                "archive too large: {content_length} bytes (max {MAX_DOWNLOAD_SIZE} bytes)"
            )));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len() as u64 + chunk.len() as u64 > MAX_DOWNLOAD_SIZE {
            return Err(TransitError::NetworkMessage(format!(
                "archive download exceeded size limit at {} bytes",
                bytes.len()
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Parse the four schedule tables out of an archive (blocking; call on
/// `spawn_blocking`). A failure on one table logs and yields an empty
/// table for that entity only; only a broken archive is fatal.
pub fn load_bundle<R: Read + Seek>(
    reader: R,
    lat: f64,
    lon: f64,
    filter_radius_km: f64,
    max_scan_rows: u64,
) -> Result<ScheduleBundle, TransitError> {
    let mut archive = zip::ZipArchive::new(reader)?;

    let stops = parse_stops(&mut archive).unwrap_or_else(|e| {
        error!(error = %e, "Failed to parse stops.txt");
        HashMap::new()
    });
    info!(count = stops.len(), "Parsed stops");

    let routes = parse_routes(&mut archive).unwrap_or_else(|e| {
        error!(error = %e, "Failed to parse routes.txt");
        HashMap::new()
    });
    info!(count = routes.len(), "Parsed routes");

    let trips = parse_trips(&mut archive).unwrap_or_else(|e| {
        error!(error = %e, "Failed to parse trips.txt");
        HashMap::new()
    });
    info!(count = trips.len(), "Parsed trips");

    // Geographic pre-filter: only stops near the reference point
    // contribute stop_times rows.
    let relevant_stops: HashSet<&str> = stops
        .values()
        .filter(|s| haversine_km(lat, lon, s.lat, s.lon) <= filter_radius_km)
        .map(|s| s.id.as_str())
        .collect();
    info!(
        relevant = relevant_stops.len(),
        total = stops.len(),
        radius_km = filter_radius_km,
        "Computed geo-filter stop set"
    );

    let stop_times =
        parse_stop_times(&mut archive, &relevant_stops, max_scan_rows).unwrap_or_else(|e| {
            error!(error = %e, "Failed to parse stop_times.txt");
            HashMap::new()
        });
    let total_entries: usize = stop_times.values().map(|v| v.len()).sum();
    info!(
        stops_with_times = stop_times.len(),
        entries = total_entries,
        "Parsed stop_times"
    );

    Ok(ScheduleBundle {
        stops,
        routes,
        trips,
        stop_times,
        origin: BundleOrigin::Static,
        loaded_at: chrono::Utc::now(),
    })
}

/// Parse a GTFS time string `HH:MM:SS` to seconds since midnight.
/// Hours >= 24 are allowed for trips crossing midnight.
pub fn parse_gtfs_time(time_str: &str) -> Option<i32> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: i32 = parts[0].trim().parse().ok()?;
    let minutes: i32 = parts[1].parse().ok()?;
    let seconds: i32 = parts[2].parse().ok()?;
    Some(hours * 3600 + minutes * 60 + seconds)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_stops<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<HashMap<String, Stop>, TransitError> {
    let file = archive.by_name("stops.txt")?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();

    let idx_id = headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == "stop_id")
        .ok_or_else(|| TransitError::Parse("stops.txt missing stop_id".into()))?;
    let idx_name = headers.iter().position(|h| h == "stop_name");
    let idx_lat = headers.iter().position(|h| h == "stop_lat");
    let idx_lon = headers.iter().position(|h| h == "stop_lon");
    let idx_code = headers.iter().position(|h| h == "stop_code");

    let mut stops = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let id = record.get(idx_id).unwrap_or("").to_string();
        let lat = idx_lat
            .and_then(|i| record.get(i))
            .and_then(|s| s.trim().parse::<f64>().ok());
        let lon = idx_lon
            .and_then(|i| record.get(i))
            .and_then(|s| s.trim().parse::<f64>().ok());
        let (Some(lat), Some(lon)) = (lat, lon) else {
            skipped += 1;
            continue;
        };
        if id.is_empty() {
            skipped += 1;
            continue;
        }
        stops.insert(
            id.clone(),
            Stop {
                id,
                name: idx_name
                    .and_then(|i| record.get(i))
                    .unwrap_or("")
                    .to_string(),
                lat,
                lon,
                code: idx_code.and_then(|i| record.get(i)).and_then(non_empty),
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stops.txt records without id or coordinates");
    }
    Ok(stops)
}

fn parse_routes<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<HashMap<String, Route>, TransitError> {
    let file = archive.by_name("routes.txt")?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();

    let idx_id = headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == "route_id")
        .ok_or_else(|| TransitError::Parse("routes.txt missing route_id".into()))?;
    let idx_short = headers.iter().position(|h| h == "route_short_name");
    let idx_long = headers.iter().position(|h| h == "route_long_name");
    let idx_type = headers.iter().position(|h| h == "route_type");
    let idx_color = headers.iter().position(|h| h == "route_color");

    let mut routes = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let id = record.get(idx_id).unwrap_or("").to_string();
        if id.is_empty() {
            skipped += 1;
            continue;
        }
        let mode = idx_type
            .and_then(|i| record.get(i))
            .and_then(|s| s.trim().parse::<i32>().ok())
            .map(RouteType::from_gtfs_code)
            .unwrap_or(RouteType::Bus);
        let color = idx_color
            .and_then(|i| record.get(i))
            .and_then(non_empty)
            .map(|c| format!("#{}", c.trim_start_matches('#')))
            .unwrap_or_else(|| DEFAULT_ROUTE_COLOR.to_string());
        routes.insert(
            id.clone(),
            Route {
                id,
                short_name: idx_short.and_then(|i| record.get(i)).and_then(non_empty),
                long_name: idx_long.and_then(|i| record.get(i)).and_then(non_empty),
                mode,
                color,
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped routes.txt records with empty route_id");
    }
    Ok(routes)
}

fn parse_trips<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<HashMap<String, Trip>, TransitError> {
    let file = archive.by_name("trips.txt")?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();

    let idx_trip = headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == "trip_id")
        .ok_or_else(|| TransitError::Parse("trips.txt missing trip_id".into()))?;
    let idx_route = headers
        .iter()
        .position(|h| h == "route_id")
        .ok_or_else(|| TransitError::Parse("trips.txt missing route_id".into()))?;
    let idx_service = headers.iter().position(|h| h == "service_id");
    let idx_headsign = headers.iter().position(|h| h == "trip_headsign");

    let mut trips = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let id = record.get(idx_trip).unwrap_or("").to_string();
        if id.is_empty() {
            skipped += 1;
            continue;
        }
        trips.insert(
            id.clone(),
            Trip {
                id,
                route_id: record.get(idx_route).unwrap_or("").to_string(),
                headsign: idx_headsign
                    .and_then(|i| record.get(i))
                    .unwrap_or("")
                    .to_string(),
                service_id: idx_service.and_then(|i| record.get(i)).and_then(non_empty),
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped trips.txt records with empty trip_id");
    }
    Ok(trips)
}

fn parse_stop_times<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    relevant_stops: &HashSet<&str>,
    max_scan_rows: u64,
) -> Result<HashMap<String, Vec<StopTimeEntry>>, TransitError> {
    let file = archive.by_name("stop_times.txt")?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();

    let idx_trip = headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == "trip_id")
        .ok_or_else(|| TransitError::Parse("stop_times.txt missing trip_id".into()))?;
    let idx_stop = headers
        .iter()
        .position(|h| h == "stop_id")
        .ok_or_else(|| TransitError::Parse("stop_times.txt missing stop_id".into()))?;
    let idx_seq = headers
        .iter()
        .position(|h| h == "stop_sequence")
        .ok_or_else(|| TransitError::Parse("stop_times.txt missing stop_sequence".into()))?;
    let idx_arr = headers.iter().position(|h| h == "arrival_time");
    let idx_dep = headers.iter().position(|h| h == "departure_time");

    let mut stop_times: HashMap<String, Vec<StopTimeEntry>> = HashMap::new();
    let mut scanned = 0u64;
    let mut loaded = 0u64;
    for result in rdr.records() {
        scanned += 1;
        if scanned > max_scan_rows {
            warn!(
                max_scan_rows,
                loaded, "Row-scan cap reached, keeping partial stop_times"
            );
            break;
        }
        let record = result?;
        let stop_id = record.get(idx_stop).unwrap_or("");
        if !relevant_stops.contains(stop_id) {
            continue;
        }
        let entry = StopTimeEntry {
            trip_id: record.get(idx_trip).unwrap_or("").to_string(),
            arrival: idx_arr.and_then(|i| record.get(i)).and_then(parse_gtfs_time),
            departure: idx_dep.and_then(|i| record.get(i)).and_then(parse_gtfs_time),
            sequence: record
                .get(idx_seq)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
        };
        stop_times.entry(stop_id.to_string()).or_default().push(entry);
        loaded += 1;
    }
    info!(loaded, scanned, "Geo-filtered stop_times rows");

    Ok(stop_times)
}
