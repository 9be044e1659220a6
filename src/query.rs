//! Query algorithms over a schedule bundle: nearest stops, connecting
//! route inference, routes serving a stop, and next departures.
//!
//! All functions operate uniformly over real and synthesized bundles;
//! only `next_departures` branches on the bundle origin, because
//! synthetic bundles carry dummy times that must be replaced with
//! estimates.

use std::collections::{HashMap, HashSet};

use chrono::Timelike;
use serde::Serialize;
use tracing::info;

use crate::geo::haversine_km;
use crate::models::{BundleOrigin, Route, RouteType, ScheduleBundle, Stop};

const SECONDS_PER_DAY: i32 = 86400;

/// Offsets (minutes from now) of the departures fabricated for a stop in
/// a synthetic bundle.
const SYNTHETIC_OFFSETS_MIN: [i32; 3] = [5, 15, 25];

#[derive(Debug, Clone, Serialize)]
pub struct NearbyStop {
    #[serde(flatten)]
    pub stop: Stop,
    /// Distance from the query point, in whole meters.
    pub distance_m: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Departure {
    /// Wall-clock departure time, `HH:MM:SS`.
    pub time: String,
    pub route_id: String,
    pub route_name: String,
    pub headsign: String,
    pub mode: RouteType,
    pub color: String,
    /// True for departures fabricated from synthesized data.
    pub estimated: bool,
}

/// Stops within `radius_km` of the point, nearest first.
pub fn nearby_stops(
    bundle: &ScheduleBundle,
    lat: f64,
    lon: f64,
    radius_km: f64,
) -> Vec<NearbyStop> {
    let mut nearby: Vec<NearbyStop> = bundle
        .stops
        .values()
        .filter_map(|stop| {
            let dist_km = haversine_km(lat, lon, stop.lat, stop.lon);
            (dist_km <= radius_km).then(|| NearbyStop {
                stop: stop.clone(),
                distance_m: (dist_km * 1000.0).round() as u32,
            })
        })
        .collect();

    nearby.sort_by_key(|s| s.distance_m);
    nearby
}

/// Routes serving a stop, reached via stop_times -> trip -> route.
/// Trams and metros sort first; truncated to `limit`.
pub fn routes_at_stop(bundle: &ScheduleBundle, stop_id: &str, limit: usize) -> Vec<Route> {
    let Some(entries) = bundle.stop_times.get(stop_id) else {
        return Vec::new();
    };

    let mut route_ids = HashSet::new();
    for entry in entries {
        // Entries whose trip is unknown stay in storage but are ignored here.
        if let Some(trip) = bundle.trips.get(&entry.trip_id) {
            route_ids.insert(trip.route_id.as_str());
        }
    }

    collect_sorted_routes(bundle, &route_ids, limit)
}

/// Routes connecting two stops in the right direction: a trip counts when
/// it passes the start stop at a strictly smaller stop-sequence than the
/// end stop. When no direct trip exists, falls back to all routes at the
/// start stop — a weaker guarantee that may include routes never reaching
/// the end stop.
pub fn connecting_routes(
    bundle: &ScheduleBundle,
    start_stop_id: &str,
    end_stop_id: &str,
    limit: usize,
) -> Vec<Route> {
    let mut route_ids: HashSet<&str> = HashSet::new();

    if let (Some(start_entries), Some(end_entries)) = (
        bundle.stop_times.get(start_stop_id),
        bundle.stop_times.get(end_stop_id),
    ) {
        let start_seqs: HashMap<&str, i32> = start_entries
            .iter()
            .map(|st| (st.trip_id.as_str(), st.sequence))
            .collect();

        for st in end_entries {
            if let Some(&start_seq) = start_seqs.get(st.trip_id.as_str()) {
                if start_seq < st.sequence {
                    if let Some(trip) = bundle.trips.get(&st.trip_id) {
                        route_ids.insert(trip.route_id.as_str());
                    }
                }
            }
        }
    }

    if route_ids.is_empty() {
        // Documented heuristic, not a bug: without a direct trip match,
        // surface everything leaving the start stop.
        info!(start_stop_id, end_stop_id, "No direct trip, using start-stop routes");
        if let Some(start_entries) = bundle.stop_times.get(start_stop_id) {
            for st in start_entries {
                if let Some(trip) = bundle.trips.get(&st.trip_id) {
                    route_ids.insert(trip.route_id.as_str());
                }
            }
        }
    }

    collect_sorted_routes(bundle, &route_ids, limit)
}

fn collect_sorted_routes(
    bundle: &ScheduleBundle,
    route_ids: &HashSet<&str>,
    limit: usize,
) -> Vec<Route> {
    let mut routes: Vec<Route> = route_ids
        .iter()
        .filter_map(|rid| bundle.routes.get(*rid))
        .cloned()
        .collect();

    routes.sort_by(|a, b| {
        (a.mode.sort_rank(), a.display_name()).cmp(&(b.mode.sort_rank(), b.display_name()))
    });
    routes.truncate(limit);
    routes
}

/// Upcoming departures from a stop, earliest first, truncated to `limit`.
/// `route_filter` restricts results to the given route ids.
///
/// Static bundles yield real timetable entries at or after the current
/// local time (times past 24:00 wrap to the next-day clock). Synthetic
/// bundles yield three fabricated departures per stop, each marked
/// estimated.
pub fn next_departures(
    bundle: &ScheduleBundle,
    stop_id: &str,
    limit: usize,
    route_filter: Option<&HashSet<String>>,
) -> Vec<Departure> {
    let now_secs = chrono::Local::now().time().num_seconds_from_midnight() as i32;
    next_departures_at(bundle, stop_id, limit, route_filter, now_secs)
}

/// Departure generation against an explicit clock (seconds since local
/// midnight); `next_departures` injects the real one.
pub fn next_departures_at(
    bundle: &ScheduleBundle,
    stop_id: &str,
    limit: usize,
    route_filter: Option<&HashSet<String>>,
    now_secs: i32,
) -> Vec<Departure> {
    let Some(entries) = bundle.stop_times.get(stop_id) else {
        return Vec::new();
    };

    let mut departures = Vec::new();

    for entry in entries {
        let Some(trip) = bundle.trips.get(&entry.trip_id) else {
            continue;
        };
        if let Some(filter) = route_filter {
            if !filter.contains(&trip.route_id) {
                continue;
            }
        }
        let Some(route) = bundle.routes.get(&trip.route_id) else {
            continue;
        };

        match bundle.origin {
            BundleOrigin::Synthetic => {
                // The dummy stop time carries no information; fabricate a
                // short run of estimates and stop after the first pair.
                for offset_min in SYNTHETIC_OFFSETS_MIN {
                    let secs = now_secs + offset_min * 60;
                    departures.push(Departure {
                        time: format_time(secs),
                        route_id: route.id.clone(),
                        route_name: route.display_name().to_string(),
                        headsign: trip.headsign.clone(),
                        mode: route.mode,
                        color: route.color.clone(),
                        estimated: true,
                    });
                }
                break;
            }
            BundleOrigin::Static => {
                let Some(departure_secs) = entry.departure else {
                    continue;
                };
                // Times >= 24:00 belong to the next-day clock.
                let wrapped = departure_secs % SECONDS_PER_DAY;
                if wrapped < now_secs {
                    continue;
                }
                departures.push(Departure {
                    time: format_time(wrapped),
                    route_id: route.id.clone(),
                    route_name: route.display_name().to_string(),
                    headsign: trip.headsign.clone(),
                    mode: route.mode,
                    color: route.color.clone(),
                    estimated: false,
                });
            }
        }
    }

    departures.sort_by(|a, b| a.time.cmp(&b.time));
    departures.truncate(limit);
    departures
}

fn format_time(secs: i32) -> String {
    let s = secs.rem_euclid(SECONDS_PER_DAY);
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}
