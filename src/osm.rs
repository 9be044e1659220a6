//! Map-feature fallback: when no schedule feed covers a region, query
//! Overpass mirrors for transit-tagged nodes and route relations and
//! synthesize a schedule skeleton from them.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::TransitConfig;
use crate::models::{
    BundleOrigin, Route, RouteType, ScheduleBundle, Stop, StopTimeEntry, Trip, DEFAULT_ROUTE_COLOR,
};

/// Dummy time attached to every synthesized stop visit (08:00:00).
const SYNTHETIC_STOP_TIME: i32 = 8 * 3600;

/// Headsign attached to every synthesized trip.
const SYNTHETIC_HEADSIGN: &str = "City centre";

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    element_type: String,
    id: i64,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

pub struct OsmFallback {
    client: reqwest::Client,
    mirrors: Vec<String>,
    timeout: Duration,
}

impl OsmFallback {
    pub fn new(client: reqwest::Client, config: &TransitConfig) -> Self {
        Self {
            client,
            mirrors: config.overpass_mirrors.clone(),
            timeout: Duration::from_secs(config.mirror_timeout_secs),
        }
    }

    /// Fetch transit-tagged stops and route relations around a point.
    /// Tries each mirror in order; the first decodable response wins.
    /// All mirrors failing yields empty vectors, not an error.
    pub async fn fetch(&self, lat: f64, lon: f64, radius_m: u32) -> (Vec<Stop>, Vec<Route>) {
        let query = build_query(lat, lon, radius_m);

        for mirror in &self.mirrors {
            info!(mirror, lat, lon, "Querying map-feature mirror");
            match self.query_mirror(mirror, &query).await {
                Ok(response) => {
                    let (stops, routes) = extract_features(response);
                    info!(
                        mirror,
                        stops = stops.len(),
                        routes = routes.len(),
                        "Map-feature mirror responded"
                    );
                    return (stops, routes);
                }
                Err(e) => {
                    warn!(mirror, error = %e, "Map-feature mirror failed, trying next");
                }
            }
        }

        error!("All map-feature mirrors failed");
        (Vec::new(), Vec::new())
    }

    async fn query_mirror(
        &self,
        mirror: &str,
        query: &str,
    ) -> Result<OverpassResponse, reqwest::Error> {
        let response = self
            .client
            .post(mirror)
            .form(&[("data", query)])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        response.json().await
    }
}

/// Overpass QL: transit stop nodes within the radius, route relations in a
/// slightly wider band so lines passing the cell edge are still found.
fn build_query(lat: f64, lon: f64, radius_m: u32) -> String {
    let relation_radius_m = radius_m + radius_m / 2;
    format!(
        "[out:json][timeout:15];\n\
         (\n\
           node[\"public_transport\"=\"stop_position\"](around:{radius_m},{lat},{lon});\n\
           node[\"highway\"=\"bus_stop\"](around:{radius_m},{lat},{lon});\n\
           node[\"railway\"=\"tram_stop\"](around:{radius_m},{lat},{lon});\n\
           node[\"railway\"=\"station\"](around:{radius_m},{lat},{lon});\n\
           node[\"railway\"=\"halt\"](around:{radius_m},{lat},{lon});\n\
           relation[\"route\"~\"bus|tram|subway|train|light_rail\"](around:{relation_radius_m},{lat},{lon});\n\
         );\n\
         out body;"
    )
}

fn normalize_color(raw: Option<&str>) -> String {
    match raw {
        Some(c) if !c.is_empty() => format!("#{}", c.trim_start_matches('#')),
        _ => DEFAULT_ROUTE_COLOR.to_string(),
    }
}

fn extract_features(response: OverpassResponse) -> (Vec<Stop>, Vec<Route>) {
    let mut stops = Vec::new();
    let mut routes = Vec::new();

    for element in response.elements {
        let tags = element.tags.unwrap_or_default();
        match element.element_type.as_str() {
            "node" => {
                let transit_tagged = tags.contains_key("public_transport")
                    || tags.contains_key("highway")
                    || tags.contains_key("railway");
                let (Some(lat), Some(lon)) = (element.lat, element.lon) else {
                    continue;
                };
                if transit_tagged {
                    stops.push(Stop {
                        id: format!("osm_{}", element.id),
                        name: tags
                            .get("name")
                            .cloned()
                            .unwrap_or_else(|| "Unnamed stop".to_string()),
                        lat,
                        lon,
                        code: None,
                    });
                }
            }
            "relation" => {
                let Some(route_tag) = tags.get("route") else {
                    continue;
                };
                let short_name = tags.get("ref").or_else(|| tags.get("name")).cloned();
                routes.push(Route {
                    id: format!("osm_route_{}", element.id),
                    short_name,
                    long_name: tags.get("name").cloned(),
                    mode: RouteType::from_osm_tag(route_tag),
                    color: normalize_color(tags.get("colour").map(String::as_str)),
                });
            }
            _ => {}
        }
    }

    (stops, routes)
}

/// Build a schedule skeleton by pairing every stop with every route found
/// in the same cell: one fabricated trip per route, one dummy stop visit
/// per stop/route pair. An explicit approximation with no real stop-route
/// correspondence; the bundle is tagged synthetic so every departure
/// derived from it is marked estimated.
pub fn synthesize_bundle(stops: Vec<Stop>, routes: Vec<Route>) -> ScheduleBundle {
    let mut trips = HashMap::new();
    for route in &routes {
        let trip_id = format!("{}_trip", route.id);
        trips.insert(
            trip_id.clone(),
            Trip {
                id: trip_id,
                route_id: route.id.clone(),
                headsign: SYNTHETIC_HEADSIGN.to_string(),
                service_id: None,
            },
        );
    }

    let mut stop_times: HashMap<String, Vec<StopTimeEntry>> = HashMap::new();
    for stop in &stops {
        for route in &routes {
            stop_times
                .entry(stop.id.clone())
                .or_default()
                .push(StopTimeEntry {
                    trip_id: format!("{}_trip", route.id),
                    arrival: Some(SYNTHETIC_STOP_TIME),
                    departure: Some(SYNTHETIC_STOP_TIME),
                    sequence: 0,
                });
        }
    }

    info!(
        stops = stops.len(),
        routes = routes.len(),
        "Synthesized schedule skeleton from map features"
    );

    ScheduleBundle {
        stops: stops.into_iter().map(|s| (s.id.clone(), s)).collect(),
        routes: routes.into_iter().map(|r| (r.id.clone(), r)).collect(),
        trips,
        stop_times,
        origin: BundleOrigin::Synthetic,
        loaded_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_response(json: &str) -> OverpassResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn extracts_stops_and_routes() {
        let response = parse_response(
            r#"{
                "elements": [
                    {"type": "node", "id": 101, "lat": 48.85, "lon": 2.35,
                     "tags": {"highway": "bus_stop", "name": "Opera"}},
                    {"type": "node", "id": 102, "lat": 48.86, "lon": 2.36,
                     "tags": {"railway": "tram_stop"}},
                    {"type": "node", "id": 103, "lat": 48.87, "lon": 2.37},
                    {"type": "relation", "id": 201,
                     "tags": {"route": "tram", "ref": "T3", "name": "Tramway T3", "colour": "FF6600"}},
                    {"type": "relation", "id": 202,
                     "tags": {"route": "bus", "name": "Bus 27"}},
                    {"type": "relation", "id": 203, "tags": {"building": "yes"}}
                ]
            }"#,
        );

        let (stops, routes) = extract_features(response);

        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].id, "osm_101");
        assert_eq!(stops[0].name, "Opera");
        assert_eq!(stops[1].name, "Unnamed stop");

        assert_eq!(routes.len(), 2);
        let tram = &routes[0];
        assert_eq!(tram.id, "osm_route_201");
        assert_eq!(tram.short_name.as_deref(), Some("T3"));
        assert_eq!(tram.mode, RouteType::Tram);
        assert_eq!(tram.color, "#FF6600");

        let bus = &routes[1];
        assert_eq!(bus.short_name.as_deref(), Some("Bus 27"));
        assert_eq!(bus.mode, RouteType::Bus);
        assert_eq!(bus.color, DEFAULT_ROUTE_COLOR);
    }

    #[test]
    fn untagged_node_is_ignored() {
        let response = parse_response(
            r#"{"elements": [{"type": "node", "id": 1, "lat": 1.0, "lon": 2.0}]}"#,
        );
        let (stops, routes) = extract_features(response);
        assert!(stops.is_empty());
        assert!(routes.is_empty());
    }

    #[test]
    fn normalize_color_variants() {
        assert_eq!(normalize_color(Some("FF0000")), "#FF0000");
        assert_eq!(normalize_color(Some("#00FF00")), "#00FF00");
        assert_eq!(normalize_color(Some("")), DEFAULT_ROUTE_COLOR);
        assert_eq!(normalize_color(None), DEFAULT_ROUTE_COLOR);
    }

    #[test]
    fn query_widens_relation_radius() {
        let query = build_query(48.85, 2.35, 2000);
        assert!(query.contains("around:2000,48.85,2.35"));
        assert!(query.contains("around:3000,48.85,2.35"));
        assert!(query.starts_with("[out:json]"));
    }

    #[test]
    fn synthesis_pairs_every_stop_with_every_route() {
        let stops = vec![
            Stop {
                id: "osm_1".into(),
                name: "A".into(),
                lat: 0.0,
                lon: 0.0,
                code: None,
            },
            Stop {
                id: "osm_2".into(),
                name: "B".into(),
                lat: 0.1,
                lon: 0.1,
                code: None,
            },
        ];
        let routes = vec![
            Route {
                id: "osm_route_9".into(),
                short_name: Some("9".into()),
                long_name: None,
                mode: RouteType::Bus,
                color: DEFAULT_ROUTE_COLOR.into(),
            },
            Route {
                id: "osm_route_10".into(),
                short_name: Some("10".into()),
                long_name: None,
                mode: RouteType::Tram,
                color: DEFAULT_ROUTE_COLOR.into(),
            },
        ];

        let bundle = synthesize_bundle(stops, routes);

        assert_eq!(bundle.origin, BundleOrigin::Synthetic);
        assert_eq!(bundle.trips.len(), 2);
        assert_eq!(bundle.trips["osm_route_9_trip"].route_id, "osm_route_9");
        assert_eq!(bundle.trips["osm_route_9_trip"].headsign, SYNTHETIC_HEADSIGN);

        for stop_id in ["osm_1", "osm_2"] {
            let entries = &bundle.stop_times[stop_id];
            assert_eq!(entries.len(), 2);
            for entry in entries {
                assert_eq!(entry.departure, Some(SYNTHETIC_STOP_TIME));
                assert_eq!(entry.sequence, 0);
            }
        }
    }

    #[test]
    fn empty_inputs_synthesize_empty_bundle() {
        let bundle = synthesize_bundle(Vec::new(), Vec::new());
        assert_eq!(bundle.origin, BundleOrigin::Synthetic);
        assert!(bundle.stops.is_empty());
        assert!(bundle.stop_times.is_empty());
    }
}
