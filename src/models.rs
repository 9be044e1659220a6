//! The unified schedule schema.
//!
//! Real GTFS feeds and synthesized map-feature data both land in a
//! [`ScheduleBundle`]; consumers branch on [`BundleOrigin`] instead of
//! inferring the data source structurally.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default route color applied whenever a feed omits one.
pub const DEFAULT_ROUTE_COLOR: &str = "#0066CC";

/// Transit mode, normalized from GTFS `route_type` codes or OSM `route`
/// relation tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    Tram,
    Metro,
    Rail,
    Bus,
    Ferry,
    CableCar,
    Gondola,
    Funicular,
    Trolleybus,
    Monorail,
}

impl RouteType {
    /// Map a GTFS `route_type` code. Unknown codes default to `Bus`.
    pub fn from_gtfs_code(code: i32) -> Self {
        match code {
            0 => RouteType::Tram,
            1 => RouteType::Metro,
            2 => RouteType::Rail,
            3 => RouteType::Bus,
            4 => RouteType::Ferry,
            5 => RouteType::CableCar,
            6 => RouteType::Gondola,
            7 => RouteType::Funicular,
            11 => RouteType::Trolleybus,
            12 => RouteType::Monorail,
            _ => RouteType::Bus,
        }
    }

    /// Map an OSM `route=*` relation tag value. Unknown values default to `Bus`.
    pub fn from_osm_tag(tag: &str) -> Self {
        match tag {
            "tram" | "light_rail" => RouteType::Tram,
            "subway" | "metro" => RouteType::Metro,
            "train" | "rail" => RouteType::Rail,
            "bus" => RouteType::Bus,
            "trolleybus" => RouteType::Trolleybus,
            "ferry" => RouteType::Ferry,
            "funicular" => RouteType::Funicular,
            "monorail" => RouteType::Monorail,
            _ => RouteType::Bus,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Tram => "tram",
            RouteType::Metro => "metro",
            RouteType::Rail => "rail",
            RouteType::Bus => "bus",
            RouteType::Ferry => "ferry",
            RouteType::CableCar => "cable_car",
            RouteType::Gondola => "gondola",
            RouteType::Funicular => "funicular",
            RouteType::Trolleybus => "trolleybus",
            RouteType::Monorail => "monorail",
        }
    }

    /// Sort rank for route listings: trams and metros first, then buses,
    /// then everything else.
    pub fn sort_rank(&self) -> u8 {
        match self {
            RouteType::Tram | RouteType::Metro => 0,
            RouteType::Bus => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub mode: RouteType,
    /// `#RRGGBB`; feeds without a color get [`DEFAULT_ROUTE_COLOR`].
    pub color: String,
}

impl Route {
    /// Display name: short name, falling back to long name, then "N/A".
    pub fn display_name(&self) -> &str {
        self.short_name
            .as_deref()
            .or(self.long_name.as_deref())
            .unwrap_or("N/A")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Trip {
    pub id: String,
    pub route_id: String,
    pub headsign: String,
    pub service_id: Option<String>,
}

/// One scheduled stop visit. Times are seconds since midnight and may
/// exceed 86400 for trips crossing midnight.
#[derive(Debug, Clone, Serialize)]
pub struct StopTimeEntry {
    pub trip_id: String,
    pub arrival: Option<i32>,
    pub departure: Option<i32>,
    pub sequence: i32,
}

/// Where a bundle's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleOrigin {
    /// Parsed from a packaged static schedule feed.
    Static,
    /// Synthesized from generic map features; every derived departure is
    /// an estimate.
    Synthetic,
}

/// The parsed or synthesized schedule data for one cache cell.
///
/// Immutable once stored: a refresh replaces the whole bundle, never
/// mutates fields in place. `stop_times` rows whose `trip_id` is absent
/// from `trips` stay in storage; consumers skip them.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleBundle {
    pub stops: HashMap<String, Stop>,
    pub routes: HashMap<String, Route>,
    pub trips: HashMap<String, Trip>,
    /// stop_id -> stop visits, in feed order.
    pub stop_times: HashMap<String, Vec<StopTimeEntry>>,
    pub origin: BundleOrigin,
    pub loaded_at: DateTime<Utc>,
}

impl ScheduleBundle {
    /// The terminal state when no feed exists and all fallback mirrors
    /// fail: a valid, empty, synthetic bundle.
    pub fn empty_synthetic() -> Self {
        Self {
            stops: HashMap::new(),
            routes: HashMap::new(),
            trips: HashMap::new(),
            stop_times: HashMap::new(),
            origin: BundleOrigin::Synthetic,
            loaded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gtfs_code_mapping() {
        assert_eq!(RouteType::from_gtfs_code(0), RouteType::Tram);
        assert_eq!(RouteType::from_gtfs_code(1), RouteType::Metro);
        assert_eq!(RouteType::from_gtfs_code(2), RouteType::Rail);
        assert_eq!(RouteType::from_gtfs_code(3), RouteType::Bus);
        assert_eq!(RouteType::from_gtfs_code(7), RouteType::Funicular);
        assert_eq!(RouteType::from_gtfs_code(11), RouteType::Trolleybus);
        assert_eq!(RouteType::from_gtfs_code(12), RouteType::Monorail);
    }

    #[test]
    fn unknown_gtfs_code_defaults_to_bus() {
        assert_eq!(RouteType::from_gtfs_code(99), RouteType::Bus);
        assert_eq!(RouteType::from_gtfs_code(-1), RouteType::Bus);
    }

    #[test]
    fn osm_tag_mapping() {
        assert_eq!(RouteType::from_osm_tag("tram"), RouteType::Tram);
        assert_eq!(RouteType::from_osm_tag("light_rail"), RouteType::Tram);
        assert_eq!(RouteType::from_osm_tag("subway"), RouteType::Metro);
        assert_eq!(RouteType::from_osm_tag("train"), RouteType::Rail);
        assert_eq!(RouteType::from_osm_tag("hovercraft"), RouteType::Bus);
    }

    #[test]
    fn sort_rank_puts_trams_and_metros_first() {
        assert!(RouteType::Tram.sort_rank() < RouteType::Bus.sort_rank());
        assert!(RouteType::Metro.sort_rank() < RouteType::Bus.sort_rank());
        assert!(RouteType::Bus.sort_rank() < RouteType::Ferry.sort_rank());
    }

    #[test]
    fn route_display_name_fallback_chain() {
        let mut route = Route {
            id: "r1".into(),
            short_name: Some("12".into()),
            long_name: Some("Airport Express".into()),
            mode: RouteType::Bus,
            color: DEFAULT_ROUTE_COLOR.into(),
        };
        assert_eq!(route.display_name(), "12");
        route.short_name = None;
        assert_eq!(route.display_name(), "Airport Express");
        route.long_name = None;
        assert_eq!(route.display_name(), "N/A");
    }

    #[test]
    fn empty_synthetic_bundle_is_tagged() {
        let bundle = ScheduleBundle::empty_synthetic();
        assert_eq!(bundle.origin, BundleOrigin::Synthetic);
        assert!(bundle.stops.is_empty());
        assert!(bundle.routes.is_empty());
        assert!(bundle.trips.is_empty());
        assert!(bundle.stop_times.is_empty());
    }
}
