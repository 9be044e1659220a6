//! Region-keyed transit schedule cache.
//!
//! Answers transit queries (nearby stops, connecting lines, next
//! departures) for arbitrary world coordinates by maintaining a per-region
//! knowledge base derived from schedule data:
//!
//! - [`feeds::FeedLocator`] discovers a GTFS feed for a point, falling
//!   back to a static catalog of known regional endpoints.
//! - [`gtfs`] downloads and parses the feed, geo-filtering the large
//!   stop_times table to the region of interest.
//! - [`osm::OsmFallback`] synthesizes a schedule skeleton from
//!   OpenStreetMap features when no real feed exists.
//! - [`cache::RegionCache`] keys parsed bundles by ~1.1 km coordinate
//!   cells with a 24-hour staleness policy.
//! - [`query`] answers queries uniformly over real or synthesized bundles.
//!
//! `RegionCache::get` never fails: every failure class downstream has a
//! defined empty or degraded result, ending at an empty synthetic bundle.

pub mod cache;
pub mod config;
pub mod error;
pub mod feeds;
pub mod geo;
pub mod gtfs;
pub mod models;
pub mod osm;
pub mod query;

/// User agent sent on every outbound request.
pub(crate) const USER_AGENT: &str = concat!("omnistop/", env!("CARGO_PKG_VERSION"));

pub use cache::{BundleProvider, CellKey, FeedChain, RegionCache};
pub use config::TransitConfig;
pub use error::TransitError;
pub use models::{BundleOrigin, Route, RouteType, ScheduleBundle, Stop, StopTimeEntry, Trip};
pub use query::{connecting_routes, nearby_stops, next_departures, routes_at_stop, Departure, NearbyStop};
