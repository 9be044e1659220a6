use serde::Deserialize;
use std::path::Path;

/// Tunables for feed discovery, parsing and the region cache.
///
/// Every field has a default so an empty YAML document (or `Default::default()`)
/// yields a working configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransitConfig {
    /// Base URL of the feed-directory service (Mobility Database style).
    #[serde(default = "TransitConfig::default_directory_url")]
    pub directory_url: String,
    /// Search radius passed to the feed directory, in kilometers (default: 50)
    #[serde(default = "TransitConfig::default_feed_search_radius_km")]
    pub feed_search_radius_km: f64,
    /// Maximum distance for a static-catalog feed to be considered local (default: 100)
    #[serde(default = "TransitConfig::default_catalog_max_distance_km")]
    pub catalog_max_distance_km: f64,
    /// Radius around the reference point for which stop_times are retained (default: 5)
    #[serde(default = "TransitConfig::default_filter_radius_km")]
    pub filter_radius_km: f64,
    /// Hard cap on scanned stop_times rows; parsing stops there, keeping
    /// whatever was loaded (default: 2,000,000)
    #[serde(default = "TransitConfig::default_max_scan_rows")]
    pub max_scan_rows: u64,
    /// Cache entry lifetime in hours (default: 24)
    #[serde(default = "TransitConfig::default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,
    /// Radius for the map-feature fallback query, in meters (default: 2000)
    #[serde(default = "TransitConfig::default_fallback_radius_m")]
    pub fallback_radius_m: u32,
    /// Timeout for feed-directory requests, in seconds (default: 10)
    #[serde(default = "TransitConfig::default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
    /// Timeout for the schedule archive download, in seconds (default: 60)
    #[serde(default = "TransitConfig::default_archive_timeout_secs")]
    pub archive_timeout_secs: u64,
    /// Timeout per fallback mirror request, in seconds (default: 20)
    #[serde(default = "TransitConfig::default_mirror_timeout_secs")]
    pub mirror_timeout_secs: u64,
    /// Ordered list of map-feature service mirrors; the first one returning
    /// a valid response wins.
    #[serde(default = "TransitConfig::default_overpass_mirrors")]
    pub overpass_mirrors: Vec<String>,
}

impl Default for TransitConfig {
    fn default() -> Self {
        Self {
            directory_url: Self::default_directory_url(),
            feed_search_radius_km: Self::default_feed_search_radius_km(),
            catalog_max_distance_km: Self::default_catalog_max_distance_km(),
            filter_radius_km: Self::default_filter_radius_km(),
            max_scan_rows: Self::default_max_scan_rows(),
            cache_ttl_hours: Self::default_cache_ttl_hours(),
            fallback_radius_m: Self::default_fallback_radius_m(),
            discovery_timeout_secs: Self::default_discovery_timeout_secs(),
            archive_timeout_secs: Self::default_archive_timeout_secs(),
            mirror_timeout_secs: Self::default_mirror_timeout_secs(),
            overpass_mirrors: Self::default_overpass_mirrors(),
        }
    }
}

impl TransitConfig {
    fn default_directory_url() -> String {
        "https://api.mobilitydatabase.org/v1".to_string()
    }
    fn default_feed_search_radius_km() -> f64 {
        50.0
    }
    fn default_catalog_max_distance_km() -> f64 {
        100.0
    }
    fn default_filter_radius_km() -> f64 {
        5.0
    }
    fn default_max_scan_rows() -> u64 {
        2_000_000
    }
    fn default_cache_ttl_hours() -> i64 {
        24
    }
    fn default_fallback_radius_m() -> u32 {
        2000
    }
    fn default_discovery_timeout_secs() -> u64 {
        10
    }
    fn default_archive_timeout_secs() -> u64 {
        60
    }
    fn default_mirror_timeout_secs() -> u64 {
        20
    }
    fn default_overpass_mirrors() -> Vec<String> {
        vec![
            "https://overpass.kumi.systems/api/interpreter".to_string(),
            "https://overpass-api.de/api/interpreter".to_string(),
            "https://overpass.openstreetmap.ru/cgi/interpreter".to_string(),
        ]
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = TransitConfig::default();
        assert_eq!(cfg.filter_radius_km, 5.0);
        assert_eq!(cfg.max_scan_rows, 2_000_000);
        assert_eq!(cfg.cache_ttl_hours, 24);
        assert_eq!(cfg.discovery_timeout_secs, 10);
        assert_eq!(cfg.archive_timeout_secs, 60);
        assert_eq!(cfg.mirror_timeout_secs, 20);
        assert_eq!(cfg.overpass_mirrors.len(), 3);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let cfg: TransitConfig =
            serde_yaml::from_str("filter_radius_km: 2.5\ncache_ttl_hours: 6\n").unwrap();
        assert_eq!(cfg.filter_radius_km, 2.5);
        assert_eq!(cfg.cache_ttl_hours, 6);
        assert_eq!(cfg.max_scan_rows, 2_000_000);
        assert!(cfg.directory_url.starts_with("https://"));
    }
}
