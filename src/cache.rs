//! Region-keyed cache of schedule bundles with a 24-hour staleness policy,
//! orchestrating the locator -> parser -> map-feature fallback chain.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::config::TransitConfig;
use crate::error::TransitError;
use crate::feeds::FeedLocator;
use crate::models::ScheduleBundle;
use crate::osm::{self, OsmFallback};
use crate::{gtfs, USER_AGENT};

/// Cache key: coordinates quantized to 2 decimals (~1.1 km cells).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    lat_centi: i32,
    lon_centi: i32,
}

impl CellKey {
    pub fn from_coords(lat: f64, lon: f64) -> Self {
        Self {
            lat_centi: (lat * 100.0).round() as i32,
            lon_centi: (lon * 100.0).round() as i32,
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2}_{:.2}",
            self.lat_centi as f64 / 100.0,
            self.lon_centi as f64 / 100.0
        )
    }
}

/// Source of bundles on a cache miss. The production implementation is
/// [`FeedChain`]; tests inject stubs.
pub trait BundleProvider: Send + Sync {
    fn load(&self, lat: f64, lon: f64) -> impl Future<Output = ScheduleBundle> + Send;
}

/// The full acquisition chain: feed directory -> schedule archive ->
/// map-feature synthesis. Never fails; the terminal degraded state is an
/// empty synthetic bundle.
pub struct FeedChain {
    client: reqwest::Client,
    locator: FeedLocator,
    fallback: OsmFallback,
    config: TransitConfig,
}

impl FeedChain {
    pub fn new(config: TransitConfig) -> Result<Self, TransitError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let locator = FeedLocator::new(client.clone(), &config);
        let fallback = OsmFallback::new(client.clone(), &config);
        Ok(Self {
            client,
            locator,
            fallback,
            config,
        })
    }
}

impl BundleProvider for FeedChain {
    async fn load(&self, lat: f64, lon: f64) -> ScheduleBundle {
        if let Some(feed) = self.locator.locate(lat, lon).await {
            if let Some(bundle) =
                gtfs::fetch_bundle(&self.client, &feed.url, lat, lon, &self.config).await
            {
                return bundle;
            }
            warn!(feed = %feed.name, "Schedule feed unusable, falling back to map features");
        } else {
            info!(lat, lon, "No schedule feed for region, using map features");
        }

        let (stops, routes) = self
            .fallback
            .fetch(lat, lon, self.config.fallback_radius_m)
            .await;
        osm::synthesize_bundle(stops, routes)
    }
}

/// TTL-keyed store of schedule bundles, shared by concurrent request
/// tasks.
///
/// The entry map lock is held only around map reads and writes, never
/// across a network call, so one region's slow fetch cannot stall others.
/// A per-cell in-flight guard collapses concurrent first-access misses on
/// the same cell into one fetch.
pub struct RegionCache<P> {
    provider: P,
    ttl: Duration,
    entries: Mutex<HashMap<CellKey, Arc<ScheduleBundle>>>,
    inflight: Mutex<HashMap<CellKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl RegionCache<FeedChain> {
    /// Cache backed by the production acquisition chain.
    pub fn from_config(config: TransitConfig) -> Result<Self, TransitError> {
        let ttl_hours = config.cache_ttl_hours;
        let chain = FeedChain::new(config)?;
        Ok(Self::new(chain, ttl_hours))
    }
}

impl<P: BundleProvider> RegionCache<P> {
    pub fn new(provider: P, ttl_hours: i64) -> Self {
        Self {
            provider,
            ttl: Duration::hours(ttl_hours),
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Get the bundle for a coordinate's cell, loading it on miss or
    /// expiry. Always yields a bundle; every failure mode downstream
    /// degrades to a valid (possibly empty) one.
    pub async fn get(&self, lat: f64, lon: f64) -> Arc<ScheduleBundle> {
        let key = CellKey::from_coords(lat, lon);

        if let Some(bundle) = self.lookup_fresh(&key) {
            info!(cell = %key, "Schedule cache hit");
            return bundle;
        }

        // Single-flight: concurrent misses on the same cell queue up here
        // while distinct cells fetch in parallel.
        let gate = self.gate(&key);
        let _guard = gate.lock().await;

        if let Some(bundle) = self.lookup_fresh(&key) {
            info!(cell = %key, "Schedule cache hit after in-flight fetch");
            return bundle;
        }

        info!(cell = %key, "Schedule cache miss, loading region");
        let bundle = Arc::new(self.provider.load(lat, lon).await);

        {
            let mut entries = self.entries.lock().expect("cache lock poisoned");
            entries.insert(key, bundle.clone());
        }
        self.inflight
            .lock()
            .expect("inflight lock poisoned")
            .remove(&key);

        bundle
    }

    fn lookup_fresh(&self, key: &CellKey) -> Option<Arc<ScheduleBundle>> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries
            .get(key)
            .filter(|bundle| Utc::now() - bundle.loaded_at < self.ttl)
            .cloned()
    }

    fn gate(&self, key: &CellKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
        inflight.entry(*key).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BundleOrigin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        delay_ms: u64,
    }

    impl CountingProvider {
        fn new(delay_ms: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay_ms,
            }
        }
    }

    impl BundleProvider for CountingProvider {
        async fn load(&self, _lat: f64, _lon: f64) -> ScheduleBundle {
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            ScheduleBundle::empty_synthetic()
        }
    }

    #[test]
    fn cell_key_quantizes_to_two_decimals() {
        let a = CellKey::from_coords(48.8566, 2.3522);
        let b = CellKey::from_coords(48.8601, 2.3545);
        let c = CellKey::from_coords(48.8701, 2.3522);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "48.86_2.35");
    }

    #[test]
    fn cell_key_handles_negative_coordinates() {
        let key = CellKey::from_coords(-33.8688, 151.2093);
        assert_eq!(key.to_string(), "-33.87_151.21");
    }

    #[tokio::test]
    async fn second_get_within_ttl_is_a_hit() {
        let cache = RegionCache::new(CountingProvider::new(0), 24);

        let first = cache.get(48.8566, 2.3522).await;
        let second = cache.get(48.8566, 2.3522).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.loaded_at, second.loaded_at);
        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_reload() {
        let cache = RegionCache::new(CountingProvider::new(0), 24);
        let key = CellKey::from_coords(48.8566, 2.3522);

        // Age an entry just past the TTL.
        let mut stale = ScheduleBundle::empty_synthetic();
        stale.loaded_at = Utc::now() - Duration::hours(24) - Duration::seconds(1);
        cache
            .entries
            .lock()
            .unwrap()
            .insert(key, Arc::new(stale));

        let bundle = cache.get(48.8566, 2.3522).await;

        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 1);
        assert!(Utc::now() - bundle.loaded_at < Duration::minutes(1));
    }

    #[tokio::test]
    async fn distinct_cells_load_independently() {
        let cache = RegionCache::new(CountingProvider::new(0), 24);

        cache.get(48.8566, 2.3522).await;
        cache.get(45.7640, 4.8357).await;

        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_on_one_cell_collapse() {
        let cache = Arc::new(RegionCache::new(CountingProvider::new(50), 24));

        let a = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get(48.8566, 2.3522).await }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get(48.8566, 2.3522).await }
        });

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_sources_failing_yields_empty_synthetic_bundle() {
        // Point every network dependency at a closed local port: the
        // directory lookup fails, the mid-ocean point matches no catalog
        // feed, and every fallback mirror fails. The terminal state is an
        // empty synthetic bundle, not an error.
        let config = TransitConfig {
            directory_url: "http://127.0.0.1:1".to_string(),
            overpass_mirrors: vec![
                "http://127.0.0.1:1".to_string(),
                "http://127.0.0.1:2".to_string(),
            ],
            ..TransitConfig::default()
        };
        let cache = RegionCache::from_config(config).unwrap();

        let bundle = cache.get(30.0, -40.0).await;

        assert_eq!(bundle.origin, BundleOrigin::Synthetic);
        assert!(bundle.stops.is_empty());
        assert!(bundle.routes.is_empty());
        assert!(bundle.trips.is_empty());
        assert!(bundle.stop_times.is_empty());
    }
}
