//! Feed discovery against an external feed-directory service, with the
//! static catalog as fallback.

use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use super::{catalog, FeedDescriptor};
use crate::config::TransitConfig;

/// One feed record as returned by the directory service. Only the fields
/// we read are modeled; the download URL may live under either key.
#[derive(Debug, Deserialize)]
struct DirectoryFeed {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    direct_download_url: Option<String>,
}

impl DirectoryFeed {
    fn into_descriptor(self) -> Option<FeedDescriptor> {
        let url = self.url.or(self.direct_download_url)?;
        Some(FeedDescriptor {
            name: self.name.unwrap_or_else(|| "unnamed feed".to_string()),
            url,
        })
    }
}

pub struct FeedLocator {
    client: reqwest::Client,
    directory_url: String,
    search_radius_km: f64,
    catalog_max_distance_km: f64,
    timeout: Duration,
}

impl FeedLocator {
    pub fn new(client: reqwest::Client, config: &TransitConfig) -> Self {
        Self {
            client,
            directory_url: config.directory_url.clone(),
            search_radius_km: config.feed_search_radius_km,
            catalog_max_distance_km: config.catalog_max_distance_km,
            timeout: Duration::from_secs(config.discovery_timeout_secs),
        }
    }

    /// Find a feed covering the given point. Network failures and empty
    /// results fall back to the static catalog; `None` means no feed is
    /// known for this region, which is a normal outcome, not an error.
    pub async fn locate(&self, lat: f64, lon: f64) -> Option<FeedDescriptor> {
        info!(lat, lon, "Searching feed directory");

        match self.query_directory(lat, lon).await {
            Ok(Some(feed)) => {
                info!(feed = %feed.name, "Feed directory match");
                return Some(feed);
            }
            Ok(None) => {
                info!("Feed directory returned no feeds, trying static catalog");
            }
            Err(e) => {
                warn!(error = %e, "Feed directory lookup failed, trying static catalog");
            }
        }

        catalog::nearest_feed(lat, lon, self.catalog_max_distance_km)
    }

    async fn query_directory(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Option<FeedDescriptor>, reqwest::Error> {
        let url = format!("{}/gtfs_feeds", self.directory_url);
        let radius_m = self.search_radius_km * 1000.0;

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("radius", radius_m.to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let feeds: Vec<DirectoryFeed> = response.json().await?;
        info!(count = feeds.len(), "Feed directory responded");

        Ok(first_usable_feed(feeds))
    }
}

/// The directory ranks feeds by proximity; take the first one that
/// actually carries a download URL.
fn first_usable_feed(feeds: Vec<DirectoryFeed>) -> Option<FeedDescriptor> {
    feeds.into_iter().find_map(DirectoryFeed::into_descriptor)
}
