//! Debug utility: resolve the schedule bundle for a coordinate and print
//! nearby stops with their next departures.
//!
//! Usage: transit-lookup <lat> <lon> [radius_km]

use std::path::Path;
use std::process::ExitCode;

use omnistop::{query, RegionCache, TransitConfig};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(lat), Some(lon)) = (
        args.next().and_then(|a| a.parse::<f64>().ok()),
        args.next().and_then(|a| a.parse::<f64>().ok()),
    ) else {
        eprintln!("Usage: transit-lookup <lat> <lon> [radius_km]");
        return ExitCode::FAILURE;
    };
    let radius_km = args
        .next()
        .and_then(|a| a.parse::<f64>().ok())
        .unwrap_or(1.0);

    let config = if Path::new("config.yaml").exists() {
        match TransitConfig::load("config.yaml") {
            Ok(config) => config,
            Err(e) => {
                eprintln!("config.yaml: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        TransitConfig::default()
    };

    let cache = match RegionCache::from_config(config) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("failed to build acquisition chain: {e}");
            return ExitCode::FAILURE;
        }
    };

    let bundle = cache.get(lat, lon).await;
    println!(
        "bundle: {:?}, {} stops, {} routes, {} trips",
        bundle.origin,
        bundle.stops.len(),
        bundle.routes.len(),
        bundle.trips.len()
    );

    for nearby in query::nearby_stops(&bundle, lat, lon, radius_km) {
        println!("{:>6} m  {} ({})", nearby.distance_m, nearby.stop.name, nearby.stop.id);
        for dep in query::next_departures(&bundle, &nearby.stop.id, 3, None) {
            let flag = if dep.estimated { " (est.)" } else { "" };
            println!(
                "          {} {} -> {}{}",
                dep.time, dep.route_name, dep.headsign, flag
            );
        }
    }

    ExitCode::SUCCESS
}
