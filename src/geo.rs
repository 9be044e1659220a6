//! Great-circle distance math shared by the geo-filter, the feed catalog
//! and the nearby-stop queries.

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two WGS84 coordinates, in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let d = haversine_km(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111.2).abs() < 0.5, "got {d}");
    }

    #[test]
    fn identical_points_are_zero() {
        assert_eq!(haversine_km(48.8566, 2.3522, 48.8566, 2.3522), 0.0);
    }

    #[test]
    fn paris_to_lyon_roughly_392_km() {
        let d = haversine_km(48.8566, 2.3522, 45.7640, 4.8357);
        assert!((d - 392.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn symmetric() {
        let a = haversine_km(44.8378, -0.5792, 48.8566, 2.3522);
        let b = haversine_km(48.8566, 2.3522, 44.8378, -0.5792);
        assert!((a - b).abs() < 1e-9);
    }
}
