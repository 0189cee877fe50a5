//! Stateless great-circle math between coordinate pairs.

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

fn degrees_to_radians(degrees: f64) -> f64 {
    degrees.to_radians()
}

/// Computes the haversine great-circle distance between two points, in
/// kilometers. Assumes valid degree inputs.
#[must_use]
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = degrees_to_radians(lat2 - lat1);
    let d_lon = degrees_to_radians(lon2 - lon1);

    let a = (d_lat / 2.0).sin().powi(2)
        + degrees_to_radians(lat1).cos() * degrees_to_radians(lat2).cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Relative transmission risk between two cities as a function of distance:
/// 1 at `distance <= 0`, 0 at `distance >= max_distance`, linear falloff in
/// between.
#[must_use]
pub fn transmission_risk(distance: f64, max_distance: f64) -> f64 {
    if distance <= 0.0 {
        return 1.0;
    }
    if distance >= max_distance {
        return 0.0;
    }
    1.0 - distance / max_distance
}
