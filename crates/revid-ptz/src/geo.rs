//! Geodesic helpers over camera locations.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Wrap an angle to (-180, 180].
pub fn wrap_degrees(deg: f64) -> f64 {
    ((deg + 540.0) % 360.0) - 180.0
}

/// Great-circle destination point given a start, distance, and bearing.
///
/// Returns (latitude, longitude) in degrees, longitude wrapped to
/// (-180, 180].
pub fn destination_point(lat: f64, lng: f64, dist_meters: f64, bearing_deg: f64) -> (f64, f64) {
    let d = dist_meters / EARTH_RADIUS_M;
    let brng = bearing_deg.to_radians();
    let phi1 = lat.to_radians();
    let lam1 = lng.to_radians();

    let phi2 = (phi1.sin() * d.cos() + phi1.cos() * d.sin() * brng.cos()).asin();
    let lam2 = lam1
        + (brng.sin() * d.sin() * phi1.cos()).atan2(d.cos() - phi1.sin() * phi2.sin());

    (phi2.to_degrees(), wrap_degrees(lam2.to_degrees()))
}

/// Initial compass bearing from point 1 to point 2, degrees in [0, 360).
pub fn bearing_between(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlam = (lng2 - lng1).to_radians();

    let y = dlam.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlam.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Build the camera's FOV cone as a (lat, lng) polygon: apex at the camera,
/// an arc of `n_pts + 1` points along the range boundary, closed back at
/// the apex.
pub fn fov_polygon(
    lat: f64,
    lng: f64,
    bearing_deg: f64,
    fov_angle_deg: f64,
    range_meters: f64,
    n_pts: usize,
) -> Vec<(f64, f64)> {
    let mut pts = vec![(lat, lng)];
    let start = bearing_deg - fov_angle_deg / 2.0;
    let end = bearing_deg + fov_angle_deg / 2.0;
    for i in 0..=n_pts {
        let angle = start + (end - start) * (i as f64 / n_pts as f64);
        pts.push(destination_point(lat, lng, range_meters, angle));
    }
    pts.push((lat, lng));
    pts
}
