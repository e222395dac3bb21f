use crate::models::Point;

/// Straight-line distance on the planar grid, in kilometres.
pub fn euclidean_km(a: &Point, b: &Point) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Hours needed to cover `distance_km` at `speed_kmh`, as a chrono duration.
/// `None` when the result does not fit a duration.
pub fn travel_time(distance_km: f64, speed_kmh: f64) -> Option<chrono::Duration> {
    if speed_kmh <= 0.0 || !distance_km.is_finite() {
        return Some(chrono::Duration::zero());
    }

    let millis = (distance_km / speed_kmh * 3_600_000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    chrono::Duration::try_milliseconds(millis as i64)
}
