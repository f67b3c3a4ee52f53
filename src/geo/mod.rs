use crate::error::AppError;
use crate::models::delivery::{GeoPoint, RouteEstimate};

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn validate_point(point: &GeoPoint) -> Result<(), AppError> {
    if !point.lat.is_finite() || !(-90.0..=90.0).contains(&point.lat) {
        return Err(AppError::Validation(format!(
            "latitude {} is outside [-90, 90]",
            point.lat
        )));
    }

    if !point.lng.is_finite() || !(-180.0..=180.0).contains(&point.lng) {
        return Err(AppError::Validation(format!(
            "longitude {} is outside [-180, 180]",
            point.lng
        )));
    }

    Ok(())
}

/// Route planning collaborator. Implementations return the ordered stop list together with
/// distance and travel-time estimates; the dispatch core treats the result as opaque data.
pub trait RouteEstimator: Send + Sync {
    fn estimate(&self, pickup: &GeoPoint, dropoff: &GeoPoint) -> RouteEstimate;
}

/// Great-circle estimate at a constant average speed.
pub struct StraightLineEstimator {
    average_speed_kmh: f64,
}

impl StraightLineEstimator {
    pub fn new(average_speed_kmh: f64) -> Self {
        Self {
            average_speed_kmh: average_speed_kmh.max(1.0),
        }
    }
}

impl RouteEstimator for StraightLineEstimator {
    fn estimate(&self, pickup: &GeoPoint, dropoff: &GeoPoint) -> RouteEstimate {
        let distance_km = haversine_km(pickup, dropoff);
        let duration_secs = (distance_km / self.average_speed_kmh * 3_600.0).round() as i64;

        RouteEstimate {
            stops: vec![*pickup, *dropoff],
            distance_km,
            duration_secs,
        }
    }
}
