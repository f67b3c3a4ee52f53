use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::delivery::{DeliveryId, GeoPoint};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionSample {
    pub delivery_id: DeliveryId,
    pub lat: f64,
    pub lng: f64,
    pub recorded_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(delivery_id: DeliveryId, point: GeoPoint) -> Self {
        Self {
            delivery_id,
            lat: point.lat,
            lng: point.lng,
            recorded_at: Utc::now(),
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}
