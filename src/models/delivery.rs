use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::principal::{Principal, Role};

pub type DeliveryId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub location: GeoPoint,
    pub address: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Bidding,
    Accepted,
    InProgress,
    Delivered,
    Completed,
    Cancelled,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 7] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Bidding,
        DeliveryStatus::Accepted,
        DeliveryStatus::InProgress,
        DeliveryStatus::Delivered,
        DeliveryStatus::Completed,
        DeliveryStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Bidding => "bidding",
            DeliveryStatus::Accepted => "accepted",
            DeliveryStatus::InProgress => "in_progress",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }

    /// Still collecting bids; no courier attached.
    pub fn is_open(&self) -> bool {
        matches!(self, DeliveryStatus::Pending | DeliveryStatus::Bidding)
    }

    /// A courier has been assigned (includes completion).
    pub fn is_assigned(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Accepted
                | DeliveryStatus::InProgress
                | DeliveryStatus::Delivered
                | DeliveryStatus::Completed
        )
    }

    /// Live position streaming is allowed.
    pub fn is_live(&self) -> bool {
        matches!(self, DeliveryStatus::Accepted | DeliveryStatus::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Completed | DeliveryStatus::Cancelled)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown status: {s}"))
    }
}

/// Output of the route estimator, stored alongside the job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteEstimate {
    pub stops: Vec<GeoPoint>,
    pub distance_km: f64,
    pub duration_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub client_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub pickup: Stop,
    pub dropoff: Stop,
    pub proposed_price: i64,
    pub final_price: Option<i64>,
    pub status: DeliveryStatus,
    pub route: RouteEstimate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub execution_secs: Option<i64>,
}

impl Delivery {
    pub fn is_client(&self, principal: &Principal) -> bool {
        principal.role == Role::Client && principal.id == self.client_id
    }

    pub fn is_assigned_courier(&self, principal: &Principal) -> bool {
        principal.role == Role::Courier && self.courier_id == Some(principal.id)
    }

    /// Parties allowed to watch the live position stream.
    pub fn is_observer(&self, principal: &Principal) -> bool {
        principal.is_operator() || self.is_client(principal) || self.is_assigned_courier(principal)
    }

    /// Parties allowed to read the job record.
    pub fn is_visible_to(&self, principal: &Principal) -> bool {
        self.is_observer(principal) || (principal.role == Role::Courier && self.status.is_open())
    }
}

/// A job as posted by a client, before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDelivery {
    pub pickup: Stop,
    pub dropoff: Stop,
    pub proposed_price: i64,
}
