//! Side-effect events leaving the dispatch core.
//!
//! Notification, payment capture and dashboards consume these from a broadcast channel;
//! nothing in the core reads them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::bid::{Bid, BidId};
use crate::models::delivery::{Delivery, DeliveryId, DeliveryStatus};
use crate::models::principal::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    JobCreated {
        delivery: Delivery,
    },
    BidSubmitted {
        bid: Bid,
        resubmitted: bool,
    },
    BidAccepted {
        delivery_id: DeliveryId,
        bid_id: BidId,
        courier_id: Uuid,
        final_price: i64,
    },
    CourierAssigned {
        delivery_id: DeliveryId,
        courier_id: Uuid,
        final_price: i64,
        operator_id: Uuid,
    },
    StatusChanged {
        delivery_id: DeliveryId,
        from: DeliveryStatus,
        to: DeliveryStatus,
        by: Role,
        at: DateTime<Utc>,
    },
}

impl DispatchEvent {
    pub fn delivery_id(&self) -> DeliveryId {
        match self {
            DispatchEvent::JobCreated { delivery } => delivery.id,
            DispatchEvent::BidSubmitted { bid, .. } => bid.delivery_id,
            DispatchEvent::BidAccepted { delivery_id, .. }
            | DispatchEvent::CourierAssigned { delivery_id, .. }
            | DispatchEvent::StatusChanged { delivery_id, .. } => *delivery_id,
        }
    }
}
