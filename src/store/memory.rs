use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{JobStore, StoreError};
use crate::models::bid::{Bid, BidId, BidStatus, NewBid};
use crate::models::delivery::{Delivery, DeliveryId, DeliveryStatus, NewDelivery, RouteEstimate};
use crate::models::position::PositionSample;

/// Process-local [`JobStore`] keyed by surrogate integer ids.
#[derive(Default)]
pub struct InMemoryJobStore {
    deliveries: DashMap<DeliveryId, Delivery>,
    bids: DashMap<BidId, Bid>,
    positions: DashMap<DeliveryId, Vec<PositionSample>>,
    next_delivery_id: AtomicI64,
    next_bid_id: AtomicI64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_delivery(
        &self,
        client_id: Uuid,
        job: NewDelivery,
        route: RouteEstimate,
    ) -> Result<Delivery, StoreError> {
        let id = self.next_delivery_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();

        let delivery = Delivery {
            id,
            client_id,
            courier_id: None,
            pickup: job.pickup,
            dropoff: job.dropoff,
            proposed_price: job.proposed_price,
            final_price: None,
            status: DeliveryStatus::Pending,
            route,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            picked_up_at: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
            execution_secs: None,
        };

        self.deliveries.insert(id, delivery.clone());
        Ok(delivery)
    }

    async fn load_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>, StoreError> {
        Ok(self.deliveries.get(&id).map(|entry| entry.value().clone()))
    }

    async fn save_delivery(&self, delivery: &Delivery) -> Result<(), StoreError> {
        let mut stored = self
            .deliveries
            .get_mut(&delivery.id)
            .ok_or_else(|| StoreError::Missing(format!("delivery {}", delivery.id)))?;

        *stored = delivery.clone();
        Ok(())
    }

    async fn list_deliveries(
        &self,
        statuses: &[DeliveryStatus],
    ) -> Result<Vec<Delivery>, StoreError> {
        let mut deliveries: Vec<Delivery> = self
            .deliveries
            .iter()
            .filter(|entry| statuses.contains(&entry.value().status))
            .map(|entry| entry.value().clone())
            .collect();

        deliveries.sort_by_key(|delivery| delivery.id);
        Ok(deliveries)
    }

    async fn insert_bid(&self, bid: NewBid) -> Result<Bid, StoreError> {
        let id = self.next_bid_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();

        let bid = Bid {
            id,
            delivery_id: bid.delivery_id,
            courier_id: bid.courier_id,
            amount: bid.amount,
            note: bid.note,
            status: BidStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.bids.insert(id, bid.clone());
        Ok(bid)
    }

    async fn save_bid(&self, bid: &Bid) -> Result<(), StoreError> {
        let mut stored = self
            .bids
            .get_mut(&bid.id)
            .ok_or_else(|| StoreError::Missing(format!("bid {}", bid.id)))?;

        *stored = bid.clone();
        Ok(())
    }

    async fn load_bid(&self, id: BidId) -> Result<Option<Bid>, StoreError> {
        Ok(self.bids.get(&id).map(|entry| entry.value().clone()))
    }

    async fn bids_for_delivery(&self, delivery_id: DeliveryId) -> Result<Vec<Bid>, StoreError> {
        let mut bids: Vec<Bid> = self
            .bids
            .iter()
            .filter(|entry| entry.value().delivery_id == delivery_id)
            .map(|entry| entry.value().clone())
            .collect();

        bids.sort_by_key(|bid| bid.id);
        Ok(bids)
    }

    async fn append_position(&self, sample: &PositionSample) -> Result<(), StoreError> {
        let mut history = self.positions.entry(sample.delivery_id).or_default();

        // Keep the history ordered even if a late sample arrives out of order.
        let index = history.partition_point(|existing| existing.recorded_at <= sample.recorded_at);
        history.insert(index, sample.clone());
        Ok(())
    }

    async fn latest_position(
        &self,
        delivery_id: DeliveryId,
    ) -> Result<Option<PositionSample>, StoreError> {
        Ok(self
            .positions
            .get(&delivery_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn positions(&self, delivery_id: DeliveryId) -> Result<Vec<PositionSample>, StoreError> {
        Ok(self
            .positions
            .get(&delivery_id)
            .map(|history| history.value().clone())
            .unwrap_or_default())
    }
}
