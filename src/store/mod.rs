//! Durable storage boundary for deliveries, bids and position samples.
//!
//! The dispatch core only issues simple save/load calls through [`JobStore`]; the storage
//! format belongs to the implementation. [`InMemoryJobStore`] backs tests and single-node
//! runs.

mod memory;

pub use memory::InMemoryJobStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::bid::{Bid, BidId, NewBid};
use crate::models::delivery::{Delivery, DeliveryId, DeliveryStatus, NewDelivery, RouteEstimate};
use crate::models::position::PositionSample;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record missing: {0}")]
    Missing(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a freshly posted job with status `pending` and returns it with its id.
    async fn insert_delivery(
        &self,
        client_id: Uuid,
        job: NewDelivery,
        route: RouteEstimate,
    ) -> Result<Delivery, StoreError>;

    async fn load_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>, StoreError>;

    async fn save_delivery(&self, delivery: &Delivery) -> Result<(), StoreError>;

    /// Deliveries whose status is one of `statuses`, ordered by id.
    async fn list_deliveries(
        &self,
        statuses: &[DeliveryStatus],
    ) -> Result<Vec<Delivery>, StoreError>;

    async fn insert_bid(&self, bid: NewBid) -> Result<Bid, StoreError>;

    async fn save_bid(&self, bid: &Bid) -> Result<(), StoreError>;

    async fn load_bid(&self, id: BidId) -> Result<Option<Bid>, StoreError>;

    /// The bid ledger of one delivery, ordered by id.
    async fn bids_for_delivery(&self, delivery_id: DeliveryId) -> Result<Vec<Bid>, StoreError>;

    async fn append_position(&self, sample: &PositionSample) -> Result<(), StoreError>;

    async fn latest_position(
        &self,
        delivery_id: DeliveryId,
    ) -> Result<Option<PositionSample>, StoreError>;

    /// Full position history, ordered by timestamp.
    async fn positions(&self, delivery_id: DeliveryId) -> Result<Vec<PositionSample>, StoreError>;
}
