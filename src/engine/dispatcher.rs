use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::locks::KeyedLocks;
use crate::engine::transitions;
use crate::error::AppError;
use crate::events::DispatchEvent;
use crate::geo::{validate_point, RouteEstimator};
use crate::hub::{CloseReason, PositionHub};
use crate::models::bid::{Bid, BidId, BidStatus, NewBid};
use crate::models::delivery::{Delivery, DeliveryId, DeliveryStatus, NewDelivery};
use crate::models::position::PositionSample;
use crate::models::principal::{Principal, Role};
use crate::observability::metrics::Metrics;
use crate::store::JobStore;

/// Owns the lifecycle of delivery jobs and their bid ledgers.
///
/// Every mutation of one delivery (status, courier, bids) runs under that delivery's lock, so two
/// racing acceptances cannot both win while unrelated deliveries proceed in parallel.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    hub: Arc<PositionHub>,
    routes: Arc<dyn RouteEstimator>,
    events: broadcast::Sender<DispatchEvent>,
    metrics: Metrics,
    locks: Arc<KeyedLocks<DeliveryId>>,
    price_floor: i64,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        hub: Arc<PositionHub>,
        routes: Arc<dyn RouteEstimator>,
        events: broadcast::Sender<DispatchEvent>,
        metrics: Metrics,
        locks: Arc<KeyedLocks<DeliveryId>>,
        price_floor: i64,
    ) -> Self {
        Self {
            store,
            hub,
            routes,
            events,
            metrics,
            locks,
            price_floor,
        }
    }

    pub fn price_floor(&self) -> i64 {
        self.price_floor
    }

    pub async fn create(&self, principal: &Principal, job: NewDelivery) -> Result<Delivery, AppError> {
        let started = Instant::now();
        let result = self.create_inner(principal, job).await;
        self.record("create", started, &result);
        result
    }

    async fn create_inner(&self, principal: &Principal, job: NewDelivery) -> Result<Delivery, AppError> {
        if principal.role != Role::Client {
            return Err(AppError::Permission("only clients may post delivery jobs".to_string()));
        }

        if job.proposed_price <= 0 || job.proposed_price < self.price_floor {
            return Err(AppError::Validation(format!(
                "proposed price {} is below the floor of {}",
                job.proposed_price, self.price_floor
            )));
        }

        validate_point(&job.pickup.location)?;
        validate_point(&job.dropoff.location)?;

        let route = self
            .routes
            .estimate(&job.pickup.location, &job.dropoff.location);
        let delivery = self.store.insert_delivery(principal.id, job, route).await?;

        self.metrics.deliveries_created_total.inc();
        info!(
            delivery_id = delivery.id,
            client_id = %delivery.client_id,
            proposed_price = delivery.proposed_price,
            "delivery job created"
        );
        self.emit(DispatchEvent::JobCreated {
            delivery: delivery.clone(),
        });

        Ok(delivery)
    }

    /// Places or updates the courier's bid. The first bid on a pending job opens bidding.
    pub async fn submit_bid(
        &self,
        delivery_id: DeliveryId,
        principal: &Principal,
        amount: i64,
        note: String,
    ) -> Result<Bid, AppError> {
        let started = Instant::now();
        let result = self.submit_bid_inner(delivery_id, principal, amount, note).await;
        self.record("submit_bid", started, &result);
        result
    }

    async fn submit_bid_inner(
        &self,
        delivery_id: DeliveryId,
        principal: &Principal,
        amount: i64,
        note: String,
    ) -> Result<Bid, AppError> {
        if principal.role != Role::Courier {
            return Err(AppError::Permission("only couriers may bid".to_string()));
        }

        if amount <= 0 {
            return Err(AppError::Validation(format!(
                "bid amount must be positive, got {amount}"
            )));
        }

        let _guard = self.locks.lock(delivery_id).await;
        let mut delivery = self.load(delivery_id).await?;

        if !delivery.status.is_open() {
            self.metrics.bids_total.with_label_values(&["refused"]).inc();
            return Err(AppError::Conflict(format!(
                "delivery {delivery_id} is {} and no longer takes bids",
                delivery.status
            )));
        }

        let existing = self
            .store
            .bids_for_delivery(delivery_id)
            .await?
            .into_iter()
            .find(|bid| bid.courier_id == principal.id);

        let resubmitted = existing.is_some();
        let bid = match existing {
            Some(mut bid) => {
                bid.amount = amount;
                bid.note = note;
                bid.updated_at = Utc::now();
                self.store.save_bid(&bid).await?;
                bid
            }
            None => {
                self.store
                    .insert_bid(NewBid {
                        delivery_id,
                        courier_id: principal.id,
                        amount,
                        note,
                    })
                    .await?
            }
        };

        if delivery.status == DeliveryStatus::Pending {
            let from = delivery.status;
            delivery.status = DeliveryStatus::Bidding;
            delivery.updated_at = Utc::now();
            self.store.save_delivery(&delivery).await?;
            self.status_changed(&delivery, from, Role::Courier);
        }

        let outcome = if resubmitted { "resubmitted" } else { "submitted" };
        self.metrics.bids_total.with_label_values(&[outcome]).inc();
        info!(
            delivery_id,
            bid_id = bid.id,
            courier_id = %principal.id,
            amount,
            resubmitted,
            "bid recorded"
        );
        self.emit(DispatchEvent::BidSubmitted {
            bid: bid.clone(),
            resubmitted,
        });

        Ok(bid)
    }

    /// The job's client picks a winning bid; every other bid on the job is rejected.
    pub async fn accept_bid(
        &self,
        delivery_id: DeliveryId,
        bid_id: BidId,
        principal: &Principal,
    ) -> Result<Delivery, AppError> {
        let started = Instant::now();
        let result = self.accept_bid_inner(delivery_id, bid_id, principal).await;
        self.record("accept_bid", started, &result);
        result
    }

    async fn accept_bid_inner(
        &self,
        delivery_id: DeliveryId,
        bid_id: BidId,
        principal: &Principal,
    ) -> Result<Delivery, AppError> {
        let _guard = self.locks.lock(delivery_id).await;
        let mut delivery = self.load(delivery_id).await?;

        if !delivery.is_client(principal) {
            return Err(AppError::Permission(format!(
                "only the client who posted delivery {delivery_id} may accept bids"
            )));
        }

        if delivery.status != DeliveryStatus::Bidding {
            return Err(AppError::Conflict(format!(
                "delivery {delivery_id} is {}, bids can only be accepted while bidding",
                delivery.status
            )));
        }

        let bids = self.store.bids_for_delivery(delivery_id).await?;
        let winner = bids
            .iter()
            .find(|bid| bid.id == bid_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("bid {bid_id} not found on delivery {delivery_id}"))
            })?;

        if winner.status != BidStatus::Pending {
            return Err(AppError::Conflict(format!("bid {bid_id} is no longer pending")));
        }

        let now = Utc::now();
        let from = delivery.status;
        delivery.courier_id = Some(winner.courier_id);
        delivery.final_price = Some(winner.amount);
        delivery.status = DeliveryStatus::Accepted;
        delivery.accepted_at = Some(now);
        delivery.updated_at = now;
        self.store.save_delivery(&delivery).await?;

        self.settle_ledger(bids, Some(winner.id)).await?;

        self.metrics.bids_total.with_label_values(&["accepted"]).inc();
        info!(
            delivery_id,
            bid_id,
            courier_id = %winner.courier_id,
            final_price = winner.amount,
            "bid accepted"
        );
        self.emit(DispatchEvent::BidAccepted {
            delivery_id,
            bid_id,
            courier_id: winner.courier_id,
            final_price: winner.amount,
        });
        self.status_changed(&delivery, from, Role::Client);

        Ok(delivery)
    }

    /// Operator override: assigns a courier directly, bypassing the auction.
    pub async fn assign_courier(
        &self,
        delivery_id: DeliveryId,
        courier_id: Uuid,
        price: i64,
        principal: &Principal,
    ) -> Result<Delivery, AppError> {
        let started = Instant::now();
        let result = self
            .assign_courier_inner(delivery_id, courier_id, price, principal)
            .await;
        self.record("assign_courier", started, &result);
        result
    }

    async fn assign_courier_inner(
        &self,
        delivery_id: DeliveryId,
        courier_id: Uuid,
        price: i64,
        principal: &Principal,
    ) -> Result<Delivery, AppError> {
        if !principal.is_operator() {
            return Err(AppError::Permission(
                "only operators may assign couriers directly".to_string(),
            ));
        }

        if price <= 0 {
            return Err(AppError::Validation(format!("price must be positive, got {price}")));
        }

        let _guard = self.locks.lock(delivery_id).await;
        let mut delivery = self.load(delivery_id).await?;

        if !delivery.status.is_open() {
            return Err(AppError::Conflict(format!(
                "delivery {delivery_id} is {} and already past assignment",
                delivery.status
            )));
        }

        let now = Utc::now();
        let from = delivery.status;
        delivery.courier_id = Some(courier_id);
        delivery.final_price = Some(price);
        delivery.status = DeliveryStatus::Accepted;
        delivery.accepted_at = Some(now);
        delivery.updated_at = now;
        self.store.save_delivery(&delivery).await?;

        let bids = self.store.bids_for_delivery(delivery_id).await?;
        let winner = bids
            .iter()
            .find(|bid| bid.courier_id == courier_id)
            .map(|bid| bid.id);
        self.settle_ledger(bids, winner).await?;

        info!(
            delivery_id,
            courier_id = %courier_id,
            operator_id = %principal.id,
            price,
            "courier assigned by operator"
        );
        self.emit(DispatchEvent::CourierAssigned {
            delivery_id,
            courier_id,
            final_price: price,
            operator_id: principal.id,
        });
        self.status_changed(&delivery, from, Role::Operator);

        Ok(delivery)
    }

    /// Moves a job along the role-gated transition table.
    pub async fn advance_status(
        &self,
        delivery_id: DeliveryId,
        target: DeliveryStatus,
        principal: &Principal,
    ) -> Result<Delivery, AppError> {
        let started = Instant::now();
        let result = self.advance_status_inner(delivery_id, target, principal).await;
        self.record("advance_status", started, &result);
        result
    }

    async fn advance_status_inner(
        &self,
        delivery_id: DeliveryId,
        target: DeliveryStatus,
        principal: &Principal,
    ) -> Result<Delivery, AppError> {
        let _guard = self.locks.lock(delivery_id).await;
        let mut delivery = self.load(delivery_id).await?;
        let from = delivery.status;

        transitions::check(principal.role, from, target)?;

        let owns = match principal.role {
            Role::Client => delivery.is_client(principal),
            Role::Courier => delivery.is_assigned_courier(principal),
            Role::Operator => true,
        };
        if !owns {
            return Err(AppError::Permission(format!(
                "{} {} is not a party to delivery {delivery_id}",
                principal.role, principal.id
            )));
        }

        let now = Utc::now();
        delivery.status = target;
        delivery.updated_at = now;
        match target {
            // An operator rewind forgets the milestones of the pass it undoes.
            DeliveryStatus::Accepted => {
                delivery.accepted_at.get_or_insert(now);
                delivery.picked_up_at = None;
                delivery.delivered_at = None;
            }
            DeliveryStatus::InProgress => {
                delivery.picked_up_at.get_or_insert(now);
                delivery.delivered_at = None;
            }
            DeliveryStatus::Delivered => delivery.delivered_at = Some(now),
            DeliveryStatus::Completed => {
                delivery.completed_at = Some(now);
                delivery.execution_secs = delivery
                    .picked_up_at
                    .map(|picked_up| (now - picked_up).num_seconds());
            }
            DeliveryStatus::Cancelled => delivery.cancelled_at = Some(now),
            DeliveryStatus::Pending | DeliveryStatus::Bidding => {}
        }
        self.store.save_delivery(&delivery).await?;

        if target == DeliveryStatus::Cancelled {
            let bids = self.store.bids_for_delivery(delivery_id).await?;
            self.settle_ledger(bids, None).await?;
        }

        self.status_changed(&delivery, from, principal.role);

        if let Some(reason) = CloseReason::for_terminal(target) {
            self.hub.end_delivery(delivery_id, reason).await;
        }

        Ok(delivery)
    }

    pub async fn get_delivery(
        &self,
        delivery_id: DeliveryId,
        principal: &Principal,
    ) -> Result<Delivery, AppError> {
        let delivery = self.load(delivery_id).await?;
        if !delivery.is_visible_to(principal) {
            return Err(AppError::Permission(format!(
                "delivery {delivery_id} is not visible to {}",
                principal.id
            )));
        }
        Ok(delivery)
    }

    /// Jobs still collecting bids.
    pub async fn list_open(&self, principal: &Principal) -> Result<Vec<Delivery>, AppError> {
        if principal.role == Role::Client {
            return Err(AppError::Permission(
                "open jobs are listed for couriers and operators".to_string(),
            ));
        }

        Ok(self
            .store
            .list_deliveries(&[DeliveryStatus::Pending, DeliveryStatus::Bidding])
            .await?)
    }

    pub async fn list_bids(
        &self,
        delivery_id: DeliveryId,
        principal: &Principal,
    ) -> Result<Vec<Bid>, AppError> {
        let delivery = self.load(delivery_id).await?;
        if !(delivery.is_client(principal) || principal.is_operator()) {
            return Err(AppError::Permission(format!(
                "bids on delivery {delivery_id} are visible to its client and operators"
            )));
        }

        Ok(self.store.bids_for_delivery(delivery_id).await?)
    }

    pub async fn position_history(
        &self,
        delivery_id: DeliveryId,
        principal: &Principal,
    ) -> Result<Vec<PositionSample>, AppError> {
        let delivery = self.load(delivery_id).await?;
        if !delivery.is_observer(principal) {
            return Err(AppError::Permission(format!(
                "positions of delivery {delivery_id} are not visible to {}",
                principal.id
            )));
        }

        Ok(self.store.positions(delivery_id).await?)
    }

    async fn load(&self, delivery_id: DeliveryId) -> Result<Delivery, AppError> {
        self.store
            .load_delivery(delivery_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))
    }

    /// Marks `winner` accepted and every other pending bid rejected.
    async fn settle_ledger(&self, bids: Vec<Bid>, winner: Option<BidId>) -> Result<(), AppError> {
        let now = Utc::now();
        for mut bid in bids {
            let status = if Some(bid.id) == winner {
                BidStatus::Accepted
            } else if bid.status == BidStatus::Pending {
                BidStatus::Rejected
            } else {
                continue;
            };

            bid.status = status;
            bid.updated_at = now;
            self.store.save_bid(&bid).await?;
        }
        Ok(())
    }

    fn status_changed(&self, delivery: &Delivery, from: DeliveryStatus, by: Role) {
        self.metrics
            .status_transitions_total
            .with_label_values(&[delivery.status.as_str()])
            .inc();
        info!(
            delivery_id = delivery.id,
            from = from.as_str(),
            to = delivery.status.as_str(),
            by = by.as_str(),
            "delivery status changed"
        );
        self.emit(DispatchEvent::StatusChanged {
            delivery_id: delivery.id,
            from,
            to: delivery.status,
            by,
            at: delivery.updated_at,
        });
    }

    fn emit(&self, event: DispatchEvent) {
        // No subscribers is fine; notification consumers are optional.
        let _ = self.events.send(event);
    }

    fn record<T>(&self, operation: &str, started: Instant, result: &Result<T, AppError>) {
        self.metrics
            .observe_dispatch(operation, result.is_ok(), started.elapsed().as_secs_f64());
        if let Err(err) = result {
            match err {
                AppError::Store(_) | AppError::Internal(_) => {
                    warn!(operation, error = %err, "dispatch operation failed");
                }
                _ => {
                    debug!(operation, kind = err.kind(), error = %err, "dispatch operation rejected");
                }
            }
        }
    }
}
