//! Live position broadcast hub.
//!
//! For every delivery with attached observers the hub keeps one [`LiveChannel`]: the observer
//! connections of this process and the latest known position. Each channel has its own lock, so
//! attach, detach and fanout on one delivery never wait on another. A channel is dropped as soon
//! as its last observer leaves; late joiners are then replayed from the job store instead.
//!
//! Observers attached to other processes are reached through the optional
//! [`FanoutBridge`](crate::fanout::FanoutBridge): local publishes are forwarded to it and the
//! relay feeds remote publishes back through [`PositionHub::apply_remote`].

mod observer;
pub mod sweep;

pub use observer::{AttachRefusal, CloseReason, ConnectionId, ObserverEvent, Subscription};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::locks::KeyedLocks;
use crate::error::AppError;
use crate::fanout::{FanoutBridge, FanoutEnvelope, FanoutEvent};
use crate::geo::validate_point;
use crate::models::delivery::{DeliveryId, GeoPoint};
use crate::models::position::PositionSample;
use crate::models::principal::Principal;
use crate::observability::metrics::Metrics;
use crate::store::JobStore;
use observer::Observer;

#[derive(Default)]
struct LiveChannel {
    /// Keyed by principal id: one connection per principal and delivery.
    observers: HashMap<Uuid, Observer>,
    last_position: Option<PositionSample>,
    /// Set once the channel has been unlinked from the registry.
    closed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub evicted: usize,
}

pub struct PositionHub {
    instance_id: Uuid,
    store: Arc<dyn JobStore>,
    bridge: Option<Arc<dyn FanoutBridge>>,
    channels: DashMap<DeliveryId, Arc<Mutex<LiveChannel>>>,
    /// Shared with the dispatcher, so a position is never stored after the job stopped being live.
    job_locks: Arc<KeyedLocks<DeliveryId>>,
    metrics: Metrics,
    observer_buffer: usize,
}

impl PositionHub {
    pub fn new(
        instance_id: Uuid,
        store: Arc<dyn JobStore>,
        bridge: Option<Arc<dyn FanoutBridge>>,
        job_locks: Arc<KeyedLocks<DeliveryId>>,
        metrics: Metrics,
        observer_buffer: usize,
    ) -> Self {
        Self {
            instance_id,
            store,
            bridge,
            channels: DashMap::new(),
            job_locks,
            metrics,
            observer_buffer: observer_buffer.max(1),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Deliveries with at least one observer attached to this process.
    pub fn tracked_deliveries(&self) -> usize {
        self.channels.len()
    }

    pub async fn observer_count(&self, delivery_id: DeliveryId) -> usize {
        match self.existing_channel(delivery_id) {
            Some(channel) => channel.lock().await.observers.len(),
            None => 0,
        }
    }

    /// Registers `principal` as an observer of the delivery and replays the latest known
    /// position into the new connection.
    pub async fn attach(
        &self,
        delivery_id: DeliveryId,
        principal: Principal,
    ) -> Result<Subscription, AttachRefusal> {
        loop {
            let channel = self
                .channels
                .entry(delivery_id)
                .or_default()
                .value()
                .clone();
            let mut live = channel.lock().await;
            if live.closed {
                // Lost a race with the last detach or with end_delivery; take a fresh channel.
                continue;
            }

            // Authorize while holding the channel lock so a concurrent end_delivery either
            // sees this observer or this attach sees the terminal status.
            if let Err(refusal) = self.authorize_attach(delivery_id, &principal).await {
                self.unlink_if_empty(delivery_id, &channel, &mut live);
                warn!(
                    delivery_id,
                    principal_id = %principal.id,
                    role = %principal.role,
                    reason = refusal.kind(),
                    "attach refused"
                );
                return Err(refusal);
            }

            if live.last_position.is_none() {
                live.last_position = match self.store.latest_position(delivery_id).await {
                    Ok(sample) => sample,
                    Err(err) => {
                        warn!(delivery_id, error = %err, "failed to load last position for replay");
                        None
                    }
                };
            }

            let connection_id = Uuid::new_v4();
            let (observer, subscription) =
                observer::subscription(connection_id, delivery_id, principal, self.observer_buffer);
            if let Some(sample) = live.last_position.clone() {
                // Fresh channel with capacity >= 1, cannot fail.
                let _ = observer.sender.try_send(ObserverEvent::Position(sample));
            }

            match live.observers.insert(principal.id, observer) {
                Some(previous) => {
                    previous.close(CloseReason::Superseded);
                    info!(
                        delivery_id,
                        principal_id = %principal.id,
                        "observer connection superseded"
                    );
                }
                None => self.metrics.hub_observers.inc(),
            }

            info!(
                delivery_id,
                principal_id = %principal.id,
                role = %principal.role,
                %connection_id,
                observers = live.observers.len(),
                "observer attached"
            );

            return Ok(subscription);
        }
    }

    async fn authorize_attach(
        &self,
        delivery_id: DeliveryId,
        principal: &Principal,
    ) -> Result<(), AttachRefusal> {
        let delivery = match self.store.load_delivery(delivery_id).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return Err(AttachRefusal::NotFound),
            Err(err) => {
                warn!(delivery_id, error = %err, "job store failed during attach");
                return Err(AttachRefusal::Unavailable);
            }
        };

        if !delivery.is_observer(principal) {
            return Err(AttachRefusal::Forbidden);
        }

        if !delivery.status.is_live() {
            return Err(AttachRefusal::Inactive);
        }

        Ok(())
    }

    /// Removes the principal's connection from the delivery, whichever connection it is.
    pub async fn detach(&self, delivery_id: DeliveryId, principal_id: Uuid) -> bool {
        self.remove_observer(delivery_id, principal_id, None, None)
            .await
    }

    /// Removes one specific connection; a newer connection of the same principal is left alone.
    pub async fn release(&self, delivery_id: DeliveryId, connection_id: ConnectionId) -> bool {
        let Some(principal_id) = self.principal_for(delivery_id, connection_id).await else {
            return false;
        };

        self.remove_observer(delivery_id, principal_id, Some(connection_id), None)
            .await
    }

    async fn principal_for(
        &self,
        delivery_id: DeliveryId,
        connection_id: ConnectionId,
    ) -> Option<Uuid> {
        let channel = self.existing_channel(delivery_id)?;
        let live = channel.lock().await;

        live.observers
            .values()
            .find(|observer| observer.connection_id == connection_id)
            .map(|observer| observer.principal.id)
    }

    async fn remove_observer(
        &self,
        delivery_id: DeliveryId,
        principal_id: Uuid,
        connection_id: Option<ConnectionId>,
        reason: Option<CloseReason>,
    ) -> bool {
        let Some(channel) = self.existing_channel(delivery_id) else {
            return false;
        };
        let mut live = channel.lock().await;

        let matches = live.observers.get(&principal_id).is_some_and(|observer| {
            connection_id.is_none_or(|expected| observer.connection_id == expected)
        });
        if !matches {
            return false;
        }

        if let Some(observer) = live.observers.remove(&principal_id) {
            self.metrics.hub_observers.dec();
            debug!(
                delivery_id,
                principal_id = %principal_id,
                connected_secs = (Utc::now() - observer.joined_at).num_seconds(),
                "observer detached"
            );
            if let Some(reason) = reason {
                observer.close(reason);
            }
        }

        self.unlink_if_empty(delivery_id, &channel, &mut live);
        true
    }

    /// Accepts a position from the assigned courier, persists it and fans it out.
    pub async fn publish_position(
        &self,
        delivery_id: DeliveryId,
        publisher: &Principal,
        point: GeoPoint,
    ) -> Result<PositionSample, AppError> {
        validate_point(&point)?;

        let guard = self.job_locks.lock(delivery_id).await;
        let delivery = self
            .store
            .load_delivery(delivery_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

        if !delivery.is_assigned_courier(publisher) {
            warn!(
                delivery_id,
                publisher_id = %publisher.id,
                role = %publisher.role,
                assigned_courier = ?delivery.courier_id,
                "rejected position from a publisher not assigned to the delivery"
            );
            return Err(AppError::Permission(format!(
                "{} is not the courier assigned to delivery {delivery_id}",
                publisher.id
            )));
        }

        if !delivery.status.is_live() {
            return Err(AppError::Conflict(format!(
                "delivery {delivery_id} is {} and does not accept positions",
                delivery.status
            )));
        }

        let sample = PositionSample::new(delivery_id, point);
        self.store.append_position(&sample).await?;
        drop(guard);
        self.metrics.positions_published_total.inc();

        let delivered = self.fan_out_local(&sample, "local").await;
        debug!(delivery_id, delivered, "position fanned out");

        if let Some(bridge) = &self.bridge {
            let envelope = FanoutEnvelope {
                origin: self.instance_id,
                event: FanoutEvent::Position {
                    sample: sample.clone(),
                },
            };
            if let Err(err) = bridge.publish(&envelope).await {
                warn!(delivery_id, error = %err, "failed to forward position to fanout bridge");
            }
        }

        Ok(sample)
    }

    /// Delivers a sample to every observer attached to this process. Returns how many
    /// observers received it.
    async fn fan_out_local(&self, sample: &PositionSample, origin: &str) -> usize {
        let Some(channel) = self.existing_channel(sample.delivery_id) else {
            return 0;
        };
        let mut live = channel.lock().await;
        if live.closed {
            return 0;
        }

        let newer = live
            .last_position
            .as_ref()
            .is_none_or(|cached| cached.recorded_at <= sample.recorded_at);
        if newer {
            live.last_position = Some(sample.clone());
        }

        let mut delivered = 0;
        let mut evicted = Vec::new();
        for (principal_id, observer) in &live.observers {
            match observer
                .sender
                .try_send(ObserverEvent::Position(sample.clone()))
            {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => evicted.push((*principal_id, CloseReason::Lagged)),
                Err(TrySendError::Closed(_)) => evicted.push((*principal_id, CloseReason::Stale)),
            }
        }

        for (principal_id, reason) in evicted {
            if let Some(observer) = live.observers.remove(&principal_id) {
                observer.close(reason);
                self.metrics.hub_observers.dec();
                warn!(
                    delivery_id = sample.delivery_id,
                    principal_id = %principal_id,
                    reason = reason.as_str(),
                    "observer dropped during fanout"
                );
            }
        }

        self.metrics
            .fanout_messages_total
            .with_label_values(&[origin])
            .inc_by(delivered as u64);

        self.unlink_if_empty(sample.delivery_id, &channel, &mut live);
        delivered
    }

    /// Tears down the delivery's channel, locally and on every process reached by the bridge.
    /// Every observer receives a terminal [`ObserverEvent::Closed`].
    pub async fn end_delivery(&self, delivery_id: DeliveryId, reason: CloseReason) -> usize {
        let notified = self.close_local(delivery_id, reason).await;

        if let Some(bridge) = &self.bridge {
            let envelope = FanoutEnvelope {
                origin: self.instance_id,
                event: FanoutEvent::Ended {
                    delivery_id,
                    reason,
                },
            };
            if let Err(err) = bridge.publish(&envelope).await {
                warn!(delivery_id, error = %err, "failed to forward delivery end to fanout bridge");
            }
        }

        notified
    }

    async fn close_local(&self, delivery_id: DeliveryId, reason: CloseReason) -> usize {
        let Some((_, channel)) = self.channels.remove(&delivery_id) else {
            return 0;
        };
        let mut live = channel.lock().await;
        live.closed = true;
        live.last_position = None;

        let notified = live.observers.len();
        for (_, observer) in live.observers.drain() {
            observer.close(reason);
            self.metrics.hub_observers.dec();
        }

        info!(
            delivery_id,
            reason = reason.as_str(),
            notified,
            "live channel closed"
        );
        notified
    }

    /// Applies an event relayed from another process. Events this hub published itself are
    /// ignored, so local observers never see a sample twice.
    pub async fn apply_remote(&self, envelope: FanoutEnvelope) {
        if envelope.origin == self.instance_id {
            return;
        }

        match envelope.event {
            FanoutEvent::Position { sample } => {
                self.fan_out_local(&sample, "remote").await;
            }
            FanoutEvent::Ended {
                delivery_id,
                reason,
            } => {
                self.close_local(delivery_id, reason).await;
            }
        }
    }

    /// Probes every attached connection and evicts the ones that do not answer in time.
    /// Probes run without holding any channel lock.
    pub async fn sweep_once(&self, probe_timeout: Duration) -> SweepReport {
        let channels: Vec<(DeliveryId, Arc<Mutex<LiveChannel>>)> = self
            .channels
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut targets = Vec::new();
        for (delivery_id, channel) in channels {
            let live = channel.lock().await;
            for observer in live.observers.values() {
                targets.push((
                    delivery_id,
                    observer.principal.id,
                    observer.connection_id,
                    observer.sender.clone(),
                ));
            }
        }

        let probed = targets.len();
        let outcomes = join_all(targets.into_iter().map(
            |(delivery_id, principal_id, connection_id, sender)| async move {
                let alive = probe(&sender, probe_timeout).await;
                (delivery_id, principal_id, connection_id, alive)
            },
        ))
        .await;

        let mut evicted = 0;
        for (delivery_id, principal_id, connection_id, alive) in outcomes {
            if alive {
                continue;
            }

            let removed = self
                .remove_observer(
                    delivery_id,
                    principal_id,
                    Some(connection_id),
                    Some(CloseReason::Stale),
                )
                .await;
            if removed {
                evicted += 1;
                self.metrics.sweep_evictions_total.inc();
                warn!(
                    delivery_id,
                    principal_id = %principal_id,
                    %connection_id,
                    "evicted observer that failed liveness probe"
                );
            }
        }

        SweepReport { probed, evicted }
    }

    fn existing_channel(&self, delivery_id: DeliveryId) -> Option<Arc<Mutex<LiveChannel>>> {
        self.channels
            .get(&delivery_id)
            .map(|entry| entry.value().clone())
    }

    fn unlink_if_empty(
        &self,
        delivery_id: DeliveryId,
        channel: &Arc<Mutex<LiveChannel>>,
        live: &mut LiveChannel,
    ) {
        if !live.observers.is_empty() || live.closed {
            return;
        }

        live.closed = true;
        self.channels
            .remove_if(&delivery_id, |_, current| Arc::ptr_eq(current, channel));
    }
}

/// A connection is alive when its task acknowledges the probe before the timeout. A full or
/// closed queue counts as dead.
async fn probe(sender: &mpsc::Sender<ObserverEvent>, timeout: Duration) -> bool {
    let (ack_tx, ack_rx) = oneshot::channel();
    if sender.try_send(ObserverEvent::Probe(ack_tx)).is_err() {
        return false;
    }

    matches!(tokio::time::timeout(timeout, ack_rx).await, Ok(Ok(())))
}
