use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::models::delivery::{DeliveryId, DeliveryStatus};
use crate::models::position::PositionSample;
use crate::models::principal::Principal;

pub type ConnectionId = Uuid;

/// Why the hub stopped serving an observer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Completed,
    Cancelled,
    /// The same principal attached again from another connection.
    Superseded,
    /// The observer's buffer filled up.
    Lagged,
    /// The connection failed a liveness probe or was found closed.
    Stale,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Completed => "completed",
            CloseReason::Cancelled => "cancelled",
            CloseReason::Superseded => "superseded",
            CloseReason::Lagged => "lagged",
            CloseReason::Stale => "stale",
        }
    }

    /// The job itself ended, as opposed to this one connection.
    pub fn is_job_ended(&self) -> bool {
        matches!(self, CloseReason::Completed | CloseReason::Cancelled)
    }

    pub fn for_terminal(status: DeliveryStatus) -> Option<Self> {
        match status {
            DeliveryStatus::Completed => Some(CloseReason::Completed),
            DeliveryStatus::Cancelled => Some(CloseReason::Cancelled),
            _ => None,
        }
    }

    /// WebSocket close code sent alongside the final frame.
    pub fn close_code(&self) -> u16 {
        match self {
            CloseReason::Completed | CloseReason::Cancelled => 1000,
            CloseReason::Superseded => 4001,
            CloseReason::Lagged => 4002,
            CloseReason::Stale => 4003,
        }
    }
}

/// Messages queued for one observer connection.
#[derive(Debug)]
pub enum ObserverEvent {
    Position(PositionSample),
    Closed(CloseReason),
    /// Liveness probe: the connection task answers once the peer proves it is alive.
    Probe(oneshot::Sender<()>),
}

/// Refusal of an attach attempt, surfaced to the peer as a close reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttachRefusal {
    #[error("delivery does not exist")]
    NotFound,
    #[error("principal may not observe this delivery")]
    Forbidden,
    #[error("delivery is not in a live status")]
    Inactive,
    #[error("job store unavailable")]
    Unavailable,
}

impl AttachRefusal {
    pub fn kind(&self) -> &'static str {
        match self {
            AttachRefusal::NotFound => "not_found",
            AttachRefusal::Forbidden => "forbidden",
            AttachRefusal::Inactive => "inactive",
            AttachRefusal::Unavailable => "unavailable",
        }
    }

    pub fn reason_code(&self) -> u16 {
        match self {
            AttachRefusal::NotFound => 4404,
            AttachRefusal::Forbidden => 4403,
            AttachRefusal::Inactive => 4409,
            AttachRefusal::Unavailable => 1011,
        }
    }
}

/// Receiving half of an attached observer connection.
///
/// The close reason travels on its own channel, so a queue full of positions can never crowd it
/// out. Queued positions are still handed out before it.
#[derive(Debug)]
pub struct Subscription {
    pub connection_id: ConnectionId,
    pub delivery_id: DeliveryId,
    pub principal: Principal,
    events: mpsc::Receiver<ObserverEvent>,
    closed: Option<oneshot::Receiver<CloseReason>>,
}

impl Subscription {
    /// Next event for this connection. Returns `None` once the hub let go of it, either after the
    /// final [`ObserverEvent::Closed`] or after a plain detach.
    pub async fn recv(&mut self) -> Option<ObserverEvent> {
        let Some(closed) = self.closed.as_mut() else {
            return self.events.recv().await;
        };

        let reason = tokio::select! {
            biased;
            Some(event) = self.events.recv() => return Some(event),
            reason = closed => reason,
        };
        self.finish(reason.ok())
    }

    pub fn try_recv(&mut self) -> Result<ObserverEvent, TryRecvError> {
        let err = match self.events.try_recv() {
            Ok(event) => return Ok(event),
            Err(err) => err,
        };

        match self.closed.as_mut().map(|closed| closed.try_recv()) {
            Some(Ok(reason)) => self.finish(Some(reason)).ok_or(err),
            Some(Err(oneshot::error::TryRecvError::Closed)) => {
                self.finish(None);
                Err(err)
            }
            _ => Err(err),
        }
    }

    fn finish(&mut self, reason: Option<CloseReason>) -> Option<ObserverEvent> {
        self.closed = None;
        self.events.close();
        reason.map(ObserverEvent::Closed)
    }
}

pub(crate) fn subscription(
    connection_id: ConnectionId,
    delivery_id: DeliveryId,
    principal: Principal,
    buffer: usize,
) -> (Observer, Subscription) {
    let (sender, events) = mpsc::channel(buffer);
    let (closer, closed) = oneshot::channel();

    let observer = Observer {
        connection_id,
        principal,
        joined_at: Utc::now(),
        sender,
        closer,
    };
    let subscription = Subscription {
        connection_id,
        delivery_id,
        principal,
        events,
        closed: Some(closed),
    };
    (observer, subscription)
}

#[derive(Debug)]
pub(crate) struct Observer {
    pub connection_id: ConnectionId,
    pub principal: Principal,
    pub joined_at: DateTime<Utc>,
    pub sender: mpsc::Sender<ObserverEvent>,
    closer: oneshot::Sender<CloseReason>,
}

impl Observer {
    /// Hands the connection its final reason and drops the queue's sending half.
    pub fn close(self, reason: CloseReason) {
        let _ = self.closer.send(reason);
    }
}
