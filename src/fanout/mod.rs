//! Cross-process relay of hub events.
//!
//! A hub only serves the observers attached to its own process. When several processes serve
//! the same deliveries, each hub forwards what it publishes to a [`FanoutBridge`] and a relay
//! task feeds what the other processes published back into local fanout.

mod bus;
mod relay;

pub use bus::InProcessBus;
pub use relay::spawn_fanout_relay;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::hub::CloseReason;
use crate::models::delivery::DeliveryId;
use crate::models::position::PositionSample;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("envelope codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FanoutEvent {
    Position {
        sample: PositionSample,
    },
    Ended {
        delivery_id: DeliveryId,
        reason: CloseReason,
    },
}

/// One relayed hub event, tagged with the instance that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FanoutEnvelope {
    pub origin: Uuid,
    pub event: FanoutEvent,
}

impl FanoutEnvelope {
    pub fn encode(&self) -> Result<String, FanoutError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, FanoutError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// External publish/subscribe channel shared by every dispatch process.
#[async_trait]
pub trait FanoutBridge: Send + Sync {
    async fn publish(&self, envelope: &FanoutEnvelope) -> Result<(), FanoutError>;

    /// Every envelope published after the subscription is established, in publish order per
    /// publisher.
    async fn subscribe(&self) -> Result<BoxStream<'static, FanoutEnvelope>, FanoutError>;
}
