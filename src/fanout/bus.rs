use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use super::{FanoutBridge, FanoutEnvelope, FanoutError};

/// Broadcast-channel bridge carrying JSON-encoded envelopes. Clones share the same channel, so
/// several hubs in one process behave like separate instances on a shared bus.
#[derive(Clone)]
pub struct InProcessBus {
    sender: broadcast::Sender<String>,
}

impl InProcessBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _unused_rx) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

#[async_trait]
impl FanoutBridge for InProcessBus {
    async fn publish(&self, envelope: &FanoutEnvelope) -> Result<(), FanoutError> {
        let raw = envelope.encode()?;
        // No subscribers means no other instance to reach.
        let _ = self.sender.send(raw);
        Ok(())
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, FanoutEnvelope>, FanoutError> {
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(|item| async move {
            match item {
                Ok(raw) => match FanoutEnvelope::decode(&raw) {
                    Ok(envelope) => Some(envelope),
                    Err(err) => {
                        warn!(error = %err, "dropping undecodable fanout envelope");
                        None
                    }
                },
                Err(err) => {
                    warn!(error = %err, "fanout subscriber lagged behind the bus");
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}
