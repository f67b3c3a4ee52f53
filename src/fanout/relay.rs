use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{FanoutBridge, FanoutEnvelope, FanoutError};
use crate::hub::PositionHub;

/// Subscribes to the bridge and spawns the task feeding remote events into the hub. The
/// subscription is live by the time this returns.
pub async fn spawn_fanout_relay(
    hub: Arc<PositionHub>,
    bridge: Arc<dyn FanoutBridge>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, FanoutError> {
    let inbound = bridge.subscribe().await?;
    Ok(tokio::spawn(relay_loop(hub, inbound, shutdown)))
}

async fn relay_loop(
    hub: Arc<PositionHub>,
    mut inbound: BoxStream<'static, FanoutEnvelope>,
    shutdown: CancellationToken,
) {
    info!(instance_id = %hub.instance_id(), "fanout relay started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = inbound.next() => match next {
                Some(envelope) => hub.apply_remote(envelope).await,
                None => {
                    warn!("fanout subscription ended");
                    break;
                }
            }
        }
    }

    info!(instance_id = %hub.instance_id(), "fanout relay stopped");
}
