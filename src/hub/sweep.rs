use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::PositionHub;

/// Periodically probes every observer connection and evicts the dead ones. A failed cycle needs
/// no retry of its own: the next tick probes everything again.
pub async fn run_sweep(
    hub: Arc<PositionHub>,
    interval: Duration,
    probe_timeout: Duration,
    shutdown: CancellationToken,
) {
    info!(
        interval_secs = interval.as_secs(),
        probe_timeout_ms = probe_timeout.as_millis() as u64,
        "observer sweep started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = hub.sweep_once(probe_timeout).await;
                if report.evicted > 0 {
                    info!(probed = report.probed, evicted = report.evicted, "observer sweep finished");
                } else {
                    debug!(probed = report.probed, "observer sweep finished");
                }
            }
        }
    }

    info!("observer sweep stopped");
}
