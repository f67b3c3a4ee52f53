use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::locks::KeyedLocks;
use crate::engine::Dispatcher;
use crate::events::DispatchEvent;
use crate::fanout::{spawn_fanout_relay, FanoutBridge, FanoutError};
use crate::geo::StraightLineEstimator;
use crate::hub::sweep::run_sweep;
use crate::hub::PositionHub;
use crate::observability::metrics::Metrics;
use crate::store::{InMemoryJobStore, JobStore};

pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub hub: Arc<PositionHub>,
    pub dispatcher: Dispatcher,
    pub bridge: Option<Arc<dyn FanoutBridge>>,
    pub dispatch_events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn JobStore>,
        bridge: Option<Arc<dyn FanoutBridge>>,
    ) -> Self {
        let metrics = Metrics::new();
        let (dispatch_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));

        let job_locks = Arc::new(KeyedLocks::new());

        let hub = Arc::new(PositionHub::new(
            config.instance_id,
            store.clone(),
            bridge.clone(),
            job_locks.clone(),
            metrics.clone(),
            config.observer_buffer_size,
        ));

        let dispatcher = Dispatcher::new(
            store.clone(),
            hub.clone(),
            Arc::new(StraightLineEstimator::new(config.average_speed_kmh)),
            dispatch_events_tx.clone(),
            metrics.clone(),
            job_locks,
            config.price_floor,
        );

        Self {
            store,
            hub,
            dispatcher,
            bridge,
            dispatch_events_tx,
            metrics,
        }
    }

    pub fn in_memory(config: &Config) -> Self {
        Self::new(config, Arc::new(InMemoryJobStore::new()), None)
    }

    /// Starts the observer sweep and, when a bridge is configured, the fanout relay. Both stop
    /// when `shutdown` is cancelled.
    pub async fn start_background(
        &self,
        config: &Config,
        shutdown: CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>, FanoutError> {
        let mut tasks = vec![tokio::spawn(run_sweep(
            self.hub.clone(),
            config.sweep_interval,
            config.probe_timeout,
            shutdown.clone(),
        ))];

        if let Some(bridge) = &self.bridge {
            tasks.push(spawn_fanout_relay(self.hub.clone(), bridge.clone(), shutdown).await?);
        }

        Ok(tasks)
    }
}
