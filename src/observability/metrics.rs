use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub deliveries_created_total: IntCounter,
    pub bids_total: IntCounterVec,
    pub status_transitions_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub hub_observers: IntGauge,
    pub positions_published_total: IntCounter,
    pub fanout_messages_total: IntCounterVec,
    pub sweep_evictions_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let deliveries_created_total =
            IntCounter::new("deliveries_created_total", "Total delivery jobs created")
                .expect("valid deliveries_created_total metric");

        let bids_total = IntCounterVec::new(
            Opts::new("bids_total", "Bid ledger operations by outcome"),
            &["outcome"],
        )
        .expect("valid bids_total metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Delivery status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid status_transitions_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of dispatch operations in seconds",
            ),
            &["operation", "outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let hub_observers = IntGauge::new("hub_observers", "Live observer connections")
            .expect("valid hub_observers metric");

        let positions_published_total = IntCounter::new(
            "positions_published_total",
            "Position samples accepted from couriers",
        )
        .expect("valid positions_published_total metric");

        let fanout_messages_total = IntCounterVec::new(
            Opts::new(
                "fanout_messages_total",
                "Messages delivered to observers by origin",
            ),
            &["origin"],
        )
        .expect("valid fanout_messages_total metric");

        let sweep_evictions_total = IntCounter::new(
            "sweep_evictions_total",
            "Observer connections evicted by the liveness sweep",
        )
        .expect("valid sweep_evictions_total metric");

        registry
            .register(Box::new(deliveries_created_total.clone()))
            .expect("register deliveries_created_total");
        registry
            .register(Box::new(bids_total.clone()))
            .expect("register bids_total");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(hub_observers.clone()))
            .expect("register hub_observers");
        registry
            .register(Box::new(positions_published_total.clone()))
            .expect("register positions_published_total");
        registry
            .register(Box::new(fanout_messages_total.clone()))
            .expect("register fanout_messages_total");
        registry
            .register(Box::new(sweep_evictions_total.clone()))
            .expect("register sweep_evictions_total");

        Self {
            registry,
            deliveries_created_total,
            bids_total,
            status_transitions_total,
            dispatch_latency_seconds,
            hub_observers,
            positions_published_total,
            fanout_messages_total,
            sweep_evictions_total,
        }
    }

    pub fn observe_dispatch(&self, operation: &str, success: bool, elapsed_secs: f64) {
        let outcome = if success { "success" } else { "error" };
        self.dispatch_latency_seconds
            .with_label_values(&[operation, outcome])
            .observe(elapsed_secs);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
