use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub plan_runs_total: IntCounterVec,
    pub plan_latency_seconds: HistogramVec,
    pub trips_created_total: IntCounter,
    pub orders_pending: IntGauge,
    pub stop_mutations_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let plan_runs_total = IntCounterVec::new(
            Opts::new("plan_runs_total", "Total planning runs by outcome"),
            &["outcome"],
        )
        .expect("valid plan_runs_total metric");

        let plan_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "plan_latency_seconds",
                "Latency of a planning run including commit, in seconds",
            ),
            &["outcome"],
        )
        .expect("valid plan_latency_seconds metric");

        let trips_created_total =
            IntCounter::new("trips_created_total", "Trips created by planning runs")
                .expect("valid trips_created_total metric");

        let orders_pending = IntGauge::new("orders_pending", "Orders currently waiting for a trip")
            .expect("valid orders_pending metric");

        let stop_mutations_total = IntCounterVec::new(
            Opts::new("stop_mutations_total", "Stop-level mutations by operation and outcome"),
            &["op", "outcome"],
        )
        .expect("valid stop_mutations_total metric");

        registry
            .register(Box::new(plan_runs_total.clone()))
            .expect("register plan_runs_total");
        registry
            .register(Box::new(plan_latency_seconds.clone()))
            .expect("register plan_latency_seconds");
        registry
            .register(Box::new(trips_created_total.clone()))
            .expect("register trips_created_total");
        registry
            .register(Box::new(orders_pending.clone()))
            .expect("register orders_pending");
        registry
            .register(Box::new(stop_mutations_total.clone()))
            .expect("register stop_mutations_total");

        Self {
            registry,
            plan_runs_total,
            plan_latency_seconds,
            trips_created_total,
            orders_pending,
            stop_mutations_total,
        }
    }

    pub fn record_stop_mutation<T, E>(&self, op: &str, result: &Result<T, E>) {
        let outcome = if result.is_ok() { "success" } else { "error" };
        self.stop_mutations_total
            .with_label_values(&[op, outcome])
            .inc();
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
