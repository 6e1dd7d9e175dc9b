//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub relay_requests_total: IntCounter,
    pub relay_confirmed_total: IntCounter,
    pub relay_rejected_total: IntCounterVec,
    pub relay_failed_total: IntCounter,
    pub quote_requests_total: IntCounter,
    pub source_locks_dropped_auto: IntCounter,

    // Gauges
    pub source_locks_held: IntGauge,

    // Histograms
    pub relay_latency: Histogram,
    pub rpc_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let relay_requests_total = IntCounter::with_opts(Opts::new(
            "relay_requests_total",
            "Total number of relay requests received",
        ))?;

        let relay_confirmed_total = IntCounter::with_opts(Opts::new(
            "relay_confirmed_total",
            "Number of relayed transactions confirmed on chain",
        ))?;

        let relay_rejected_total = IntCounterVec::new(
            Opts::new(
                "relay_rejected_total",
                "Number of relay requests rejected, by reason code",
            ),
            &["code"],
        )?;

        let relay_failed_total = IntCounter::with_opts(Opts::new(
            "relay_failed_total",
            "Number of relays that failed after co-signing",
        ))?;

        let quote_requests_total = IntCounter::with_opts(Opts::new(
            "quote_requests_total",
            "Number of cost quotes computed",
        ))?;

        let source_locks_dropped_auto = IntCounter::with_opts(Opts::new(
            "source_locks_dropped_auto",
            "Number of source locks released via Drop",
        ))?;

        let source_locks_held = IntGauge::with_opts(Opts::new(
            "source_locks_held",
            "Number of source accounts currently locked",
        ))?;

        let relay_latency = Histogram::with_opts(
            HistogramOpts::new("relay_latency_seconds", "End-to-end relay latency")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        registry.register(Box::new(relay_requests_total.clone()))?;
        registry.register(Box::new(relay_confirmed_total.clone()))?;
        registry.register(Box::new(relay_rejected_total.clone()))?;
        registry.register(Box::new(relay_failed_total.clone()))?;
        registry.register(Box::new(quote_requests_total.clone()))?;
        registry.register(Box::new(source_locks_dropped_auto.clone()))?;
        registry.register(Box::new(source_locks_held.clone()))?;
        registry.register(Box::new(relay_latency.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;

        Ok(Self {
            registry,
            relay_requests_total,
            relay_confirmed_total,
            relay_rejected_total,
            relay_failed_total,
            quote_requests_total,
            source_locks_dropped_auto,
            source_locks_held,
            relay_latency,
            rpc_latency,
        })
    }

    pub fn record_rejection(&self, code: &str) {
        self.relay_rejected_total.with_label_values(&[code]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
