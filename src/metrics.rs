//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub trades_total: IntCounter,
    pub trades_success: IntCounter,
    pub trades_failed: IntCounter,
    pub pools_not_found: IntCounter,
    pub reserve_reads_failed: IntCounter,
    pub simulation_failures: IntCounter,
    pub relay_accepted: IntCounter,
    pub relay_rejected: IntCounter,
    pub confirmation_timeouts: IntCounter,
    pub rpc_retries: IntCounter,

    // Histograms
    pub trade_latency: Histogram,
    pub rpc_latency: Histogram,
    pub confirm_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let trades_total = IntCounter::with_opts(Opts::new(
            "trades_total",
            "Total number of trades attempted",
        ))?;

        let trades_success =
            IntCounter::with_opts(Opts::new("trades_success", "Number of successful trades"))?;

        let trades_failed =
            IntCounter::with_opts(Opts::new("trades_failed", "Number of failed trades"))?;

        let pools_not_found = IntCounter::with_opts(Opts::new(
            "pools_not_found",
            "Number of pool lookups that found no pool for the mint",
        ))?;

        let reserve_reads_failed = IntCounter::with_opts(Opts::new(
            "reserve_reads_failed",
            "Number of pools discarded because a reserve read failed",
        ))?;

        let simulation_failures = IntCounter::with_opts(Opts::new(
            "simulation_failures",
            "Number of trade transactions rejected by pre-broadcast simulation",
        ))?;

        let relay_accepted = IntCounter::with_opts(Opts::new(
            "relay_accepted",
            "Number of submissions accepted by at least one relay endpoint",
        ))?;

        let relay_rejected = IntCounter::with_opts(Opts::new(
            "relay_rejected",
            "Number of submissions rejected by every relay endpoint",
        ))?;

        let confirmation_timeouts = IntCounter::with_opts(Opts::new(
            "confirmation_timeouts",
            "Number of submissions whose blockhash expired before confirmation",
        ))?;

        let rpc_retries = IntCounter::with_opts(Opts::new(
            "rpc_retries",
            "Number of RPC calls retried after a transient failure",
        ))?;

        let trade_latency = Histogram::with_opts(
            HistogramOpts::new("trade_latency_seconds", "End-to-end trade latency")
                .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        let confirm_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confirm_latency_seconds",
                "Time from relay acceptance to confirmation",
            )
            .buckets(vec![0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 60.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(trades_total.clone()))?;
        registry.register(Box::new(trades_success.clone()))?;
        registry.register(Box::new(trades_failed.clone()))?;
        registry.register(Box::new(pools_not_found.clone()))?;
        registry.register(Box::new(reserve_reads_failed.clone()))?;
        registry.register(Box::new(simulation_failures.clone()))?;
        registry.register(Box::new(relay_accepted.clone()))?;
        registry.register(Box::new(relay_rejected.clone()))?;
        registry.register(Box::new(confirmation_timeouts.clone()))?;
        registry.register(Box::new(rpc_retries.clone()))?;
        registry.register(Box::new(trade_latency.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;
        registry.register(Box::new(confirm_latency.clone()))?;

        Ok(Self {
            registry,
            trades_total,
            trades_success,
            trades_failed,
            pools_not_found,
            reserve_reads_failed,
            simulation_failures,
            relay_accepted,
            relay_rejected,
            confirmation_timeouts,
            rpc_retries,
            trade_latency,
            rpc_latency,
            confirm_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all registered metrics in the prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
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

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
