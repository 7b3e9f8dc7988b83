//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring settlements.
//!
//! # Metrics
//!
//! - `clan_ledger_settlements_total` - Settlements committed
//! - `clan_ledger_replays_total` - Duplicate settlements answered from the ledger
//! - `clan_ledger_adjustments_total` - Manual adjustments committed
//! - `clan_ledger_transient_failures_total` - Commits that hit lock timeouts or conflicts
//! - `clan_ledger_settle_duration_seconds` - Histogram of settlement latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Settlements committed
    pub settlements_total: IntCounter,

    /// Duplicate settlements answered from the ledger
    pub replays_total: IntCounter,

    /// Manual adjustments committed
    pub adjustments_total: IntCounter,

    /// Transient commit failures
    pub transient_failures_total: IntCounter,

    /// Settle duration histogram
    pub settle_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("settlements_total", &self.settlements_total.get())
            .field("replays_total", &self.replays_total.get())
            .field("adjustments_total", &self.adjustments_total.get())
            .field("transient_failures_total", &self.transient_failures_total.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector on its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let settlements_total = IntCounter::new(
            "clan_ledger_settlements_total",
            "Settlements committed",
        )?;
        registry.register(Box::new(settlements_total.clone()))?;

        let replays_total = IntCounter::new(
            "clan_ledger_replays_total",
            "Duplicate settlements answered from the ledger",
        )?;
        registry.register(Box::new(replays_total.clone()))?;

        let adjustments_total = IntCounter::new(
            "clan_ledger_adjustments_total",
            "Manual adjustments committed",
        )?;
        registry.register(Box::new(adjustments_total.clone()))?;

        let transient_failures_total = IntCounter::new(
            "clan_ledger_transient_failures_total",
            "Commits that hit lock timeouts or conflicts",
        )?;
        registry.register(Box::new(transient_failures_total.clone()))?;

        let settle_duration = Histogram::with_opts(
            HistogramOpts::new(
                "clan_ledger_settle_duration_seconds",
                "Histogram of settlement latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(settle_duration.clone()))?;

        Ok(Self {
            settlements_total,
            replays_total,
            adjustments_total,
            transient_failures_total,
            settle_duration,
            registry,
        })
    }

    /// Record a committed settlement
    pub fn record_settlement(&self, duration_seconds: f64) {
        self.settlements_total.inc();
        self.settle_duration.observe(duration_seconds);
    }

    /// Record a duplicate settlement
    pub fn record_replay(&self) {
        self.replays_total.inc();
    }

    /// Record a committed adjustment
    pub fn record_adjustment(&self) {
        self.adjustments_total.inc();
    }

    /// Record a transient failure
    pub fn record_transient_failure(&self) {
        self.transient_failures_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
