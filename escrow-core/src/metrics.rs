//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `escrow_operations_total{kind}` - Successful operations by kind
//! - `escrow_rejected_total{kind}` - Operations rejected by a precondition
//! - `escrow_checkpoint_week_steps` - Week boundaries walked per checkpoint
//! - `escrow_global_epoch` - Index of the latest global point
//! - `escrow_supply` - Total principal escrowed (saturates at i64::MAX)

use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Successful operations by kind
    pub operations_total: IntCounterVec,

    /// Rejected operations by kind
    pub rejected_total: IntCounterVec,

    /// Week steps per checkpoint
    pub checkpoint_steps: Histogram,

    /// Latest global epoch
    pub global_epoch: IntGauge,

    /// Escrowed supply
    pub supply: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("global_epoch", &self.global_epoch.get())
            .field("supply", &self.supply.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("escrow_operations_total", "Successful escrow operations"),
            &["kind"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new("escrow_rejected_total", "Rejected escrow operations"),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let checkpoint_steps = Histogram::with_opts(
            HistogramOpts::new(
                "escrow_checkpoint_week_steps",
                "Week boundaries walked per global checkpoint",
            )
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 52.0, 104.0]),
        )?;
        registry.register(Box::new(checkpoint_steps.clone()))?;

        let global_epoch = IntGauge::new("escrow_global_epoch", "Latest global epoch")?;
        registry.register(Box::new(global_epoch.clone()))?;

        let supply = IntGauge::new("escrow_supply", "Total principal escrowed")?;
        registry.register(Box::new(supply.clone()))?;

        Ok(Self {
            operations_total,
            rejected_total,
            checkpoint_steps,
            global_epoch,
            supply,
            registry,
        })
    }

    /// Record a successful operation
    pub fn record_operation(&self, kind: &str) {
        self.operations_total.with_label_values(&[kind]).inc();
    }

    /// Record a rejected operation
    pub fn record_rejection(&self, kind: &str) {
        self.rejected_total.with_label_values(&[kind]).inc();
    }

    /// Record checkpoint cost and the resulting ledger position
    pub fn record_checkpoint(&self, steps: u64, global_epoch: u64) {
        if steps > 0 {
            self.checkpoint_steps.observe(steps as f64);
        }
        self.global_epoch.set(global_epoch.min(i64::MAX as u64) as i64);
    }

    /// Update escrowed supply
    pub fn update_supply(&self, supply: u128) {
        self.supply.set(supply.min(i64::MAX as u128) as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
