//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the engine.
//!
//! # Metrics
//!
//! - `staking_operations_total{operation}` - Committed operations
//! - `staking_rejections_total{operation,kind}` - Aborted operations by error kind
//! - `staking_operation_duration_seconds{operation}` - Unit-of-work latency
//! - `staking_rewards_distributed_total` - Sum of rewards paid out (approximate, f64)

use crate::Error;
use prometheus::{Counter, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Metrics collector
///
/// Each collector owns its registry, so several engines (tests, replicas)
/// can live in one process.
#[derive(Clone)]
pub struct Metrics {
    /// Committed operations
    pub operations_total: IntCounterVec,

    /// Aborted operations
    pub rejections_total: IntCounterVec,

    /// Operation latency
    pub operation_duration: HistogramVec,

    /// Rewards paid out
    pub rewards_distributed: Counter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("collectors", &self.registry.gather().len())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("staking_operations_total", "Committed ledger operations"),
            &["operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new("staking_rejections_total", "Aborted ledger operations"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "staking_operation_duration_seconds",
                "Histogram of unit-of-work latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let rewards_distributed = Counter::new(
            "staking_rewards_distributed_total",
            "Sum of rewards paid out",
        )?;
        registry.register(Box::new(rewards_distributed.clone()))?;

        Ok(Self {
            operations_total,
            rejections_total,
            operation_duration,
            rewards_distributed,
            registry,
        })
    }

    /// Record a committed operation
    pub fn record_success(&self, operation: &str, duration_seconds: f64) {
        self.operations_total.with_label_values(&[operation]).inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_seconds);
    }

    /// Record an aborted operation
    pub fn record_rejection(&self, operation: &str, error: &Error) {
        self.rejections_total
            .with_label_values(&[operation, error.kind()])
            .inc();
    }

    /// Record a reward payout
    pub fn record_reward(&self, amount: Decimal) {
        if let Some(value) = amount.to_f64() {
            if value > 0.0 {
                self.rewards_distributed.inc_by(value);
            }
        }
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
