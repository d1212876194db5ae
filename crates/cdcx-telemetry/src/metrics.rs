//! Prometheus metrics for cdcx-arb.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a startup bug. These panics can only
//! happen during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_int_counter,
    register_int_counter_vec, CounterVec, Gauge, Histogram, IntCounter, IntCounterVec,
};

/// Opportunities evaluated by the top-of-book detector.
/// Labels: currency, viable (true/false)
pub static OPPORTUNITIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cdcx_opportunities_total",
        "Opportunities evaluated by the detector",
        &["currency", "viable"]
    )
    .unwrap()
});

/// Market-data fetch failures that caused a candidate to be skipped.
pub static FETCH_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cdcx_fetch_errors_total",
        "Market-data fetch failures",
        &["source"]
    )
    .unwrap()
});

/// Profitable fills found per depth analysis.
pub static DEPTH_FILLS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "cdcx_depth_fills",
        "Profitable fills found per depth analysis",
        vec![0.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 20.0]
    )
    .unwrap()
});

/// Revalidation rejections.
/// Labels: kind (data_error/no_price/no_arbitrage/low_volume/low_margin)
pub static REVALIDATION_REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cdcx_revalidation_rejected_total",
        "Opportunities rejected at decision time",
        &["kind"]
    )
    .unwrap()
});

/// Attempts by terminal status.
pub static ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cdcx_attempts_total",
        "Execution attempts by terminal status",
        &["status"]
    )
    .unwrap()
});

/// Realized profit in the common unit.
/// Labels: sign (gain/loss)
pub static REALIZED_PROFIT: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cdcx_realized_profit_sum",
        "Sum of absolute realized profit in the common unit",
        &["sign"]
    )
    .unwrap()
});

/// Time spent waiting for the execution lock.
pub static LOCK_WAIT_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "cdcx_execution_lock_wait_seconds",
        "Time spent waiting for the execution lock",
        vec![0.001, 0.01, 0.1, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]
    )
    .unwrap()
});

/// Cumulative investment of the current run, funding currency.
pub static INVESTMENT: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "cdcx_run_investment",
        "Cumulative investment of the current run"
    )
    .unwrap()
});

/// Recovery orders submitted.
pub static RECOVERY_ORDERS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("cdcx_recovery_orders_total", "Recovery orders submitted").unwrap()
});

/// Live-loop cycles completed.
pub static CYCLES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("cdcx_live_cycles_total", "Live-loop cycles completed").unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn opportunity_evaluated(currency: &str, viable: bool) {
        let viable = if viable { "true" } else { "false" };
        OPPORTUNITIES_TOTAL
            .with_label_values(&[currency, viable])
            .inc();
    }

    pub fn fetch_error(source: &str) {
        FETCH_ERRORS_TOTAL.with_label_values(&[source]).inc();
    }

    pub fn depth_analyzed(fills: usize) {
        DEPTH_FILLS.observe(fills as f64);
    }

    pub fn revalidation_rejected(kind: &str) {
        REVALIDATION_REJECTED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn attempt_finished(status: &str) {
        ATTEMPTS_TOTAL.with_label_values(&[status]).inc();
    }

    /// Record realized profit. Losses are tracked under `sign="loss"`.
    pub fn realized_profit(profit: f64) {
        let sign = if profit < 0.0 { "loss" } else { "gain" };
        REALIZED_PROFIT
            .with_label_values(&[sign])
            .inc_by(profit.abs());
    }

    pub fn lock_wait(seconds: f64) {
        LOCK_WAIT_SECONDS.observe(seconds);
    }

    pub fn investment_set(value: f64) {
        INVESTMENT.set(value);
    }

    pub fn recovery_submitted() {
        RECOVERY_ORDERS_TOTAL.inc();
    }

    pub fn cycle_completed() {
        CYCLES_TOTAL.inc();
    }
}
