//! Run-level safety controls.
//!
//! This module provides:
//! - `ShutdownLatch`: one-way stop signal checked before every new attempt
//! - `PositionBudget`: cumulative-investment and order-count admission control

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::Notify;
use tracing::{info, warn};

// ============================================================================
// ShutdownLatch
// ============================================================================

/// Process-wide shutdown latch.
///
/// Once triggered no new attempt starts. Attempts already past the buy
/// fill run to a terminal state. The latch never resets.
///
/// # Example
/// ```
/// use cdcx_executor::ShutdownLatch;
///
/// let latch = ShutdownLatch::new();
/// latch.trigger("ctrl-c");
/// latch.trigger("second signal");
/// assert_eq!(latch.reason().as_deref(), Some("ctrl-c"));
/// ```
#[derive(Debug, Default)]
pub struct ShutdownLatch {
    triggered: AtomicBool,
    /// Set on first trigger only.
    reason: Mutex<Option<String>>,
    triggered_at: Mutex<Option<Instant>>,
    notify: Notify,
}

impl ShutdownLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Trigger shutdown. Later calls keep the first reason.
    pub fn trigger(&self, reason: &str) {
        if !self.triggered.swap(true, Ordering::AcqRel) {
            *self.reason.lock() = Some(reason.to_string());
            *self.triggered_at.lock() = Some(Instant::now());
            warn!(reason, "Shutdown requested, no new attempts will start");
            self.notify.notify_waiters();
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    #[must_use]
    pub fn triggered_at(&self) -> Option<Instant> {
        *self.triggered_at.lock()
    }

    /// Resolve once the latch is triggered.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// PositionBudget
// ============================================================================

/// Why the budget refuses a new attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetRefusal {
    PositionLimit { invested: Decimal, max: Decimal },
    OrderLimit { started: usize, max: usize },
}

impl std::fmt::Display for BudgetRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PositionLimit { invested, max } => {
                write!(f, "position limit reached: {invested} >= {max}")
            }
            Self::OrderLimit { started, max } => {
                write!(f, "order limit reached: {started} >= {max}")
            }
        }
    }
}

/// Cumulative investment of one run, in the funding currency.
///
/// Lives inside the execution lock; every read and update happens in the
/// same critical section as the attempt itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionBudget {
    max_position: Decimal,
    max_orders: usize,
    invested: Decimal,
    orders_started: usize,
}

impl PositionBudget {
    pub fn new(max_position: Decimal, max_orders: usize) -> Self {
        Self {
            max_position,
            max_orders,
            invested: Decimal::ZERO,
            orders_started: 0,
        }
    }

    pub fn max_position(&self) -> Decimal {
        self.max_position
    }

    pub fn invested(&self) -> Decimal {
        self.invested
    }

    pub fn orders_started(&self) -> usize {
        self.orders_started
    }

    pub fn remaining(&self) -> Decimal {
        (self.max_position - self.invested).max(Decimal::ZERO)
    }

    /// Whether another attempt may start.
    pub fn admit(&self) -> Result<(), BudgetRefusal> {
        if self.invested >= self.max_position {
            return Err(BudgetRefusal::PositionLimit {
                invested: self.invested,
                max: self.max_position,
            });
        }
        if self.orders_started >= self.max_orders {
            return Err(BudgetRefusal::OrderLimit {
                started: self.orders_started,
                max: self.max_orders,
            });
        }
        Ok(())
    }

    /// Record one finished attempt and its deployed capital.
    pub fn record(&mut self, investment: Decimal) {
        self.orders_started += 1;
        if investment > Decimal::ZERO {
            self.invested += investment;
        }
        info!(
            invested = %self.invested,
            max = %self.max_position,
            orders = self.orders_started,
            "Position budget updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_latch_keeps_first_reason() {
        let latch = ShutdownLatch::new();
        assert!(!latch.is_triggered());
        assert!(latch.reason().is_none());

        latch.trigger("signal");
        latch.trigger("other");

        assert!(latch.is_triggered());
        assert_eq!(latch.reason().as_deref(), Some("signal"));
        assert!(latch.triggered_at().is_some());
    }

    #[tokio::test]
    async fn test_latch_wait_wakes_waiters() {
        let latch = Arc::new(ShutdownLatch::new());
        let waiter = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait().await })
        };
        tokio::task::yield_now().await;

        latch.trigger("test");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
        // Already triggered: returns at once
        latch.wait().await;
    }

    #[test]
    fn test_budget_admission() {
        let mut budget = PositionBudget::new(dec!(100), 3);
        assert!(budget.admit().is_ok());

        budget.record(dec!(60));
        assert_eq!(budget.remaining(), dec!(40));
        assert!(budget.admit().is_ok());

        budget.record(dec!(45));
        assert_eq!(budget.remaining(), dec!(0));
        assert_eq!(
            budget.admit(),
            Err(BudgetRefusal::PositionLimit {
                invested: dec!(105),
                max: dec!(100)
            })
        );
    }

    #[test]
    fn test_budget_order_limit() {
        let mut budget = PositionBudget::new(dec!(1000), 2);
        budget.record(Decimal::ZERO);
        budget.record(dec!(10));
        assert!(matches!(
            budget.admit(),
            Err(BudgetRefusal::OrderLimit { started: 2, max: 2 })
        ));
        assert_eq!(
            budget.admit().unwrap_err().to_string(),
            "order limit reached: 2 >= 2"
        );
    }
}
