//! Bounded fill polling.
//!
//! Waits for an order to reach a terminal status. Polls at a fixed interval
//! until a terminal report arrives or the deadline passes. Status-query
//! errors are retried; every query is itself bounded by the remaining time.

use std::time::Duration;

use tracing::{debug, warn};

use cdcx_core::{OrderId, OrderStatusReport};

use crate::clock::DynClock;
use crate::trading::DynTradingClient;

/// Lower bound on a single status query, so the last poll at the deadline
/// still gets a chance to complete.
const MIN_QUERY_TIMEOUT: Duration = Duration::from_millis(500);

/// Result of waiting for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Order reached a terminal status (filled, cancelled, rejected).
    Terminal(OrderStatusReport),
    /// Deadline passed. Carries the last report seen, if any.
    TimedOut(Option<OrderStatusReport>),
}

impl PollOutcome {
    /// Report with a `filled` status and a positive quantity.
    pub fn filled(&self) -> Option<&OrderStatusReport> {
        match self {
            Self::Terminal(r) if r.status.is_filled() && r.filled_quantity.is_positive() => Some(r),
            _ => None,
        }
    }

    pub fn last_report(&self) -> Option<&OrderStatusReport> {
        match self {
            Self::Terminal(r) => Some(r),
            Self::TimedOut(r) => r.as_ref(),
        }
    }
}

#[derive(Clone)]
pub struct FillPoller {
    client: DynTradingClient,
    clock: DynClock,
    interval: Duration,
}

impl FillPoller {
    pub fn new(client: DynTradingClient, clock: DynClock, interval: Duration) -> Self {
        Self {
            client,
            clock,
            interval,
        }
    }

    pub async fn wait_terminal(&self, order_id: &OrderId, timeout: Duration) -> PollOutcome {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let deadline = self.clock.now_ms().saturating_add(timeout_ms);
        let mut last = None;
        let mut polls = 0u32;

        loop {
            let now = self.clock.now_ms();
            if now >= deadline {
                warn!(%order_id, polls, timeout_ms, "Order not terminal before deadline");
                return PollOutcome::TimedOut(last);
            }
            let left = Duration::from_millis(deadline - now);
            self.clock.sleep(self.interval.min(left)).await;

            let left = Duration::from_millis(deadline.saturating_sub(self.clock.now_ms()));
            polls += 1;
            let query = self.client.get_order_status(order_id);
            match tokio::time::timeout(left.max(MIN_QUERY_TIMEOUT), query).await {
                Ok(Ok(report)) => {
                    debug!(%order_id, polls, status = %report.status, "Poll");
                    if report.status.is_terminal() {
                        return PollOutcome::Terminal(report);
                    }
                    last = Some(report);
                }
                Ok(Err(e)) => debug!(%order_id, polls, error = %e, "Status query failed, retrying"),
                Err(_) => debug!(%order_id, polls, "Status query timed out, retrying"),
            }
        }
    }
}
