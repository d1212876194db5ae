//! Execution ledger.
//!
//! Collects every finished attempt of a run and aggregates them into an
//! [`ExecutionResult`]. Optional sinks see each attempt as it is recorded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;

use cdcx_core::{ExecutionAttempt, ExecutionResult};

/// Receives each attempt as soon as it is recorded.
pub trait AttemptSink: Send + Sync {
    fn on_attempt(&self, attempt: &ExecutionAttempt);
}

pub struct ExecutionLedger {
    started_at: DateTime<Utc>,
    attempts: Mutex<Vec<ExecutionAttempt>>,
    sinks: Vec<Arc<dyn AttemptSink>>,
}

impl ExecutionLedger {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            attempts: Mutex::new(Vec::new()),
            sinks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AttemptSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn record(&self, attempt: ExecutionAttempt) {
        for sink in &self.sinks {
            sink.on_attempt(&attempt);
        }
        self.attempts.lock().push(attempt);
    }

    pub fn len(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.lock().is_empty()
    }

    pub fn attempts(&self) -> Vec<ExecutionAttempt> {
        self.attempts.lock().clone()
    }

    /// Aggregate everything recorded so far.
    pub fn summarize(&self) -> ExecutionResult {
        let result = ExecutionResult::summarize(self.attempts(), self.started_at, Utc::now());
        info!(
            attempts = result.attempts.len(),
            successful = result.successful_count(),
            total_profit = %result.total_profit,
            total_investment = %result.total_investment,
            success_rate = %result.success_rate.round_dp(2),
            "Run summary"
        );
        result
    }
}

impl Default for ExecutionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLedger")
            .field("started_at", &self.started_at)
            .field("attempts", &self.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdcx_core::{AttemptStatus, MarketRef, OrderId, Size};
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct CountingSink {
        seen: Mutex<Vec<AttemptStatus>>,
    }

    impl AttemptSink for CountingSink {
        fn on_attempt(&self, attempt: &ExecutionAttempt) {
            self.seen.lock().push(attempt.status);
        }
    }

    fn attempt(status: AttemptStatus, profit: Option<rust_decimal::Decimal>) -> ExecutionAttempt {
        let mut a = ExecutionAttempt::new(
            "XRP",
            MarketRef::new("XRPUSDT", "B-XRP_USDT", "USDT"),
            MarketRef::new("XRPINR", "I-XRP_INR", "INR"),
            Size::new(dec!(10)),
            dec!(4),
            0,
        );
        if status != AttemptStatus::NonViable {
            a.buy_order_id = Some(OrderId::new("b"));
        }
        a.status = status;
        a.actual_profit = profit;
        a
    }

    #[test]
    fn test_record_and_summarize() {
        let sink = Arc::new(CountingSink::default());
        let ledger = ExecutionLedger::new().with_sink(sink.clone());

        ledger.record(attempt(AttemptStatus::SellFilled, Some(dec!(5))));
        ledger.record(attempt(AttemptStatus::RecoveryFailed, None));
        ledger.record(attempt(AttemptStatus::NonViable, None));

        assert_eq!(ledger.len(), 3);
        assert_eq!(sink.seen.lock().len(), 3);

        let result = ledger.summarize();
        assert_eq!(result.total_profit, dec!(5));
        assert_eq!(result.success_rate, dec!(50));
        assert_eq!(result.needs_manual_intervention().count(), 1);
        assert!(result.ended_at >= result.started_at);
    }
}
