//! Two-leg attempt state machine.
//!
//! ```text
//! buy (market) --filled--> sell (market) --filled--> SellFilled
//!     |                         |
//!  not filled               not filled / rejected
//!     v                         v
//! BuyAborted            recovery sell {COIN}{FUNDING} --> RecoveryFilled | RecoveryFailed
//! ```
//!
//! The sell leg is never submitted before the buy leg is confirmed filled.
//! A partially filled buy is still an abort, but its notional counts as
//! investment.
//! Once inventory is held, exactly one recovery order for the full executed
//! volume is sent if the sell leg does not fill. Recovery is not retried.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use cdcx_core::{AttemptStatus, ExecutionAttempt, OrderId, OrderSide, OrderType, Size};
use cdcx_detector::RealTimeOpportunity;
use cdcx_feed::{FeedResult, RateOracle};
use cdcx_telemetry::Metrics;

use crate::clock::DynClock;
use crate::poller::{FillPoller, PollOutcome};
use crate::trading::DynTradingClient;

/// Timeouts and currencies for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptConfig {
    /// Fill timeout of the buy and sell legs.
    pub order_timeout: Duration,
    pub recovery_timeout: Duration,
    /// Currency the recovery leg sells back into.
    pub funding_currency: String,
}

impl Default for AttemptConfig {
    fn default() -> Self {
        Self {
            order_timeout: Duration::from_secs(30),
            recovery_timeout: Duration::from_secs(15),
            funding_currency: "USDT".to_string(),
        }
    }
}

/// Runs one attempt from buy submission to a terminal state.
#[derive(Clone)]
pub struct AttemptRunner {
    client: DynTradingClient,
    poller: FillPoller,
    oracle: Arc<RateOracle>,
    clock: DynClock,
    config: AttemptConfig,
}

impl AttemptRunner {
    pub fn new(
        client: DynTradingClient,
        poller: FillPoller,
        oracle: Arc<RateOracle>,
        clock: DynClock,
        config: AttemptConfig,
    ) -> Self {
        Self {
            client,
            poller,
            oracle,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &AttemptConfig {
        &self.config
    }

    pub fn oracle(&self) -> &Arc<RateOracle> {
        &self.oracle
    }

    pub fn clock(&self) -> &DynClock {
        &self.clock
    }

    /// Execute `opp` for `volume` coins. Always returns a terminal attempt.
    pub async fn run(&self, opp: &RealTimeOpportunity, volume: Size) -> ExecutionAttempt {
        let o = &opp.opportunity;
        let mut attempt = ExecutionAttempt::new(
            o.target_currency.clone(),
            o.buy_market.clone(),
            o.sell_market.clone(),
            volume,
            opp.margin_pct,
            self.clock.now_ms(),
        );
        info!(
            currency = %attempt.currency,
            buy = %attempt.buy_market,
            sell = %attempt.sell_market,
            %volume,
            expected_margin_pct = %opp.margin_pct.round_dp(2),
            "Starting attempt"
        );

        if self.buy_leg(&mut attempt).await {
            self.sell_leg(&mut attempt).await;
            self.account_profit(&mut attempt).await;
        }

        attempt.ended_at = Some(self.clock.now_ms());
        self.report(&attempt);
        attempt
    }

    /// Returns true when the buy leg filled and inventory is held.
    async fn buy_leg(&self, attempt: &mut ExecutionAttempt) -> bool {
        step(attempt, AttemptStatus::BuySubmitted);
        attempt.buy_submitted_at = Some(self.clock.now_ms());

        let symbol = attempt.buy_market.symbol.clone();
        let order_id = match self
            .client
            .submit_order(OrderSide::Buy, OrderType::Market, &symbol, attempt.planned_volume)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                abort_buy(attempt, format!("buy order placement failed: {e}"));
                return false;
            }
        };
        attempt.buy_order_id = Some(order_id.clone());

        let outcome = self
            .poller
            .wait_terminal(&order_id, self.config.order_timeout)
            .await;

        if let Some(fill) = outcome.filled() {
            attempt.executed_volume = fill.filled_quantity;
            attempt.actual_buy_price = fill.avg_price;
            attempt.buy_fee = fill.fee_amount;
            attempt.investment = fill.filled_quantity.notional(fill.avg_price);
            step(attempt, AttemptStatus::BuyFilled);
            info!(
                currency = %attempt.currency,
                %order_id,
                filled = %fill.filled_quantity,
                avg_price = %fill.avg_price,
                "Buy filled"
            );
            return true;
        }

        if matches!(outcome, PollOutcome::TimedOut(_)) {
            self.cancel_quietly(&order_id).await;
        }
        abort_buy(attempt, describe_unfilled("buy", &outcome, self.config.order_timeout));

        // Coins from a partial fill are held; charge them to the budget.
        if let Some(partial) = outcome.last_report().filter(|r| r.filled_quantity.is_positive()) {
            attempt.investment = partial.filled_quantity.notional(partial.avg_price);
            warn!(
                currency = %attempt.currency,
                %order_id,
                filled = %partial.filled_quantity,
                avg_price = %partial.avg_price,
                investment = %attempt.investment,
                "Buy partially filled before abort, reconcile manually"
            );
        }
        false
    }

    async fn sell_leg(&self, attempt: &mut ExecutionAttempt) {
        let volume = attempt.executed_volume;
        let symbol = attempt.sell_market.symbol.clone();

        let order_id = match self
            .client
            .submit_order(OrderSide::Sell, OrderType::Market, &symbol, volume)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                let reason = format!("sell order placement failed: {e}");
                self.recover(attempt, reason).await;
                return;
            }
        };
        step(attempt, AttemptStatus::SellSubmitted);
        attempt.sell_order_id = Some(order_id.clone());

        let outcome = self
            .poller
            .wait_terminal(&order_id, self.config.order_timeout)
            .await;

        if let Some(fill) = outcome.filled() {
            attempt.actual_sell_price = fill.avg_price;
            attempt.sell_fee = fill.fee_amount;
            step(attempt, AttemptStatus::SellFilled);
            info!(
                currency = %attempt.currency,
                %order_id,
                avg_price = %fill.avg_price,
                "Sell filled"
            );
            return;
        }

        if matches!(outcome, PollOutcome::TimedOut(_)) {
            self.cancel_quietly(&order_id).await;
        }
        let reason = describe_unfilled("sell", &outcome, self.config.order_timeout);
        self.recover(attempt, reason).await;
    }

    /// Sell the full executed volume back into the funding currency.
    async fn recover(&self, attempt: &mut ExecutionAttempt, cause: String) {
        let symbol = format!("{}{}", attempt.currency, self.config.funding_currency);
        let volume = attempt.executed_volume;
        warn!(currency = %attempt.currency, %cause, %symbol, %volume, "Sell leg failed, recovering");

        step(attempt, AttemptStatus::RecoverySubmitted);
        attempt.recovery_symbol = Some(symbol.clone());
        Metrics::recovery_submitted();

        let order_id = match self
            .client
            .submit_order(OrderSide::Sell, OrderType::Market, &symbol, volume)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                attempt.error_reason = Some(format!("{cause}; recovery placement failed: {e}"));
                step(attempt, AttemptStatus::RecoveryFailed);
                return;
            }
        };
        attempt.recovery_order_id = Some(order_id.clone());

        let outcome = self
            .poller
            .wait_terminal(&order_id, self.config.recovery_timeout)
            .await;

        match outcome.filled() {
            Some(fill) => {
                attempt.actual_sell_price = fill.avg_price;
                attempt.sell_fee = fill.fee_amount;
                attempt.error_reason = Some(format!("{cause}; recovered via {symbol}"));
                step(attempt, AttemptStatus::RecoveryFilled);
            }
            None => {
                let detail = describe_unfilled("recovery", &outcome, self.config.recovery_timeout);
                attempt.error_reason = Some(format!("{cause}; {detail}"));
                step(attempt, AttemptStatus::RecoveryFailed);
            }
        }
    }

    /// Profit of a filled attempt in the common unit.
    ///
    /// Buy amounts use the buy market's quote currency. Sell amounts use the
    /// sell market's, or the funding currency after a recovery.
    async fn account_profit(&self, attempt: &mut ExecutionAttempt) {
        if !attempt.status.is_success() {
            return;
        }
        let sell_quote = if attempt.status == AttemptStatus::RecoveryFilled {
            self.config.funding_currency.clone()
        } else {
            attempt.sell_market.quote_currency.clone()
        };

        match self.profit_in_common(attempt, &sell_quote).await {
            Ok((profit, margin_pct)) => {
                attempt.actual_profit = Some(profit);
                attempt.actual_margin_pct = margin_pct;
            }
            Err(e) => {
                let note = format!("profit unavailable: {e}");
                warn!(currency = %attempt.currency, %note);
                attempt.error_reason = Some(match attempt.error_reason.take() {
                    Some(prev) => format!("{prev}; {note}"),
                    None => note,
                });
            }
        }
    }

    async fn profit_in_common(
        &self,
        attempt: &ExecutionAttempt,
        sell_quote: &str,
    ) -> FeedResult<(Decimal, Option<Decimal>)> {
        let buy_rate = self
            .oracle
            .rate_to_common(&attempt.buy_market.quote_currency)
            .await?;
        let sell_rate = self.oracle.rate_to_common(sell_quote).await?;

        let volume = attempt.executed_volume;
        let cost = volume.notional(attempt.actual_buy_price) * buy_rate;
        let proceeds = volume.notional(attempt.actual_sell_price) * sell_rate;
        let fees = attempt.buy_fee * buy_rate + attempt.sell_fee * sell_rate;
        let profit = proceeds - cost - fees;

        let margin_pct = if cost > Decimal::ZERO {
            Some(profit / cost * Decimal::ONE_HUNDRED)
        } else {
            None
        };
        Ok((profit, margin_pct))
    }

    async fn cancel_quietly(&self, order_id: &OrderId) {
        if let Err(e) = self.client.cancel_order(order_id).await {
            debug!(%order_id, error = %e, "Cancel after timeout failed");
        }
    }

    fn report(&self, attempt: &ExecutionAttempt) {
        Metrics::attempt_finished(&attempt.status.to_string());
        if let Some(profit) = attempt.actual_profit {
            Metrics::realized_profit(profit.to_f64().unwrap_or_default());
        }

        match attempt.status {
            AttemptStatus::RecoveryFailed => error!(
                currency = %attempt.currency,
                volume = %attempt.executed_volume,
                reason = attempt.error_reason.as_deref().unwrap_or_default(),
                "Recovery failed, manual intervention required"
            ),
            AttemptStatus::BuyAborted => warn!(
                currency = %attempt.currency,
                reason = attempt.error_reason.as_deref().unwrap_or_default(),
                "Attempt aborted at buy leg"
            ),
            status => info!(
                currency = %attempt.currency,
                %status,
                profit = ?attempt.actual_profit,
                margin_pct = ?attempt.actual_margin_pct.map(|m| m.round_dp(2)),
                duration_ms = ?attempt.duration_ms(),
                "Attempt finished"
            ),
        }
    }
}

/// Advance the attempt; the runner only requests legal transitions.
fn step(attempt: &mut ExecutionAttempt, next: AttemptStatus) {
    if let Err(e) = attempt.advance(next) {
        error!(currency = %attempt.currency, error = %e, "Illegal attempt transition");
    }
}

fn abort_buy(attempt: &mut ExecutionAttempt, reason: String) {
    attempt.executed_volume = Size::ZERO;
    attempt.investment = Decimal::ZERO;
    attempt.error_reason = Some(reason);
    step(attempt, AttemptStatus::BuyAborted);
}

/// Reason text for a leg that did not fill. Partial fills are called out
/// for manual reconciliation.
fn describe_unfilled(leg: &str, outcome: &PollOutcome, timeout: Duration) -> String {
    let mut reason = match outcome {
        PollOutcome::Terminal(r) => format!("{leg} order {}", r.status),
        PollOutcome::TimedOut(_) => format!("{leg} order not filled within {}s", timeout.as_secs()),
    };
    if let Some(partial) = outcome
        .last_report()
        .map(|r| r.filled_quantity)
        .filter(|q| q.is_positive())
    {
        reason.push_str(&format!(" (partial fill {partial}, reconcile manually)"));
    }
    reason
}
